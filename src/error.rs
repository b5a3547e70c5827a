pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("task graph needs more than one hardware thread")]
    InsufficientParallelism,

    #[error("task handle refers to a released slot")]
    StaleHandle,

    #[error("task has not completed yet")]
    TaskNotComplete,

    #[error("task is reclaimed by the pool and cannot be released by the caller")]
    NotCallerOwned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
