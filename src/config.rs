use crate::error::{Error, Result};
use crate::executor::PanicStrategy;

/// Worker pool configuration for a [`TaskGraph`](crate::TaskGraph).
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of default-class workers. `None` derives it from the hardware.
    pub default_workers: Option<usize>,
    /// Cap applied to the derived default worker count.
    pub max_default_workers: usize,
    /// Workers that only ever drain the background class.
    pub background_workers: usize,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    pub panic_strategy: PanicStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_workers: None,
            max_default_workers: 16,
            background_workers: 2,
            thread_name_prefix: "taskgraph-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
            panic_strategy: PanicStrategy::default(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.default_workers {
            if n == 0 {
                return Err(Error::config("default_workers must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("default_workers too large (max 1024)"));
            }
        }

        if self.max_default_workers == 0 {
            return Err(Error::config("max_default_workers must be > 0"));
        }

        if self.background_workers > 64 {
            return Err(Error::config("background_workers too large (max 64)"));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        Ok(())
    }

    /// Resolves the number of default-class workers.
    ///
    /// One hardware thread is left for the initializing thread, which joins
    /// the pool whenever it waits on a task.
    pub fn default_worker_threads(&self) -> Result<usize> {
        if let Some(n) = self.default_workers {
            return Ok(n);
        }

        let hardware = num_cpus::get();
        if hardware <= 1 {
            return Err(Error::InsufficientParallelism);
        }

        Ok((hardware - 1).min(self.max_default_workers).max(1))
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn default_workers(mut self, n: usize) -> Self {
        self.config.default_workers = Some(n);
        self
    }

    pub fn max_default_workers(mut self, n: usize) -> Self {
        self.config.max_default_workers = n;
        self
    }

    pub fn background_workers(mut self, n: usize) -> Self {
        self.config.background_workers = n;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let result = Config::builder().default_workers(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_empty_prefix() {
        let result = Config::builder().thread_name_prefix("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_worker_count_is_honored() {
        let config = Config::builder()
            .default_workers(3)
            .max_default_workers(1)
            .build()
            .unwrap();
        assert_eq!(config.default_worker_threads().unwrap(), 3);
    }

    #[test]
    fn test_derived_worker_count_respects_cap() {
        let config = Config::builder().max_default_workers(1).build().unwrap();
        if num_cpus::get() > 1 {
            assert_eq!(config.default_worker_threads().unwrap(), 1);
        } else {
            assert!(matches!(
                config.default_worker_threads(),
                Err(Error::InsufficientParallelism)
            ));
        }
    }
}
