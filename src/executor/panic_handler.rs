use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// What happens when a task function panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicStrategy {
    /// Log the panic and abort the process.
    #[default]
    Abort,
    /// Swallow the panic silently; the task still counts as finished.
    Isolate,
    /// Log the panic; the task still counts as finished.
    LogAndContinue,
}

#[derive(Debug)]
pub struct PanicHandler {
    strategy: PanicStrategy,
    panic_count: AtomicUsize,
}

impl PanicHandler {
    pub fn new(strategy: PanicStrategy) -> Self {
        Self {
            strategy,
            panic_count: AtomicUsize::new(0),
        }
    }

    /// Runs `f`. Under [`PanicStrategy::Abort`] a panic never returns.
    pub fn execute<F, R>(&self, f: F) -> Result<R, PanicInfo>
    where
        F: FnOnce() -> R,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => Ok(result),
            Err(payload) => {
                self.panic_count.fetch_add(1, Ordering::Relaxed);
                let info = PanicInfo::from_payload(payload);

                match self.strategy {
                    PanicStrategy::Abort => {
                        tracing::error!(message = %info.message, "task panicked, aborting");
                        std::process::abort();
                    }
                    PanicStrategy::Isolate => {}
                    PanicStrategy::LogAndContinue => {
                        tracing::warn!(message = %info.message, "task panicked");
                    }
                }

                Err(info)
            }
        }
    }

    pub fn panic_count(&self) -> usize {
        self.panic_count.load(Ordering::Relaxed)
    }

    pub fn strategy(&self) -> PanicStrategy {
        self.strategy
    }
}

impl Default for PanicHandler {
    fn default() -> Self {
        Self::new(PanicStrategy::default())
    }
}

#[derive(Debug, Clone)]
pub struct PanicInfo {
    pub message: String,
}

impl PanicInfo {
    fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_counts_and_reports() {
        let handler = PanicHandler::new(PanicStrategy::Isolate);

        let result = handler.execute(|| -> () { panic!("mesh decode failed") });

        let info = result.unwrap_err();
        assert_eq!(info.message, "mesh decode failed");
        assert_eq!(handler.panic_count(), 1);
    }

    #[test]
    fn test_success_passes_value_through() {
        let handler = PanicHandler::new(PanicStrategy::LogAndContinue);
        assert_eq!(handler.execute(|| 7 * 6).unwrap(), 42);
        assert_eq!(handler.panic_count(), 0);
    }

    #[test]
    fn test_formatted_payload() {
        let handler = PanicHandler::new(PanicStrategy::LogAndContinue);
        for i in 0..3 {
            let err = handler
                .execute(|| -> () { panic!("chunk {} failed", i) })
                .unwrap_err();
            assert_eq!(err.message, format!("chunk {} failed", i));
        }
        assert_eq!(handler.panic_count(), 3);
    }

    #[test]
    fn test_default_strategy_aborts() {
        assert_eq!(PanicHandler::default().strategy(), PanicStrategy::Abort);
    }
}
