//! Task execution infrastructure.
//!
//! Task records and handles, the worker threads that run them, and the panic
//! policy applied around every task function.

pub mod cpu_pool;
pub mod panic_handler;
pub mod task;
pub mod worker;

pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use task::{QueueType, ReleasePolicy, TaskFunction, TaskHandle};
pub use worker::{WorkStrategy, WorkerId, WorkerStats};

pub(crate) use cpu_pool::WorkerPool;
pub(crate) use task::TaskRecord;
pub(crate) use worker::WorkerControl;
