pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::executor::{PanicStrategy, QueueType, ReleasePolicy, TaskHandle};
pub use crate::runtime::{GraphContext, TaskGraph};
pub use crate::scope::{FanOut, FanOutBuilder};
