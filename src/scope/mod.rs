//! Structured fan-out on top of the raw task API.

pub mod fan_out;
pub mod parallel_for;

pub use fan_out::{FanOut, FanOutBuilder};
