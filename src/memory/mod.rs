//! Storage for task records.

pub mod arena;

pub use arena::{Arena, ArenaIndex, TaskArena};
