//! Thread registry and work-stealing queues.
//!
//! Submission is local-first: a task always lands on the submitting thread's
//! own queue. Load spreads only through stealing.

pub(crate) mod registry;
pub(crate) mod work_stealing;

pub(crate) use registry::Registry;
pub(crate) use work_stealing::Source;
