//! Spin-then-yield backoff for idle workers and waiting callers.
//!
//! Nothing here ever parks or sleeps: an idle participant keeps its OS
//! thread runnable so a freshly enqueued task is picked up with minimal
//! latency. The cost is CPU burn while the graph is idle. A parking path
//! (condition variable woken on enqueue, guarded by the same idle flags)
//! is the alternative when CPU budget matters more than wake latency.

use std::hint::spin_loop;
use std::thread;

#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;

    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// One idle round: exponential spinning first, then `yield_now`.
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }

    /// True once spinning has given way to yielding.
    pub fn is_yielding(&self) -> bool {
        self.step > Self::SPIN_LIMIT
    }
}
