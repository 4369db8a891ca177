// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Green threads (stackful, cooperative, single OS thread).
//!
//! Components:
//! - `thread`    — Thread struct, id, lifecycle states
//! - `scheduler` — registry, run loop, trampoline, yield

pub mod scheduler;
pub mod thread;

pub use scheduler::{current, yield_now, RunStats, Scheduler, MAX_THREADS};
pub use thread::{ThreadId, ThreadState};
