// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Spindle runtime: cooperative green threads on one OS thread.
//!
//! Logical threads run on their own mapped stacks and switch only at
//! explicit `yield_now` calls or when their task returns. The schedule is
//! deterministic: the same program with the same yield points always
//! interleaves the same way.
//!
//! Components:
//! - stack     — mapped stacks with guard margins
//! - context   — saved machine state, capture/swap
//! - green     — thread lifecycle, trampoline, round-robin scheduler
//! - pool      — OS-thread spawn/wait pool for comparison
//! - config    — scheduler settings and environment overrides
//! - error     — typed errors and the fatal-abort path

pub mod config;
pub mod context;
pub mod error;
pub mod green;
pub mod pool;
pub mod stack;

pub use config::SchedulerConfig;
pub use error::{ConfigError, PoolError, SpawnError, StackError};
pub use green::{current, yield_now, RunStats, Scheduler, ThreadId, ThreadState, MAX_THREADS};
pub use pool::ThreadPool;
pub use stack::{GuardPolicy, Stack};

#[doc(hidden)]
pub use log as __log;
