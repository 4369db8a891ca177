// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error types and the fatal-abort path.
//!
//! Resource exhaustion is recoverable and surfaces as a typed error.
//! Invariant violations go through `fatal!` and abort the process: a
//! scheduler with a torn context cannot continue.

use std::io;

use thiserror::Error;

/// Errors from allocating a green thread stack.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("stack of {size} bytes cannot hold two {guard}-byte guard margins")]
    TooSmall { size: usize, guard: usize },

    #[error("{size}-byte stack cannot be rounded to whole pages")]
    TooLarge { size: usize },

    #[error("failed to map {size}-byte stack: {source}")]
    Map { size: usize, source: io::Error },

    #[error("failed to protect stack guard region: {0}")]
    Protect(io::Error),
}

/// Errors from registering a new green thread.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("thread registry is full ({capacity} threads)")]
    CapacityExceeded { capacity: usize },

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("failed to prepare execution context: {0}")]
    Context(io::Error),
}

/// Errors from building a scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stack size {stack_size} must exceed twice the guard size {guard_size}")]
    StackTooSmall { stack_size: usize, guard_size: usize },

    #[error("invalid value `{value}` for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Errors from the OS-thread pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread pool is full ({capacity} threads since last wait)")]
    CapacityExceeded { capacity: usize },

    #[error("failed to launch OS thread: {0}")]
    Launch(io::Error),

    #[error("worker {id} panicked: {message}")]
    Panicked { id: u8, message: String },
}

/// Log an invariant violation and abort the process.
///
/// Writes to stderr as well as the `log` facade so the message survives
/// when no logger is installed.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::__log::error!("{}", msg);
        eprintln!("spindle: fatal: {}", msg);
        std::process::abort()
    }};
}

/// Render a panic payload the way `std` does for `&str` and `String`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
