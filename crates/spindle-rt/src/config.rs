// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler configuration.
//!
//! Defaults suit debug builds running moderately deep recursion inside a
//! green thread. Environment overrides let benchmarks resize stacks
//! without recompiling.

use std::env;

use crate::error::ConfigError;
use crate::stack::GuardPolicy;

/// Default stack size per green thread.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Default guard margin at each end of a stack.
pub const DEFAULT_GUARD_SIZE: usize = 1024;

pub const ENV_STACK_SIZE: &str = "SPINDLE_STACK_SIZE";
pub const ENV_GUARD_SIZE: &str = "SPINDLE_GUARD_SIZE";
pub const ENV_GUARD_POLICY: &str = "SPINDLE_GUARD_POLICY";

/// Per-scheduler settings applied to every thread it spawns.
///
/// A task that may panic needs room for the panic hook on its own stack.
/// Keep such tasks at [`DEFAULT_STACK_SIZE`] or above; with
/// `RUST_BACKTRACE` set, a stack of a few dozen KiB overflows while the
/// backtrace is captured and the process dies by `SIGSEGV` instead of
/// the panic-abort path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Total bytes mapped per stack, guards included.
    pub stack_size: usize,
    /// Requested guard bytes at each end. `Protect` rounds this up to a page.
    pub guard_size: usize,
    pub guard_policy: GuardPolicy,
}

impl SchedulerConfig {
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_guard_size(mut self, guard_size: usize) -> Self {
        self.guard_size = guard_size;
        self
    }

    pub fn with_guard_policy(mut self, guard_policy: GuardPolicy) -> Self {
        self.guard_policy = guard_policy;
        self
    }

    /// Defaults overridden by `SPINDLE_STACK_SIZE`, `SPINDLE_GUARD_SIZE`
    /// and `SPINDLE_GUARD_POLICY` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_STACK_SIZE) {
            config.stack_size = parse_size(ENV_STACK_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_GUARD_SIZE) {
            config.guard_size = parse_size(ENV_GUARD_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_GUARD_POLICY) {
            config.guard_policy = match value.trim().to_ascii_lowercase().as_str() {
                "protect" => GuardPolicy::Protect,
                "reserve" => GuardPolicy::Reserve,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_GUARD_POLICY,
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject stacks that leave no usable bytes between the guards.
    ///
    /// Checked against the requested guard; page rounding under
    /// `Protect` is re-checked at allocation time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let guards = self.guard_size.saturating_mul(2);
        if self.stack_size <= guards {
            return Err(ConfigError::StackTooSmall {
                stack_size: self.stack_size,
                guard_size: self.guard_size,
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            guard_size: DEFAULT_GUARD_SIZE,
            guard_policy: GuardPolicy::Protect,
        }
    }
}

/// Accepts plain byte counts and `k`/`m` suffixes (`64k`, `1m`).
fn parse_size(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    let invalid = || ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    };

    let trimmed = value.trim().to_ascii_lowercase();
    let (digits, scale) = if let Some(n) = trimmed.strip_suffix('k') {
        (n, 1024)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 1024 * 1024)
    } else {
        (trimmed.as_str(), 1)
    };

    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(invalid)
}
