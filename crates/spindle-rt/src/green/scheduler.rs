// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative round-robin scheduler.
//!
//! One OS thread, many green threads. The run loop scans the registry in
//! slot order and switches into every Ready or Yielded thread; control
//! comes back only when that thread yields or finishes. Same program,
//! same yield points, same schedule.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::config::SchedulerConfig;
use crate::context::Context;
use crate::error::{panic_message, ConfigError, SpawnError};
use crate::fatal;
use crate::stack::Stack;

use super::thread::{Thread, ThreadId, ThreadState};

/// Registry capacity: the width of the thread id space.
pub const MAX_THREADS: usize = u8::MAX as usize + 1;

thread_local! {
    /// Scheduler currently driving this OS thread, if any.
    static ACTIVE: Cell<*mut Core> = const { Cell::new(ptr::null_mut()) };
}

/// Counters from one `run()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Passes over the registry that resumed at least one thread.
    pub passes: usize,
    /// Switches from the scheduler into a thread.
    pub switches: usize,
    /// Threads that reached Finished during this run.
    pub finished: usize,
}

/// Owns the registry and drives it. Not `Send`: every thread it holds
/// lives on the OS thread that created it.
pub struct Scheduler {
    /// Boxed so the address published through `ACTIVE` stays put.
    core: Box<Core>,
}

struct Core {
    /// Slot index == thread id. Grows by spawn, emptied by teardown.
    slots: Vec<Box<Thread>>,
    /// Slot of the Running thread.
    current: Option<usize>,
    /// The driver's own context; every yield and finish lands here.
    home: Box<Context>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::from_valid_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: SchedulerConfig) -> Self {
        Self {
            core: Box::new(Core {
                slots: Vec::with_capacity(MAX_THREADS),
                current: None,
                home: Context::empty(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    /// Register a Ready thread running `f`. Aborts the process if the
    /// registry is full or its stack cannot be set up.
    pub fn spawn<F>(&mut self, f: F) -> ThreadId
    where
        F: FnOnce() + 'static,
    {
        match self.try_spawn(f) {
            Ok(id) => id,
            Err(err) => fatal!("spawn failed: {}", err),
        }
    }

    /// Register a Ready thread running `f`, reporting exhaustion as an
    /// error instead of aborting.
    pub fn try_spawn<F>(&mut self, f: F) -> Result<ThreadId, SpawnError>
    where
        F: FnOnce() + 'static,
    {
        let core = &mut *self.core;
        let index = core.slots.len();
        if index >= MAX_THREADS {
            return Err(SpawnError::CapacityExceeded {
                capacity: MAX_THREADS,
            });
        }

        let config = core.config;
        let stack = Stack::allocate(config.stack_size, config.guard_size, config.guard_policy)?;
        let id = ThreadId::from_index(index);
        let thread = Thread::new(id, Box::new(f), stack, trampoline)?;
        core.slots.push(thread);

        log::debug!("spawned green thread {}", id);
        Ok(id)
    }

    /// Drive every registered thread to completion, then tear down.
    pub fn run_all(&mut self) -> RunStats {
        if self.is_empty() {
            return RunStats::default();
        }
        let stats = self.run();
        self.cleanup();
        stats
    }

    /// Drive every registered thread to completion. Finished threads stay
    /// in the registry, observable through `state`, until `cleanup`.
    pub fn run(&mut self) -> RunStats {
        let mut stats = RunStats::default();
        loop {
            let pass = self.run_pass();
            if pass.passes == 0 {
                break;
            }
            stats.passes += pass.passes;
            stats.switches += pass.switches;
            stats.finished += pass.finished;
        }

        log::debug!(
            "run complete: {} passes, {} switches, {} finished",
            stats.passes,
            stats.switches,
            stats.finished
        );
        stats
    }

    /// One pass over the registry in slot order, resuming each runnable
    /// thread once. `passes` is 0 when nothing was runnable.
    pub fn run_pass(&mut self) -> RunStats {
        let core: *mut Core = &mut *self.core;
        let _active = ActiveGuard::install(core);
        let mut stats = RunStats::default();

        // SAFETY: `core` is exclusively ours for the whole pass; no
        // reference into it is held across a switch.
        let len = unsafe { (&(*core).slots).len() };
        for index in 0..len {
            let state = unsafe { (&(*core).slots)[index].state };
            match state {
                ThreadState::Finished => {}
                ThreadState::Running => {
                    fatal!("green thread #{} already Running when visited", index)
                }
                ThreadState::Ready | ThreadState::Yielded => {
                    stats.switches += 1;
                    if unsafe { resume(core, index) } == ThreadState::Finished {
                        stats.finished += 1;
                    }
                }
            }
        }

        if stats.switches > 0 {
            stats.passes = 1;
        }
        stats
    }

    /// Release every thread and empty the registry. Unfinished threads are
    /// abandoned: values live on their stacks are never dropped.
    pub fn cleanup(&mut self) {
        let core = &mut *self.core;
        if core.slots.is_empty() {
            return;
        }

        let abandoned = core
            .slots
            .iter()
            .filter(|t| t.state != ThreadState::Finished)
            .count();
        if abandoned > 0 {
            log::warn!("tearing down {} unfinished green thread(s)", abandoned);
        }
        log::debug!("releasing {} green thread(s)", core.slots.len());

        core.slots.clear();
        core.current = None;
    }

    pub fn state(&self, id: ThreadId) -> Option<ThreadState> {
        self.core.slots.get(id.index()).map(|t| t.state)
    }

    /// Every registered thread in slot order.
    pub fn states(&self) -> impl Iterator<Item = (ThreadId, ThreadState)> + '_ {
        self.core.slots.iter().map(|t| (t.id, t.state))
    }

    pub fn len(&self) -> usize {
        self.core.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.slots.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("threads", &self.core.slots)
            .field("config", &self.core.config)
            .finish()
    }
}

/// Publishes a scheduler as `ACTIVE` for one run and restores whatever
/// was there before, so a green thread can drive a nested scheduler.
struct ActiveGuard {
    previous: *mut Core,
}

impl ActiveGuard {
    fn install(core: *mut Core) -> Self {
        let previous = ACTIVE.with(|active| active.replace(core));
        Self { previous }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.previous));
    }
}

/// Switch from the scheduler into slot `index`; returns the thread's
/// state once control comes back.
///
/// # Safety
/// `core` must be the active scheduler and `index` a runnable slot.
unsafe fn resume(core: *mut Core, index: usize) -> ThreadState {
    let (save, target) = {
        let core = &mut *core;
        let thread = &mut core.slots[index];
        thread.transition(ThreadState::Running);
        core.current = Some(index);
        log::trace!("switch -> {}", thread.id);
        (
            &mut *core.home as *mut Context,
            &*thread.context as *const Context,
        )
    };

    if let Err(err) = Context::swap(save, target) {
        fatal!("switch into green thread #{} failed: {}", index, err);
    }

    let core = &mut *core;
    core.current = None;
    let state = core.slots[index].state;
    log::trace!("switch <- #{} ({:?})", index, state);
    state
}

/// Suspend the current green thread and return to the scheduler.
///
/// A no-op when no green thread is Running on this OS thread, so shared
/// code may call it unconditionally.
pub fn yield_now() {
    let core = ACTIVE.with(Cell::get);
    if core.is_null() {
        return;
    }

    // SAFETY: `ACTIVE` is only non-null while its `run()` is on the stack.
    let (save, home) = unsafe {
        let core = &mut *core;
        let Some(index) = core.current else {
            return;
        };
        let thread = &mut core.slots[index];
        if thread.state != ThreadState::Running {
            return;
        }
        thread.transition(ThreadState::Yielded);
        (
            &mut *thread.context as *mut Context,
            &*core.home as *const Context,
        )
    };

    if let Err(err) = unsafe { Context::swap(save, home) } {
        fatal!("yield back to scheduler failed: {}", err);
    }
}

/// Id of the green thread running on this OS thread, if any.
pub fn current() -> Option<ThreadId> {
    let core = ACTIVE.with(Cell::get);
    if core.is_null() {
        return None;
    }
    // SAFETY: see `yield_now`.
    unsafe {
        let core = &*core;
        core.current.map(|index| core.slots[index].id)
    }
}

/// First frame of every green thread. Runs the entry, marks the thread
/// Finished and switches home for good.
extern "C" fn trampoline() {
    let core = ACTIVE.with(Cell::get);
    if core.is_null() {
        fatal!("green thread started with no active scheduler");
    }

    // SAFETY: the run loop published `core` and set `current` right
    // before switching here.
    let (id, entry) = unsafe {
        let core = &mut *core;
        let Some(index) = core.current else {
            fatal!("green thread started with no current slot");
        };
        let thread = &mut core.slots[index];
        (thread.id, thread.entry.take())
    };
    let Some(entry) = entry else {
        fatal!("green thread {} started twice", id);
    };

    // Unwinding past this frame has nowhere to go.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
        fatal!("green thread {} panicked: {}", id, panic_message(payload.as_ref()));
    }

    unsafe { finish(core) }
}

/// # Safety
/// Called only from `trampoline`, on the current thread's own stack.
unsafe fn finish(core: *mut Core) -> ! {
    let (id, save, home) = {
        let core = &mut *core;
        let Some(index) = core.current else {
            fatal!("green thread finished with no current slot");
        };
        let thread = &mut core.slots[index];
        thread.transition(ThreadState::Finished);
        (
            thread.id,
            &mut *thread.context as *mut Context,
            &*core.home as *const Context,
        )
    };
    log::trace!("green thread {} finished", id);

    if let Err(err) = Context::swap(save, home) {
        fatal!("switch out of finished green thread {} failed: {}", id, err);
    }
    fatal!("finished green thread {} was resumed", id);
}
