// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Green thread representation.
//!
//! A thread owns its stack and saved context. Its entry closure is taken
//! exactly once, by the trampoline on first scheduling.

use std::fmt;

use crate::context::Context;
use crate::error::SpawnError;
use crate::stack::Stack;

/// Thread id: the slot index in its scheduler's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u8);

impl ThreadId {
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index <= u8::MAX as usize);
        Self(index as u8)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Thread lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Spawned, never scheduled.
    Ready = 0,
    /// The one thread currently executing.
    Running = 1,
    /// Suspended at `yield_now`, waiting for the next pass.
    Yielded = 2,
    /// Entry returned. Terminal.
    Finished = 3,
}

impl ThreadState {
    /// Ready or Yielded: the run loop will switch into it.
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::Ready | Self::Yielded)
    }
}

/// Zero-argument task run on a green thread.
pub(crate) type Entry = Box<dyn FnOnce() + 'static>;

pub(crate) struct Thread {
    pub id: ThreadId,
    pub state: ThreadState,
    pub entry: Option<Entry>,
    /// Boxed: the context must not move once prepared.
    pub context: Box<Context>,
    pub stack: Stack,
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("started", &self.entry.is_none())
            .field("stack", &self.stack)
            .finish()
    }
}

impl Thread {
    /// Build a Ready thread whose context starts at `trampoline`.
    pub fn new(
        id: ThreadId,
        entry: Entry,
        stack: Stack,
        trampoline: extern "C" fn(),
    ) -> Result<Box<Self>, SpawnError> {
        let mut thread = Box::new(Self {
            id,
            state: ThreadState::Ready,
            entry: Some(entry),
            context: Context::empty(),
            stack,
        });

        // SAFETY: the stack and the boxed context live as long as the
        // thread; neither moves.
        unsafe {
            thread
                .context
                .prepare(&thread.stack, trampoline)
                .map_err(SpawnError::Context)?;
        }
        Ok(thread)
    }

    /// Move to `new`. Returns false, leaving the state alone, if already
    /// Finished.
    pub fn transition(&mut self, new: ThreadState) -> bool {
        if self.state == ThreadState::Finished {
            return false;
        }
        self.state = new;
        true
    }
}
