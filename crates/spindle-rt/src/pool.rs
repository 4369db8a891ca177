// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! OS-thread pool: the preemptive side of the comparison.
//!
//! `spawn` starts the task on a fresh OS thread right away; there is no
//! Ready state. `wait` is a barrier over everything launched since the
//! previous `wait`, including threads launched by those threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::error::{panic_message, PoolError};
use crate::fatal;
use crate::green::MAX_THREADS;

/// Id of a pool worker, unique until the next `wait`.
pub type WorkerId = u8;

struct Worker {
    id: WorkerId,
    handle: JoinHandle<Result<(), String>>,
}

#[derive(Default)]
struct Registry {
    workers: Vec<Worker>,
    /// Launched since the last completed `wait`.
    launched: usize,
}

/// Spawn/wait pool over OS threads. Share it behind an `Arc` to spawn
/// from inside workers.
#[derive(Default)]
pub struct ThreadPool {
    registry: Mutex<Registry>,
}

impl ThreadPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `f` on a new OS thread. Aborts the process when the pool is
    /// full or the thread cannot be created.
    pub fn spawn<F>(&self, f: F) -> WorkerId
    where
        F: FnOnce() + Send + 'static,
    {
        match self.try_spawn(f) {
            Ok(id) => id,
            Err(err) => fatal!("pool spawn failed: {}", err),
        }
    }

    pub fn try_spawn<F>(&self, f: F) -> Result<WorkerId, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut registry = self.lock();
        if registry.launched >= MAX_THREADS {
            return Err(PoolError::CapacityExceeded {
                capacity: MAX_THREADS,
            });
        }

        let id = registry.launched as WorkerId;

        let handle = thread::Builder::new()
            .name(format!("spindle-pool-{}", id))
            .spawn(move || {
                panic::catch_unwind(AssertUnwindSafe(f))
                    .map_err(|payload| panic_message(payload.as_ref()))
            })
            .map_err(PoolError::Launch)?;

        registry.launched += 1;
        registry.workers.push(Worker { id, handle });
        log::debug!("pool launched worker {}", id);
        Ok(id)
    }

    /// Block until every worker launched since the last `wait` has
    /// completed, then reclaim them. Returns how many were joined, or the
    /// first worker that panicked.
    pub fn wait(&self) -> Result<usize, PoolError> {
        let mut joined = 0;
        let mut first_panic = None;

        // Workers may launch more workers while we join, so drain until
        // a round comes back empty.
        loop {
            let batch = std::mem::take(&mut self.lock().workers);
            if batch.is_empty() {
                break;
            }
            for worker in batch {
                let outcome = worker
                    .handle
                    .join()
                    .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));
                joined += 1;
                if let Err(message) = outcome {
                    log::warn!("pool worker {} panicked: {}", worker.id, message);
                    first_panic.get_or_insert(PoolError::Panicked {
                        id: worker.id,
                        message,
                    });
                }
            }
        }

        self.lock().launched = 0;
        log::debug!("pool wait reclaimed {} worker(s)", joined);
        match first_panic {
            Some(err) => Err(err),
            None => Ok(joined),
        }
    }

    /// Workers launched and not yet reclaimed by `wait`.
    pub fn pending(&self) -> usize {
        self.lock().workers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A worker never holds the lock while running user code, so a
        // poisoned registry is still consistent.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if self.pending() > 0 {
            if let Err(err) = self.wait() {
                log::warn!("pool dropped with failed worker: {}", err);
            }
        }
    }
}
