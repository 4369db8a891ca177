//! Pool vs. green workloads.
//!
//! Each workload runs the same task body twice: once per OS thread on the
//! pool, once per green thread on the scheduler. Green variants yield at
//! the points where a real async runtime would suspend.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use spindle_rt::{yield_now, PoolError, Scheduler, ThreadPool};

use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Io,
    Compute,
    Memory,
}

impl Workload {
    pub const ALL: [Workload; 3] = [Workload::Io, Workload::Compute, Workload::Memory];

    pub fn parse(name: &str) -> Option<Vec<Workload>> {
        match name {
            "io" => Some(vec![Workload::Io]),
            "compute" => Some(vec![Workload::Compute]),
            "memory" => Some(vec![Workload::Memory]),
            "all" => Some(Self::ALL.to_vec()),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Workload::Io => "IO-heavy",
            Workload::Compute => "Compute-heavy",
            Workload::Memory => "Memory-heavy",
        }
    }

    pub fn default_tasks(self) -> u64 {
        match self {
            Workload::Io => 200,
            Workload::Compute => 12,
            Workload::Memory => 32,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Workload::Io => "downloads",
            Workload::Compute | Workload::Memory => "workers",
        }
    }
}

pub struct Timing {
    pub pool: Duration,
    pub green: Duration,
}

const IO_DELAY: Duration = Duration::from_millis(100);
const PRIME_LIMIT: u64 = 2_000_000;
const PRIME_YIELD_EVERY: u64 = 50_000;
const MEMORY_ROUNDS: u32 = 200;
const MEMORY_WORDS: usize = 15_000;
const MEMORY_YIELD_EVERY: u32 = 100;

pub fn run(workload: Workload, tasks: u64) -> Result<Timing, PoolError> {
    let pool = time_pool(workload, tasks)?;
    let green = time_green(workload, tasks);
    Ok(Timing { pool, green })
}

fn time_pool(workload: Workload, tasks: u64) -> Result<Duration, PoolError> {
    let pool = ThreadPool::new();
    let done = Arc::new(AtomicU64::new(0));
    let progress = Progress::new(tasks, workload.unit());
    let started = Instant::now();

    for index in 0..tasks {
        let done = done.clone();
        pool.try_spawn(move || {
            match workload {
                Workload::Io => thread::sleep(IO_DELAY),
                Workload::Compute => {
                    black_box(count_primes(slice(index, tasks), |_| {}));
                }
                Workload::Memory => churn(|_| {}),
            }
            done.fetch_add(1, Ordering::SeqCst);
        })?;
    }

    loop {
        let n = done.load(Ordering::SeqCst);
        progress.draw(n);
        if n >= tasks {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    pool.wait()?;
    Ok(started.elapsed())
}

fn time_green(workload: Workload, tasks: u64) -> Duration {
    let mut sched = Scheduler::new();
    let started = Instant::now();

    for index in 0..tasks {
        sched.spawn(move || match workload {
            Workload::Io => {
                // Stand-in for a non-blocking read: park, then parse.
                yield_now();
                let mut parsed = 0u32;
                for i in 0..1000u32 {
                    parsed = parsed.wrapping_add(i % 100);
                }
                black_box(parsed);
            }
            Workload::Compute => {
                black_box(count_primes(slice(index, tasks), |n| {
                    if n % PRIME_YIELD_EVERY == 0 {
                        yield_now();
                    }
                }));
            }
            Workload::Memory => churn(|round| {
                if round % MEMORY_YIELD_EVERY == 0 {
                    yield_now();
                }
            }),
        });
    }

    let stats = sched.run_all();
    let elapsed = started.elapsed();
    log::debug!("{}: {:?}", workload.title(), stats);
    Progress::new(tasks, workload.unit()).draw(tasks);
    elapsed
}

/// Half-open candidate range for worker `index` of `of`.
fn slice(index: u64, of: u64) -> (u64, u64) {
    let width = PRIME_LIMIT / of.max(1);
    (index * width, (index + 1) * width)
}

fn count_primes((start, end): (u64, u64), mut on_candidate: impl FnMut(u64)) -> u32 {
    let mut count = 0;
    for n in start..end {
        if is_prime(n) {
            count += 1;
        }
        on_candidate(n);
    }
    count
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

fn churn(mut after_round: impl FnMut(u32)) {
    let mut total = 0u64;
    for round in 0..MEMORY_ROUNDS {
        let buffer: Vec<u32> = (0..MEMORY_WORDS as u32)
            .map(|i| round.wrapping_mul(i) % MEMORY_WORDS as u32)
            .collect();
        total += buffer.iter().map(|&v| v as u64).sum::<u64>();

        let mut checksum = 0u64;
        for i in 0..MEMORY_WORDS {
            checksum ^= buffer[i] as u64 * buffer[(i + 1) % MEMORY_WORDS] as u64;
        }
        black_box(checksum);
        after_round(round);
    }
    black_box(total);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primes() {
        let found: Vec<u64> = (0..30).filter(|&n| is_prime(n)).collect();
        assert_eq!(found, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(count_primes((0, 100), |_| {}), 25);
    }

    #[test]
    fn slices_tile_the_range() {
        let parts: Vec<_> = (0..4).map(|i| slice(i, 4)).collect();
        assert_eq!(parts[0].0, 0);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        assert_eq!(parts[3].1, PRIME_LIMIT);
    }

    #[test]
    fn parse_workloads() {
        assert_eq!(Workload::parse("io"), Some(vec![Workload::Io]));
        assert_eq!(Workload::parse("all").map(|w| w.len()), Some(3));
        assert_eq!(Workload::parse("disk"), None);
    }

    #[test]
    fn churn_reports_every_round() {
        let mut rounds = 0;
        churn(|_| rounds += 1);
        assert_eq!(rounds, MEMORY_ROUNDS);
    }

    #[test]
    fn io_workload_runs_on_both_sides() {
        let timing = run(Workload::Io, 4).unwrap();
        assert!(timing.pool >= IO_DELAY);
        assert!(timing.green < timing.pool);
    }
}
