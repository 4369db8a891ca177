//! Single-line progress bar, redrawn in place on stderr.

use std::io::{self, Write};
use std::time::Instant;

const BAR_WIDTH: usize = 40;

pub struct Progress {
    total: u64,
    label: &'static str,
    started: Instant,
}

impl Progress {
    pub fn new(total: u64, label: &'static str) -> Self {
        Self {
            total,
            label,
            started: Instant::now(),
        }
    }

    /// Redraw at `current`. Ends the line once `current` reaches the total.
    pub fn draw(&self, current: u64) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            current as f64 / elapsed
        } else {
            0.0
        };
        let line = render(current, self.total, rate, self.label);

        let mut err = io::stderr().lock();
        let _ = write!(err, "\r{}", line);
        if current >= self.total {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    }
}

/// `" 50%|████▌    | 5/10 [12.0it/s] unit"`
pub fn render(current: u64, total: u64, rate: f64, label: &str) -> String {
    let fraction = if total == 0 {
        1.0
    } else {
        (current.min(total) as f64) / (total as f64)
    };
    let cells = fraction * BAR_WIDTH as f64;
    let filled = cells as usize;

    let mut bar = "█".repeat(filled);
    if filled < BAR_WIDTH {
        let partial = cells - filled as f64;
        bar.push(match partial {
            p if p > 0.75 => '▊',
            p if p > 0.5 => '▌',
            p if p > 0.25 => '▎',
            _ => '▏',
        });
        bar.push_str(&" ".repeat(BAR_WIDTH - filled - 1));
    }

    format!(
        "{:3}%|{}| {}/{} [{:.1}it/s] {}",
        (fraction * 100.0) as u32,
        bar,
        current,
        total,
        rate,
        label
    )
}
