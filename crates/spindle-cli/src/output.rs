//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.
//! Colors are automatically disabled when output is piped.

use std::time::Duration;

use colored::{ColoredString, Colorize};

/// Initialize color support based on environment.
/// Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

// === Error Output ===

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

// === Bench Output ===

pub fn workload(name: &str) -> ColoredString {
    name.yellow().bold()
}

pub fn side_pool() -> ColoredString {
    "pool ".cyan()
}

pub fn side_green() -> ColoredString {
    "green".green()
}

pub fn elapsed(d: Duration) -> ColoredString {
    format!("{:>9.3}s", d.as_secs_f64()).bold()
}

/// "green 3.10x faster" / "pool 1.25x faster".
pub fn verdict(pool: Duration, green: Duration) -> String {
    let (p, g) = (pool.as_secs_f64(), green.as_secs_f64());
    if p == 0.0 || g == 0.0 {
        return "too fast to compare".dimmed().to_string();
    }
    if g <= p {
        format!("{} {:.2}x faster", "green".green(), p / g)
    } else {
        format!("{} {:.2}x faster", "pool".cyan(), g / p)
    }
}

// === Help Output ===

pub fn title(name: &str) -> ColoredString {
    name.bold()
}

pub fn version(v: &str) -> ColoredString {
    v.dimmed()
}

pub fn section_header(header: &str) -> ColoredString {
    header.yellow().bold()
}

pub fn command(name: &str) -> ColoredString {
    name.green()
}

pub fn arg(name: &str) -> ColoredString {
    name.cyan()
}

// === Decorations ===

pub fn separator(width: usize) -> ColoredString {
    "─".repeat(width).dimmed()
}

pub fn thread_tag(id: u8) -> ColoredString {
    format!("#{}", id).blue()
}
