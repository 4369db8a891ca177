//! Spindle CLI - cooperative vs. preemptive concurrency demos.

mod bench;
mod output;
mod progress;

use std::cell::RefCell;
use std::env;
use std::process;
use std::rc::Rc;

use spindle_rt::{current, yield_now, Scheduler, SchedulerConfig};

use bench::Workload;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    output::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let verbose = take_flag(&mut args, "-v") | take_flag(&mut args, "--verbose");
    init_logging(verbose);

    let Some(command) = args.first().cloned() else {
        print_usage();
        return;
    };
    let rest = &args[1..];

    match command.as_str() {
        "bench" => cmd_bench(rest),
        "trace" => cmd_trace(rest),
        "help" | "--help" | "-h" => print_usage(),
        "version" | "--version" | "-V" => println!("spindle {}", VERSION),
        other => {
            eprintln!("{}: unknown command: {}", output::error_label(), other);
            print_usage();
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn print_usage() {
    println!(
        "{} {} - green threads vs. OS threads",
        output::title("Spindle"),
        output::version(VERSION)
    );
    println!();
    println!("{}", output::section_header("Usage:"));
    println!("  spindle <command> [args] [-v]");
    println!();
    println!("{}", output::section_header("Commands:"));
    println!(
        "  {} {}  Time a workload on the pool and on the scheduler",
        output::command("bench"),
        output::arg("[io|compute|memory|all] [--tasks N]")
    );
    println!(
        "  {} {}          Print the round-robin interleaving",
        output::command("trace"),
        output::arg("[--threads N] [--yields K]")
    );
    println!("  {}                                     Show this help", output::command("help"));
    println!("  {}                                  Show version", output::command("version"));
    println!();
    println!("{}", output::section_header("Environment:"));
    println!("  SPINDLE_STACK_SIZE, SPINDLE_GUARD_SIZE, SPINDLE_GUARD_POLICY, RUST_LOG, NO_COLOR");
}

fn cmd_bench(args: &[String]) {
    let mut args = args.to_vec();
    let tasks = take_number(&mut args, "--tasks");
    let name = args.first().map(String::as_str).unwrap_or("all");

    let Some(workloads) = Workload::parse(name) else {
        eprintln!("{}: unknown workload: {}", output::error_label(), name);
        eprintln!("Usage: spindle bench [io|compute|memory|all] [--tasks N]");
        process::exit(1);
    };

    for workload in workloads {
        let tasks = tasks.unwrap_or_else(|| workload.default_tasks());
        println!(
            "{} ({} tasks)",
            output::workload(workload.title()),
            tasks
        );
        match bench::run(workload, tasks) {
            Ok(timing) => {
                println!("  {} {}", output::side_pool(), output::elapsed(timing.pool));
                println!("  {} {}", output::side_green(), output::elapsed(timing.green));
                println!("  {}", output::verdict(timing.pool, timing.green));
                println!("{}", output::separator(40));
            }
            Err(e) => {
                eprintln!("{}: {}", output::error_label(), e);
                process::exit(1);
            }
        }
    }
}

fn cmd_trace(args: &[String]) {
    let mut args = args.to_vec();
    let threads = take_number(&mut args, "--threads").unwrap_or(3);
    let yields = take_number(&mut args, "--yields").unwrap_or(2);

    let config = match SchedulerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            process::exit(1);
        }
    };
    let mut sched = match Scheduler::with_config(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            process::exit(1);
        }
    };

    let steps = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..threads {
        let steps = steps.clone();
        if let Err(e) = sched.try_spawn(move || {
            for step in 0..=yields {
                if let Some(id) = current() {
                    steps.borrow_mut().push((id.as_u8(), step));
                }
                yield_now();
            }
        }) {
            eprintln!("{}: {}", output::error_label(), e);
            process::exit(1);
        }
    }

    let stats = sched.run_all();
    let steps = steps.borrow();
    for step in 0..=yields {
        let line: Vec<String> = steps
            .iter()
            .filter(|(_, s)| *s == step)
            .map(|(id, _)| output::thread_tag(*id).to_string())
            .collect();
        println!("pass {:>3}: {}", step + 1, line.join(" "));
    }
    println!(
        "{} passes, {} switches, {} finished",
        stats.passes, stats.switches, stats.finished
    );
}

/// Remove `flag` from `args`; true if it was present.
fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

/// Remove `name <value>` from `args` and parse the value.
fn take_number(args: &mut Vec<String>, name: &str) -> Option<u64> {
    let pos = args.iter().position(|a| a == name)?;
    let Some(raw) = args.get(pos + 1).cloned() else {
        eprintln!("{}: {} needs a value", output::error_label(), name);
        process::exit(1);
    };
    args.drain(pos..=pos + 1);
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            eprintln!("{}: invalid value for {}: {}", output::error_label(), name, raw);
            process::exit(1);
        }
    }
}
