//! Core War match runner.
//!
//! Assembles one or more Redcode warriors and runs them against each other.
//!
//! # Usage
//! ```text
//! redcode <warrior.red>... [OPTIONS]
//! ```
//!
//! # Options
//! - `--preset <name>`: `icws86` (default) or `koth`
//! - `--seed <n>`: Seed for random placement
//! - `--cycles <n>`: Cycles before the match is a tie
//! - `--separation <n>`: Fixed distance between warriors
//! - `--trace`: Log every executed instruction
//!
//! The log level is read from `REDCODE_LOG`.

use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use redcode::utils::log::{self, Level, LOG_ENV};
use redcode::virtual_machine::assembler::assemble_file;
use redcode::virtual_machine::options::{Separation, VmOptions};
use redcode::virtual_machine::program::Program;
use redcode::virtual_machine::vm::trace::LogTrace;
use redcode::virtual_machine::vm::{MatchResult, VM};
use redcode::{error, info, warn};
use std::env;
use std::process;
use std::str::FromStr;

fn main() {
    if let Some(value) = log::init_from_env() {
        warn!("ignoring unknown {LOG_ENV} value '{value}'");
    }

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let mut files: Vec<&str> = Vec::new();
    let mut options = VmOptions::default();
    let mut seed: Option<u64> = None;
    let mut cycles: Option<usize> = None;
    let mut separation: Option<usize> = None;
    let mut trace = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--preset" => {
                let name = flag_value(&args, i);
                options = VmOptions::preset(name).unwrap_or_else(|| {
                    error!("Unknown preset: '{name}' (expected icws86 or koth)");
                    process::exit(1);
                });
                i += 2;
            }
            "--seed" => {
                seed = Some(parse_number(&args, i));
                i += 2;
            }
            "--cycles" => {
                cycles = Some(parse_number(&args, i));
                i += 2;
            }
            "--separation" => {
                separation = Some(parse_number(&args, i));
                i += 2;
            }
            "--trace" => {
                trace = true;
                i += 1;
            }
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
            file => {
                files.push(file);
                i += 1;
            }
        }
    }

    if files.is_empty() {
        error!("No warriors given");
        print_usage(&args[0]);
        process::exit(1);
    }

    options.num_warriors = files.len();
    if let Some(cycles) = cycles {
        options.cycles_before_tie = cycles;
    }
    if let Some(gap) = separation {
        options.separation = Separation::Fixed(gap);
    }
    if trace && !log::enabled(Level::Debug) {
        log::set_max_level(Some(Level::Debug));
    }

    let programs: Vec<Program> = files
        .iter()
        .map(|path| {
            // The diagnostic has already been logged.
            assemble_file(path).unwrap_or_else(|_| process::exit(1))
        })
        .collect();

    let loaded = match seed {
        Some(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            VM::with_rng(options, &programs, &mut rng)
        }
        None => VM::new(options, &programs),
    };
    let mut vm = match loaded {
        Ok(vm) => vm,
        Err(e) => {
            error!("Failed to load warriors: {}", e);
            process::exit(1);
        }
    };

    info!(
        "{} warriors, core size {}, separation {}",
        programs.len(),
        vm.options().core_size,
        vm.options().separation
    );

    let result = if trace {
        vm.with_trace(LogTrace).execute()
    } else {
        vm.execute()
    };
    report(&result, &files, &programs);
}

/// Prints the outcome to stdout.
fn report(result: &MatchResult, files: &[&str], programs: &[Program]) {
    match result.winner_id {
        Some(id) => {
            let name = programs[id]
                .metadata()
                .name
                .clone()
                .unwrap_or_else(|| files[id].to_string());
            println!("{} ({name}) after {} cycles", result.status, result.num_cycles);
        }
        None => println!("{result}"),
    }
}

/// Returns the argument following the flag at `i`, exiting if there is none.
fn flag_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            error!("{} requires an argument", args[i]);
            process::exit(1);
        }
    }
}

fn parse_number<T: FromStr>(args: &[String], i: usize) -> T {
    let value = flag_value(args, i);
    value.parse().unwrap_or_else(|_| {
        error!("Invalid value for {}: '{}' is not a valid number", args[i], value);
        process::exit(1);
    })
}

const USAGE: &str = "
Core War match runner

USAGE:
    {program} <warrior.red>... [OPTIONS]

ARGS:
    <warrior.red>...    Redcode source files, one per warrior

OPTIONS:
    --preset <name>      Option preset: icws86 (default) or koth
    --seed <n>           Seed for random warrior placement
    --cycles <n>         Cycles before the match is declared a tie
    --separation <n>     Fixed distance between warriors instead of random
    --trace              Log every executed instruction
    -h, --help           Print this help message

ENVIRONMENT:
    REDCODE_LOG    Log level: debug, info, warn, error or off (default info)

EXAMPLES:
    # Dwarf against an imp with default settings
    {program} dwarf.red imp.red

    # Reproducible King of the Hill match
    {program} dwarf.red imp.red --preset koth --seed 42

    # Step-by-step trace of a short match
    {program} dwarf.red imp.red --cycles 20 --trace
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
