//! Redcode assembler CLI.
//!
//! Assembles a warrior and prints its canonical listing.
//!
//! # Usage
//! ```text
//! redasm <warrior.red> [OPTIONS]
//! ```
//!
//! # Options
//! - `-o, --output <file>`: Write the listing to a file instead of stdout
//! - `-q, --quiet`: Only check that the warrior assembles
//!
//! # Examples
//! ```text
//! redasm dwarf.red
//! redasm dwarf.red -o dwarf.lst
//! ```

use redcode::utils::log::{self, LOG_ENV};
use redcode::virtual_machine::assembler::assemble_file;
use redcode::virtual_machine::program::Program;
use redcode::{error, info, warn};
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    if let Some(value) = log::init_from_env() {
        warn!("ignoring unknown {LOG_ENV} value '{value}'");
    }

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut quiet = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--quiet" | "-q" => {
                quiet = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    // assemble_file logs its own diagnostic.
    let Ok(program) = assemble_file(input_path) else {
        process::exit(1);
    };

    if quiet {
        info!("{}: {} instructions", input_path, program.len());
        return;
    }

    let text = listing(&program);
    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, &text) {
                error!("Failed to write output file: {}", e);
                process::exit(1);
            }
            info!("Assembled {} -> {} ({} instructions)", input_path, path, program.len());
        }
        None => print!("{text}"),
    }
}

/// Metadata comments, `ORG` and one canonical instruction per line.
fn listing(program: &Program) -> String {
    let mut out = String::new();
    let meta = program.metadata();
    for (key, value) in [
        ("name", &meta.name),
        ("author", &meta.author),
        ("version", &meta.version),
        ("date", &meta.date),
        ("strategy", &meta.strategy),
    ] {
        if let Some(value) = value {
            for line in value.lines() {
                let _ = writeln!(out, ";{key} {line}");
            }
        }
    }
    let _ = writeln!(out, "        ORG {}", program.start_index());
    for (index, insn) in program.code().iter().enumerate() {
        let marker = if index == program.start_index() { '>' } else { ' ' };
        let _ = writeln!(out, "{marker}{index:>5}  {insn}");
    }
    out
}

const USAGE: &str = "
Redcode Assembler

USAGE:
    {program} <warrior.red> [OPTIONS]

ARGS:
    <warrior.red>    Redcode source file to assemble

OPTIONS:
    -o, --output <file>    Write the listing to a file instead of stdout
    -q, --quiet            Only check that the warrior assembles
    -h, --help             Print this help message

EXAMPLES:
    # Print the listing
    {program} dwarf.red

    # Save the listing
    {program} dwarf.red -o dwarf.lst
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
