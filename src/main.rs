//! extkeeper - Main entry point.
//!
//! Usage: extkeeper [OPTIONS] <COMMAND>
//!
//! Commands:
//!   check [--force] [--patch-only]           List available updates
//!   update [--force] [--patch-only] [NAME]   Install available updates
//!   registry                                 List registered packages
//!
//! Options:
//!   --config <PATH>  Use another rc file
//!   --verbose        Mirror log output to stderr
//!   --version, -v    Show version
//!   --help, -h       Show this help

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use extkeeper::config::Settings;
use extkeeper::logging;
use extkeeper::package::PackageContext;
use extkeeper::registry::Registry;
use extkeeper::updates::{CheckReport, UpdateChecker};
use extkeeper::VERSION;

const USAGE: &str = "\
Usage: extkeeper [OPTIONS] <COMMAND>

Commands:
  check [--force] [--patch-only]              List available updates
  update [--force] [--patch-only] [NAME...]   Install available updates
  registry                                    List registered packages

Options:
  --config <PATH>  Use another rc file
  --verbose        Mirror log output to stderr
  --version, -v    Show version
  --help, -h       Show this help";

/// Parsed command line.
#[derive(Debug, Default)]
struct Args {
    command: Option<String>,
    names: Vec<String>,
    config: Option<PathBuf>,
    force: bool,
    patch_only: bool,
    verbose: bool,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = raw.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--force" | "-f" => args.force = true,
            "--patch-only" => args.patch_only = true,
            "--verbose" => args.verbose = true,
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {}", flag)),
            word if args.command.is_none() => args.command = Some(word.to_string()),
            word => args.names.push(word.to_string()),
        }
    }

    Ok(args)
}

fn main() -> ExitCode {
    let raw: Vec<String> = env::args().skip(1).collect();

    if raw.iter().any(|a| a == "--version" || a == "-v") {
        println!("extkeeper v{}", VERSION);
        return ExitCode::SUCCESS;
    }
    if raw.is_empty() || raw.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the command. `Ok(false)` means it completed but reported failure.
fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    settings.log_config.verbose |= args.verbose;

    if let Err(e) = logging::init(&settings.log_config) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match args.command.as_deref() {
        Some("check") => {
            let ctx = PackageContext::from_settings(&settings)?;
            let mut checker = UpdateChecker::new(ctx, settings.cache_window);
            let report = checker.check_all(args.force, args.patch_only);
            print_report(&report);
            Ok(!report.is_unreachable())
        }
        Some("update") => {
            let ctx = PackageContext::from_settings(&settings)?;
            let mut checker = UpdateChecker::new(ctx, settings.cache_window);
            let mut report = checker.check_all(args.force, args.patch_only);
            if report.is_unreachable() {
                print_report(&report);
                return Ok(false);
            }
            if !args.names.is_empty() {
                report
                    .packages
                    .retain(|p| args.names.iter().any(|n| n == p.name()));
            }
            if report.is_empty() {
                println!("No updates.");
                return Ok(true);
            }

            let mut ok = true;
            for (name, result) in checker.update_all(&mut report) {
                match result {
                    Ok(()) => println!("Updated {}", name),
                    Err(e) => {
                        eprintln!("Failed to update {}: {}", name, e);
                        ok = false;
                    }
                }
            }
            Ok(ok)
        }
        Some("registry") => {
            let registry = Registry::from_settings(&settings)?;
            for entry in registry.all()? {
                println!(
                    "{:<30} {}",
                    entry.name,
                    entry.repository.as_deref().unwrap_or("-")
                );
            }
            Ok(true)
        }
        Some(other) => Err(format!("Unknown command: {}\n\n{}", other, USAGE).into()),
        None => Err(USAGE.into()),
    }
}

fn print_report(report: &CheckReport) {
    if report.is_unreachable() {
        eprintln!("Could not check for updates.");
        return;
    }
    if report.is_empty() {
        println!("No updates.");
        return;
    }
    for package in &report.packages {
        println!(
            "{:<30} {} -> {}",
            package.name(),
            package.local_version().unwrap_or("?"),
            package.remote_version().unwrap_or("latest")
        );
    }
}
