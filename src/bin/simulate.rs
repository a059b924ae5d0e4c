use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use slotsim::engine;
use slotsim::logging;

struct Args {
    config: PathBuf,
    threads: usize,
    verbose: bool,
    log_file: Option<PathBuf>,
    console: bool,
}

fn print_usage() {
    println!("Usage: simulate --config <file> [options]");
    println!();
    println!("Options:");
    println!("  -c, --config <file>   Simulation run file (required)");
    println!("  -t, --threads <N>     Worker count (default: from config, 0 = auto)");
    println!("  -v, --verbose         DEBUG-level console logging");
    println!("      --log-file <file> Also log to a file (DEBUG level)");
    println!("      --no-console      Disable console logging");
    println!("  -h, --help            Show this help");
}

fn parse_args() -> Result<Args, String> {
    let argv: Vec<String> = std::env::args().collect();
    let mut config: Option<PathBuf> = None;
    let mut threads = 0usize;
    let mut verbose = false;
    let mut log_file: Option<PathBuf> = None;
    let mut console = true;

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                match argv.get(i) {
                    Some(value) => config = Some(PathBuf::from(value)),
                    None => return Err("--config requires a filename".into()),
                }
            }
            "-t" | "--threads" => {
                i += 1;
                match argv.get(i).and_then(|v| v.parse().ok()) {
                    Some(value) => threads = value,
                    None => return Err("--threads requires a number".into()),
                }
            }
            "--log-file" => {
                i += 1;
                match argv.get(i) {
                    Some(value) => log_file = Some(PathBuf::from(value)),
                    None => return Err("--log-file requires a filename".into()),
                }
            }
            "-v" | "--verbose" => verbose = true,
            "--no-console" => console = false,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
        i += 1;
    }

    let config = config.ok_or_else(|| "--config is required".to_string())?;
    Ok(Args {
        config,
        threads,
        verbose,
        log_file,
        console,
    })
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {}", message);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(args.verbose, args.log_file.as_deref(), args.console) {
        eprintln!("Error: failed to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }

    info!("slot simulator starting");
    info!("config file: {}", args.config.display());

    match engine::run(&args.config, args.threads) {
        Ok(stats) => {
            info!(
                "simulation finished in {:.2}s: {}/{} sessions completed ({} failed)",
                stats.elapsed_secs,
                stats.completed,
                stats.total_tasks,
                stats.failed
            );
            info!("results under {}", stats.output_dir.display());
            if stats.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!("fatal: {}", err);
            ExitCode::FAILURE
        }
    }
}
