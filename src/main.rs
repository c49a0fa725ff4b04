//! GridRunner CLI Entry Point
//!
//! Provides command-line interface for workflow execution.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow
//! gridrunner ci.yaml
//!
//! # Dry run mode (preview resolved instances)
//! gridrunner ci.yaml --dry-run
//!
//! # Specify working directory
//! gridrunner ci.yaml --working-dir /path/to/checkout
//!
//! # Set parallelism and a per-step timeout
//! gridrunner ci.yaml --jobs 2 --parallel 8 --timeout 600
//!
//! # Save a JSON report
//! gridrunner ci.yaml --report report.json
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info};

use gridrunner::execution::Engine;
use gridrunner::workflow::parser::load_workflow;
use gridrunner::{APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Default maximum parallel jobs.
const DEFAULT_MAX_PARALLEL_JOBS: usize = 4;

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    dry_run: bool,
    working_dir: Option<PathBuf>,
    max_parallel_jobs: usize,
    max_parallel_instances: Option<usize>,
    step_timeout: Option<Duration>,
    report_path: Option<PathBuf>,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            dry_run: false,
            working_dir: None,
            max_parallel_jobs: DEFAULT_MAX_PARALLEL_JOBS,
            max_parallel_instances: None,
            step_timeout: None,
            report_path: None,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Matrix-Driven Workflow Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: gridrunner [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>     Path to workflow YAML file");
    println!();
    println!("Options:");
    println!("  --dry-run           Expand and resolve instances without execution");
    println!("  --working-dir PATH  Set working directory for step execution");
    println!("  --jobs N            Maximum parallel jobs (default: {})", DEFAULT_MAX_PARALLEL_JOBS);
    println!("  --parallel N        Maximum parallel run instances per job (default: CPU count)");
    println!("  --timeout SECS      Per-step timeout in seconds (default: unlimited)");
    println!("  --report PATH       Save a JSON execution report");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  gridrunner ci.yaml");
    println!("  gridrunner ci.yaml --dry-run");
    println!("  gridrunner ci.yaml --jobs 2 --parallel 8 --timeout 600");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--working-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--working-dir requires a path argument".to_string());
                }
                config.working_dir = Some(PathBuf::from(&args[i]));
            }
            "--jobs" => {
                i += 1;
                if i >= args.len() {
                    return Err("--jobs requires a number argument".to_string());
                }
                config.max_parallel_jobs = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid jobs value: {}", args[i]))?;
            }
            "--parallel" => {
                i += 1;
                if i >= args.len() {
                    return Err("--parallel requires a number argument".to_string());
                }
                let parallel: usize = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid parallel value: {}", args[i]))?;
                config.max_parallel_instances = Some(parallel);
            }
            "--timeout" => {
                i += 1;
                if i >= args.len() {
                    return Err("--timeout requires a seconds argument".to_string());
                }
                let secs: u64 = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid timeout value: {}", args[i]))?;
                config.step_timeout = Some(Duration::from_secs(secs));
            }
            "--report" => {
                i += 1;
                if i >= args.len() {
                    return Err("--report requires a path argument".to_string());
                }
                config.report_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                // Positional argument
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Validates the working directory without changing the process cwd;
/// the engine passes it to each spawned step instead.
fn validate_working_directory(
    working_dir: &Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(dir) = working_dir else {
        return Ok(());
    };

    if !dir.exists() {
        return Err(format!("Working directory does not exist: {}", dir.display()).into());
    }

    if !dir.is_dir() {
        return Err(format!("Path is not a directory: {}", dir.display()).into());
    }

    info!("Working directory: {}", dir.display());
    Ok(())
}

/// Main application entry point.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    if config.dry_run {
        info!("Mode: DRY RUN (actions will not execute)");
        println!();
    }

    validate_working_directory(&config.working_dir)?;

    // Load workflow
    info!("Loading workflow: {}", config.workflow_path);
    let workflow = load_workflow(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;

    info!("Workflow loaded: {} job(s)", workflow.len());

    // Create and configure engine
    let mut engine = Engine::new(workflow);
    engine.set_max_parallel_jobs(config.max_parallel_jobs);
    engine.set_dry_run(config.dry_run);

    if let Some(parallel) = config.max_parallel_instances {
        engine.set_max_parallel_instances(parallel);
    }

    if let Some(timeout) = config.step_timeout {
        engine.set_step_timeout(timeout);
    }

    if let Some(dir) = config.working_dir {
        engine.set_working_dir(dir);
    }

    // Execute workflow
    let report = engine.run();
    report.print_summary();

    if let Some(ref path) = config.report_path {
        report.save(path)?;
    }

    Ok(report.succeeded())
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
