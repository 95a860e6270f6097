use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use coverprofile::ReportConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Render a Go coverage profile as an HTML report.", long_about = None)]
struct Args {
    /// Path to the coverage profile (go test -coverprofile=...)
    #[arg(required = true)]
    profile: PathBuf,

    /// Directory the report is written to
    #[arg(short, long, default_value = coverprofile::consts::DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Number of render workers
    #[arg(short, long, default_value_t = coverprofile::consts::DEFAULT_JOBS)]
    jobs: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Package prefix of module paths (read from go.mod when omitted)
    #[arg(long)]
    package: Option<String>,

    /// Directory source files are resolved against (defaults to the profile's directory)
    #[arg(long)]
    source_root: Option<PathBuf>,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    let mut builder = ReportConfig::builder()
        .output_dir(&args.output)
        .jobs(args.jobs);
    if let Some(package) = &args.package {
        builder = builder.package(package);
    }
    if let Some(root) = &args.source_root {
        builder = builder.source_root(root);
    }
    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let outcome = match coverprofile::generate(&args.profile, &config) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!(
                "Error: Failed to build report for '{}': {}",
                args.profile.display(),
                e
            );
            process::exit(1);
        }
    };

    let report = &outcome.report;
    println!("=== Coverage Report ===");
    println!("Profile: {}", args.profile.display());
    println!("Mode: {}", report.mode);
    println!("Index: {}", outcome.index.display());
    println!();

    println!("{:<8} {:<8} {:<8} {:<6} File", "Stmts", "Reached", "Missed", "Cover");
    println!("{}", "-".repeat(80));
    for module in &report.modules {
        println!(
            "{:<8} {:<8} {:<8} {:<6} {}",
            module.counts.statements,
            module.counts.reached,
            module.counts.missed,
            format!("{}%", module.counts.percentage),
            module.display_file
        );
    }
    println!("{}", "-".repeat(80));
    println!(
        "{:<8} {:<8} {:<8} {:<6} Total",
        report.totals.statements,
        report.totals.reached,
        report.totals.missed,
        format!("{}%", report.totals.percentage)
    );

    if !outcome.is_clean() {
        for failure in &outcome.pool.failures {
            warn!(module = %failure.module, error = %failure.error, "missing page");
        }
        eprintln!(
            "Error: {} of {} file pages could not be written",
            outcome.pool.failures.len(),
            outcome.pool.dispatched
        );
        process::exit(2);
    }
}
