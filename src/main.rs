mod audit;
mod errors;
mod report;
mod resource;
mod scanner;
mod settings;
mod snapshot;

use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "plumbline",
    version,
    about = "Cloud resource posture auditor"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // load the snapshot, run every configured pass, and report
    let outcome = scanner::run_scan(&settings)?;

    let report = report::ScanReport::new(outcome.snapshot_timestamp, outcome.violations);
    report.summarize();
    report.write(settings.scanner.output_path.as_deref())?;
    Ok(())
}
