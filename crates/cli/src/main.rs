mod demo;
mod verify;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// Batch provenance ledger tools.
#[derive(Parser)]
#[command(name = "foodtrust", version, about = "Batch provenance ledger tools")]
struct Cli {
    /// Log filter directives (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an exported event log and print the folded batch snapshots
    Verify {
        /// JSON Lines file, one stored event per line
        file: PathBuf,
    },

    /// Run a create/transfer/recall walkthrough against an in-memory ledger
    Demo,
}

fn main() {
    let cli = Cli::parse();
    match &cli.log_filter {
        Some(filter) => foodtrust_observability::init_with_filter(filter),
        None => foodtrust_observability::init(),
    }

    match run(cli.command) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(2);
        }
    }
}

/// `Ok(false)` means the command ran but found problems.
fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Verify { file } => {
            let input = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let events = verify::parse_log(&input)?;
            let report = verify::verify_events(events);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(report.is_clean())
        }
        Commands::Demo => {
            let output = demo::run_scenario()?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(true)
        }
    }
}
