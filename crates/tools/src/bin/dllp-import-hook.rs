//! `dllp-import-hook` -- apply the DLLP pre-create hook to import users.
//!
//! Reads users as a JSON array or JSON lines from a file (or stdin), sets
//! the per-school, per-role UDM properties from UCR and writes the
//! accepted users as a JSON array. Exits with 1 if any user was rejected.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dllp_core::import_hook::DllpAutomation;
use dllp_core::registry::ConfigRegistry;
use dllp_tools::config::ToolsConfig;
use dllp_tools::import_batch::{parse_users, run_batch};
use dllp_tools::logging;

#[derive(Parser, Debug)]
#[command(name = "dllp-import-hook", version, about = "Apply DLLP settings to import users")]
struct Cli {
    /// JSON file with the users; reads stdin when omitted or `-`
    input: Option<PathBuf>,

    /// Write the annotated users here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory with the UCR layer files (overrides DLLP_UCR_DIR)
    #[arg(long)]
    ucr_dir: Option<PathBuf>,
}

fn read_input(input: Option<&PathBuf>) -> anyhow::Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = ToolsConfig::from_env()?;
    let ucr_dir = cli.ucr_dir.unwrap_or(config.ucr_dir);
    let registry = ConfigRegistry::load(&ucr_dir)
        .with_context(|| format!("Failed to load UCR from {}", ucr_dir.display()))?;

    let users = parse_users(&read_input(cli.input.as_ref())?)?;
    let hook = DllpAutomation::new(registry);
    let report = run_batch(&[&hook], users).await;

    for failure in &report.failures {
        eprintln!(
            "User #{} ({}): {}",
            failure.index,
            failure.name.as_deref().unwrap_or("unnamed"),
            failure.error
        );
    }

    let json = serde_json::to_string_pretty(&report.users)?;
    match &cli.output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(report.succeeded())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init("dllp_import_hook=info,dllp_tools=info,dllp_core=info");

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Import hook failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}
