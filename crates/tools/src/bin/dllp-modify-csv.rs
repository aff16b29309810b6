//! `dllp-modify-csv` -- reshape a mail quota report.
//!
//! Drops `context<N>` columns and moves numeric fields to the front of
//! each row. Takes exactly two paths; anything else prints the usage line
//! and exits with 1. Paths may start with `-`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dllp_core::quota_csv::reshape_csv;
use dllp_tools::logging;

const USAGE: &str = "Usage: dllp-modify-csv input_file output_file";

#[derive(Parser, Debug)]
#[command(
    name = "dllp-modify-csv",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    #[arg(allow_hyphen_values = true)]
    input_file: PathBuf,
    #[arg(allow_hyphen_values = true)]
    output_file: PathBuf,
}

/// Parse the arguments after the program name. Exactly two are accepted,
/// both taken as paths.
fn parse_args(args: Vec<OsString>) -> Option<Cli> {
    if args.len() != 2 {
        return None;
    }
    let argv = [OsString::from("dllp-modify-csv"), OsString::from("--")]
        .into_iter()
        .chain(args);
    Cli::try_parse_from(argv).ok()
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(&cli.input_file)
        .with_context(|| format!("Failed to read {}", cli.input_file.display()))?;
    let output = reshape_csv(&input)
        .with_context(|| format!("Failed to parse {}", cli.input_file.display()))?;
    std::fs::write(&cli.output_file, output)
        .with_context(|| format!("Failed to write {}", cli.output_file.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init("dllp_modify_csv=info,dllp_core=info");

    let Some(cli) = parse_args(std::env::args_os().skip(1).collect()) else {
        println!("{USAGE}");
        return ExitCode::FAILURE;
    };

    if let Err(e) = run(&cli) {
        tracing::error!(error = %e, "CSV modification failed");
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    println!(
        "CSV modification complete. Output written to {}",
        cli.output_file.display()
    );
    ExitCode::SUCCESS
}
