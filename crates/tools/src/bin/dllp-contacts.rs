//! `dllp-contacts` -- build the DLLP address list from a vCard export.
//!
//! Keeps contacts whose mail domain occurs at least `--min-addresses` times
//! in the export, plus every contact of a `--manual-domain`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dllp_core::contacts::{
    filter_contacts, parse_vcards, render_address_list, ContactFilter, DEFAULT_MANUAL_DOMAINS,
    DEFAULT_MIN_ADDRESSES,
};
use dllp_tools::logging;

#[derive(Parser, Debug)]
#[command(name = "dllp-contacts", version, about = "Filter a vCard export into a Name,Email list")]
struct Cli {
    /// vCard file, e.g. a Nextcloud address book export
    input: PathBuf,

    /// Output CSV file
    #[arg(short, long, default_value = "./contacts.csv")]
    output: PathBuf,

    /// Minimum number of addresses a domain needs to be kept
    #[arg(long, default_value_t = DEFAULT_MIN_ADDRESSES)]
    min_addresses: usize,

    /// Domain kept regardless of its count (repeatable)
    #[arg(long = "manual-domain", default_values_t = DEFAULT_MANUAL_DOMAINS.iter().map(|d| d.to_string()).collect::<Vec<_>>())]
    manual_domains: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init("dllp_contacts=info,dllp_core=info");

    let cli = Cli::parse();

    let text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let contacts = parse_vcards(&text)
        .with_context(|| format!("Failed to parse {}", cli.input.display()))?;

    let filter = ContactFilter {
        min_addresses: cli.min_addresses,
        manual_domains: cli.manual_domains,
    };
    let rows = filter_contacts(&contacts, &filter);

    std::fs::write(&cli.output, render_address_list(&rows))
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    tracing::info!(
        contacts = contacts.len(),
        written = rows.len(),
        output = %cli.output.display(),
        "Address list written",
    );
    Ok(())
}
