//! Matches reconstructed interactions and particles against truth for a file of events.
//!
//! Usage:
//!   recoeval --input units.json --output report.json
//!   recoeval --input units.json --config match.json --patches patches.json --snapshot units.bin.zst

use std::error::Error;

use clap::Parser;
use log::{error, info};

use recoeval::config::EvalConfig;
use recoeval::data::io::{load_json, save_bincode, save_reports_json};
use recoeval::evaluation::batch::{build_units, process_units, UnitReport};
use recoeval::evaluation::patch::{ExternalMatchers, PatchTable};

/// Reconstruction-to-truth matching
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file of units to evaluate
    #[arg(short, long)]
    input: String,

    /// JSON matching configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Output path of the JSON report
    #[arg(short, long, default_value = "report.json")]
    output: String,

    /// JSON file of precomputed CRT-TPC and flash patches
    #[arg(short, long)]
    patches: Option<String>,

    /// Also write the matched units as a bincode snapshot
    #[arg(short, long)]
    snapshot: Option<String>,

    /// Compress the snapshot with zstd
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Restrict particle matching to matched interaction pairs, overriding the configuration
    #[arg(long, default_value_t = false)]
    hierarchical: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EvalConfig::load(path)?,
        None => EvalConfig::default(),
    };
    config.hierarchical |= args.hierarchical;

    let patches = args.patches.as_deref().map(PatchTable::load).transpose()?;
    let matchers = match &patches {
        Some(table) => ExternalMatchers { crt: Some(table), flash: Some(table) },
        None => ExternalMatchers::default(),
    };

    let inputs = load_json(&args.input)?;
    info!("loaded {} units from {}", inputs.len(), args.input);

    let mut units = Vec::with_capacity(inputs.len());
    for result in build_units(inputs) {
        match result {
            Ok(unit) => units.push(unit),
            Err(e) => error!("{}", e),
        }
    }

    let mut reports: Vec<UnitReport> = Vec::with_capacity(units.len());
    for result in process_units(&mut units, &config, &matchers) {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => error!("{}", e),
        }
    }

    save_reports_json(&args.output, &reports)?;
    info!("wrote {} unit reports to {}", reports.len(), args.output);

    if let Some(path) = &args.snapshot {
        save_bincode(path, &units, args.compress)?;
        info!("wrote snapshot of {} units to {}", units.len(), path);
    }
    Ok(())
}
