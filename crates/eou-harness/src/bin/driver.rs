//! CLI entrypoint for the eou record driver.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use clap::Parser;

use eou_core::{SafetyLevel, safety_level, set_safety_level};
use eou_harness::driver::{DEFAULT_CAPACITY, DEFAULT_STACK_SLOTS};
use eou_harness::{DriverConfig, LogEmitter};

/// Load 8-byte records into owning slots and audit their release.
#[derive(Debug, Parser)]
#[command(name = "eou-driver")]
#[command(about = "Record-driven exerciser for eou owning slots")]
struct Cli {
    /// Binary input of native-endian i64 records ("-" for stdin).
    #[arg(long, default_value = "-")]
    input: PathBuf,
    /// Maximum number of stored records.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,
    /// Leading records kept in stack storage.
    #[arg(long, default_value_t = DEFAULT_STACK_SLOTS)]
    stack_slots: usize,
    /// Null-source policy (strict|tolerant). Defaults to the process policy.
    #[arg(long)]
    mode: Option<String>,
    /// Structured JSONL log output path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Report JSON output path (if omitted, prints to stdout).
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(raw) = cli.mode.as_deref() {
        set_safety_level(SafetyLevel::from_str_loose(raw));
    }
    // Builds with the `strict` feature keep the strict level regardless.
    let mode = safety_level();
    let config = DriverConfig {
        capacity: cli.capacity,
        stack_slots: cli.stack_slots,
        mode,
    };

    let input: Box<dyn Read> = if cli.input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(&cli.input)?))
    };
    let sink: Box<dyn Write> = match &cli.log {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::sink()),
    };
    let run_id = format!("eou-driver-{}", std::process::id());
    let mut log = LogEmitter::new(sink, &run_id);

    let report = eou_harness::run(input, &config, &mut log)?;
    let body = serde_json::to_string_pretty(&report)?;
    match &cli.report {
        Some(path) => {
            std::fs::write(path, format!("{body}\n"))?;
            eprintln!("Wrote report to {}", path.display());
        }
        None => println!("{body}"),
    }

    if !report.audit_passed() {
        return Err(format!(
            "ownership audit failed: {} acquisitions, {} releases, {} outstanding",
            report.ledger.acquisitions, report.ledger.releases, report.ledger.outstanding
        )
        .into());
    }
    Ok(())
}
