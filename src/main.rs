use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use weatherlog::{history, ingest, logging, storage};

#[derive(Parser, Debug)]
#[command(
    name = "weatherlog",
    about = "Ingest framed weather-station readings from a serial device"
)]
struct Args {
    /// Serial port the device is attached to (e.g. /dev/ttyUSB0 or COM9)
    port: String,
    /// Baud rate of the serial link
    #[arg(long, default_value_t = ingest::DEFAULT_BAUD_RATE)]
    baud: u32,
    /// CSV log file, truncated at startup
    #[arg(long, default_value = storage::DEFAULT_LOG_FILE)]
    log_file: PathBuf,
    /// Maximum readings retained in the in-memory history
    #[arg(long, default_value_t = history::DEFAULT_CAPACITY)]
    capacity: usize,
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let transport = ingest::open_port(&args.port, args.baud)
        .with_context(|| format!("could not open {}", args.port))?;
    let log = storage::CsvLog::create(&args.log_file)
        .with_context(|| format!("could not create log file {}", args.log_file.display()))?;
    let history = history::History::with_capacity(args.capacity);

    // Display code reads through clones of `history`; the collector thread
    // owns the writer side and the log file handle.
    let handle = weatherlog::Collector::new(transport, history.clone(), log).start();
    info!("ingesting; logging to {}", args.log_file.display());

    handle.join().context("ingestion loop failed")?;
    Ok(())
}
