//! Serial weather-station data logger.
//!
//! A microcontroller streams newline-terminated frames over a serial link,
//! one sample per frame:
//!
//! ```text
//! T:21.50 HUM:45.00 PRES:1013.20 LUX:300.00 WIND:1.20 CHK:57
//! ```
//!
//! This crate ingests that stream: it verifies each frame's XOR checksum,
//! decodes the five sensor fields, keeps a bounded in-memory history for a
//! dashboard to read, and appends every accepted reading to a durable CSV
//! log. A rejected frame is answered with a `LED_ON` fault command on the
//! same link so the device can flash an indicator.
//!
//! # Usage
//!
//! ```no_run
//! use weatherlog::{Collector, CsvLog, History};
//!
//! # fn main() -> weatherlog::Result<()> {
//! let transport = weatherlog::open_port("/dev/ttyUSB0", 9600)?;
//! let log = CsvLog::create("weather_monitoring.csv")?;
//! let history = History::new();
//!
//! let handle = Collector::new(transport, history.clone(), log).start();
//! // ... hand `history` clones to display code; take snapshots at will ...
//! handle.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod protocol;
pub mod storage;

pub use errors::{DecodeError, FrameError, IngestError, Result};
pub use history::{History, DEFAULT_CAPACITY};
pub use ingest::{open_port, Collector, CollectorHandle, Transport, DEFAULT_BAUD_RATE};
pub use protocol::{
    decode_frame, decode_payload, encode_frame, xor_checksum, Channel, Reading, SensorValues,
};
pub use storage::{CsvLog, DEFAULT_LOG_FILE};
