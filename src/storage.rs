//! Durable CSV log of accepted readings.
//!
//! The log file is truncated and re-headered once per process start, then
//! strictly appended. Every append flushes before returning, so an accepted
//! reading survives a crash immediately after acceptance; at this feed's
//! sample rate one flush per record costs nothing that matters.

use std::fs::File;
use std::path::Path;

use chrono::SecondsFormat;
use serde::Serialize;

use crate::protocol::Reading;

/// Default log file name, next to the process working directory.
pub const DEFAULT_LOG_FILE: &str = "weather_monitoring.csv";

const HEADER: [&str; 6] = ["timestamp", "temp", "hum", "pres", "lux", "wind"];

/// One log row: RFC 3339 timestamp plus the five fields at fixed precision.
#[derive(Debug, Serialize)]
struct LogRecord {
    timestamp: String,
    temp: String,
    hum: String,
    pres: String,
    lux: String,
    wind: String,
}

impl From<&Reading> for LogRecord {
    fn from(reading: &Reading) -> Self {
        let v = &reading.values;
        Self {
            timestamp: reading
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, false),
            temp: format!("{:.2}", v.temperature),
            hum: format!("{:.2}", v.humidity),
            pres: format!("{:.2}", v.pressure),
            lux: format!("{:.2}", v.illuminance),
            wind: format!("{:.2}", v.wind_speed),
        }
    }
}

/// Append-only CSV writer owned by the ingestion loop.
#[derive(Debug)]
pub struct CsvLog {
    writer: csv::Writer<File>,
}

impl CsvLog {
    /// Create or truncate the log at `path` and write the header row.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let file = File::create(path.as_ref())?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Append one reading as a row and flush it before returning.
    pub fn append(&mut self, reading: &Reading) -> Result<(), csv::Error> {
        self.writer.serialize(LogRecord::from(reading))?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SensorValues;
    use std::fs;

    fn reading(n: f64) -> Reading {
        Reading::stamped_now(SensorValues {
            temperature: n,
            humidity: 45.0,
            pressure: 1013.2,
            illuminance: 300.0,
            wind_speed: 1.2,
        })
    }

    #[test]
    fn header_plus_one_row_per_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CsvLog::create(&path).unwrap();
        for i in 0..4 {
            log.append(&reading(f64::from(i))).unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "timestamp,temp,hum,pres,lux,wind");
        for row in &lines[1..] {
            assert_eq!(row.split(',').count(), 6);
        }
    }

    #[test]
    fn rows_carry_two_decimal_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CsvLog::create(&path).unwrap();
        log.append(&reading(21.5)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        assert!(
            row.ends_with(",21.50,45.00,1013.20,300.00,1.20"),
            "unexpected row: {row}"
        );
        // Timestamp column is a full date+time, not just a time of day.
        let timestamp = row.split(',').next().unwrap();
        assert!(timestamp.contains('T'), "not ISO-8601: {timestamp}");
    }

    #[test]
    fn recreate_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        {
            let mut log = CsvLog::create(&path).unwrap();
            log.append(&reading(1.0)).unwrap();
        }
        let _log = CsvLog::create(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn rows_survive_without_explicit_drop() {
        // The per-record flush is the durability point; the file must be
        // complete even while the writer is still alive.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CsvLog::create(&path).unwrap();
        log.append(&reading(2.0)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        drop(log);
    }
}
