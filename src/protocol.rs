//! Wire protocol for the weather station's serial feed.
//!
//! The device transmits one newline-terminated frame per sample:
//!
//! ```text
//! T:21.50 HUM:45.00 PRES:1013.20 LUX:300.00 WIND:1.20 CHK:57
//! ```
//!
//! Everything before the ` CHK:` marker is the payload; the marker is
//! followed by the hex XOR checksum of the payload bytes. The payload is
//! five `KEY:VALUE` tokens in any order, one per sensor.
//!
//! Validation happens in two stages: [`decode_frame`] verifies the checksum
//! and yields the payload, [`decode_payload`] decodes the payload into
//! [`SensorValues`]. Both are pure functions over the input string.

use chrono::{DateTime, Local};

use crate::errors::{DecodeError, FrameError};

// ============================================================================
// Wire constants
// ============================================================================

/// Separator between payload and checksum. The leading space is part of the
/// marker: the checksum covers the exact substring before it.
pub const CHECKSUM_MARKER: &str = " CHK:";

/// Command token sent back to the device when a frame is rejected.
pub const FAULT_COMMAND: &str = "LED_ON";

/// The closed set of payload keys, all required exactly once per frame.
pub const REQUIRED_KEYS: [&str; 5] = ["T", "HUM", "PRES", "LUX", "WIND"];

// ============================================================================
// Data types
// ============================================================================

/// One of the five sensor channels carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Temperature,
    Humidity,
    Pressure,
    Illuminance,
    WindSpeed,
}

impl Channel {
    /// All channels, in wire/log column order.
    pub const ALL: [Channel; 5] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Pressure,
        Channel::Illuminance,
        Channel::WindSpeed,
    ];
}

/// The five decoded sensor fields of one frame, before timestamping.
///
/// Values are taken as transmitted; range filtering is a display concern,
/// not an ingestion concern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorValues {
    /// Temperature in °C.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Barometric pressure in hPa.
    pub pressure: f64,
    /// Illuminance in lux.
    pub illuminance: f64,
    /// Wind speed.
    pub wind_speed: f64,
}

impl SensorValues {
    /// Project one channel's value.
    pub fn channel(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
            Channel::Pressure => self.pressure,
            Channel::Illuminance => self.illuminance,
            Channel::WindSpeed => self.wind_speed,
        }
    }
}

/// One accepted sample: decoded values plus the wall-clock time at which the
/// frame was accepted. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Local>,
    pub values: SensorValues,
}

impl Reading {
    /// Stamp a decoded payload with the current wall-clock time.
    pub fn stamped_now(values: SensorValues) -> Self {
        Self {
            timestamp: Local::now(),
            values,
        }
    }
}

// ============================================================================
// Frame codec
// ============================================================================

/// XOR of every byte in `payload`. The device accumulates the same value
/// while transmitting, so a verified frame matched byte for byte.
pub fn xor_checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, b| acc ^ b)
}

/// Build a complete wire line (without terminator) for `payload`.
///
/// Inverse of [`decode_frame`]; used by tests and device simulators.
pub fn encode_frame(payload: &str) -> String {
    format!("{payload}{CHECKSUM_MARKER}{:02X}", xor_checksum(payload))
}

/// Split a raw line into payload and checksum and verify the checksum.
///
/// Returns the payload substring and the transmitted checksum. The split is
/// at the first ` CHK:` occurrence; the checksum section must be valid hex
/// and equal the recomputed XOR exactly.
pub fn decode_frame(line: &str) -> Result<(&str, u32), FrameError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(FrameError::EmptyLine);
    }

    let (payload, sent_hex) = line
        .split_once(CHECKSUM_MARKER)
        .ok_or(FrameError::MissingChecksumMarker)?;

    let sent = u32::from_str_radix(sent_hex.trim(), 16)
        .map_err(|_| FrameError::InvalidChecksumEncoding(sent_hex.to_string()))?;

    let computed = xor_checksum(payload);
    if sent != u32::from(computed) {
        return Err(FrameError::ChecksumMismatch { sent, computed });
    }

    Ok((payload, sent))
}

// ============================================================================
// Payload decoder
// ============================================================================

/// Decode a verified payload into [`SensorValues`].
///
/// The payload must be exactly five whitespace-separated `KEY:VALUE` tokens
/// covering every key in [`REQUIRED_KEYS`] exactly once, in any order. A
/// duplicate key is rejected rather than resolved last-value-wins.
pub fn decode_payload(payload: &str) -> Result<SensorValues, DecodeError> {
    let tokens: Vec<&str> = payload.split_whitespace().collect();
    if tokens.len() != REQUIRED_KEYS.len() {
        return Err(DecodeError::WrongFieldCount { got: tokens.len() });
    }

    let mut fields = [None::<f64>; REQUIRED_KEYS.len()];
    for token in tokens {
        let (key, value) = token.split_once(':').ok_or_else(|| {
            DecodeError::UnknownOrMissingKey {
                key: token.to_string(),
            }
        })?;

        let slot = REQUIRED_KEYS
            .iter()
            .position(|&k| k == key)
            .ok_or_else(|| DecodeError::UnknownOrMissingKey {
                key: key.to_string(),
            })?;

        let parsed = value
            .parse::<f64>()
            .map_err(|_| DecodeError::MalformedNumber {
                key: key.to_string(),
                value: value.to_string(),
            })?;

        // Five tokens into five distinct slots: a refill means a duplicate
        // key, which also implies some other required key is absent.
        if fields[slot].replace(parsed).is_some() {
            return Err(DecodeError::UnknownOrMissingKey {
                key: key.to_string(),
            });
        }
    }

    let get = |slot: usize| {
        fields[slot].ok_or_else(|| DecodeError::UnknownOrMissingKey {
            key: REQUIRED_KEYS[slot].to_string(),
        })
    };

    Ok(SensorValues {
        temperature: get(0)?,
        humidity: get(1)?,
        pressure: get(2)?,
        illuminance: get(3)?,
        wind_speed: get(4)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
