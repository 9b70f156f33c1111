use std::io;
use thiserror::Error;

/// Frame-level rejection: the line could not be validated against its
/// transmitted checksum. Recoverable; the frame is discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty line")]
    EmptyLine,
    #[error("checksum marker not transmitted")]
    MissingChecksumMarker,
    #[error("checksum is not valid hex: {0:?}")]
    InvalidChecksumEncoding(String),
    #[error("checksum mismatch: transmitted {sent:#04X}, computed {computed:#04X}")]
    ChecksumMismatch { sent: u32, computed: u8 },
}

/// Payload-level rejection: the frame verified but its fields did not decode.
/// Recoverable; the frame is discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected 5 fields, got {got}")]
    WrongFieldCount { got: usize },
    #[error("unknown, missing, or duplicate field key: {key:?}")]
    UnknownOrMissingKey { key: String },
    #[error("field {key} has malformed number {value:?}")]
    MalformedNumber { key: String, value: String },
}

/// Fatal conditions that terminate the ingestion loop.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("log persistence error: {0}")]
    Persistence(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
