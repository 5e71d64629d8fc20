//! Typed errors for the decoding, GATT lookup, recording, and configuration layers.
//!
//! Only [`DecodeError`] ever reaches a caller synchronously; every other
//! fault is absorbed and logged where it happens so that one misbehaving
//! sensor never stalls the others.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::types::SensorType;

/// A sensor packet could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Shorter than header + one whole sample.  Fatal to this packet only.
    #[error("{sensor} packet too short: {len} bytes (minimum: {min})")]
    PacketTooShort {
        sensor: &'static str,
        len: usize,
        min: usize,
    },
}

/// The connected peripheral does not expose an expected attribute.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GattError {
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("descriptor {descriptor} not found on characteristic {characteristic}")]
    DescriptorNotFound { characteristic: Uuid, descriptor: Uuid },
    #[error("no active link")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no sensors selected")]
    NothingSelected,
    #[error("no recording in progress")]
    NotRecording,
    #[error("no device connected")]
    NotConnected,
    #[error("{sensor} stream I/O failed: {source}")]
    Io {
        sensor: SensorType,
        #[source]
        source: std::io::Error,
    },
    #[error("{sensor} CSV write failed: {source}")]
    Csv {
        sensor: SensorType,
        #[source]
        source: csv::Error,
    },
    #[error("could not create recording directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
