//! Keystore document handling.
//!
//! Provides version-aware parsing and serialization of the JSON keystore
//! layout read by downstream signers.

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::error::KeystoreError;
use crate::keystore::KeystoreRecord;

pub mod v4;

/// Latest keystore version
pub const CURRENT_VERSION: u32 = v4::VERSION_V4;

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Parses a keystore document into a [`KeystoreRecord`].
///
/// Automatically dispatches to the appropriate version parser.
///
/// # Errors
///
/// Returns [`KeystoreError::Malformed`] if the document is not valid JSON or
/// lacks a version, and [`KeystoreError::Unsupported`] for unknown versions
/// or algorithms.
pub fn parse(data: &str) -> Result<KeystoreRecord, KeystoreError> {
    let probe: VersionProbe =
        serde_json::from_str(data).map_err(|e| KeystoreError::Malformed(e.to_string()))?;

    match probe.version {
        v4::VERSION_V4 => v4::parse(data),
        v => Err(KeystoreError::Unsupported(format!("version {v}"))),
    }
}

/// Serializes a record to its JSON document.
///
/// # Errors
///
/// Returns an error if the version is unsupported.
pub fn serialize(record: &KeystoreRecord) -> Result<String> {
    match record.version() {
        v4::VERSION_V4 => v4::serialize(record),
        v => bail!("unsupported keystore version {v}"),
    }
}

/// Decodes a hex field, tolerating a `0x` prefix.
pub(crate) fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, KeystoreError> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(value).map_err(|e| KeystoreError::Malformed(format!("{field}: {e}")))
}
