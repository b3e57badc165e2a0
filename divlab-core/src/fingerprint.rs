//! Content fingerprints: BLAKE3 over bars, parameters and outputs.
//!
//! Two runs over the same bars with the same parameters must produce the
//! same output hash. Bars are hashed from their raw bit patterns; params
//! and outputs from their JSON form, whose field order is fixed by the
//! struct definitions and `BTreeMap` keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PipelineParams;
use crate::domain::Bar;
use crate::engine::PipelineOutput;
use crate::error::{Result, TaError};

/// Hex-encoded BLAKE3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    fn from_hasher(hasher: &blake3::Hasher) -> Self {
        Self(hasher.finalize().to_hex().to_string())
    }

    /// First 12 hex characters, for logs.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn dataset_hash(bars: &[Bar]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.time.to_le_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close] {
            hasher.update(&v.to_bits().to_le_bytes());
        }
    }
    Fingerprint::from_hasher(&hasher)
}

fn json_hash<T: Serialize>(value: &T, what: &str) -> Result<Fingerprint> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, value)
        .map_err(|e| TaError::Config(format!("serialize {what} for hashing: {e}")))?;
    Ok(Fingerprint::from_hasher(&hasher))
}

pub fn params_hash(params: &PipelineParams) -> Result<Fingerprint> {
    json_hash(params, "params")
}

pub fn output_hash(output: &PipelineOutput) -> Result<Fingerprint> {
    json_hash(output, "output")
}
