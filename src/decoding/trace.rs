//! One record of the node's trace pipe.
//!
//! The node emits a JSON object per store mutation. Heights and times arrive
//! either as JSON numbers or as integer-valued strings depending on the node
//! version, so both are accepted.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceOperation {
    Write,
    Delete,
    /// Reads, iterations and anything a future node version may add.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceMetadata {
    #[serde(rename = "blockHeight", deserialize_with = "u64_lenient")]
    pub block_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceRecord {
    pub operation: TraceOperation,
    /// Base64-encoded store key.
    pub key: String,
    /// Base64-encoded value. Empty for deletes.
    #[serde(default)]
    pub value: String,
    pub metadata: TraceMetadata,
    #[serde(rename = "blockTimeUnixMs", deserialize_with = "u64_lenient")]
    pub block_time_unix_ms: u64,
}

impl TraceRecord {
    pub fn key_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.key)
    }

    pub fn value_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.value)
    }
}

fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
