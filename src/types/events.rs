//! Parsed wasm events flowing from the matcher into the export pipeline.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// A contract lifecycle event decoded from a contract-info store write.
#[derive(Debug, Clone, Serialize)]
pub struct ContractEvent {
    pub address: String,
    pub code_id: u64,
    pub admin: Option<String>,
    pub creator: Option<String>,
    pub label: Option<String>,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

/// A contract state mutation decoded from a contract-store write or delete.
#[derive(Debug, Clone, Serialize)]
pub struct StateEvent {
    pub contract_address: String,
    /// Canonical comma-decimal rendering of the user key bytes.
    pub key: String,
    pub value: String,
    pub value_json: Option<JsonValue>,
    pub delete: bool,
    /// 0 until the resolver or a lifecycle event fills it in.
    pub code_id: u64,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

/// Either kind of event, tagged with its in-batch dedup identity.
#[derive(Debug, Clone)]
pub enum WasmEvent {
    Contract(ContractEvent),
    State(StateEvent),
}

impl WasmEvent {
    /// In-batch dedup identity. Later records with the same id overwrite
    /// earlier ones before anything reaches the database.
    pub fn event_id(&self) -> String {
        match self {
            WasmEvent::Contract(e) => format!("contract:{}:{}", e.block_height, e.address),
            WasmEvent::State(e) => format!(
                "state:{}:{}:{}",
                e.block_height, e.contract_address, e.key
            ),
        }
    }

    pub fn block_height(&self) -> u64 {
        match self {
            WasmEvent::Contract(e) => e.block_height,
            WasmEvent::State(e) => e.block_height,
        }
    }

    pub fn block_time_unix_ms(&self) -> u64 {
        match self {
            WasmEvent::Contract(e) => e.block_time_unix_ms,
            WasmEvent::State(e) => e.block_time_unix_ms,
        }
    }
}
