//! Classifies raw trace records into wasm events.
//!
//! A record is either noise (another module's store, a read, a malformed
//! value), a contract lifecycle event, or a contract state event. Decode
//! failures drop the offending record and the batch continues.

use prost::Message;

use crate::decoding::contract_info::ContractInfo;
use crate::decoding::keys::{self, DecodedKey, KeyFamily, KeyLayout};
use crate::decoding::trace::{TraceOperation, TraceRecord};
use crate::types::events::{ContractEvent, StateEvent, WasmEvent};

pub struct Matcher {
    layout: KeyLayout,
    bech32_prefix: String,
}

impl Matcher {
    pub fn new(chain_id: &str, bech32_prefix: impl Into<String>) -> Self {
        Self {
            layout: KeyLayout::for_chain(chain_id),
            bech32_prefix: bech32_prefix.into(),
        }
    }

    /// Classify one trace record. `None` means the record is not a wasm
    /// event worth exporting.
    pub fn classify(&self, record: &TraceRecord) -> Option<WasmEvent> {
        if record.operation == TraceOperation::Other {
            return None;
        }

        let key_bytes = match record.key_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("dropping record with undecodable key: {e}");
                return None;
            }
        };

        let decoded = match keys::decode_key(self.layout, &key_bytes) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!("dropping malformed wasm key: {e}");
                return None;
            }
        };

        let address = match keys::bech32_address(&self.bech32_prefix, &decoded.address) {
            Ok(address) => address,
            Err(e) => {
                tracing::debug!("dropping record with unencodable address: {e}");
                return None;
            }
        };

        match decoded.family {
            KeyFamily::ContractInfo => self.classify_contract(record, address),
            KeyFamily::ContractState => Some(self.classify_state(record, address, &decoded)),
        }
    }

    fn classify_contract(&self, record: &TraceRecord, address: String) -> Option<WasmEvent> {
        // Contract-info deletes don't occur on-chain; only writes carry
        // a ContractInfo payload.
        if record.operation != TraceOperation::Write {
            return None;
        }

        let value = record.value_bytes().ok()?;
        let info = match ContractInfo::decode(value.as_slice()) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("dropping contract-info write with bad protobuf: {e}");
                return None;
            }
        };

        if info.code_id == 0 {
            return None;
        }

        Some(WasmEvent::Contract(ContractEvent {
            address,
            code_id: info.code_id,
            admin: none_if_empty(info.admin),
            creator: none_if_empty(info.creator),
            label: none_if_empty(info.label),
            block_height: record.metadata.block_height,
            block_time_unix_ms: record.block_time_unix_ms,
        }))
    }

    fn classify_state(
        &self,
        record: &TraceRecord,
        address: String,
        decoded: &DecodedKey,
    ) -> WasmEvent {
        let delete = record.operation == TraceOperation::Delete;

        let raw_value = record.value_bytes().unwrap_or_else(|e| {
            tracing::debug!("state value is not valid base64, keeping raw text: {e}");
            record.value.clone().into_bytes()
        });

        let value = match String::from_utf8(raw_value.clone()) {
            Ok(text) => text,
            // Non-UTF-8 payloads downgrade to lossy text; value_json stays unset.
            Err(_) => String::from_utf8_lossy(&raw_value).into_owned(),
        };

        let value_json = if delete {
            None
        } else {
            serde_json::from_slice(&raw_value).ok()
        };

        WasmEvent::State(StateEvent {
            contract_address: address,
            key: keys::canonical_key(&decoded.state_key),
            value,
            value_json,
            delete,
            code_id: 0,
            block_height: record.metadata.block_height,
            block_time_unix_ms: record.block_time_unix_ms,
        })
    }
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine;
    use prost::Message;

    use super::*;
    use crate::decoding::keys::{encode_key, KeyFamily, KeyLayout};
    use crate::decoding::trace::TraceMetadata;

    fn record(operation: TraceOperation, key: &[u8], value: &[u8], height: u64) -> TraceRecord {
        TraceRecord {
            operation,
            key: BASE64_STANDARD.encode(key),
            value: BASE64_STANDARD.encode(value),
            metadata: TraceMetadata {
                block_height: height,
            },
            block_time_unix_ms: 1_700_000_000_000,
        }
    }

    fn contract_info(code_id: u64) -> Vec<u8> {
        ContractInfo {
            code_id,
            creator: "c".to_string(),
            admin: "a".to_string(),
            label: "L".to_string(),
            created: None,
            ibc_port_id: String::new(),
        }
        .encode_to_vec()
    }

    #[test]
    fn contract_instantiation_write() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let key = encode_key(
            KeyLayout::Standard,
            KeyFamily::ContractInfo,
            &[1u8; 32],
            &[],
        );
        let record = record(TraceOperation::Write, &key, &contract_info(42), 100);

        let event = matcher.classify(&record).unwrap();
        let WasmEvent::Contract(event) = event else {
            panic!("expected contract event");
        };
        assert_eq!(event.code_id, 42);
        assert_eq!(event.admin.as_deref(), Some("a"));
        assert_eq!(event.creator.as_deref(), Some("c"));
        assert_eq!(event.label.as_deref(), Some("L"));
        assert_eq!(event.block_height, 100);
        assert!(event.address.starts_with("osmo1"));
    }

    #[test]
    fn state_write_with_json_value() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let key = encode_key(
            KeyLayout::Standard,
            KeyFamily::ContractState,
            &[2u8; 32],
            &[1, 2, 3],
        );
        let record = record(TraceOperation::Write, &key, br#"{"x":1}"#, 101);

        let WasmEvent::State(event) = matcher.classify(&record).unwrap() else {
            panic!("expected state event");
        };
        assert_eq!(event.key, "1,2,3");
        assert_eq!(event.value, r#"{"x":1}"#);
        assert_eq!(event.value_json, Some(serde_json::json!({"x": 1})));
        assert!(!event.delete);
        assert_eq!(event.code_id, 0);
    }

    #[test]
    fn state_delete_has_no_json() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let key = encode_key(
            KeyLayout::Standard,
            KeyFamily::ContractState,
            &[2u8; 32],
            b"balances",
        );
        let record = record(TraceOperation::Delete, &key, b"", 102);

        let WasmEvent::State(event) = matcher.classify(&record).unwrap() else {
            panic!("expected state event");
        };
        assert!(event.delete);
        assert!(event.value_json.is_none());
        assert!(event.value.is_empty());
    }

    #[test]
    fn non_utf8_value_downgrades_without_json() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let key = encode_key(
            KeyLayout::Standard,
            KeyFamily::ContractState,
            &[2u8; 32],
            &[7],
        );
        let record = record(TraceOperation::Write, &key, &[0xff, 0xfe, 0x00], 103);

        let WasmEvent::State(event) = matcher.classify(&record).unwrap() else {
            panic!("expected state event");
        };
        assert!(event.value_json.is_none());
        assert!(!event.value.is_empty());
    }

    #[test]
    fn bad_protobuf_is_dropped() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let key = encode_key(
            KeyLayout::Standard,
            KeyFamily::ContractInfo,
            &[1u8; 32],
            &[],
        );
        // A stray continuation byte is not a valid message.
        let record = record(TraceOperation::Write, &key, &[0x80], 100);
        assert!(matcher.classify(&record).is_none());
    }

    #[test]
    fn zero_code_id_is_dropped() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let key = encode_key(
            KeyLayout::Standard,
            KeyFamily::ContractInfo,
            &[1u8; 32],
            &[],
        );
        let record = record(TraceOperation::Write, &key, &contract_info(0), 100);
        assert!(matcher.classify(&record).is_none());
    }

    #[test]
    fn contract_info_delete_is_dropped() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let key = encode_key(
            KeyLayout::Standard,
            KeyFamily::ContractInfo,
            &[1u8; 32],
            &[],
        );
        let record = record(TraceOperation::Delete, &key, b"", 100);
        assert!(matcher.classify(&record).is_none());
    }

    #[test]
    fn foreign_store_keys_are_dropped() {
        let matcher = Matcher::new("osmosis-1", "osmo");
        let mut key = vec![0x01u8];
        key.extend_from_slice(&[0u8; 40]);
        let record = record(TraceOperation::Write, &key, b"{}", 100);
        assert!(matcher.classify(&record).is_none());
    }

    #[test]
    fn terra_classic_length_prefixed_keys() {
        let matcher = Matcher::new("columbus-5", "terra");
        let key = encode_key(
            KeyLayout::LengthPrefixed,
            KeyFamily::ContractState,
            &[0x11u8; 20],
            &[9, 9],
        );
        let record = record(TraceOperation::Write, &key, b"1", 200);

        let WasmEvent::State(event) = matcher.classify(&record).unwrap() else {
            panic!("expected state event");
        };
        assert_eq!(event.key, "9,9");
        assert!(event.contract_address.starts_with("terra1"));
    }
}
