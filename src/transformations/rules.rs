//! Built-in transformer rules.
//!
//! Deployments extend this list with chain-specific rules; the two cw20
//! rules here cover the singleton items every cw20-compatible token keeps.

use serde_json::Value as JsonValue;

use super::error::TransformError;
use super::registry::Transformer;
use crate::types::events::StateEvent;

// Canonical renderings of the cw20 Item keys.
const TOKEN_INFO_KEY: &str = "116,111,107,101,110,95,105,110,102,111";
const MARKETING_INFO_KEY: &str = "109,97,114,107,101,116,105,110,103,95,105,110,102,111";

pub fn build_rules() -> Vec<Transformer> {
    vec![
        Transformer {
            name: "cw20/tokenInfo",
            code_ids_keys: &["cw20"],
            matches: matches_token_info,
            extract: extract_token_info,
        },
        Transformer {
            name: "cw20/marketingInfo",
            code_ids_keys: &["cw20"],
            matches: matches_marketing_info,
            extract: extract_marketing_info,
        },
    ]
}

fn matches_token_info(key: &str, value_json: Option<&JsonValue>) -> bool {
    key == TOKEN_INFO_KEY && value_json.is_some()
}

fn matches_marketing_info(key: &str, value_json: Option<&JsonValue>) -> bool {
    key == MARKETING_INFO_KEY && value_json.is_some()
}

fn extract_token_info(event: &StateEvent) -> Result<Option<JsonValue>, TransformError> {
    extract_object("cw20/tokenInfo", event)
}

fn extract_marketing_info(event: &StateEvent) -> Result<Option<JsonValue>, TransformError> {
    extract_object("cw20/marketingInfo", event)
}

/// Deleting the item nulls the derived row; writes carry the parsed value.
/// Both cw20 items are JSON objects on chain, so anything else is a broken
/// payload worth surfacing rather than indexing.
fn extract_object(name: &str, event: &StateEvent) -> Result<Option<JsonValue>, TransformError> {
    if event.delete {
        return Ok(Some(JsonValue::Null));
    }
    match &event.value_json {
        Some(value) if value.is_object() => Ok(Some(value.clone())),
        Some(value) => Err(TransformError::extract(
            name,
            format!("expected a JSON object, got {value}"),
        )),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::keys::canonical_key;

    #[test]
    fn key_constants_match_canonical_rendering() {
        assert_eq!(TOKEN_INFO_KEY, canonical_key(b"token_info"));
        assert_eq!(MARKETING_INFO_KEY, canonical_key(b"marketing_info"));
    }

    #[test]
    fn token_info_rule_matches_only_its_key() {
        let value = serde_json::json!({"name": "Token"});
        assert!(matches_token_info(TOKEN_INFO_KEY, Some(&value)));
        assert!(!matches_token_info(MARKETING_INFO_KEY, Some(&value)));
        assert!(!matches_token_info(TOKEN_INFO_KEY, None));
    }

    fn event(value_json: Option<JsonValue>, delete: bool) -> StateEvent {
        StateEvent {
            contract_address: "juno1token".to_string(),
            key: TOKEN_INFO_KEY.to_string(),
            value: value_json.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            value_json,
            delete,
            code_id: 1,
            block_height: 10,
            block_time_unix_ms: 0,
        }
    }

    #[test]
    fn extraction_carries_objects_and_nulls_deletes() {
        let value = serde_json::json!({"name": "Token", "decimals": 6});
        let extracted = extract_token_info(&event(Some(value.clone()), false)).unwrap();
        assert_eq!(extracted, Some(value));

        let extracted = extract_token_info(&event(None, true)).unwrap();
        assert_eq!(extracted, Some(JsonValue::Null));

        assert_eq!(extract_token_info(&event(None, false)).unwrap(), None);
    }

    #[test]
    fn non_object_payload_is_an_extraction_error() {
        let err = extract_token_info(&event(Some(serde_json::json!(42)), false)).unwrap_err();
        assert!(matches!(
            err,
            TransformError::Extract { ref name, .. } if name == "cw20/tokenInfo"
        ));
    }
}
