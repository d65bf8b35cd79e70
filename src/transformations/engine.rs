//! Runs transformer rules against a batch of persisted state events.
//!
//! Planning is pure: select events by code-id group, evaluate the match
//! predicate, extract, and collapse duplicate `(contract, name, height)`
//! outputs to the last one. Persistence upserts under retry and joins each
//! row back to its contract.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::TransformError;
use super::registry::TransformerRegistry;
use crate::db::contracts::{self, ContractRow};
use crate::db::transformations::{self, TransformationRow};
use crate::db::DbPool;
use crate::retry::{with_retry, RetryConfig};
use crate::types::events::StateEvent;

/// Derive rows from a batch. Events whose code id is still unresolved are
/// skipped; they become eligible once a later batch re-exports them with a
/// known code id. An extractor error skips that event and the batch
/// continues.
pub fn plan(registry: &TransformerRegistry, events: &[StateEvent]) -> Vec<TransformationRow> {
    let mut rows: Vec<TransformationRow> = Vec::new();
    let mut index: HashMap<(String, &'static str, u64), usize> = HashMap::new();

    for event in events {
        if event.code_id == 0 {
            continue;
        }

        for resolved in registry.matching(event.code_id) {
            let rule = &resolved.rule;
            if !(rule.matches)(&event.key, event.value_json.as_ref()) {
                continue;
            }

            let value = match (rule.extract)(event) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(
                        "transformer '{}' failed on {} at height {}: {e}",
                        rule.name,
                        event.contract_address,
                        event.block_height
                    );
                    continue;
                }
            };

            let row = TransformationRow {
                contract_address: event.contract_address.clone(),
                block_height: event.block_height,
                name: rule.name.to_string(),
                value: Some(value),
            };

            let id = (event.contract_address.clone(), rule.name, event.block_height);
            match index.get(&id) {
                Some(&i) => rows[i] = row,
                None => {
                    index.insert(id, rows.len());
                    rows.push(row);
                }
            }
        }
    }

    rows
}

pub struct TransformerEngine {
    registry: Arc<TransformerRegistry>,
    pool: Arc<DbPool>,
    retry: RetryConfig,
}

impl TransformerEngine {
    pub fn new(registry: Arc<TransformerRegistry>, pool: Arc<DbPool>, retry: RetryConfig) -> Self {
        Self {
            registry,
            pool,
            retry,
        }
    }

    /// Plan, persist with retry, and join each row to its contract. Rows
    /// whose contract cannot be found are dropped.
    pub async fn run(
        &self,
        events: &[StateEvent],
        contracts: &mut HashMap<String, ContractRow>,
    ) -> Result<Vec<TransformationRow>, TransformError> {
        let rows = plan(&self.registry, events);
        if rows.is_empty() {
            return Ok(rows);
        }

        with_retry(&self.retry, "persist transformations", || {
            transformations::upsert_transformations(&self.pool, &rows)
        })
        .await?;

        let mut joined = Vec::with_capacity(rows.len());
        for row in rows {
            if !contracts.contains_key(&row.contract_address) {
                if let Some(contract) =
                    contracts::load_one(&self.pool, &row.contract_address).await?
                {
                    contracts.insert(contract.address.clone(), contract);
                }
            }
            if contracts.contains_key(&row.contract_address) {
                joined.push(row);
            } else {
                tracing::warn!(
                    "dropping transformation '{}': contract {} has no row",
                    row.name,
                    row.contract_address
                );
            }
        }

        tracing::debug!("persisted {} transformation rows", joined.len());
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value as JsonValue;

    use super::*;
    use crate::export::codes::WasmCodeRegistry;
    use crate::transformations::registry::Transformer;

    fn match_all(_key: &str, _value_json: Option<&JsonValue>) -> bool {
        true
    }

    fn match_config(key: &str, _value_json: Option<&JsonValue>) -> bool {
        key == "99"
    }

    fn extract_value(event: &StateEvent) -> Result<Option<JsonValue>, TransformError> {
        Ok(event.value_json.clone())
    }

    fn extract_height(event: &StateEvent) -> Result<Option<JsonValue>, TransformError> {
        Ok(Some(serde_json::json!(event.block_height)))
    }

    fn extract_nothing(_event: &StateEvent) -> Result<Option<JsonValue>, TransformError> {
        Ok(None)
    }

    fn extract_objects_only(event: &StateEvent) -> Result<Option<JsonValue>, TransformError> {
        match &event.value_json {
            Some(value) if value.is_object() => Ok(Some(value.clone())),
            other => Err(TransformError::extract(
                "objects-only",
                format!("expected a JSON object, got {other:?}"),
            )),
        }
    }

    fn registry(rules: Vec<Transformer>) -> TransformerRegistry {
        let codes = WasmCodeRegistry::from_rows(vec![
            ("group-a".to_string(), 10),
            ("group-b".to_string(), 20),
        ]);
        TransformerRegistry::resolve(rules, &codes)
    }

    fn event(address: &str, code_id: u64, height: u64, key: &str, json: JsonValue) -> StateEvent {
        StateEvent {
            contract_address: address.to_string(),
            key: key.to_string(),
            value: json.to_string(),
            value_json: Some(json),
            delete: false,
            code_id,
            block_height: height,
            block_time_unix_ms: 0,
        }
    }

    #[test]
    fn selects_events_by_code_id_group() {
        let registry = registry(vec![Transformer {
            name: "config",
            code_ids_keys: &["group-a"],
            matches: match_config,
            extract: extract_value,
        }]);

        let events = vec![
            event("juno1a", 10, 5, "99", serde_json::json!({"v": 1})),
            event("juno1b", 20, 5, "99", serde_json::json!({"v": 2})),
            event("juno1c", 10, 5, "42", serde_json::json!({"v": 3})),
            event("juno1d", 0, 5, "99", serde_json::json!({"v": 4})),
        ];

        let rows = plan(&registry, &events);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contract_address, "juno1a");
        assert_eq!(rows[0].name, "config");
        assert_eq!(rows[0].value, Some(serde_json::json!({"v": 1})));
    }

    #[test]
    fn duplicate_outputs_collapse_to_the_last() {
        let registry = registry(vec![Transformer {
            name: "latest",
            code_ids_keys: &["group-a"],
            matches: match_all,
            extract: extract_value,
        }]);

        let events = vec![
            event("juno1a", 10, 5, "1", serde_json::json!({"v": "old"})),
            event("juno1a", 10, 5, "2", serde_json::json!({"v": "new"})),
        ];

        let rows = plan(&registry, &events);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(serde_json::json!({"v": "new"})));
    }

    #[test]
    fn one_event_can_feed_many_rules() {
        let registry = registry(vec![
            Transformer {
                name: "value",
                code_ids_keys: &["group-a"],
                matches: match_all,
                extract: extract_value,
            },
            Transformer {
                name: "height",
                code_ids_keys: &["group-a"],
                matches: match_all,
                extract: extract_height,
            },
        ]);

        let events = vec![event("juno1a", 10, 7, "1", serde_json::json!(true))];
        let rows = plan(&registry, &events);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "value");
        assert_eq!(rows[1].name, "height");
        assert_eq!(rows[1].value, Some(serde_json::json!(7)));
    }

    #[test]
    fn extractor_errors_skip_the_event_and_the_batch_continues() {
        let registry = registry(vec![Transformer {
            name: "objects-only",
            code_ids_keys: &["group-a"],
            matches: match_all,
            extract: extract_objects_only,
        }]);

        let events = vec![
            event("juno1a", 10, 5, "1", serde_json::json!({"v": 1})),
            // A bare number makes the extractor error; only this event is lost.
            event("juno1b", 10, 5, "2", serde_json::json!(7)),
            event("juno1c", 10, 6, "3", serde_json::json!({"v": 3})),
        ];

        let rows = plan(&registry, &events);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].contract_address, "juno1a");
        assert_eq!(rows[1].contract_address, "juno1c");
        assert_eq!(rows[1].value, Some(serde_json::json!({"v": 3})));
    }

    #[test]
    fn extractor_returning_none_skips_the_event() {
        let registry = registry(vec![Transformer {
            name: "silent",
            code_ids_keys: &["group-a"],
            matches: match_all,
            extract: extract_nothing,
        }]);

        let events = vec![event("juno1a", 10, 7, "1", serde_json::json!(1))];
        assert!(plan(&registry, &events).is_empty());
    }
}
