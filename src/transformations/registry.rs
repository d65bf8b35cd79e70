//! Transformer rules and their registry.
//!
//! A transformer is a plain record, not a trait object: a name, the
//! symbolic code groups it applies to, a match predicate over the canonical
//! key and parsed value, and an extractor producing the derived JSON. The
//! registry resolves the symbolic groups to concrete code-id sets once at
//! startup.

use std::collections::HashSet;

use serde_json::Value as JsonValue;

use super::error::TransformError;
use crate::export::codes::WasmCodeRegistry;
use crate::types::events::StateEvent;

pub type MatchFn = fn(key: &str, value_json: Option<&JsonValue>) -> bool;
pub type ExtractFn = fn(event: &StateEvent) -> Result<Option<JsonValue>, TransformError>;

/// One transformation rule.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    /// Output name; the `name` column of the derived rows.
    pub name: &'static str,
    /// Symbolic code groups this rule applies to.
    pub code_ids_keys: &'static [&'static str],
    pub matches: MatchFn,
    /// Derive the output value. `Ok(None)` skips the event.
    pub extract: ExtractFn,
}

pub struct ResolvedTransformer {
    pub rule: Transformer,
    pub code_ids: HashSet<u64>,
}

pub struct TransformerRegistry {
    rules: Vec<ResolvedTransformer>,
}

impl TransformerRegistry {
    pub fn resolve(rules: Vec<Transformer>, codes: &WasmCodeRegistry) -> Self {
        let rules: Vec<ResolvedTransformer> = rules
            .into_iter()
            .map(|rule| {
                let code_ids = codes.code_ids_for_keys(rule.code_ids_keys);
                if code_ids.is_empty() {
                    tracing::warn!(
                        "transformer '{}' resolved to no code ids (keys {:?})",
                        rule.name,
                        rule.code_ids_keys
                    );
                }
                ResolvedTransformer { rule, code_ids }
            })
            .collect();

        tracing::info!("resolved {} transformer rules", rules.len());
        Self { rules }
    }

    /// Rules applicable to a contract with the given (nonzero) code id.
    pub fn matching(&self, code_id: u64) -> impl Iterator<Item = &ResolvedTransformer> + '_ {
        self.rules
            .iter()
            .filter(move |r| r.code_ids.contains(&code_id))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
