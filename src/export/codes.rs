//! Symbolic code-key registry.
//!
//! Allowlist rules and transformers name contract families by a symbolic
//! key ("cw20", "dao-core") rather than chain-specific code ids. The
//! registry holds the key → code-id mapping loaded from the `wasm_codes`
//! table; the external code tracker keeps that table fresh.

use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Default)]
pub struct WasmCodeRegistry {
    by_key: HashMap<String, BTreeSet<u64>>,
}

impl WasmCodeRegistry {
    pub fn from_rows(rows: Vec<(String, u64)>) -> Self {
        let mut by_key: HashMap<String, BTreeSet<u64>> = HashMap::new();
        for (key, code_id) in rows {
            by_key.entry(key).or_default().insert(code_id);
        }
        Self { by_key }
    }

    /// Union of code ids behind the given keys. Unknown keys contribute
    /// nothing; the tracker may simply not have seen them yet.
    pub fn code_ids_for_keys<S: AsRef<str>>(&self, keys: &[S]) -> HashSet<u64> {
        let mut out = HashSet::new();
        for key in keys {
            if let Some(ids) = self.by_key.get(key.as_ref()) {
                out.extend(ids.iter().copied());
            } else {
                tracing::debug!("code key '{}' has no known code ids", key.as_ref());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unions_code_ids_across_keys() {
        let registry = WasmCodeRegistry::from_rows(vec![
            ("cw20".to_string(), 1),
            ("cw20".to_string(), 2),
            ("cw721".to_string(), 9),
        ]);

        let ids = registry.code_ids_for_keys(&["cw20", "cw721"]);
        assert_eq!(ids, HashSet::from([1, 2, 9]));

        let ids = registry.code_ids_for_keys(&["cw20", "unknown"]);
        assert_eq!(ids, HashSet::from([1, 2]));
    }
}
