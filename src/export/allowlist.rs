//! Per-chain state-key allowlist.
//!
//! Each rule restricts the contracts in its code-id groups to a fixed set of
//! state keys. Rules combine conjunctively: when several rules cover the
//! same code id, an event must satisfy all of them. Contracts no rule
//! covers, and events whose code id is still unresolved, pass untouched.

use std::collections::HashSet;

use serde::Deserialize;

use super::codes::WasmCodeRegistry;

/// One allowlist rule as it appears in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowlistRuleConfig {
    pub code_ids_keys: Vec<String>,
    pub state_keys: Vec<String>,
}

#[derive(Debug)]
struct ResolvedRule {
    code_ids: HashSet<u64>,
    state_keys: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct StateEventAllowlist {
    rules: Vec<ResolvedRule>,
}

impl StateEventAllowlist {
    /// No rules: everything passes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resolve(rules: &[AllowlistRuleConfig], registry: &WasmCodeRegistry) -> Self {
        let rules = rules
            .iter()
            .map(|rule| ResolvedRule {
                code_ids: registry.code_ids_for_keys(&rule.code_ids_keys),
                state_keys: rule.state_keys.iter().cloned().collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Keep an event with the given resolved code id and canonical key?
    /// Code id 0 is "unknown, decide later" and always passes.
    pub fn allows(&self, code_id: u64, key: &str) -> bool {
        if code_id == 0 {
            return true;
        }
        self.rules
            .iter()
            .filter(|rule| rule.code_ids.contains(&code_id))
            .all(|rule| rule.state_keys.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> WasmCodeRegistry {
        WasmCodeRegistry::from_rows(vec![
            ("cl-vault".to_string(), 100),
            ("cw20".to_string(), 100),
            ("cw20".to_string(), 200),
        ])
    }

    fn rule(code_ids_keys: &[&str], state_keys: &[&str]) -> AllowlistRuleConfig {
        AllowlistRuleConfig {
            code_ids_keys: code_ids_keys.iter().map(|s| s.to_string()).collect(),
            state_keys: state_keys.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn restricts_keys_for_covered_code_ids() {
        let allowlist = StateEventAllowlist::resolve(
            &[rule(&["cl-vault"], &["contract_info"])],
            &registry(),
        );

        assert!(allowlist.allows(100, "contract_info"));
        assert!(!allowlist.allows(100, "balances"));
        // Uncovered code id: unaffected.
        assert!(allowlist.allows(300, "balances"));
        // Unresolved code id: decide later.
        assert!(allowlist.allows(0, "balances"));
    }

    #[test]
    fn overlapping_rules_tighten() {
        let allowlist = StateEventAllowlist::resolve(
            &[
                rule(&["cl-vault"], &["contract_info", "balances"]),
                rule(&["cw20"], &["contract_info"]),
            ],
            &registry(),
        );

        // Code id 100 is covered by both rules; only keys in both survive.
        assert!(allowlist.allows(100, "contract_info"));
        assert!(!allowlist.allows(100, "balances"));
        // Code id 200 is only covered by the cw20 rule.
        assert!(allowlist.allows(200, "contract_info"));
        assert!(!allowlist.allows(200, "supply"));
    }

    #[test]
    fn empty_allowlist_passes_everything() {
        let allowlist = StateEventAllowlist::empty();
        assert!(allowlist.is_empty());
        assert!(allowlist.allows(100, "anything"));
    }
}
