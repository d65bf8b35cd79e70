//! Environment-variable expansion for config values.
//!
//! Any string scalar of the form `env:NAME` is replaced with the variable's
//! value before typed deserialization; a missing variable refuses startup.
//! `envOptional:NAME` silently becomes empty when unset.

use serde_json::Value as JsonValue;

use super::indexer::ConfigError;

const ENV_PREFIX: &str = "env:";
const ENV_OPTIONAL_PREFIX: &str = "envOptional:";

pub fn expand_env(value: &mut JsonValue) -> Result<(), ConfigError> {
    match value {
        JsonValue::String(s) => {
            if let Some(name) = s.strip_prefix(ENV_PREFIX) {
                *s = std::env::var(name)
                    .map_err(|_| ConfigError::MissingEnv(name.to_string()))?;
            } else if let Some(name) = s.strip_prefix(ENV_OPTIONAL_PREFIX) {
                *s = std::env::var(name).unwrap_or_default();
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                expand_env(item)?;
            }
        }
        JsonValue::Object(map) => {
            for (_, v) in map.iter_mut() {
                expand_env(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}
