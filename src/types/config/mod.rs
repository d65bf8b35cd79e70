pub mod env;
pub mod indexer;

pub use indexer::{ConfigError, IndexerConfig};
