pub mod blocks;
pub mod codes;
pub mod contracts;
pub mod error;
pub mod indexer_state;
pub mod migrations;
pub mod pool;
pub mod state_events;
pub mod transformations;

pub use error::DbError;
pub use pool::DbPool;
