use thiserror::Error;

use crate::db::DbError;
use crate::transformations::TransformError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("transformation error: {0}")]
    Transform(#[from] TransformError),

    #[error("indexer state row is missing; migrations must seed it before export")]
    MissingIndexerState,

    #[error("batch cancelled")]
    Cancelled,
}
