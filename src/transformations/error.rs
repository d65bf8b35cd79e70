use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transformer '{name}' failed: {message}")]
    Extract { name: String, message: String },

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

impl TransformError {
    pub fn extract(name: &str, message: impl Into<String>) -> Self {
        Self::Extract {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
