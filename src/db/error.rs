use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("{}", describe_pg_error(.0))]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool build error: {0}")]
    Build(#[from] deadpool_postgres::BuildError),

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("migration {name} failed: {message}")]
    Migration { name: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Surface the server-side detail and constraint name when present; the
/// conflict targets on the event tables make constraint names the fastest
/// path to a diagnosis.
fn describe_pg_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db_err) => {
            let mut msg = format!("postgres [{}]: {}", db_err.code().code(), db_err.message());
            if let Some(detail) = db_err.detail() {
                msg.push_str(&format!(" ({detail})"));
            }
            if let Some(constraint) = db_err.constraint() {
                msg.push_str(&format!(" [constraint {constraint}]"));
            }
            msg
        }
        None => format!("postgres: {e}"),
    }
}
