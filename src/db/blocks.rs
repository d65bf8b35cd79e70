//! Block rows. One row per observed height, written once.

use tokio_postgres::types::ToSql;

use super::error::DbError;
use super::pool::{chunk_rows, values_placeholders, DbPool};

/// Ensure a row exists for every `(height, time_unix_ms)` pair. Existing
/// rows are left untouched.
pub async fn ensure_blocks(pool: &DbPool, blocks: &[(u64, u64)]) -> Result<(), DbError> {
    if blocks.is_empty() {
        return Ok(());
    }

    for chunk in blocks.chunks(chunk_rows(2)) {
        let sql = format!(
            "INSERT INTO blocks (height, time_unix_ms) VALUES {} \
             ON CONFLICT (height) DO NOTHING",
            values_placeholders(chunk.len(), 2)
        );

        let ints: Vec<i64> = chunk
            .iter()
            .flat_map(|&(height, time)| [height as i64, time as i64])
            .collect();
        let params: Vec<&(dyn ToSql + Sync)> =
            ints.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        pool.execute(&sql, &params).await?;
    }

    Ok(())
}
