//! Derived transformation rows.

use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;

use super::error::DbError;
use super::pool::{chunk_rows, values_placeholders, DbPool};

#[derive(Debug, Clone, PartialEq)]
pub struct TransformationRow {
    pub contract_address: String,
    pub block_height: u64,
    pub name: String,
    pub value: Option<JsonValue>,
}

/// Upsert transformation rows. The `(contract_address, name, block_height)`
/// conflict target makes re-runs overwrite the derived value in place.
pub async fn upsert_transformations(
    pool: &DbPool,
    rows: &[TransformationRow],
) -> Result<(), DbError> {
    if rows.is_empty() {
        return Ok(());
    }

    for chunk in rows.chunks(chunk_rows(4)) {
        let sql = format!(
            "INSERT INTO wasm_state_event_transformations \
                 (contract_address, block_height, name, value) \
             VALUES {} \
             ON CONFLICT (contract_address, name, block_height) DO UPDATE SET \
                 value = EXCLUDED.value",
            values_placeholders(chunk.len(), 4)
        );

        let heights: Vec<i64> = chunk.iter().map(|r| r.block_height as i64).collect();

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 4);
        for (i, row) in chunk.iter().enumerate() {
            params.push(&row.contract_address);
            params.push(&heights[i]);
            params.push(&row.name);
            params.push(&row.value);
        }

        pool.execute(&sql, &params).await?;
    }

    Ok(())
}
