//! State event rows.
//!
//! Bulk upsert with the composite `(block_height, contract_address, key)`
//! conflict target. A re-exported block collapses onto the same rows,
//! refreshing value, value_json and the delete flag.

use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use super::error::DbError;
use super::pool::{chunk_rows, values_placeholders, DbPool};
use crate::types::events::StateEvent;

fn from_row(row: &Row) -> StateEvent {
    StateEvent {
        contract_address: row.get("contract_address"),
        key: row.get("key"),
        value: row.get("value"),
        value_json: row.get("value_json"),
        delete: row.get("is_delete"),
        code_id: row.get::<_, i64>("code_id") as u64,
        block_height: row.get::<_, i64>("block_height") as u64,
        block_time_unix_ms: row.get::<_, i64>("block_time_unix_ms") as u64,
    }
}

/// Upsert a batch of state events and return the rows as persisted.
pub async fn upsert_events(
    pool: &DbPool,
    events: &[StateEvent],
) -> Result<Vec<StateEvent>, DbError> {
    if events.is_empty() {
        return Ok(Vec::new());
    }

    let mut persisted = Vec::with_capacity(events.len());

    for chunk in events.chunks(chunk_rows(8)) {
        let sql = format!(
            "INSERT INTO wasm_state_events \
                 (block_height, contract_address, key, value, value_json, \
                  is_delete, code_id, block_time_unix_ms) \
             VALUES {} \
             ON CONFLICT (block_height, contract_address, key) DO UPDATE SET \
                 value = EXCLUDED.value, \
                 value_json = EXCLUDED.value_json, \
                 is_delete = EXCLUDED.is_delete \
             RETURNING block_height, contract_address, key, value, value_json, \
                 is_delete, code_id, block_time_unix_ms",
            values_placeholders(chunk.len(), 8)
        );

        let ints: Vec<i64> = chunk
            .iter()
            .flat_map(|e| {
                [
                    e.block_height as i64,
                    e.code_id as i64,
                    e.block_time_unix_ms as i64,
                ]
            })
            .collect();

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 8);
        for (i, event) in chunk.iter().enumerate() {
            params.push(&ints[i * 3]);
            params.push(&event.contract_address);
            params.push(&event.key);
            params.push(&event.value);
            params.push(&event.value_json);
            params.push(&event.delete);
            params.push(&ints[i * 3 + 1]);
            params.push(&ints[i * 3 + 2]);
        }

        let rows = pool.query(&sql, &params).await?;
        persisted.extend(rows.iter().map(from_row));
    }

    Ok(persisted)
}
