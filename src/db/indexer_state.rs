//! The singleton indexer-state row and its monotonic watermark.

use tokio_postgres::Row;

use super::error::DbError;
use super::pool::DbPool;

#[derive(Debug, Clone)]
pub struct IndexerStateRow {
    pub chain_id: String,
    pub last_wasm_block_height_exported: u64,
    pub latest_block_height: u64,
    pub latest_block_time_unix_ms: u64,
}

fn from_row(row: &Row) -> IndexerStateRow {
    IndexerStateRow {
        chain_id: row.get("chain_id"),
        last_wasm_block_height_exported: row
            .get::<_, i64>("last_wasm_block_height_exported") as u64,
        latest_block_height: row.get::<_, i64>("latest_block_height") as u64,
        latest_block_time_unix_ms: row.get::<_, i64>("latest_block_time_unix_ms") as u64,
    }
}

pub async fn get(pool: &DbPool) -> Result<Option<IndexerStateRow>, DbError> {
    let row = pool
        .query_opt(
            "SELECT chain_id, last_wasm_block_height_exported, \
                    latest_block_height, latest_block_time_unix_ms \
             FROM indexer_state WHERE id",
            &[],
        )
        .await?;
    Ok(row.as_ref().map(from_row))
}

/// Create the singleton row if absent and return it. An existing row with a
/// different chain id is left alone but flagged loudly; the deployment is
/// pointed at the wrong database.
pub async fn ensure(pool: &DbPool, chain_id: &str) -> Result<IndexerStateRow, DbError> {
    pool.execute(
        "INSERT INTO indexer_state (id, chain_id) VALUES (TRUE, $1) \
         ON CONFLICT (id) DO NOTHING",
        &[&chain_id],
    )
    .await?;

    let state = get(pool).await?.expect("indexer_state row just ensured");
    if state.chain_id != chain_id {
        tracing::error!(
            "indexer_state chain id is '{}' but this process is configured for '{}'",
            state.chain_id,
            chain_id
        );
    }
    Ok(state)
}

/// Advance the watermark and the latest-block pointers. `GREATEST` keeps
/// every counter monotonic under re-processing and concurrent restarts.
pub async fn advance(
    pool: &DbPool,
    wasm_height: u64,
    latest_height: u64,
    latest_time_unix_ms: u64,
) -> Result<(), DbError> {
    pool.execute(
        "UPDATE indexer_state SET \
             last_wasm_block_height_exported = \
                 GREATEST(last_wasm_block_height_exported, $1), \
             latest_block_height = GREATEST(latest_block_height, $2), \
             latest_block_time_unix_ms = GREATEST(latest_block_time_unix_ms, $3) \
         WHERE id",
        &[
            &(wasm_height as i64),
            &(latest_height as i64),
            &(latest_time_unix_ms as i64),
        ],
    )
    .await?;
    Ok(())
}
