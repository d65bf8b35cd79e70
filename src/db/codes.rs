//! The wasm-code registry backing table.
//!
//! Rows map a symbolic code key (e.g. "cw20") to one code id. The external
//! code tracker writes this table; the indexer only reads it at startup.

use super::error::DbError;
use super::pool::DbPool;

pub async fn load_code_keys(pool: &DbPool) -> Result<Vec<(String, u64)>, DbError> {
    let rows = pool
        .query("SELECT code_key, code_id FROM wasm_codes", &[])
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("code_key"), row.get::<_, i64>("code_id") as u64))
        .collect())
}
