//! Contract rows.
//!
//! Three write paths with different conflict behavior: lifecycle upserts
//! refresh metadata, existence back-fill inserts placeholder rows for
//! contracts first seen through their state, and code-ID back-fill patches
//! rows the resolver has since learned about. Instantiation columns are
//! written once and never updated.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use super::error::DbError;
use super::pool::{chunk_rows, values_placeholders, DbPool};
use crate::types::events::ContractEvent;

#[derive(Debug, Clone)]
pub struct ContractRow {
    pub address: String,
    pub code_id: u64,
    pub admin: Option<String>,
    pub creator: Option<String>,
    pub label: Option<String>,
    pub instantiated_at_block_height: u64,
    pub instantiated_at_block_time_unix_ms: u64,
}

/// Placeholder seed for a contract first observed through a state event.
#[derive(Debug, Clone)]
pub struct ContractSeed {
    pub address: String,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

const SELECT_COLUMNS: &str = "address, code_id, admin, creator, label, \
     instantiated_at_block_height, instantiated_at_block_time_unix_ms";

fn from_row(row: &Row) -> ContractRow {
    ContractRow {
        address: row.get("address"),
        code_id: row.get::<_, i64>("code_id") as u64,
        admin: row.get("admin"),
        creator: row.get("creator"),
        label: row.get("label"),
        instantiated_at_block_height: row.get::<_, i64>("instantiated_at_block_height") as u64,
        instantiated_at_block_time_unix_ms: row.get::<_, i64>("instantiated_at_block_time_unix_ms")
            as u64,
    }
}

fn timestamp_from_ms(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// Upsert from contract lifecycle events. Conflicts update metadata only.
pub async fn upsert_from_lifecycle(
    pool: &DbPool,
    events: &[ContractEvent],
) -> Result<(), DbError> {
    if events.is_empty() {
        return Ok(());
    }

    for chunk in events.chunks(chunk_rows(8)) {
        let sql = format!(
            "INSERT INTO contracts \
                 (address, code_id, admin, creator, label, \
                  instantiated_at_block_height, instantiated_at_block_time_unix_ms, \
                  instantiated_at_block_timestamp) \
             VALUES {} \
             ON CONFLICT (address) DO UPDATE SET \
                 code_id = EXCLUDED.code_id, \
                 admin = EXCLUDED.admin, \
                 creator = EXCLUDED.creator, \
                 label = EXCLUDED.label",
            values_placeholders(chunk.len(), 8)
        );

        let ints: Vec<i64> = chunk
            .iter()
            .flat_map(|e| [e.code_id as i64, e.block_height as i64, e.block_time_unix_ms as i64])
            .collect();
        let timestamps: Vec<SystemTime> = chunk
            .iter()
            .map(|e| timestamp_from_ms(e.block_time_unix_ms))
            .collect();

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 8);
        for (i, event) in chunk.iter().enumerate() {
            params.push(&event.address);
            params.push(&ints[i * 3]);
            params.push(&event.admin);
            params.push(&event.creator);
            params.push(&event.label);
            params.push(&ints[i * 3 + 1]);
            params.push(&ints[i * 3 + 2]);
            params.push(&timestamps[i]);
        }

        pool.execute(&sql, &params).await?;
    }

    Ok(())
}

/// Insert placeholder rows (code_id 0) for addresses without a contract row.
/// Conflicts do nothing, preserving instantiation data from earlier batches.
pub async fn ensure_exist(pool: &DbPool, seeds: &[ContractSeed]) -> Result<(), DbError> {
    if seeds.is_empty() {
        return Ok(());
    }

    for chunk in seeds.chunks(chunk_rows(4)) {
        let sql = format!(
            "INSERT INTO contracts \
                 (address, instantiated_at_block_height, \
                  instantiated_at_block_time_unix_ms, instantiated_at_block_timestamp) \
             VALUES {} \
             ON CONFLICT (address) DO NOTHING",
            values_placeholders(chunk.len(), 4)
        );

        let ints: Vec<i64> = chunk
            .iter()
            .flat_map(|s| [s.block_height as i64, s.block_time_unix_ms as i64])
            .collect();
        let timestamps: Vec<SystemTime> = chunk
            .iter()
            .map(|s| timestamp_from_ms(s.block_time_unix_ms))
            .collect();

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 4);
        for (i, seed) in chunk.iter().enumerate() {
            params.push(&seed.address);
            params.push(&ints[i * 2]);
            params.push(&ints[i * 2 + 1]);
            params.push(&timestamps[i]);
        }

        pool.execute(&sql, &params).await?;
    }

    Ok(())
}

/// Load contract rows for a set of addresses, keyed by address.
pub async fn load_by_addresses(
    pool: &DbPool,
    addresses: &[String],
) -> Result<HashMap<String, ContractRow>, DbError> {
    if addresses.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!("SELECT {SELECT_COLUMNS} FROM contracts WHERE address = ANY($1)");
    let owned: Vec<String> = addresses.to_vec();
    let rows = pool.query(&sql, &[&owned]).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let contract = from_row(row);
            (contract.address.clone(), contract)
        })
        .collect())
}

/// Load a single contract row.
pub async fn load_one(pool: &DbPool, address: &str) -> Result<Option<ContractRow>, DbError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM contracts WHERE address = $1");
    let row = pool.query_opt(&sql, &[&address]).await?;
    Ok(row.as_ref().map(from_row))
}

/// Patch `code_id` on rows the resolver has learned about. Only rows still
/// at code_id 0 are touched, so a lifecycle event always wins.
pub async fn backfill_code_ids(
    pool: &DbPool,
    updates: &[(String, u64)],
) -> Result<(), DbError> {
    if updates.is_empty() {
        return Ok(());
    }

    let addresses: Vec<String> = updates.iter().map(|(a, _)| a.clone()).collect();
    let code_ids: Vec<i64> = updates.iter().map(|&(_, c)| c as i64).collect();

    pool.execute(
        "UPDATE contracts AS c \
         SET code_id = u.code_id \
         FROM unnest($1::text[], $2::bigint[]) AS u(address, code_id) \
         WHERE c.address = u.address AND c.code_id <= 0",
        &[&addresses, &code_ids],
    )
    .await?;

    Ok(())
}
