//! The batch orchestrator.
//!
//! One processor instance owns the whole export sequence for a batch of
//! trace records: classify and dedup, ensure blocks and contracts, resolve
//! code ids, filter through the allowlist, upsert events, run transformers,
//! enqueue downstream work, and finally advance the watermark. The watermark
//! moves only after everything else succeeded, so a crash anywhere in the
//! middle re-exports the batch on restart and the upserts converge to the
//! same rows.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::allowlist::StateEventAllowlist;
use super::error::ExportError;
use super::queue::{CodeTrackerJob, ExportQueue};
use crate::db::contracts::{ContractRow, ContractSeed};
use crate::db::{self, DbPool};
use crate::decoding::matcher::Matcher;
use crate::decoding::trace::TraceRecord;
use crate::retry::{with_retry, RetryConfig};
use crate::rpc::CodeIdResolver;
use crate::transformations::TransformerEngine;
use crate::types::events::{ContractEvent, StateEvent, WasmEvent};

pub struct Processor {
    pool: Arc<DbPool>,
    matcher: Matcher,
    resolver: Arc<CodeIdResolver>,
    allowlist: StateEventAllowlist,
    engine: TransformerEngine,
    queue: ExportQueue,
    send_webhooks: bool,
    cancel: CancellationToken,
    retry: RetryConfig,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub contract_events: usize,
    pub state_events_persisted: usize,
    pub transformations: usize,
    pub max_block_height: u64,
}

struct PersistOutcome {
    /// Rows as persisted, joined to an existing contract.
    inserted: Vec<StateEvent>,
    /// Parsed events that survived the allowlist, with resolved code ids.
    kept: Vec<StateEvent>,
    contracts: HashMap<String, ContractRow>,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<DbPool>,
        matcher: Matcher,
        resolver: Arc<CodeIdResolver>,
        allowlist: StateEventAllowlist,
        engine: TransformerEngine,
        queue: ExportQueue,
        send_webhooks: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            matcher,
            resolver,
            allowlist,
            engine,
            queue,
            send_webhooks,
            cancel,
            retry: RetryConfig::default(),
        }
    }

    /// Export one batch of trace records.
    pub async fn process(&self, records: &[TraceRecord]) -> Result<BatchSummary, ExportError> {
        let events = dedup_events(records.iter().filter_map(|r| self.matcher.classify(r)));
        let Some((max_height, max_time)) = batch_max(&events) else {
            return Ok(BatchSummary::default());
        };

        let state = db::indexer_state::get(&self.pool)
            .await?
            .ok_or(ExportError::MissingIndexerState)?;
        let pre_watermark = state.last_wasm_block_height_exported;

        let mut contract_events: Vec<ContractEvent> = Vec::new();
        let mut state_events: Vec<StateEvent> = Vec::new();
        for event in &events {
            match event {
                WasmEvent::Contract(e) => contract_events.push(e.clone()),
                WasmEvent::State(e) => state_events.push(e.clone()),
            }
        }

        let blocks = collect_blocks(&events);

        let outcome = self
            .guarded(with_retry(&self.retry, "persist wasm batch", || {
                self.persist(&blocks, &contract_events, &state_events)
            }))
            .await??;

        // Unresolved contracts sit this round out; once their code id is
        // known a later re-export picks them up.
        let transformer_input: Vec<StateEvent> = outcome
            .kept
            .iter()
            .filter(|e| e.code_id > 0)
            .cloned()
            .collect();

        let mut contracts = outcome.contracts;
        let transformations = self
            .guarded(self.engine.run(&transformer_input, &mut contracts))
            .await??;

        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        if let Some(first) = contract_events.first() {
            self.queue
                .enqueue_code_tracker(CodeTrackerJob {
                    block_height: first.block_height,
                    contract_events: contract_events.clone(),
                    state_event_updates: outcome.kept.clone(),
                })
                .await;
        }

        // Webhooks go out before the watermark moves; a crash in between
        // re-enqueues on restart, and delivery downstream is idempotent.
        if self.send_webhooks {
            let deliverable = deliverable_events(&outcome.inserted, pre_watermark);
            self.queue.enqueue_webhooks(deliverable).await;
        }

        db::indexer_state::advance(&self.pool, max_height, max_height, max_time).await?;

        let summary = BatchSummary {
            contract_events: contract_events.len(),
            state_events_persisted: outcome.inserted.len(),
            transformations: transformations.len(),
            max_block_height: max_height,
        };
        tracing::info!(
            "exported batch: {} contract events, {} state events, {} transformations, height {}",
            summary.contract_events,
            summary.state_events_persisted,
            summary.transformations,
            summary.max_block_height
        );
        Ok(summary)
    }

    /// Blocks, contracts and events, in dependency order. Retried as a unit;
    /// every statement is an idempotent upsert.
    async fn persist(
        &self,
        blocks: &[(u64, u64)],
        contract_events: &[ContractEvent],
        state_events: &[StateEvent],
    ) -> Result<PersistOutcome, ExportError> {
        db::blocks::ensure_blocks(&self.pool, blocks).await?;

        db::contracts::upsert_from_lifecycle(&self.pool, contract_events).await?;

        let seeds = contract_seeds(state_events);
        db::contracts::ensure_exist(&self.pool, &seeds).await?;

        let addresses = batch_addresses(contract_events, state_events);
        let mut contracts = db::contracts::load_by_addresses(&self.pool, &addresses).await?;

        let unresolved: Vec<String> = contracts
            .values()
            .filter(|c| c.code_id == 0)
            .map(|c| c.address.clone())
            .collect();
        if !unresolved.is_empty() {
            let resolved = self.resolver.resolve_many(&unresolved).await;
            let updates: Vec<(String, u64)> = resolved
                .into_iter()
                .filter(|&(_, code_id)| code_id > 0)
                .collect();
            if !updates.is_empty() {
                db::contracts::backfill_code_ids(&self.pool, &updates).await?;
                contracts = db::contracts::load_by_addresses(&self.pool, &addresses).await?;
            }
        }

        let mut kept: Vec<StateEvent> = Vec::with_capacity(state_events.len());
        for event in state_events {
            let mut event = event.clone();
            event.code_id = contracts
                .get(&event.contract_address)
                .map(|c| c.code_id)
                .unwrap_or(0);
            if self.allowlist.allows(event.code_id, &event.key) {
                kept.push(event);
            }
        }

        let persisted = db::state_events::upsert_events(&self.pool, &kept).await?;

        let mut inserted = Vec::with_capacity(persisted.len());
        for row in persisted {
            if !contracts.contains_key(&row.contract_address) {
                if let Some(contract) =
                    db::contracts::load_one(&self.pool, &row.contract_address).await?
                {
                    contracts.insert(contract.address.clone(), contract);
                }
            }
            if contracts.contains_key(&row.contract_address) {
                inserted.push(row);
            } else {
                tracing::warn!(
                    "state event at height {} dropped: contract {} disappeared",
                    row.block_height,
                    row.contract_address
                );
            }
        }

        Ok(PersistOutcome {
            inserted,
            kept,
            contracts,
        })
    }

    async fn guarded<T>(&self, fut: impl Future<Output = T>) -> Result<T, ExportError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExportError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

/// Collapse events with the same identity, keeping the last occurrence in
/// first-seen order.
pub fn dedup_events(events: impl IntoIterator<Item = WasmEvent>) -> Vec<WasmEvent> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, WasmEvent> = HashMap::new();

    for event in events {
        let id = event.event_id();
        if !by_id.contains_key(&id) {
            order.push(id.clone());
        }
        by_id.insert(id, event);
    }

    order
        .into_iter()
        .map(|id| by_id.remove(&id).expect("id recorded on insert"))
        .collect()
}

/// One `(height, time)` pair per distinct height, first observed time wins.
fn collect_blocks(events: &[WasmEvent]) -> Vec<(u64, u64)> {
    let mut blocks: BTreeMap<u64, u64> = BTreeMap::new();
    for event in events {
        blocks
            .entry(event.block_height())
            .or_insert_with(|| event.block_time_unix_ms());
    }
    blocks.into_iter().collect()
}

/// Placeholder seeds: the earliest event per contract address.
fn contract_seeds(state_events: &[StateEvent]) -> Vec<ContractSeed> {
    let mut seeds: HashMap<&str, ContractSeed> = HashMap::new();
    for event in state_events {
        let seed = seeds
            .entry(event.contract_address.as_str())
            .or_insert_with(|| ContractSeed {
                address: event.contract_address.clone(),
                block_height: event.block_height,
                block_time_unix_ms: event.block_time_unix_ms,
            });
        if event.block_height < seed.block_height {
            seed.block_height = event.block_height;
            seed.block_time_unix_ms = event.block_time_unix_ms;
        }
    }
    let mut seeds: Vec<ContractSeed> = seeds.into_values().collect();
    seeds.sort_by(|a, b| a.address.cmp(&b.address));
    seeds
}

fn batch_addresses(
    contract_events: &[ContractEvent],
    state_events: &[StateEvent],
) -> Vec<String> {
    let mut addresses: Vec<String> = contract_events
        .iter()
        .map(|e| e.address.clone())
        .chain(state_events.iter().map(|e| e.contract_address.clone()))
        .collect();
    addresses.sort();
    addresses.dedup();
    addresses
}

/// Events worth redelivering: at or above the pre-batch watermark. The
/// inclusive bound catches a block re-split across batches.
fn deliverable_events(inserted: &[StateEvent], pre_watermark: u64) -> Vec<StateEvent> {
    inserted
        .iter()
        .filter(|e| e.block_height >= pre_watermark)
        .cloned()
        .collect()
}

/// Height and time of the batch's highest block.
fn batch_max(events: &[WasmEvent]) -> Option<(u64, u64)> {
    events
        .iter()
        .map(|e| (e.block_height(), e.block_time_unix_ms()))
        .max_by_key(|&(height, _)| height)
}
