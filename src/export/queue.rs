//! Enqueue boundary to the external delivery subsystems.
//!
//! The indexer never delivers webhooks or tracks code uploads itself; it
//! hands work to bounded channels that out-of-process workers drain.
//! Enqueueing is fire-and-forget with a short synchronous wait so a stalled
//! consumer slows the pipeline instead of growing memory without bound.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::events::{ContractEvent, StateEvent};

const ENQUEUE_WAIT: Duration = Duration::from_secs(5);

/// Job for the external wasm-code tracker: everything it needs to learn new
/// code-id → symbolic-key mappings from a batch.
#[derive(Debug, Clone, Serialize)]
pub struct CodeTrackerJob {
    pub block_height: u64,
    pub contract_events: Vec<ContractEvent>,
    pub state_event_updates: Vec<StateEvent>,
}

pub struct ExportQueue {
    webhook_tx: Option<mpsc::Sender<StateEvent>>,
    tracker_tx: Option<mpsc::Sender<CodeTrackerJob>>,
    /// Tracker jobs already enqueued this process, by block height.
    tracker_heights: Mutex<HashSet<u64>>,
}

impl ExportQueue {
    pub fn new(
        webhook_tx: Option<mpsc::Sender<StateEvent>>,
        tracker_tx: Option<mpsc::Sender<CodeTrackerJob>>,
    ) -> Self {
        Self {
            webhook_tx,
            tracker_tx,
            tracker_heights: Mutex::new(HashSet::new()),
        }
    }

    /// Enqueue one webhook message per deliverable state event.
    pub async fn enqueue_webhooks(&self, events: Vec<StateEvent>) {
        let Some(tx) = &self.webhook_tx else {
            return;
        };

        let mut dropped = 0usize;
        for event in events {
            if tx.send_timeout(event, ENQUEUE_WAIT).await.is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!("webhook queue rejected {dropped} events");
        }
    }

    /// Enqueue a code-tracker job. Idempotent on the job's block height;
    /// re-processing the same range does not produce duplicate jobs.
    pub async fn enqueue_code_tracker(&self, job: CodeTrackerJob) {
        let Some(tx) = &self.tracker_tx else {
            return;
        };

        if !self.tracker_heights.lock().insert(job.block_height) {
            tracing::debug!(
                "code tracker job for height {} already enqueued",
                job.block_height
            );
            return;
        }

        if let Err(e) = tx.send_timeout(job, ENQUEUE_WAIT).await {
            tracing::warn!("code tracker queue rejected job: {e}");
        }
    }
}
