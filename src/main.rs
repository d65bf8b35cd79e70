mod db;
mod decoding;
mod export;
mod retry;
mod rpc;
mod transformations;
mod types;

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use db::DbPool;
use decoding::matcher::Matcher;
use export::allowlist::StateEventAllowlist;
use export::codes::WasmCodeRegistry;
use export::queue::{CodeTrackerJob, ExportQueue};
use export::reader::read_trace_pipe;
use export::{ExportError, Processor};
use retry::RetryConfig;
use rpc::{CodeIdResolver, CosmosRpcClient, RpcClientConfig};
use transformations::{rules, TransformerEngine, TransformerRegistry};
use types::config::IndexerConfig;
use types::events::StateEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.json".to_string());
    let config = IndexerConfig::load(Path::new(&config_path))?;

    let pool = Arc::new(DbPool::new(&config.database_url).await?);
    pool.run_migrations().await?;

    let rpc_url = url::Url::parse(&config.rpc_endpoint)?;
    let rps = config.rpc_requests_per_second.and_then(NonZeroU32::new);
    let client = Arc::new(CosmosRpcClient::new(
        RpcClientConfig::new(rpc_url).with_requests_per_second(rps),
    )?);

    let chain_id = resolve_chain_id(&config, &client, &pool).await?;
    tracing::info!("indexing chain {chain_id}");
    db::indexer_state::ensure(&pool, &chain_id).await?;

    let codes = WasmCodeRegistry::from_rows(db::codes::load_code_keys(&pool).await?);
    if codes.is_empty() {
        tracing::warn!(
            "wasm code registry is empty; allowlist rules and transformers \
             resolve to nothing until the code tracker populates it"
        );
    }
    let allowlist = StateEventAllowlist::resolve(config.allowlist_for_chain(&chain_id), &codes);
    let registry = Arc::new(TransformerRegistry::resolve(rules::build_rules(), &codes));

    let resolver = Arc::new(CodeIdResolver::new(client.clone(), RetryConfig::default()));
    let engine = TransformerEngine::new(registry, pool.clone(), RetryConfig::default());

    let cancel = CancellationToken::new();

    // The enqueue boundary. Delivery and code tracking run as separate
    // worker processes in production; this process only hands work over, so
    // the local ends of the channels just account for what crossed.
    let webhook_tx = if config.send_webhooks {
        let (tx, mut rx) = mpsc::channel::<StateEvent>(1024);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::debug!(
                    "webhook enqueued for {} key {} at height {}",
                    event.contract_address,
                    event.key,
                    event.block_height
                );
            }
        });
        Some(tx)
    } else {
        None
    };

    let (tracker_tx, mut tracker_rx) = mpsc::channel::<CodeTrackerJob>(64);
    tokio::spawn(async move {
        while let Some(job) = tracker_rx.recv().await {
            tracing::debug!(
                "wasm code tracker job enqueued for height {} ({} contract events)",
                job.block_height,
                job.contract_events.len()
            );
        }
    });

    let queue = ExportQueue::new(webhook_tx, Some(tracker_tx));
    let matcher = Matcher::new(&chain_id, &config.bech32_prefix);
    let processor = Processor::new(
        pool.clone(),
        matcher,
        resolver,
        allowlist,
        engine,
        queue,
        config.send_webhooks,
        cancel.clone(),
    );

    let (batch_tx, mut batch_rx) = mpsc::channel(8);
    let reader_handle = {
        let trace_pipe = config.trace_pipe.clone();
        let batch_size = config.export_batch_size;
        let flush = Duration::from_millis(config.flush_interval_ms);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            read_trace_pipe(&trace_pipe, batch_size, flush, batch_tx, cancel).await
        })
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    while let Some(batch) = batch_rx.recv().await {
        match processor.process(&batch).await {
            Ok(_) => {}
            Err(ExportError::Cancelled) => {
                tracing::info!("batch aborted by shutdown; watermark not advanced");
                break;
            }
            Err(e) => {
                cancel.cancel();
                reader_handle.abort();
                return Err(e.into());
            }
        }
    }

    match reader_handle.await {
        Ok(result) => result?,
        Err(e) if e.is_cancelled() => {}
        Err(e) => return Err(e.into()),
    }

    tracing::info!("trace export complete");
    Ok(())
}

/// Config wins, then the node, then the indexer state row. A chain id is
/// required; export cannot start without one.
async fn resolve_chain_id(
    config: &IndexerConfig,
    client: &CosmosRpcClient,
    pool: &DbPool,
) -> anyhow::Result<String> {
    if let Some(chain_id) = &config.chain_id {
        return Ok(chain_id.clone());
    }

    match client.chain_id().await {
        Ok(chain_id) => Ok(chain_id),
        Err(e) => {
            tracing::warn!("chain id unavailable from rpc ({e}); trying indexer state");
            db::indexer_state::get(pool)
                .await?
                .map(|state| state.chain_id)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "chain id is not in the config, the rpc is unreachable, \
                         and no indexer state row exists"
                    )
                })
        }
    }
}
