//! Contract address → code id resolution with a bounded cache.
//!
//! The sentinel 0 stands for "unknown": not-found contracts and exhausted
//! retries both cache 0, and the contract sink treats 0 as a back-fill
//! candidate on every later batch, so nothing is lost permanently.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use lru::LruCache;
use parking_lot::Mutex;

use super::client::{CosmosRpcClient, RpcError};
use crate::decoding::contract_info::ContractInfo;
use crate::retry::{with_retry, RetryConfig};

const CACHE_CAPACITY: usize = 1000;
const MAX_IN_FLIGHT: usize = 8;

/// The one RPC surface the resolver needs; split out so tests can stub the
/// node away.
#[async_trait]
pub trait WasmQueryClient: Send + Sync {
    async fn contract_info(&self, address: &str) -> Result<Option<ContractInfo>, RpcError>;
}

#[async_trait]
impl WasmQueryClient for CosmosRpcClient {
    async fn contract_info(&self, address: &str) -> Result<Option<ContractInfo>, RpcError> {
        CosmosRpcClient::contract_info(self, address).await
    }
}

pub struct CodeIdResolver {
    client: Arc<dyn WasmQueryClient>,
    cache: Mutex<LruCache<String, u64>>,
    retry: RetryConfig,
}

impl CodeIdResolver {
    pub fn new(client: Arc<dyn WasmQueryClient>, retry: RetryConfig) -> Self {
        Self {
            client,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero capacity"),
            )),
            retry,
        }
    }

    /// Resolve one address to its code id; 0 when the contract is unknown.
    pub async fn resolve(&self, address: &str) -> u64 {
        if let Some(code_id) = self.cache.lock().get(address).copied() {
            return code_id;
        }

        let code_id = match with_retry(&self.retry, "contract info query", || {
            self.client.contract_info(address)
        })
        .await
        {
            Ok(Some(info)) => info.code_id,
            Ok(None) => {
                tracing::debug!("contract {address} not found on chain, caching code id 0");
                0
            }
            Err(e) => {
                tracing::error!("code id resolution for {address} failed: {e}; continuing with 0");
                0
            }
        };

        self.cache.lock().put(address.to_string(), code_id);
        code_id
    }

    /// Resolve a set of addresses with bounded parallelism.
    pub async fn resolve_many(&self, addresses: &[String]) -> HashMap<String, u64> {
        futures::stream::iter(addresses)
            .map(|address| async move { (address.clone(), self.resolve(address).await) })
            .buffer_unordered(MAX_IN_FLIGHT)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    struct StubClient {
        calls: AtomicU32,
        /// Outcome per call: Some(code_id), None for not-found, or an error
        /// when the list is exhausted.
        outcomes: Vec<Option<u64>>,
    }

    impl StubClient {
        fn new(outcomes: Vec<Option<u64>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                outcomes,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WasmQueryClient for StubClient {
        async fn contract_info(&self, address: &str) -> Result<Option<ContractInfo>, RpcError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.outcomes.get(n) {
                Some(Some(code_id)) => Ok(Some(ContractInfo {
                    code_id: *code_id,
                    creator: String::new(),
                    admin: String::new(),
                    label: String::new(),
                    created: None,
                    ibc_port_id: String::new(),
                })),
                Some(None) => Ok(None),
                None => Err(RpcError::Transport(format!("no outcome for {address}"))),
            }
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn caches_resolved_code_ids() {
        let client = Arc::new(StubClient::new(vec![Some(7)]));
        let resolver = CodeIdResolver::new(client.clone(), fast_retry());

        assert_eq!(resolver.resolve("juno1abc").await, 7);
        assert_eq!(resolver.resolve("juno1abc").await, 7);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn not_found_caches_zero() {
        let client = Arc::new(StubClient::new(vec![None]));
        let resolver = CodeIdResolver::new(client.clone(), fast_retry());

        assert_eq!(resolver.resolve("juno1gone").await, 0);
        assert_eq!(resolver.resolve("juno1gone").await, 0);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_cache_zero() {
        // Empty outcome list: every call errors.
        let client = Arc::new(StubClient::new(Vec::new()));
        let resolver = CodeIdResolver::new(client.clone(), fast_retry());

        assert_eq!(resolver.resolve("juno1flaky").await, 0);
        assert_eq!(client.calls(), 3);
        // The failure is cached; no further calls.
        assert_eq!(resolver.resolve("juno1flaky").await, 0);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        struct FlakyClient {
            calls: AtomicU32,
        }

        #[async_trait]
        impl WasmQueryClient for FlakyClient {
            async fn contract_info(
                &self,
                _address: &str,
            ) -> Result<Option<ContractInfo>, RpcError> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RpcError::Transport("connection reset".to_string()))
                } else {
                    Ok(Some(ContractInfo {
                        code_id: 42,
                        creator: String::new(),
                        admin: String::new(),
                        label: String::new(),
                        created: None,
                        ibc_port_id: String::new(),
                    }))
                }
            }
        }

        let client = Arc::new(FlakyClient {
            calls: AtomicU32::new(0),
        });
        let resolver = CodeIdResolver::new(client.clone(), fast_retry());

        assert_eq!(resolver.resolve("juno1slow").await, 42);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn resolve_many_covers_every_address() {
        struct ByAddress;

        #[async_trait]
        impl WasmQueryClient for ByAddress {
            async fn contract_info(
                &self,
                address: &str,
            ) -> Result<Option<ContractInfo>, RpcError> {
                let code_id = address.len() as u64;
                Ok(Some(ContractInfo {
                    code_id,
                    creator: String::new(),
                    admin: String::new(),
                    label: String::new(),
                    created: None,
                    ibc_port_id: String::new(),
                }))
            }
        }

        let resolver = CodeIdResolver::new(Arc::new(ByAddress), fast_retry());
        let addresses: Vec<String> = vec!["a".into(), "bb".into(), "ccc".into()];
        let resolved = resolver.resolve_many(&addresses).await;

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved["a"], 1);
        assert_eq!(resolved["bb"], 2);
        assert_eq!(resolved["ccc"], 3);
    }
}
