//! Tendermint JSON-RPC client for the node backing the indexer.
//!
//! Wasm queries go through `abci_query` with a protobuf-encoded payload;
//! `status` supplies the chain id when the config omits it.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use governor::clock::{QuantaClock, QuantaInstant};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use prost::Message;
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use crate::decoding::contract_info::{
    ContractInfo, QueryContractInfoRequest, QueryContractInfoResponse,
};

pub const CONTRACT_INFO_QUERY_PATH: &str = "/cosmwasm.wasm.v1.Query/ContractInfo";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error from '{method}': {message}")]
    Call { method: String, message: String },

    #[error("abci query failed with code {code}: {log}")]
    Abci { code: i64, log: String },

    #[error("malformed rpc response: {0}")]
    Decode(String),
}

pub type StandardRateLimiter =
    RateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub url: Url,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Optional client-side cap on request rate.
    pub requests_per_second: Option<NonZeroU32>,
}

impl RpcClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(10),
            requests_per_second: None,
        }
    }

    pub fn with_requests_per_second(mut self, rps: Option<NonZeroU32>) -> Self {
        self.requests_per_second = rps;
        self
    }
}

pub struct CosmosRpcClient {
    http: reqwest::Client,
    config: RpcClientConfig,
    rate_limiter: Option<Arc<StandardRateLimiter>>,
    jitter: Jitter,
}

impl CosmosRpcClient {
    pub fn new(config: RpcClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let rate_limiter = config
            .requests_per_second
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            http,
            config,
            rate_limiter,
            jitter: Jitter::new(Duration::from_millis(5), Duration::from_millis(50)),
        })
    }

    pub fn from_url(url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::InvalidUrl(e.to_string()))?;
        Self::new(RpcClientConfig::new(url))
    }

    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, RpcError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready_with_jitter(self.jitter).await;
        }

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: JsonValue = self
            .http
            .post(self.config.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(RpcError::Call {
                method: method.to_string(),
                message: error.to_string(),
            });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Decode(format!("no result field from '{method}'")))
    }

    /// Run an ABCI query against the given gRPC path. Returns the raw
    /// response value bytes on success.
    pub async fn abci_query(&self, path: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let result = self
            .call(
                "abci_query",
                serde_json::json!({
                    "path": path,
                    "data": hex::encode(data),
                    "prove": false,
                }),
            )
            .await?;

        let response = result
            .get("response")
            .ok_or_else(|| RpcError::Decode("abci_query result has no response".to_string()))?;

        let code = response.get("code").and_then(JsonValue::as_i64).unwrap_or(0);
        if code != 0 {
            let log = response
                .get("log")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(RpcError::Abci { code, log });
        }

        match response.get("value").and_then(JsonValue::as_str) {
            Some(value) => BASE64_STANDARD
                .decode(value)
                .map_err(|e| RpcError::Decode(format!("abci value is not base64: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Fetch a contract's on-chain metadata. `Ok(None)` means the chain has
    /// no contract at that address.
    pub async fn contract_info(&self, address: &str) -> Result<Option<ContractInfo>, RpcError> {
        let request = QueryContractInfoRequest {
            address: address.to_string(),
        };

        let value = match self
            .abci_query(CONTRACT_INFO_QUERY_PATH, &request.encode_to_vec())
            .await
        {
            Ok(value) => value,
            Err(RpcError::Abci { log, .. }) if log.contains("not found") => return Ok(None),
            Err(e) => return Err(e),
        };

        let response = QueryContractInfoResponse::decode(value.as_slice())
            .map_err(|e| RpcError::Decode(format!("bad ContractInfo response: {e}")))?;
        Ok(response.contract_info)
    }

    /// The network name from the node's `status` endpoint.
    pub async fn chain_id(&self) -> Result<String, RpcError> {
        let result = self.call("status", serde_json::json!([])).await?;
        result
            .pointer("/node_info/network")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| RpcError::Decode("status response has no node_info.network".to_string()))
    }
}
