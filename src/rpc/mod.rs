mod client;
mod resolver;

pub use client::{CosmosRpcClient, RpcClientConfig, RpcError};
pub use resolver::{CodeIdResolver, WasmQueryClient};
