//! Hand-rolled `cosmwasm.wasm.v1` protobuf messages.
//!
//! Only the fields the indexer reads are declared; prost skips anything else
//! (notably the `extension` Any on newer chains) during decode.

/// Metadata the wasm module stores for every instantiated contract.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContractInfo {
    #[prost(uint64, tag = "1")]
    pub code_id: u64,
    #[prost(string, tag = "2")]
    pub creator: String,
    #[prost(string, tag = "3")]
    pub admin: String,
    #[prost(string, tag = "4")]
    pub label: String,
    #[prost(message, optional, tag = "5")]
    pub created: Option<AbsoluteTxPosition>,
    #[prost(string, tag = "6")]
    pub ibc_port_id: String,
}

/// Absolute position of a tx on the chain.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct AbsoluteTxPosition {
    #[prost(uint64, tag = "1")]
    pub block_height: u64,
    #[prost(uint64, tag = "2")]
    pub tx_index: u64,
}

/// Request payload for `/cosmwasm.wasm.v1.Query/ContractInfo`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryContractInfoRequest {
    #[prost(string, tag = "1")]
    pub address: String,
}

/// Response payload for `/cosmwasm.wasm.v1.Query/ContractInfo`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryContractInfoResponse {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(message, optional, tag = "2")]
    pub contract_info: Option<ContractInfo>,
}
