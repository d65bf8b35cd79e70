pub mod contract_info;
pub mod keys;
pub mod matcher;
pub mod trace;
