//! CosmWasm store key layout.
//!
//! The wasm module keeps contract metadata and contract storage under two key
//! families. Standard chains use a fixed 32-byte address directly after the
//! prefix byte; Terra-classic prefixes the address with a one-byte length.

use thiserror::Error;

pub const CONTRACT_INFO_PREFIX: u8 = 0x02;
pub const CONTRACT_STORE_PREFIX: u8 = 0x03;
pub const CONTRACT_INFO_PREFIX_LEGACY: u8 = 0x04;
pub const CONTRACT_STORE_PREFIX_LEGACY: u8 = 0x05;

const STANDARD_ADDRESS_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key too short for its family: {0} bytes")]
    TooShort(usize),

    #[error("zero-length address in length-prefixed key")]
    EmptyAddress,

    #[error("invalid bech32 prefix '{0}'")]
    InvalidPrefix(String),

    #[error("bech32 encoding failed: {0}")]
    Bech32(String),
}

/// How contract addresses are laid out inside wasm store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// Fixed 32-byte address, prefixes 0x02/0x03.
    Standard,
    /// One-byte length then a variable-length address, prefixes 0x04/0x05.
    LengthPrefixed,
}

impl KeyLayout {
    /// Terra-classic kept the pre-migration key layout; every other chain
    /// uses the standard one.
    pub fn for_chain(chain_id: &str) -> Self {
        if chain_id == "columbus-5" {
            KeyLayout::LengthPrefixed
        } else {
            KeyLayout::Standard
        }
    }

    fn info_prefix(self) -> u8 {
        match self {
            KeyLayout::Standard => CONTRACT_INFO_PREFIX,
            KeyLayout::LengthPrefixed => CONTRACT_INFO_PREFIX_LEGACY,
        }
    }

    fn store_prefix(self) -> u8 {
        match self {
            KeyLayout::Standard => CONTRACT_STORE_PREFIX,
            KeyLayout::LengthPrefixed => CONTRACT_STORE_PREFIX_LEGACY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// The entry holding a contract's metadata.
    ContractInfo,
    /// One entry of a contract's user storage.
    ContractState,
}

/// A parsed wasm store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub family: KeyFamily,
    pub address: Vec<u8>,
    /// User key bytes after the address. Empty for contract-info keys.
    pub state_key: Vec<u8>,
}

/// Parse a raw store key. Returns `Ok(None)` when the first byte does not
/// belong to either wasm key family under the given layout.
pub fn decode_key(layout: KeyLayout, bytes: &[u8]) -> Result<Option<DecodedKey>, KeyError> {
    let Some(&prefix) = bytes.first() else {
        return Ok(None);
    };

    let family = if prefix == layout.info_prefix() {
        KeyFamily::ContractInfo
    } else if prefix == layout.store_prefix() {
        KeyFamily::ContractState
    } else {
        return Ok(None);
    };

    let (address, rest) = match layout {
        KeyLayout::Standard => {
            if bytes.len() < 1 + STANDARD_ADDRESS_LEN {
                return Err(KeyError::TooShort(bytes.len()));
            }
            let address = bytes[1..1 + STANDARD_ADDRESS_LEN].to_vec();
            (address, &bytes[1 + STANDARD_ADDRESS_LEN..])
        }
        KeyLayout::LengthPrefixed => {
            if bytes.len() < 2 {
                return Err(KeyError::TooShort(bytes.len()));
            }
            let len = bytes[1] as usize;
            if len == 0 {
                return Err(KeyError::EmptyAddress);
            }
            if bytes.len() < 2 + len {
                return Err(KeyError::TooShort(bytes.len()));
            }
            let address = bytes[2..2 + len].to_vec();
            (address, &bytes[2 + len..])
        }
    };

    Ok(Some(DecodedKey {
        family,
        address,
        state_key: rest.to_vec(),
    }))
}

/// Construct a raw store key. Inverse of [`decode_key`]; used by fixtures.
pub fn encode_key(
    layout: KeyLayout,
    family: KeyFamily,
    address: &[u8],
    state_key: &[u8],
) -> Vec<u8> {
    let prefix = match family {
        KeyFamily::ContractInfo => layout.info_prefix(),
        KeyFamily::ContractState => layout.store_prefix(),
    };

    let mut out = Vec::with_capacity(2 + address.len() + state_key.len());
    out.push(prefix);
    if layout == KeyLayout::LengthPrefixed {
        out.push(address.len() as u8);
    }
    out.extend_from_slice(address);
    out.extend_from_slice(state_key);
    out
}

/// Render user key bytes in their canonical stored form: a comma-joined list
/// of decimal byte values.
pub fn canonical_key(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&b.to_string());
    }
    out
}

/// Render raw address bytes as a bech32 account address.
pub fn bech32_address(prefix: &str, bytes: &[u8]) -> Result<String, KeyError> {
    let hrp = bech32::Hrp::parse(prefix)
        .map_err(|_| KeyError::InvalidPrefix(prefix.to_string()))?;
    bech32::encode::<bech32::Bech32>(hrp, bytes).map_err(|e| KeyError::Bech32(e.to_string()))
}
