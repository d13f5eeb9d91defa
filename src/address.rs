//! Base58Check addresses, validated against a network's version bytes.

use std::fmt;

use bitcoin::base58;
use thiserror::Error;

use crate::config::network::Network;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58check encoding: {0}")]
    Encoding(String),

    #[error("invalid payload length {0}, expected 21 bytes")]
    Length(usize),

    #[error("version byte {version} is not valid on {network}")]
    WrongNetwork { version: u8, network: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    PubkeyHash,
    ScriptHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    kind: AddressKind,
    version: u8,
    hash: [u8; 20],
}

impl Address {
    /// Parse and check the version byte belongs to `network`.
    pub fn from_base58(network: &Network, s: &str) -> Result<Self, AddressError> {
        let payload = base58::decode_check(s).map_err(|e| AddressError::Encoding(e.to_string()))?;
        if payload.len() != 21 {
            return Err(AddressError::Length(payload.len()));
        }
        let version = payload[0];
        let versions = network.address_versions();
        let kind = if version == versions.pubkey_hash {
            AddressKind::PubkeyHash
        } else if version == versions.script_hash {
            AddressKind::ScriptHash
        } else {
            return Err(AddressError::WrongNetwork { version, network: network.id() });
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self { kind, version, hash })
    }

    pub fn p2pkh(network: &Network, hash: [u8; 20]) -> Self {
        Self { kind: AddressKind::PubkeyHash, version: network.address_versions().pubkey_hash, hash }
    }

    pub fn kind(&self) -> AddressKind { self.kind }
    pub fn hash(&self) -> &[u8; 20] { &self.hash }

    /// Output script paying to this address.
    pub fn script_pubkey(&self) -> Vec<u8> {
        use bitcoin::opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160};
        let mut script = Vec::with_capacity(25);
        match self.kind {
            AddressKind::PubkeyHash => {
                script.extend_from_slice(&[OP_DUP.to_u8(), OP_HASH160.to_u8(), 20]);
                script.extend_from_slice(&self.hash);
                script.extend_from_slice(&[OP_EQUALVERIFY.to_u8(), OP_CHECKSIG.to_u8()]);
            }
            AddressKind::ScriptHash => {
                script.extend_from_slice(&[OP_HASH160.to_u8(), 20]);
                script.extend_from_slice(&self.hash);
                script.push(OP_EQUAL.to_u8());
            }
        }
        script
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.version);
        payload.extend_from_slice(&self.hash);
        f.write_str(&base58::encode_check(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(version: u8, hash: [u8; 20]) -> String {
        let mut payload = vec![version];
        payload.extend_from_slice(&hash);
        base58::encode_check(&payload)
    }

    #[test]
    fn mainnet_address_starts_with_x() {
        let addr = Address::p2pkh(&Network::Main, [7u8; 20]);
        let s = addr.to_string();
        assert!(s.starts_with('X'), "{}", s);
        assert_eq!(Address::from_base58(&Network::Main, &s).unwrap(), addr);
    }

    #[test]
    fn testnet_address_starts_with_y() {
        let s = Address::p2pkh(&Network::Testnet, [1u8; 20]).to_string();
        assert!(s.starts_with('y'), "{}", s);
    }

    #[test]
    fn rejects_address_from_other_network() {
        let s = encode(140, [3u8; 20]);
        let err = Address::from_base58(&Network::Main, &s).unwrap_err();
        assert_eq!(err, AddressError::WrongNetwork { version: 140, network: "main".into() });
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut s = encode(76, [3u8; 20]);
        let last = s.pop().unwrap();
        s.push(if last == '1' { '2' } else { '1' });
        assert!(matches!(Address::from_base58(&Network::Main, &s), Err(AddressError::Encoding(_))));
    }

    #[test]
    fn rejects_garbage_and_short_payloads() {
        assert!(matches!(Address::from_base58(&Network::Main, "not-an-address"), Err(AddressError::Encoding(_))));
        let short = base58::encode_check(&[76u8, 1, 2, 3]);
        assert_eq!(Address::from_base58(&Network::Main, &short), Err(AddressError::Length(4)));
    }

    #[test]
    fn script_hash_addresses_parse() {
        let s = encode(19, [9u8; 20]);
        let addr = Address::from_base58(&Network::Testnet, &s).unwrap();
        assert_eq!(addr.kind(), AddressKind::ScriptHash);
        assert_eq!(addr.script_pubkey().len(), 23);
    }
}
