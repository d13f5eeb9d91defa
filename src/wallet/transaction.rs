//! Transactions as the forwarder sees them, and credit-funding detection.
//!
//! A credit-funding transaction carries an output whose script is
//! `OP_RETURN <20-byte pubkey hash>`. The value of that output is burned and
//! becomes platform credit for the identity authenticated by that key.

use std::fmt;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::{OutPoint, Txid};

use super::Coin;

const PUSH_20: u8 = 0x14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: Coin,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    /// Output burning `value` against `public_key_id`.
    pub fn credit_burn(value: Coin, public_key_id: [u8; 20]) -> Self {
        let mut script_pubkey = Vec::with_capacity(22);
        script_pubkey.push(OP_RETURN.to_u8());
        script_pubkey.push(PUSH_20);
        script_pubkey.extend_from_slice(&public_key_id);
        Self { value, script_pubkey }
    }

    /// Pubkey hash carried by a credit burn output.
    pub fn credit_burn_key_id(&self) -> Option<[u8; 20]> {
        match self.script_pubkey.as_slice() {
            [op, PUSH_20, rest @ ..] if *op == OP_RETURN.to_u8() && rest.len() == 20 => {
                let mut id = [0u8; 20];
                id.copy_from_slice(rest);
                Some(id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub txid: Txid,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(txid: Txid, outputs: Vec<TxOutput>) -> Self {
        Self { txid, outputs }
    }

    pub fn is_credit_funding(&self) -> bool {
        self.outputs.iter().any(|o| o.credit_burn_key_id().is_some())
    }

    pub fn total_output(&self) -> Coin {
        self.outputs.iter().fold(Coin::ZERO, |acc, o| acc.saturating_add(o.value))
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} outputs, {})", self.txid, self.outputs.len(), self.total_output())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditFundingTransaction {
    tx: Transaction,
    burn_index: u32,
    public_key_id: [u8; 20],
}

impl CreditFundingTransaction {
    /// `None` unless `tx` has a credit burn output. The first one wins.
    pub fn from_transaction(tx: Transaction) -> Option<Self> {
        let (index, key_id) = tx
            .outputs
            .iter()
            .enumerate()
            .find_map(|(i, o)| o.credit_burn_key_id().map(|id| (i as u32, id)))?;
        Some(Self { tx, burn_index: index, public_key_id: key_id })
    }

    pub fn tx(&self) -> &Transaction { &self.tx }
    pub fn txid(&self) -> Txid { self.tx.txid }
    pub fn public_key_id(&self) -> &[u8; 20] { &self.public_key_id }

    pub fn credit_burned(&self) -> Coin {
        self.tx.outputs[self.burn_index as usize].value
    }

    pub fn locked_outpoint(&self) -> OutPoint {
        OutPoint { txid: self.tx.txid, vout: self.burn_index }
    }

    /// Double SHA-256 of the consensus-serialised locked outpoint.
    pub fn identity_identifier(&self) -> IdentityIdentifier {
        let bytes = bitcoin::consensus::encode::serialize(&self.locked_outpoint());
        IdentityIdentifier(sha256d::Hash::hash(&bytes).to_byte_array())
    }
}

/// Identifier of the identity founded by a credit-funding transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityIdentifier([u8; 32]);

impl IdentityIdentifier {
    pub fn from_bytes(bytes: [u8; 32]) -> Self { Self(bytes) }
    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    pub fn to_base58(&self) -> String {
        bitcoin::base58::encode(&self.0)
    }

    /// Alternate form some platform nodes index identities by.
    pub fn to_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.0)
    }
}

impl fmt::Display for IdentityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(n: u8) -> Txid {
        Txid::from_byte_array([n; 32])
    }

    fn funding_tx() -> Transaction {
        Transaction::new(
            txid(1),
            vec![
                TxOutput { value: Coin::from_duffs(5_000), script_pubkey: vec![0x76, 0xa9] },
                TxOutput::credit_burn(Coin::from_duffs(40_000), [9u8; 20]),
            ],
        )
    }

    #[test]
    fn plain_payment_is_not_credit_funding() {
        let tx = Transaction::new(
            txid(2),
            vec![TxOutput { value: Coin::COIN, script_pubkey: vec![0x76, 0xa9, 0x14] }],
        );
        assert!(!tx.is_credit_funding());
        assert!(CreditFundingTransaction::from_transaction(tx).is_none());
    }

    #[test]
    fn op_return_with_other_payload_is_not_a_burn() {
        let out = TxOutput { value: Coin::ZERO, script_pubkey: vec![OP_RETURN.to_u8(), 0x04, 1, 2, 3, 4] };
        assert_eq!(out.credit_burn_key_id(), None);
    }

    #[test]
    fn detects_burn_output_and_locked_outpoint() {
        let tx = funding_tx();
        assert!(tx.is_credit_funding());
        let cftx = CreditFundingTransaction::from_transaction(tx).unwrap();
        assert_eq!(cftx.credit_burned(), Coin::from_duffs(40_000));
        assert_eq!(cftx.public_key_id(), &[9u8; 20]);
        assert_eq!(cftx.locked_outpoint(), OutPoint { txid: txid(1), vout: 1 });
    }

    #[test]
    fn identity_identifier_hashes_outpoint() {
        let cftx = CreditFundingTransaction::from_transaction(funding_tx()).unwrap();
        let mut raw = [1u8; 32].to_vec();
        raw.extend_from_slice(&1u32.to_le_bytes());
        let expected = sha256d::Hash::hash(&raw).to_byte_array();
        let id = cftx.identity_identifier();
        assert_eq!(id.as_bytes(), &expected);
        assert_eq!(bitcoin::base58::decode(&id.to_base58()).unwrap(), expected.to_vec());
        assert_eq!(STANDARD_NO_PAD.decode(id.to_base64()).unwrap(), expected.to_vec());
        assert!(!id.to_base64().ends_with('='));
    }
}
