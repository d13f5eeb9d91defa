//! Wallet session seam.
//!
//! The wallet engine (chain sync, coin selection, signing, broadcast) is an
//! external collaborator. This module defines what the forwarder consumes
//! from it.
//!
//! ```text
//! WalletSession (trait)
//!     ├── RpcWallet  → wallet service over JSON-RPC   (feature "rpc")
//!     └── SimWallet  → in-process chain model         (crate::sim)
//! ```

pub mod keychain;
#[cfg(feature = "rpc")]
pub mod rpc;
pub mod transaction;

use std::fmt;

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::address::Address;
use crate::config::Network;
use crate::error::WalletResult;
use crate::watcher::ConfirmationFuture;

pub use keychain::{AuthenticationKey, AuthenticationKeyChain};
pub use transaction::{CreditFundingTransaction, IdentityIdentifier, Transaction, TxOutput};

/// Amount in duffs (1 DASH = 100 000 000 duffs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coin(u64);

impl Coin {
    pub const ZERO: Coin = Coin(0);
    pub const COIN: Coin = Coin(100_000_000);

    pub const fn from_duffs(duffs: u64) -> Self { Coin(duffs) }
    pub const fn duffs(self) -> u64 { self.0 }

    pub fn checked_sub(self, other: Coin) -> Option<Coin> { self.0.checked_sub(other.0).map(Coin) }
    pub fn saturating_add(self, other: Coin) -> Coin { Coin(self.0.saturating_add(other.0)) }

    /// `1.00 DASH`, `0.0004 DASH`: at least two decimals, trailing zeros trimmed.
    pub fn to_friendly_string(self) -> String {
        let whole = self.0 / Self::COIN.0;
        let frac = format!("{:08}", self.0 % Self::COIN.0);
        let mut frac = frac.trim_end_matches('0').to_string();
        while frac.len() < 2 {
            frac.push('0');
        }
        format!("{}.{} DASH", whole, frac)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_friendly_string())
    }
}

/// A transaction the wallet saw paying to it.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub tx: Transaction,
    pub value: Coin,
    pub previous_balance: Coin,
    pub new_balance: Coin,
}

#[derive(Debug, Clone)]
pub enum SendRequest {
    /// Sweep: the whole spendable balance, minus fee, to one address.
    EmptyWallet { to: Address },
    /// Burn `amount` as platform credits against `public_key`.
    CreditFunding { public_key: AuthenticationKey, amount: Coin },
}

impl SendRequest {
    pub fn empty_wallet(to: Address) -> Self { SendRequest::EmptyWallet { to } }

    pub fn credit_funding(public_key: AuthenticationKey, amount: Coin) -> Self {
        SendRequest::CreditFunding { public_key, amount }
    }
}

/// Completion signal for a broadcast. Cloneable; every clone observes the
/// same completion.
#[derive(Debug, Clone)]
pub struct BroadcastHandle {
    rx: watch::Receiver<bool>,
}

/// Sending half of a [`BroadcastHandle`], held by the wallet implementation.
#[derive(Debug)]
pub struct BroadcastSignal {
    tx: watch::Sender<bool>,
}

impl BroadcastHandle {
    pub fn pending() -> (BroadcastHandle, BroadcastSignal) {
        let (tx, rx) = watch::channel(false);
        (BroadcastHandle { rx }, BroadcastSignal { tx })
    }

    pub fn completed() -> BroadcastHandle {
        let (handle, signal) = Self::pending();
        signal.complete();
        handle
    }

    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the transaction has propagated. Returns `false` if the
    /// wallet dropped the signal without completing it.
    pub async fn wait(&self) -> bool {
        let mut rx = self.rx.clone();
        let done = rx.wait_for(|done| *done).await.is_ok();
        done
    }
}

impl BroadcastSignal {
    pub fn complete(self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub tx: Transaction,
    pub broadcast: BroadcastHandle,
}

#[async_trait]
pub trait WalletSession: Send + Sync {
    fn network(&self) -> &Network;

    /// Start chain synchronisation and wait until the wallet is usable.
    async fn start(&self) -> WalletResult<()>;

    async fn current_receive_address(&self) -> WalletResult<Address>;

    async fn balance(&self) -> WalletResult<Coin>;

    async fn send(&self, request: SendRequest) -> WalletResult<SendResult>;

    /// Next unused key from the identity-funding authentication chain.
    async fn fresh_authentication_key(&self) -> WalletResult<AuthenticationKey>;

    /// Most recently issued identity-funding authentication key.
    async fn current_authentication_key(&self) -> WalletResult<AuthenticationKey>;

    /// Credit-funding transactions the wallet already knows about.
    async fn credit_funding_transactions(&self) -> WalletResult<Vec<CreditFundingTransaction>>;

    /// New stream of incoming payments. Each call gets its own receiver.
    fn subscribe_payments(&self) -> mpsc::Receiver<PaymentEvent>;

    /// Completes once `txid` is buried under `depth` blocks.
    fn depth_future(&self, txid: Txid, depth: u32) -> ConfirmationFuture;
}
