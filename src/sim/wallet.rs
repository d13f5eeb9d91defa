//! SimWallet - single-balance wallet over a simulated chain.
//!
//! Payments arrive with `receive`, blocks with `mine_blocks`. Every mined
//! block updates the confirmation watcher for all included transactions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::Txid;
use tokio::sync::mpsc;

use crate::address::Address;
use crate::config::Network;
use crate::error::{WalletError, WalletResult};
use crate::wallet::{
    AuthenticationKey, AuthenticationKeyChain, BroadcastHandle, BroadcastSignal, Coin, CreditFundingTransaction,
    PaymentEvent, SendRequest, SendResult, Transaction, TxOutput, WalletSession,
};
use crate::watcher::{ConfirmationFuture, ConfirmationWatcher};

/// Flat fee charged on every transaction the wallet sends.
pub const SIM_FEE: Coin = Coin::from_duffs(1_000);

struct SimState {
    started: bool,
    balance: Coin,
    tip: u32,
    /// Height each transaction was mined at; `None` while in the mempool.
    heights: HashMap<Txid, Option<u32>>,
    nonce: u64,
    keychain: AuthenticationKeyChain,
    credit_funding: Vec<CreditFundingTransaction>,
    sent: Vec<Transaction>,
    subscribers: Vec<mpsc::Sender<PaymentEvent>>,
    hold_broadcasts: bool,
    held: Vec<BroadcastSignal>,
    fail_next_send: Option<WalletError>,
}

pub struct SimWallet {
    network: Network,
    receive_address: Address,
    state: Mutex<SimState>,
    watcher: ConfirmationWatcher,
}

impl SimWallet {
    pub fn new(network: Network, seed: &[u8]) -> WalletResult<Self> {
        let keychain = AuthenticationKeyChain::from_seed(seed, &network)?;
        let receive_hash = bitcoin::hashes::hash160::Hash::hash(seed).to_byte_array();
        Ok(Self {
            receive_address: Address::p2pkh(&network, receive_hash),
            network,
            state: Mutex::new(SimState {
                started: false,
                balance: Coin::ZERO,
                tip: 0,
                heights: HashMap::new(),
                nonce: 0,
                keychain,
                credit_funding: Vec::new(),
                sent: Vec::new(),
                subscribers: Vec::new(),
                hold_broadcasts: false,
                held: Vec::new(),
                fail_next_send: None,
            }),
            watcher: ConfirmationWatcher::new(),
        })
    }

    pub fn from_mnemonic(network: Network, words: &str) -> WalletResult<Self> {
        let mnemonic = bip39::Mnemonic::parse(words).map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        Self::new(network, &mnemonic.to_seed(""))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn watcher(&self) -> &ConfirmationWatcher { &self.watcher }

    /// Deliver an unconfirmed payment of `value` to the wallet.
    pub fn receive(&self, value: Coin) -> Transaction {
        let script = self.receive_address.script_pubkey();
        self.deliver(vec![TxOutput { value, script_pubkey: script }], value)
    }

    /// Deliver a payment that is itself a credit-funding transaction, with
    /// `value` paid to the wallet next to the burn output.
    pub fn receive_credit_funding(&self, value: Coin, burned: Coin) -> Transaction {
        let outputs = vec![
            TxOutput::credit_burn(burned, [0xcf; 20]),
            TxOutput { value, script_pubkey: self.receive_address.script_pubkey() },
        ];
        let tx = self.deliver(outputs, value);
        if let Some(cftx) = CreditFundingTransaction::from_transaction(tx.clone()) {
            self.lock().credit_funding.push(cftx);
        }
        tx
    }

    fn deliver(&self, outputs: Vec<TxOutput>, value: Coin) -> Transaction {
        let mut state = self.lock();
        let tx = Transaction::new(next_txid(&mut state), outputs);
        let previous_balance = state.balance;
        state.balance = state.balance.saturating_add(value);
        state.heights.insert(tx.txid, None);
        let event = PaymentEvent { tx: tx.clone(), value, previous_balance, new_balance: state.balance };
        state.subscribers.retain(|s| match s.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("sim: payment subscriber lagging, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        tracing::debug!(txid = %tx.txid, value = %value, "sim: payment delivered");
        tx
    }

    /// Mine `count` blocks; mempool transactions go into the first one.
    pub fn mine_blocks(&self, count: u32) {
        for _ in 0..count {
            let updates: Vec<(Txid, u32)> = {
                let mut state = self.lock();
                state.tip += 1;
                let tip = state.tip;
                for height in state.heights.values_mut() {
                    height.get_or_insert(tip);
                }
                state.heights.iter().filter_map(|(txid, h)| h.map(|h| (*txid, tip - h + 1))).collect()
            };
            for (txid, depth) in updates {
                self.watcher.observe(txid, depth);
            }
        }
    }

    pub fn tip(&self) -> u32 { self.lock().tip }

    pub fn sent_transactions(&self) -> Vec<Transaction> { self.lock().sent.clone() }

    pub fn issued_authentication_keys(&self) -> u32 { self.lock().keychain.issued() }

    /// Keep broadcasts pending until `release_broadcasts`.
    pub fn hold_broadcasts(&self, hold: bool) { self.lock().hold_broadcasts = hold; }

    pub fn release_broadcasts(&self) {
        let held = std::mem::take(&mut self.lock().held);
        for signal in held {
            signal.complete();
        }
    }

    /// Make the next `send` fail with `err`.
    pub fn fail_next_send(&self, err: WalletError) { self.lock().fail_next_send = Some(err); }

    fn broadcast(&self, state: &mut SimState, tx: Transaction) -> SendResult {
        state.heights.insert(tx.txid, None);
        state.sent.push(tx.clone());
        let broadcast = if state.hold_broadcasts {
            let (handle, signal) = BroadcastHandle::pending();
            state.held.push(signal);
            handle
        } else {
            BroadcastHandle::completed()
        };
        SendResult { tx, broadcast }
    }
}

fn next_txid(state: &mut SimState) -> Txid {
    state.nonce += 1;
    Txid::from_byte_array(sha256d::Hash::hash(&state.nonce.to_le_bytes()).to_byte_array())
}

#[async_trait]
impl WalletSession for SimWallet {
    fn network(&self) -> &Network { &self.network }

    async fn start(&self) -> WalletResult<()> {
        self.lock().started = true;
        Ok(())
    }

    async fn current_receive_address(&self) -> WalletResult<Address> {
        Ok(self.receive_address.clone())
    }

    async fn balance(&self) -> WalletResult<Coin> { Ok(self.lock().balance) }

    async fn send(&self, request: SendRequest) -> WalletResult<SendResult> {
        let mut state = self.lock();
        if !state.started {
            return Err(WalletError::NotStarted);
        }
        if let Some(err) = state.fail_next_send.take() {
            return Err(err);
        }
        let available = state.balance;
        let short = |needed: Coin| {
            WalletError::InsufficientFunds(format!("need {} duffs, have {}", needed.duffs(), available.duffs()))
        };
        match request {
            SendRequest::EmptyWallet { to } => {
                let value = available.checked_sub(SIM_FEE).filter(|v| *v > Coin::ZERO).ok_or_else(|| short(SIM_FEE))?;
                let tx = Transaction::new(next_txid(&mut state), vec![TxOutput { value, script_pubkey: to.script_pubkey() }]);
                state.balance = Coin::ZERO;
                Ok(self.broadcast(&mut state, tx))
            }
            SendRequest::CreditFunding { public_key, amount } => {
                let needed = amount.saturating_add(SIM_FEE);
                let change = available.checked_sub(needed).ok_or_else(|| short(needed))?;
                let mut outputs = vec![TxOutput::credit_burn(amount, public_key.pubkey_hash())];
                if change > Coin::ZERO {
                    outputs.push(TxOutput { value: change, script_pubkey: self.receive_address.script_pubkey() });
                }
                let tx = Transaction::new(next_txid(&mut state), outputs);
                state.balance = change;
                if let Some(cftx) = CreditFundingTransaction::from_transaction(tx.clone()) {
                    state.credit_funding.push(cftx);
                }
                Ok(self.broadcast(&mut state, tx))
            }
        }
    }

    async fn fresh_authentication_key(&self) -> WalletResult<AuthenticationKey> {
        self.lock().keychain.fresh_key()
    }

    async fn current_authentication_key(&self) -> WalletResult<AuthenticationKey> {
        self.lock().keychain.current_key()
    }

    async fn credit_funding_transactions(&self) -> WalletResult<Vec<CreditFundingTransaction>> {
        Ok(self.lock().credit_funding.clone())
    }

    fn subscribe_payments(&self) -> mpsc::Receiver<PaymentEvent> {
        let (tx, rx) = mpsc::channel(64);
        self.lock().subscribers.push(tx);
        rx
    }

    fn depth_future(&self, txid: Txid, depth: u32) -> ConfirmationFuture {
        self.watcher.watch(txid, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn wallet() -> SimWallet {
        SimWallet::from_mnemonic(Network::Regtest, TEST_MNEMONIC).expect("wallet")
    }

    #[tokio::test]
    async fn receive_notifies_subscribers_with_balances() {
        let w = wallet();
        let mut rx = w.subscribe_payments();
        w.receive(Coin::COIN);
        let event = rx.recv().await.expect("event");
        assert_eq!(event.value, Coin::COIN);
        assert_eq!(event.previous_balance, Coin::ZERO);
        assert_eq!(event.new_balance, Coin::COIN);
    }

    #[tokio::test]
    async fn mining_drives_confirmations() {
        let w = wallet();
        let tx = w.receive(Coin::COIN);
        let two = w.depth_future(tx.txid, 2);
        w.mine_blocks(1);
        assert_eq!(w.watcher().depth_of(&tx.txid), Some(1));
        w.mine_blocks(1);
        assert_eq!(two.await.unwrap().observed, 2);
    }

    #[tokio::test]
    async fn send_requires_start() {
        let w = wallet();
        let to = w.current_receive_address().await.unwrap();
        assert!(matches!(w.send(SendRequest::empty_wallet(to)).await, Err(WalletError::NotStarted)));
    }

    #[tokio::test]
    async fn sweep_empties_balance() {
        let w = wallet();
        w.start().await.unwrap();
        w.receive(Coin::COIN);
        let to = Address::p2pkh(&Network::Regtest, [1u8; 20]);
        let result = w.send(SendRequest::empty_wallet(to.clone())).await.unwrap();
        assert_eq!(result.tx.outputs[0].value.duffs(), Coin::COIN.duffs() - SIM_FEE.duffs());
        assert_eq!(result.tx.outputs[0].script_pubkey, to.script_pubkey());
        assert_eq!(w.balance().await.unwrap(), Coin::ZERO);
        assert!(matches!(w.send(SendRequest::empty_wallet(to)).await, Err(WalletError::InsufficientFunds(_))));
    }

    #[tokio::test]
    async fn credit_funding_keeps_change() {
        let w = wallet();
        w.start().await.unwrap();
        w.receive(Coin::COIN);
        let key = w.fresh_authentication_key().await.unwrap();
        let result = w.send(SendRequest::credit_funding(key.clone(), Coin::from_duffs(40_000))).await.unwrap();
        let cftx = CreditFundingTransaction::from_transaction(result.tx).expect("credit funding");
        assert_eq!(cftx.public_key_id(), &key.pubkey_hash());
        assert_eq!(w.credit_funding_transactions().await.unwrap().len(), 1);
        assert_eq!(w.balance().await.unwrap().duffs(), 100_000_000 - 40_000 - 1_000);
    }

    #[tokio::test]
    async fn held_broadcasts_complete_on_release() {
        let w = wallet();
        w.start().await.unwrap();
        w.receive(Coin::COIN);
        w.hold_broadcasts(true);
        let to = Address::p2pkh(&Network::Regtest, [1u8; 20]);
        let result = w.send(SendRequest::empty_wallet(to)).await.unwrap();
        assert!(!result.broadcast.is_complete());
        w.release_broadcasts();
        assert!(result.broadcast.wait().await);
    }
}
