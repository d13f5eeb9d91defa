//! RpcWallet - `WalletSession` over the wallet service's JSON-RPC interface.
//!
//! The service owns chain sync and signing. This side polls it for incoming
//! payments (`listreceived`), for depths of watched transactions
//! (`getconfirmations`) and for broadcast completion (`getbroadcaststatus`),
//! and turns those answers into payment events, watcher observations and
//! broadcast signals.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::secp256k1::{PublicKey, SecretKey};
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::address::Address;
use crate::config::{ForwarderConfig, Network};
use crate::error::{WalletError, WalletResult};
use crate::rpc::RpcClient;
use crate::wallet::{
    AuthenticationKey, BroadcastHandle, BroadcastSignal, Coin, CreditFundingTransaction, PaymentEvent, SendRequest,
    SendResult, Transaction, TxOutput, WalletSession,
};
use crate::watcher::{ConfirmationFuture, ConfirmationWatcher};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
const SUBSCRIBER_BUFFER: usize = 64;

// Wire types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireOutput {
    pub value: u64,
    /// Hex-encoded script.
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTransaction {
    pub txid: String,
    pub outputs: Vec<WireOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePayment {
    pub tx: WireTransaction,
    pub value: u64,
    pub previous_balance: u64,
    pub new_balance: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireReceived {
    pub payments: Vec<WirePayment>,
    /// Pass back as `since` on the next call.
    pub cursor: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAuthKey {
    pub index: u32,
    pub public_key: String,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl TryFrom<WireTransaction> for Transaction {
    type Error = WalletError;

    fn try_from(wire: WireTransaction) -> WalletResult<Self> {
        let txid = Txid::from_str(&wire.txid).map_err(|e| decode_error("txid", e))?;
        let outputs = wire
            .outputs
            .into_iter()
            .map(|o| {
                let script_pubkey = hex::decode(&o.script).map_err(|e| decode_error("script", e))?;
                Ok(TxOutput { value: Coin::from_duffs(o.value), script_pubkey })
            })
            .collect::<WalletResult<Vec<_>>>()?;
        Ok(Transaction::new(txid, outputs))
    }
}

impl TryFrom<WirePayment> for PaymentEvent {
    type Error = WalletError;

    fn try_from(wire: WirePayment) -> WalletResult<Self> {
        Ok(PaymentEvent {
            tx: wire.tx.try_into()?,
            value: Coin::from_duffs(wire.value),
            previous_balance: Coin::from_duffs(wire.previous_balance),
            new_balance: Coin::from_duffs(wire.new_balance),
        })
    }
}

impl TryFrom<WireAuthKey> for AuthenticationKey {
    type Error = WalletError;

    fn try_from(wire: WireAuthKey) -> WalletResult<Self> {
        let bytes = hex::decode(&wire.public_key).map_err(|e| decode_error("public_key", e))?;
        let public_key = PublicKey::from_slice(&bytes).map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let secret_key = match wire.secret_key {
            Some(hex_key) => {
                let bytes = hex::decode(&hex_key).map_err(|e| decode_error("secret_key", e))?;
                Some(SecretKey::from_slice(&bytes).map_err(|e| WalletError::KeyDerivation(e.to_string()))?)
            }
            None => None,
        };
        Ok(AuthenticationKey { index: wire.index, public_key, secret_key })
    }
}

fn decode_error(field: &str, e: impl std::fmt::Display) -> WalletError {
    WalletError::Service(format!("invalid {} from wallet service: {}", field, e))
}

// Session

struct Subscribers(Mutex<Vec<mpsc::Sender<PaymentEvent>>>);

impl Subscribers {
    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::Sender<PaymentEvent>>> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, event: PaymentEvent) {
        self.lock().retain(|s| match s.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(txid = %event.tx.txid, "payment subscriber lagging, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

pub struct RpcWallet {
    client: Arc<RpcClient>,
    network: Network,
    data_dir: PathBuf,
    checkpoints: Option<PathBuf>,
    poll_interval: Duration,
    watcher: ConfirmationWatcher,
    subscribers: Arc<Subscribers>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RpcWallet {
    pub fn new(client: RpcClient, network: Network, data_dir: PathBuf) -> Self {
        Self {
            client: Arc::new(client),
            network,
            data_dir,
            checkpoints: None,
            poll_interval: POLL_INTERVAL,
            watcher: ConfirmationWatcher::new(),
            subscribers: Arc::new(Subscribers(Mutex::new(Vec::new()))),
            poller: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ForwarderConfig) -> WalletResult<Self> {
        let client = RpcClient::new(config.wallet_url.clone())?;
        let mut wallet = Self::new(client, config.network.clone(), config.data_dir.clone());
        wallet.checkpoints = config.checkpoints_path();
        Ok(wallet)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn watcher(&self) -> &ConfirmationWatcher { &self.watcher }

    async fn sent(&self, wire: WireTransaction) -> WalletResult<SendResult> {
        let tx: Transaction = wire.try_into()?;
        let (broadcast, signal) = BroadcastHandle::pending();
        tokio::spawn(await_broadcast(self.client.clone(), tx.txid, signal, self.poll_interval));
        Ok(SendResult { tx, broadcast })
    }

    async fn auth_key(&self, fresh: bool) -> WalletResult<AuthenticationKey> {
        let wire: WireAuthKey = self.client.call("getauthkey", json!({ "fresh": fresh })).await?;
        wire.try_into()
    }
}

impl Drop for RpcWallet {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.lock().unwrap_or_else(|p| p.into_inner()).take() {
            poller.abort();
        }
    }
}

async fn await_broadcast(client: Arc<RpcClient>, txid: Txid, signal: BroadcastSignal, interval: Duration) {
    loop {
        match client.call::<bool>("getbroadcaststatus", json!({ "txid": txid.to_string() })).await {
            Ok(true) => {
                signal.complete();
                return;
            }
            Ok(false) => tokio::time::sleep(interval).await,
            Err(e) => {
                // Dropping the signal resolves waiters with `false`.
                tracing::warn!(txid = %txid, "broadcast status unavailable: {}", e);
                return;
            }
        }
    }
}

async fn poll_loop(
    client: Arc<RpcClient>,
    watcher: ConfirmationWatcher,
    subscribers: Arc<Subscribers>,
    interval: Duration,
    mut cursor: u64,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        match client.call::<WireReceived>("listreceived", json!({ "since": cursor })).await {
            Ok(received) => {
                cursor = received.cursor;
                for wire in received.payments {
                    match PaymentEvent::try_from(wire) {
                        Ok(event) => subscribers.publish(event),
                        Err(e) => tracing::warn!("skipping payment: {}", e),
                    }
                }
            }
            Err(e) => tracing::warn!("listreceived failed: {}", e),
        }

        for txid in watcher.pending_txids() {
            match client.call::<u32>("getconfirmations", json!({ "txid": txid.to_string() })).await {
                Ok(depth) if depth > 0 => watcher.observe(txid, depth),
                Ok(_) => {}
                Err(e) => tracing::debug!(txid = %txid, "getconfirmations failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl WalletSession for RpcWallet {
    fn network(&self) -> &Network { &self.network }

    async fn start(&self) -> WalletResult<()> {
        let params = json!({
            "file_prefix": self.network.file_prefix(),
            "data_dir": self.data_dir,
            "checkpoints": self.checkpoints,
            "network": self.network.id(),
            "connect_localhost": self.network.connect_localhost(),
        });
        let cursor: u64 = self.client.call("start", params).await?;
        tracing::info!(url = self.client.url(), network = %self.network, "wallet service started");

        let mut poller = self.poller.lock().unwrap_or_else(|p| p.into_inner());
        if poller.is_none() {
            *poller = Some(tokio::spawn(poll_loop(
                self.client.clone(),
                self.watcher.clone(),
                self.subscribers.clone(),
                self.poll_interval,
                cursor,
            )));
        }
        Ok(())
    }

    async fn current_receive_address(&self) -> WalletResult<Address> {
        let text: String = self.client.call("getreceiveaddress", json!({})).await?;
        Address::from_base58(&self.network, &text).map_err(|e| decode_error("address", e))
    }

    async fn balance(&self) -> WalletResult<Coin> {
        let duffs: u64 = self.client.call("getbalance", json!({})).await?;
        Ok(Coin::from_duffs(duffs))
    }

    async fn send(&self, request: SendRequest) -> WalletResult<SendResult> {
        if self.poller.lock().unwrap_or_else(|p| p.into_inner()).is_none() {
            return Err(WalletError::NotStarted);
        }
        let wire: WireTransaction = match request {
            SendRequest::EmptyWallet { to } => self.client.call("sweep", json!({ "address": to.to_string() })).await?,
            SendRequest::CreditFunding { public_key, amount } => {
                let params = json!({
                    "public_key": hex::encode(public_key.public_key.serialize()),
                    "amount": amount.duffs(),
                });
                self.client.call("creditfunding", params).await?
            }
        };
        self.sent(wire).await
    }

    async fn fresh_authentication_key(&self) -> WalletResult<AuthenticationKey> {
        self.auth_key(true).await
    }

    async fn current_authentication_key(&self) -> WalletResult<AuthenticationKey> {
        self.auth_key(false).await
    }

    async fn credit_funding_transactions(&self) -> WalletResult<Vec<CreditFundingTransaction>> {
        let wire: Vec<WireTransaction> = self.client.call("listcreditfunding", json!({})).await?;
        let mut fundings = Vec::with_capacity(wire.len());
        for tx in wire {
            let tx: Transaction = tx.try_into()?;
            match CreditFundingTransaction::from_transaction(tx.clone()) {
                Some(funding) => fundings.push(funding),
                None => tracing::warn!(txid = %tx.txid, "listed as credit funding but has no burn output"),
            }
        }
        Ok(fundings)
    }

    fn subscribe_payments(&self) -> mpsc::Receiver<PaymentEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.lock().push(tx);
        rx
    }

    fn depth_future(&self, txid: Txid, depth: u32) -> ConfirmationFuture {
        self.watcher.watch(txid, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use bitcoin::secp256k1::Secp256k1;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn wire_tx(outputs: Vec<WireOutput>) -> WireTransaction {
        WireTransaction { txid: TXID.into(), outputs }
    }

    #[test]
    fn burn_output_survives_wire_conversion() {
        let burn = TxOutput::credit_burn(Coin::from_duffs(40_000), [7; 20]);
        let tx: Transaction = wire_tx(vec![
            WireOutput { value: 40_000, script: hex::encode(&burn.script_pubkey) },
            WireOutput { value: 9_000, script: "76a9".into() },
        ])
        .try_into()
        .unwrap();
        assert_eq!(tx.txid.to_string(), TXID);
        assert!(tx.is_credit_funding());
        let funding = CreditFundingTransaction::from_transaction(tx).unwrap();
        assert_eq!(funding.public_key_id(), &[7; 20]);
        assert_eq!(funding.credit_burned(), Coin::from_duffs(40_000));
    }

    #[test]
    fn bad_hex_is_a_service_error() {
        let r: WalletResult<Transaction> = wire_tx(vec![WireOutput { value: 1, script: "zz".into() }]).try_into();
        assert!(matches!(r, Err(WalletError::Service(_))));
        let r: WalletResult<Transaction> = WireTransaction { txid: "nope".into(), outputs: vec![] }.try_into();
        assert!(matches!(r, Err(WalletError::Service(_))));
    }

    #[test]
    fn payment_event_carries_balances() {
        let payment: WirePayment = serde_json::from_value(json!({
            "tx": { "txid": TXID, "outputs": [] },
            "value": 100_000,
            "previous_balance": 0,
            "new_balance": 100_000,
        }))
        .unwrap();
        let event = PaymentEvent::try_from(payment).unwrap();
        assert_eq!(event.value, Coin::from_duffs(100_000));
        assert_eq!(event.new_balance, Coin::from_duffs(100_000));
        assert_eq!(event.previous_balance, Coin::ZERO);
    }

    #[test]
    fn auth_key_secret_is_optional() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[3; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);

        let public_only: AuthenticationKey =
            WireAuthKey { index: 2, public_key: hex::encode(public.serialize()), secret_key: None }
                .try_into()
                .unwrap();
        assert_eq!(public_only.index, 2);
        assert!(public_only.secret_key.is_none());

        let full: AuthenticationKey = WireAuthKey {
            index: 2,
            public_key: hex::encode(public.serialize()),
            secret_key: Some(hex::encode(secret.secret_bytes())),
        }
        .try_into()
        .unwrap();
        assert_eq!(full.secret_key, Some(secret));
    }

    #[test]
    fn remote_codes_map_to_wallet_errors() {
        let e: WalletError = RpcError::Remote { code: -6, message: "Insufficient funds".into() }.into();
        assert!(e.is_unrecoverable());
        let e: WalletError = RpcError::Remote { code: -13, message: "locked".into() }.into();
        assert!(matches!(e, WalletError::KeyCrypter(_)));
        let e: WalletError = RpcError::Transport("refused".into()).into();
        assert!(!e.is_unrecoverable());
    }
}
