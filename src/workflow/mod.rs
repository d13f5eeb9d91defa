//! Forwarder: the event loop tying payments, confirmations and the three
//! workflows together.
//!
//! ```text
//! wallet payments ──► on_payment ──► depth_future(tx, 2) ─┐
//!                                └─► depth_future(tx, 1) ─┤ (spawned waits)
//!                                                         ▼
//!                          events channel ──► Confirmed { tx, depth }
//!                                   depth 1 ──► funding::fund_identity
//!                                   depth 2 ──► forward::forward_coins
//!                                                 └─► spawn registration
//! ```
//!
//! Handlers run one at a time on the loop task. The two watches per
//! transaction are independent subscriptions, but a depth-2 completion that
//! arrives before the same transaction's depth-1 handler has run is held
//! back until it has, so forwarding always sees the funding record.

pub mod context;
pub mod forward;
pub mod funding;
pub mod registration;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bitcoin::Txid;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::address::Address;
use crate::error::{WalletError, WatchError, WorkflowError};
use crate::platform::PlatformClient;
use crate::runtime::Shutdown;
use crate::wallet::{Coin, PaymentEvent, Transaction, WalletSession};

pub use context::{FundingRecord, WorkflowContext};
pub use funding::CREDIT_FUNDING_AMOUNT;
pub use registration::{RegistrationReport, RegistrationSettings};

pub const FORWARD_DEPTH: u32 = 2;
pub const FUNDING_DEPTH: u32 = 1;

#[derive(Debug, Clone)]
pub struct ForwarderSettings {
    pub forwarding_address: Address,
    pub funding_amount: Coin,
    pub settle_delay: Duration,
    pub name_prefix: String,
}

impl ForwarderSettings {
    pub fn new(forwarding_address: Address) -> Self {
        Self {
            forwarding_address,
            funding_amount: CREDIT_FUNDING_AMOUNT,
            settle_delay: Duration::from_secs(crate::config::DEFAULT_SETTLE_SECS),
            name_prefix: crate::config::DEFAULT_NAME_PREFIX.into(),
        }
    }

    pub fn from_config(config: &crate::config::ForwarderConfig) -> Self {
        Self {
            forwarding_address: config.forwarding_address.clone(),
            funding_amount: CREDIT_FUNDING_AMOUNT,
            settle_delay: config.settle_delay,
            name_prefix: config.name_prefix.clone(),
        }
    }
}

#[derive(Debug)]
enum WorkflowEvent {
    Confirmed { tx: Transaction, depth: u32 },
    WatchFailed(WatchError),
}

pub struct Forwarder {
    wallet: Arc<dyn WalletSession>,
    platform: Option<Arc<dyn PlatformClient>>,
    settings: ForwarderSettings,
    context: WorkflowContext,
    payments: mpsc::Receiver<PaymentEvent>,
    events_tx: mpsc::UnboundedSender<WorkflowEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkflowEvent>,
    /// Transactions whose depth-1 handler has run.
    funded: HashSet<Txid>,
    /// Depth-2 completions waiting for the depth-1 handler.
    deferred: HashMap<Txid, Transaction>,
    registrations: JoinSet<RegistrationReport>,
    reports: Option<mpsc::UnboundedSender<RegistrationReport>>,
}

impl Forwarder {
    /// Subscribes to payments immediately; anything received from here on
    /// is handled once `run` starts.
    pub fn new(
        wallet: Arc<dyn WalletSession>,
        platform: Option<Arc<dyn PlatformClient>>,
        settings: ForwarderSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let payments = wallet.subscribe_payments();
        Self {
            wallet,
            platform,
            settings,
            context: WorkflowContext::new(),
            payments,
            events_tx,
            events_rx,
            funded: HashSet::new(),
            deferred: HashMap::new(),
            registrations: JoinSet::new(),
            reports: None,
        }
    }

    /// Receive a report for every finished registration attempt.
    pub fn with_reports(mut self, sink: mpsc::UnboundedSender<RegistrationReport>) -> Self {
        self.reports = Some(sink);
        self
    }

    pub fn context(&self) -> WorkflowContext { self.context.clone() }

    /// Run until shutdown. Returns an error only for the fatal tier: wallet
    /// failures while forwarding or funding, or a broken confirmation source.
    pub async fn run(mut self, shutdown: Shutdown) -> Result<(), WorkflowError> {
        if shutdown.is_triggered() {
            return Ok(());
        }
        let stop = shutdown.wait();
        tokio::pin!(stop);
        tracing::info!(to = %self.settings.forwarding_address, "forwarder running");

        let result = loop {
            tokio::select! {
                cause = &mut stop => {
                    tracing::info!(?cause, "forwarder stopping");
                    break Ok(());
                }
                payment = self.payments.recv() => match payment {
                    Some(event) => self.on_payment(event),
                    None => break Err(WorkflowError::PaymentStreamClosed),
                },
                Some(event) = self.events_rx.recv() => {
                    if let Err(e) = self.on_event(event).await {
                        break Err(e);
                    }
                }
                Some(joined) = self.registrations.join_next(), if !self.registrations.is_empty() => {
                    match joined {
                        Ok(report) => self.publish(report),
                        Err(e) => tracing::error!("registration task failed: {}", e),
                    }
                }
            }
        };
        self.registrations.abort_all();
        result
    }

    fn on_payment(&mut self, event: PaymentEvent) {
        let tx = event.tx;
        tracing::info!(
            "Received tx for {}: {} (balance {} -> {})",
            event.value,
            tx,
            event.previous_balance,
            event.new_balance
        );
        tracing::info!("Transaction will be forwarded after it confirms.");

        for depth in [FORWARD_DEPTH, FUNDING_DEPTH] {
            let fut = self.wallet.depth_future(tx.txid, depth);
            let events = self.events_tx.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let event = match fut.await {
                    Ok(_) => WorkflowEvent::Confirmed { tx, depth },
                    Err(WatchError::Cancelled) => return,
                    Err(e) => WorkflowEvent::WatchFailed(e),
                };
                let _ = events.send(event);
            });
        }
    }

    async fn on_event(&mut self, event: WorkflowEvent) -> Result<(), WorkflowError> {
        match event {
            WorkflowEvent::WatchFailed(e) => Err(e.into()),
            WorkflowEvent::Confirmed { tx, depth: FUNDING_DEPTH } => {
                tracing::info!(txid = %tx.txid, "Confirmation received.");
                self.on_funding_depth(&tx).await?;
                self.funded.insert(tx.txid);
                if let Some(held) = self.deferred.remove(&tx.txid) {
                    self.on_forward_depth(&held).await?;
                }
                Ok(())
            }
            WorkflowEvent::Confirmed { tx, depth } => {
                tracing::info!(txid = %tx.txid, depth, "Confirmation received.");
                if self.funded.contains(&tx.txid) {
                    self.on_forward_depth(&tx).await
                } else {
                    self.deferred.insert(tx.txid, tx);
                    Ok(())
                }
            }
        }
    }

    async fn on_funding_depth(&mut self, tx: &Transaction) -> Result<(), WorkflowError> {
        let funded = funding::fund_identity(self.wallet.as_ref(), tx, self.settings.funding_amount)
            .await
            .map_err(|source| fatal_wallet_error(source, |source| WorkflowError::Funding { txid: tx.txid.to_string(), source }))?;
        if let Some((funding, broadcast)) = funded {
            self.context.record(tx.txid, funding, broadcast);
        }
        Ok(())
    }

    async fn on_forward_depth(&mut self, tx: &Transaction) -> Result<(), WorkflowError> {
        self.funded.remove(&tx.txid);
        let forwarded = forward::forward_coins(self.wallet.as_ref(), &self.settings.forwarding_address, tx)
            .await
            .map_err(|source| fatal_wallet_error(source, |source| WorkflowError::Forward { txid: tx.txid.to_string(), source }))?;
        if forwarded.is_none() {
            return Ok(());
        }

        let Some(record) = self.context.for_source(&tx.txid) else {
            tracing::info!(txid = %tx.txid, "no funding transaction recorded, skipping identity registration");
            return Ok(());
        };
        let Some(platform) = self.platform.clone() else {
            tracing::info!(funding = %record.funding.txid(), "no platform configured, skipping identity registration");
            return Ok(());
        };

        let wallet = self.wallet.clone();
        let settings = RegistrationSettings {
            settle_delay: self.settings.settle_delay,
            name_prefix: self.settings.name_prefix.clone(),
        };
        self.registrations
            .spawn(registration::register_identity_and_name(wallet, platform, record, settings));
        Ok(())
    }

    fn publish(&self, report: RegistrationReport) {
        if let Some(sink) = &self.reports {
            let _ = sink.send(report);
        }
    }
}

fn fatal_wallet_error<F>(source: WalletError, wrap: F) -> WorkflowError
where
    F: FnOnce(WalletError) -> WorkflowError,
{
    if source.is_unrecoverable() {
        tracing::error!("unrecoverable wallet error: {}", source);
    }
    wrap(source)
}
