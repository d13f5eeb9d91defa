//! Confirmation watcher: one-shot subscriptions keyed by `(txid, depth)`.
//!
//! Wallet implementations feed it with `observe` whenever they learn a new
//! depth for a transaction; consumers `watch` for the depth they need. A
//! subscription fires at most once. A depth already known when the watch is
//! registered fires immediately, so a transaction first seen with two
//! confirmations still completes both its 1- and 2-block watches.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use bitcoin::Txid;
use tokio::sync::oneshot;

use crate::error::WatchError;
use crate::runtime::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub txid: Txid,
    /// Depth the watch asked for.
    pub depth: u32,
    /// Depth observed when it fired; may exceed `depth`.
    pub observed: u32,
}

type Completion = oneshot::Sender<Result<Confirmation, WatchError>>;

#[derive(Default)]
struct WatchState {
    depths: HashMap<Txid, u32>,
    pending: BTreeMap<(Txid, u32), Vec<Completion>>,
    cancelled: bool,
}

#[derive(Clone, Default)]
pub struct ConfirmationWatcher {
    state: Arc<Mutex<WatchState>>,
}

impl ConfirmationWatcher {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn watch(&self, txid: Txid, depth: u32) -> ConfirmationFuture {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if state.cancelled {
            let _ = tx.send(Err(WatchError::Cancelled));
        } else if let Some(&observed) = state.depths.get(&txid).filter(|&&d| d >= depth) {
            let _ = tx.send(Ok(Confirmation { txid, depth, observed }));
        } else {
            state.pending.entry((txid, depth)).or_default().push(tx);
        }
        ConfirmationFuture { txid, depth, rx }
    }

    /// Record that `txid` is now `depth` blocks deep. Satisfied watches fire
    /// in ascending depth order. Depth never goes backwards here; a reorg
    /// cannot un-fire a completed watch.
    pub fn observe(&self, txid: Txid, depth: u32) {
        let mut state = self.lock();
        let known = state.depths.entry(txid).or_insert(0);
        if depth <= *known {
            return;
        }
        *known = depth;

        let due: Vec<(Txid, u32)> = state
            .pending
            .range((txid, 0)..=(txid, depth))
            .map(|(key, _)| *key)
            .collect();
        for key in due {
            if let Some(waiters) = state.pending.remove(&key) {
                tracing::debug!(txid = %txid, depth = key.1, "confirmation reached");
                for waiter in waiters {
                    let _ = waiter.send(Ok(Confirmation { txid, depth: key.1, observed: depth }));
                }
            }
        }
    }

    pub fn depth_of(&self, txid: &Txid) -> Option<u32> {
        self.lock().depths.get(txid).copied()
    }

    /// Transactions with at least one outstanding watch.
    pub fn pending_txids(&self) -> Vec<Txid> {
        let state = self.lock();
        let mut txids: Vec<Txid> = state.pending.keys().map(|(txid, _)| *txid).collect();
        txids.dedup();
        txids
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.values().map(Vec::len).sum()
    }

    /// Fail every outstanding watch with `Cancelled` and refuse new ones.
    pub fn cancel_all(&self) {
        let mut state = self.lock();
        state.cancelled = true;
        let pending = std::mem::take(&mut state.pending);
        for waiter in pending.into_values().flatten() {
            let _ = waiter.send(Err(WatchError::Cancelled));
        }
    }

    /// Cancel all watches when `shutdown` fires.
    pub fn cancel_on(&self, shutdown: &Shutdown) {
        let watcher = self.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            watcher.cancel_all();
        });
    }
}

/// Resolves when the watched depth is reached. Dropping it withdraws nothing
/// from the watcher; the completion is simply discarded.
pub struct ConfirmationFuture {
    txid: Txid,
    depth: u32,
    rx: oneshot::Receiver<Result<Confirmation, WatchError>>,
}

impl ConfirmationFuture {
    pub fn txid(&self) -> Txid { self.txid }
    pub fn depth(&self) -> u32 { self.depth }
}

impl Future for ConfirmationFuture {
    type Output = Result<Confirmation, WatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let (txid, depth) = (self.txid, self.depth);
        Pin::new(&mut self.rx).poll(cx).map(|res| match res {
            Ok(outcome) => outcome,
            Err(_) => Err(WatchError::Closed { txid: txid.to_string(), depth }),
        })
    }
}
