//! Funding records keyed by the payment that triggered them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bitcoin::Txid;

use crate::wallet::{BroadcastHandle, CreditFundingTransaction};

#[derive(Debug)]
pub struct FundingRecord {
    /// Received payment the funding was created for.
    pub source_txid: Txid,
    pub funding: CreditFundingTransaction,
    pub broadcast: BroadcastHandle,
    identity_id: Mutex<Option<String>>,
}

impl FundingRecord {
    pub fn identity_id(&self) -> Option<String> {
        self.identity_id.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn set_identity_id(&self, id: impl Into<String>) {
        *self.identity_id.lock().unwrap_or_else(|p| p.into_inner()) = Some(id.into());
    }
}

#[derive(Default)]
struct ContextState {
    records: HashMap<Txid, Arc<FundingRecord>>,
    latest: Option<Arc<FundingRecord>>,
}

/// Shared between the forwarder loop and registration tasks.
#[derive(Clone, Default)]
pub struct WorkflowContext {
    state: Arc<Mutex<ContextState>>,
}

impl WorkflowContext {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Store a funding record and make it the latest one.
    pub fn record(&self, source_txid: Txid, funding: CreditFundingTransaction, broadcast: BroadcastHandle) -> Arc<FundingRecord> {
        let record = Arc::new(FundingRecord { source_txid, funding, broadcast, identity_id: Mutex::new(None) });
        let mut state = self.lock();
        if let Some(previous) = state.records.insert(source_txid, record.clone()) {
            tracing::warn!(source = %source_txid, replaced = %previous.funding.txid(), "funding record replaced");
        }
        state.latest = Some(record.clone());
        record
    }

    pub fn get(&self, source_txid: &Txid) -> Option<Arc<FundingRecord>> {
        self.lock().records.get(source_txid).cloned()
    }

    pub fn latest(&self) -> Option<Arc<FundingRecord>> {
        self.lock().latest.clone()
    }

    /// Record created for `source_txid`, else the most recent one.
    pub fn for_source(&self, source_txid: &Txid) -> Option<Arc<FundingRecord>> {
        let state = self.lock();
        state.records.get(source_txid).or(state.latest.as_ref()).cloned()
    }

    pub fn len(&self) -> usize { self.lock().records.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
