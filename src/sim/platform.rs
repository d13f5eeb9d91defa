//! SimPlatform - identities and documents held in memory.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{
    Document, DocumentQuery, Identity, IdentityPublicKey, IdentityType, NameRegistration, PlatformClient,
    DOMAIN_DOCUMENT, TOP_LEVEL_DOMAIN,
};
use crate::wallet::{AuthenticationKey, CreditFundingTransaction};

#[derive(Default)]
struct SimPlatformState {
    identities: HashMap<String, Identity>,
    documents: Vec<Document>,
    registered_fundings: Vec<String>,
    registered_names: Vec<(String, String)>,
    fail_queries: bool,
    fail_identity_lookups: bool,
    fail_registrations: bool,
    time_out_names: bool,
}

#[derive(Default)]
pub struct SimPlatform {
    state: Mutex<SimPlatformState>,
}

impl SimPlatform {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, SimPlatformState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Store `identity` under an arbitrary lookup key.
    pub fn insert_identity(&self, key: impl Into<String>, identity: Identity) {
        self.lock().identities.insert(key.into(), identity);
    }

    pub fn insert_document(&self, document: Document) {
        self.lock().documents.push(document);
    }

    /// Add a `domain` document naming `label` for `user_id`.
    pub fn insert_name(&self, user_id: &str, label: &str) {
        let doc = name_document(user_id, label);
        self.insert_document(doc);
    }

    pub fn fail_queries(&self, fail: bool) { self.lock().fail_queries = fail; }
    pub fn fail_identity_lookups(&self, fail: bool) { self.lock().fail_identity_lookups = fail; }
    pub fn fail_registrations(&self, fail: bool) { self.lock().fail_registrations = fail; }
    pub fn time_out_names(&self, time_out: bool) { self.lock().time_out_names = time_out; }

    /// Txids of funding transactions identities were registered from.
    pub fn registered_fundings(&self) -> Vec<String> { self.lock().registered_fundings.clone() }

    /// `(name, identity id)` pairs in registration order.
    pub fn registered_names(&self) -> Vec<(String, String)> { self.lock().registered_names.clone() }
}

fn name_document(user_id: &str, label: &str) -> Document {
    let normalized = label.to_lowercase();
    let mut data = Map::new();
    data.insert("label".into(), json!(label));
    data.insert("normalizedLabel".into(), json!(normalized));
    data.insert("normalizedParentDomainName".into(), json!(TOP_LEVEL_DOMAIN));
    data.insert("normalizedName".into(), json!(format!("{}.{}", normalized, TOP_LEVEL_DOMAIN)));
    Document {
        id: format!("{}:{}", user_id, normalized),
        document_type: DOMAIN_DOCUMENT.into(),
        user_id: user_id.into(),
        data,
    }
}

#[async_trait]
impl PlatformClient for SimPlatform {
    async fn register_identity(
        &self,
        identity_type: IdentityType,
        funding: &CreditFundingTransaction,
    ) -> PlatformResult<String> {
        let mut state = self.lock();
        if state.fail_registrations {
            return Err(PlatformError::Gateway("identity registration rejected".into()));
        }
        let id = funding.identity_identifier();
        let identity = Identity {
            id: id.to_base58(),
            identity_type,
            public_keys: vec![IdentityPublicKey {
                id: 1,
                key_type: 0,
                data: STANDARD.encode(funding.public_key_id()),
                is_enabled: true,
            }],
            balance: funding.credit_burned().duffs(),
        };
        state.identities.insert(identity.id.clone(), identity);
        state.registered_fundings.push(funding.txid().to_string());
        Ok(id.to_base64())
    }

    async fn get_identity(&self, id: &str) -> PlatformResult<Option<Identity>> {
        let state = self.lock();
        if state.fail_identity_lookups {
            return Err(PlatformError::Gateway("identity lookup unavailable".into()));
        }
        Ok(state.identities.get(id).cloned())
    }

    async fn get_documents(&self, document_type: &str, query: &DocumentQuery) -> PlatformResult<Vec<Document>> {
        let state = self.lock();
        if state.fail_queries {
            return Err(PlatformError::Query(format!("query on {} failed", document_type)));
        }
        let wanted = document_type.rsplit('.').next().unwrap_or(document_type);
        let skip = query.start_at.max(query.start_after) as usize;
        Ok(state
            .documents
            .iter()
            .filter(|d| d.document_type == wanted && query.matches(d))
            .skip(skip)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn register_name(
        &self,
        name: &str,
        identity: &Identity,
        _key: &AuthenticationKey,
    ) -> PlatformResult<NameRegistration> {
        let mut state = self.lock();
        if state.fail_registrations {
            return Err(PlatformError::Gateway("name registration rejected".into()));
        }
        if state.time_out_names {
            return Ok(NameRegistration::TimedOut { incomplete: vec![name.to_string()] });
        }
        state.documents.push(name_document(&identity.id, name));
        state.registered_names.push((name.to_string(), identity.id.clone()));
        Ok(NameRegistration::Complete { names: vec![name.to_string()] })
    }

    async fn get_name(&self, name: &str) -> PlatformResult<Option<Document>> {
        let state = self.lock();
        if state.fail_queries {
            return Err(PlatformError::Query(format!("name lookup for {} failed", name)));
        }
        let normalized = name.to_lowercase();
        Ok(state.documents.iter().find(|d| d.get_str("normalizedLabel").as_deref() == Some(normalized.as_str())).cloned())
    }
}
