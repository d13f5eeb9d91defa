//! Platform client seam: identities and name documents live on a separate
//! platform network reached through a gateway.
//!
//! ```text
//! PlatformClient (trait)
//!     ├── DapiClient   → platform gateway over JSON-RPC   (feature "rpc")
//!     └── SimPlatform  → in-process document store        (crate::sim)
//! ```

#[cfg(feature = "rpc")]
pub mod rpc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PlatformResult;
use crate::wallet::{AuthenticationKey, CreditFundingTransaction};

pub const DOMAIN_DOCUMENT: &str = "domain";
pub const DPNS_DOMAIN_DOCUMENT: &str = "dpns.domain";
pub const TOP_LEVEL_DOMAIN: &str = "dash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    User,
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPublicKey {
    pub id: u32,
    #[serde(rename = "type")]
    pub key_type: u8,
    /// Base64 of the compressed public key.
    pub data: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    #[serde(default)]
    pub public_keys: Vec<IdentityPublicKey>,
    #[serde(default)]
    pub balance: u64,
}

impl Identity {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$type")]
    pub document_type: String,
    #[serde(rename = "$userId")]
    pub user_id: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    /// Field lookup including the `$`-prefixed system fields.
    pub fn get(&self, field: &str) -> Option<Value> {
        match field {
            "$id" => Some(Value::String(self.id.clone())),
            "$type" => Some(Value::String(self.document_type.clone())),
            "$userId" | "$ownerId" => Some(Value::String(self.user_id.clone())),
            other => self.data.get(other).cloned(),
        }
    }

    pub fn get_str(&self, field: &str) -> Option<String> {
        self.get(field).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhereOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "startsWith")]
    StartsWith,
}

impl WhereOperator {
    /// Evaluate against a document field value.
    pub fn matches(&self, field: &Value, operand: &Value) -> bool {
        match self {
            WhereOperator::Eq => field == operand,
            WhereOperator::Lt => compare(field, operand).is_some_and(|o| o.is_lt()),
            WhereOperator::Gt => compare(field, operand).is_some_and(|o| o.is_gt()),
            WhereOperator::In => operand.as_array().is_some_and(|set| set.contains(field)),
            WhereOperator::StartsWith => match (field.as_str(), operand.as_str()) {
                (Some(f), Some(prefix)) => f.starts_with(prefix),
                _ => false,
            },
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// `[field, operator, value]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause(pub String, pub WhereOperator, pub Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    #[serde(rename = "where")]
    pub where_clauses: Vec<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<(String, SortOrder)>>,
    pub limit: u32,
    pub start_at: u32,
    pub start_after: u32,
}

impl DocumentQuery {
    pub fn new(limit: u32) -> Self {
        Self { where_clauses: Vec::new(), order_by: None, limit, start_at: 0, start_after: 0 }
    }

    pub fn filter(mut self, field: impl Into<String>, op: WhereOperator, value: impl Into<Value>) -> Self {
        self.where_clauses.push(WhereClause(field.into(), op, value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.get_or_insert_with(Vec::new).push((field.into(), order));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.where_clauses
            .iter()
            .all(|WhereClause(field, op, value)| doc.get(field).is_some_and(|f| op.matches(&f, value)))
    }
}

/// Outcome of a name registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NameRegistration {
    Complete { names: Vec<String> },
    #[serde(rename = "timeout")]
    TimedOut { incomplete: Vec<String> },
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Register the identity founded by `funding`; returns the id the
    /// platform assigned.
    async fn register_identity(
        &self,
        identity_type: IdentityType,
        funding: &CreditFundingTransaction,
    ) -> PlatformResult<String>;

    /// `Ok(None)` when no identity is stored under `id`.
    async fn get_identity(&self, id: &str) -> PlatformResult<Option<Identity>>;

    async fn get_documents(&self, document_type: &str, query: &DocumentQuery) -> PlatformResult<Vec<Document>>;

    async fn register_name(
        &self,
        name: &str,
        identity: &Identity,
        key: &AuthenticationKey,
    ) -> PlatformResult<NameRegistration>;

    async fn get_name(&self, name: &str) -> PlatformResult<Option<Document>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name_doc(user: &str, label: &str) -> Document {
        let mut data = Map::new();
        data.insert("normalizedLabel".into(), json!(label));
        data.insert("normalizedParentDomainName".into(), json!("dash"));
        Document { id: format!("doc-{}", label), document_type: "domain".into(), user_id: user.into(), data }
    }

    #[test]
    fn query_serializes_as_clause_arrays() {
        let q = DocumentQuery::new(5).filter("$userId", WhereOperator::Eq, "abc");
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v, json!({"where": [["$userId", "==", "abc"]], "limit": 5, "startAt": 0, "startAfter": 0}));
    }

    #[test]
    fn query_matches_system_and_data_fields() {
        let doc = name_doc("owner", "hashengineering-7");
        let q = DocumentQuery::new(100)
            .filter("normalizedLabel", WhereOperator::StartsWith, "hashengineering")
            .filter("normalizedParentDomainName", WhereOperator::Eq, "dash");
        assert!(q.matches(&doc));
        assert!(DocumentQuery::new(5).filter("$userId", WhereOperator::Eq, "owner").matches(&doc));
        assert!(!DocumentQuery::new(5).filter("$userId", WhereOperator::Eq, "other").matches(&doc));
        assert!(!DocumentQuery::new(5).filter("missing", WhereOperator::Eq, "x").matches(&doc));
        assert!(DocumentQuery::new(5).filter("$userId", WhereOperator::In, json!(["a", "owner"])).matches(&doc));
    }

    #[test]
    fn document_round_trips_system_fields() {
        let doc = name_doc("owner", "label");
        let v = doc.to_json();
        assert_eq!(v["$userId"], "owner");
        assert_eq!(v["normalizedLabel"], "label");
        let back: Document = serde_json::from_value(v).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn name_registration_outcomes_are_tagged() {
        let timeout: NameRegistration = serde_json::from_value(json!({"status": "timeout", "incomplete": ["a"]})).unwrap();
        assert_eq!(timeout, NameRegistration::TimedOut { incomplete: vec!["a".into()] });
        let done: NameRegistration = serde_json::from_value(json!({"status": "complete", "names": ["b"]})).unwrap();
        assert_eq!(done, NameRegistration::Complete { names: vec!["b".into()] });
    }
}
