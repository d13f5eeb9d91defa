//! Startup report: what the platform knows about identities funded by this
//! wallet, and which `<prefix>-*` names exist.
//!
//! Every platform failure here degrades to "not found" or to the error text
//! in the output. Only the wallet listing can fail the report.

use std::fmt;

use crate::error::WalletResult;
use crate::platform::{
    Document, DocumentQuery, Identity, PlatformClient, WhereOperator, DOMAIN_DOCUMENT, DPNS_DOMAIN_DOCUMENT,
    TOP_LEVEL_DOMAIN,
};
use crate::wallet::{CreditFundingTransaction, WalletSession};

pub const NAMES_PER_IDENTITY: u32 = 5;
pub const NAME_SEARCH_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct IdentityEntry {
    pub funding_txid: String,
    /// Base58 identity identifier.
    pub identity_id: String,
    /// Identity as found, by base58 or by the base64 fallback.
    pub identity: Option<Identity>,
    /// First `normalizedName` owned by the identity.
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum NameSearch {
    /// `(userId, normalizedLabel)` per matching document.
    Found(Vec<(String, String)>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StartupReport {
    pub entries: Vec<IdentityEntry>,
    pub prefix: String,
    pub search: NameSearch,
}

pub async fn build_report(
    wallet: &dyn WalletSession,
    platform: &dyn PlatformClient,
    name_prefix: &str,
) -> WalletResult<StartupReport> {
    let fundings = wallet.credit_funding_transactions().await?;
    tracing::debug!(count = fundings.len(), "credit funding transactions in wallet");

    let mut entries = Vec::with_capacity(fundings.len());
    for funding in &fundings {
        entries.push(identity_entry(platform, funding).await);
    }

    let search = search_names(platform, name_prefix).await;
    Ok(StartupReport { entries, prefix: name_prefix.to_string(), search })
}

async fn identity_entry(platform: &dyn PlatformClient, funding: &CreditFundingTransaction) -> IdentityEntry {
    let id = funding.identity_identifier();
    let identity_id = id.to_base58();

    let mut identity = lookup_identity(platform, &identity_id).await;
    if identity.is_none() {
        identity = lookup_identity(platform, &id.to_base64()).await;
    }

    // Names are owned by the base58 id, whichever form found the identity.
    let name = match &identity {
        Some(_) => first_name(platform, &identity_id).await,
        None => None,
    };

    IdentityEntry { funding_txid: funding.txid().to_string(), identity_id, identity, name }
}

async fn lookup_identity(platform: &dyn PlatformClient, id: &str) -> Option<Identity> {
    match platform.get_identity(id).await {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!(id, "identity lookup failed: {}", e);
            None
        }
    }
}

async fn first_name(platform: &dyn PlatformClient, user_id: &str) -> Option<String> {
    let query = DocumentQuery::new(NAMES_PER_IDENTITY).filter("$userId", WhereOperator::Eq, user_id);
    match platform.get_documents(DOMAIN_DOCUMENT, &query).await {
        Ok(docs) => docs.first().and_then(|d| d.get_str("normalizedName")),
        Err(e) => {
            tracing::debug!(user_id, "name query failed: {}", e);
            None
        }
    }
}

async fn search_names(platform: &dyn PlatformClient, prefix: &str) -> NameSearch {
    let query = DocumentQuery::new(NAME_SEARCH_LIMIT)
        .filter("normalizedLabel", WhereOperator::StartsWith, prefix)
        .filter("normalizedParentDomainName", WhereOperator::Eq, TOP_LEVEL_DOMAIN);
    match platform.get_documents(DPNS_DOMAIN_DOCUMENT, &query).await {
        Ok(docs) => NameSearch::Found(docs.iter().map(label_of).collect()),
        Err(e) => NameSearch::Failed(e.to_string()),
    }
}

fn label_of(doc: &Document) -> (String, String) {
    (doc.user_id.clone(), doc.get_str("normalizedLabel").unwrap_or_default())
}

impl fmt::Display for StartupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Credit Funding Transactions: {}", self.entries.len())?;
        for entry in &self.entries {
            writeln!(f, "  txid: {}", entry.funding_txid)?;
            writeln!(f, "  identity id: {}", entry.identity_id)?;
            match &entry.identity {
                Some(identity) => {
                    writeln!(f, "  identity: {}", identity.to_json())?;
                    match &entry.name {
                        Some(name) => writeln!(f, "  name: {}", name)?,
                        None => writeln!(f, "  no names found")?,
                    }
                }
                None => writeln!(f, "  identity not found")?,
            }
        }

        writeln!(f, "Names starting with {}:", self.prefix)?;
        match &self.search {
            NameSearch::Found(names) => {
                for (user_id, label) in names {
                    writeln!(f, "{}->  name: {}", user_id, label)?;
                }
                write!(f, "{} names found", names.len())
            }
            NameSearch::Failed(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(search: NameSearch) -> StartupReport {
        StartupReport { entries: Vec::new(), prefix: "hashengineering".into(), search }
    }

    #[test]
    fn found_names_print_one_line_each() {
        let text = report(NameSearch::Found(vec![
            ("alice".into(), "hashengineering-1".into()),
            ("bob".into(), "hashengineering-2".into()),
        ]))
        .to_string();
        assert!(text.contains("alice->  name: hashengineering-1"));
        assert!(text.contains("bob->  name: hashengineering-2"));
        assert!(text.ends_with("2 names found"));
    }

    #[test]
    fn failed_search_prints_error_text() {
        let text = report(NameSearch::Failed("query rejected: bad where".into())).to_string();
        assert!(text.ends_with("query rejected: bad where"));
        assert!(!text.contains("names found"));
    }

    #[test]
    fn entry_without_name_says_so() {
        let mut r = report(NameSearch::Found(Vec::new()));
        r.entries.push(IdentityEntry {
            funding_txid: "ab".into(),
            identity_id: "id".into(),
            identity: Some(Identity {
                id: "id".into(),
                identity_type: crate::platform::IdentityType::User,
                public_keys: Vec::new(),
                balance: 0,
            }),
            name: None,
        });
        let text = r.to_string();
        assert!(text.contains("no names found"));
        assert!(text.ends_with("0 names found"));
    }
}
