//! Identity and name registration for a broadcast funding transaction.
//!
//! Steps: wait for the funding broadcast, let it settle, register the
//! identity, read it back, claim `<prefix>-<n>` for it, read the name back.
//! Every failure here is logged and ends the attempt; none stops the process.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{PlatformError, RegistrationError};
use crate::platform::{Document, Identity, IdentityType, NameRegistration, PlatformClient};
use crate::wallet::WalletSession;

use super::context::FundingRecord;

#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub settle_delay: Duration,
    pub name_prefix: String,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationReport {
    pub funding_txid: String,
    /// Id as returned by the platform on registration.
    pub registered_id: Option<String>,
    /// Base58 identity identifier the identity is addressed by.
    pub identity_id: Option<String>,
    pub identity: Option<Identity>,
    pub name: Option<String>,
    pub name_outcome: Option<NameRegistration>,
    pub name_document: Option<Document>,
    pub error: Option<String>,
}

impl RegistrationReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && matches!(self.name_outcome, Some(NameRegistration::Complete { .. }))
    }
}

pub fn generate_name(prefix: &str) -> String {
    format!("{}-{}", prefix, rand::thread_rng().gen::<u32>())
}

pub async fn register_identity_and_name(
    wallet: Arc<dyn WalletSession>,
    platform: Arc<dyn PlatformClient>,
    record: Arc<FundingRecord>,
    settings: RegistrationSettings,
) -> RegistrationReport {
    let mut report = RegistrationReport { funding_txid: record.funding.txid().to_string(), ..Default::default() };
    if let Err(e) = run(wallet.as_ref(), platform.as_ref(), &record, &settings, &mut report).await {
        tracing::warn!(funding = %report.funding_txid, "identity registration failed: {}", e);
        report.error = Some(e.to_string());
    }
    report
}

async fn run(
    wallet: &dyn WalletSession,
    platform: &dyn PlatformClient,
    record: &FundingRecord,
    settings: &RegistrationSettings,
    report: &mut RegistrationReport,
) -> Result<(), RegistrationError> {
    if !record.broadcast.wait().await {
        return Err(RegistrationError::NotBroadcast(report.funding_txid.clone()));
    }
    tokio::time::sleep(settings.settle_delay).await;

    tracing::info!("Creating identity");
    let registered = platform.register_identity(IdentityType::User, &record.funding).await?;
    tracing::info!("Identity created: {}", registered);
    report.registered_id = Some(registered);

    let identity_id = record.funding.identity_identifier().to_base58();
    record.set_identity_id(&identity_id);
    report.identity_id = Some(identity_id.clone());
    tracing::info!("Identity created: {}", identity_id);

    let Some(identity) = platform.get_identity(&identity_id).await? else {
        tracing::warn!("failed to get identity: {}", identity_id);
        return Err(PlatformError::IdentityNotFound(identity_id).into());
    };
    tracing::info!("identity requested: {}", identity.to_json());
    report.identity = Some(identity.clone());

    let key = wallet.current_authentication_key().await?;
    let name = generate_name(&settings.name_prefix);
    tracing::info!("Registering name: {} for identity: {}", name, identity.id);
    report.name = Some(name.clone());
    let outcome = platform.register_name(&name, &identity, &key).await?;
    if let NameRegistration::TimedOut { incomplete } = &outcome {
        tracing::warn!("name registration timed out for {:?}", incomplete);
    }
    report.name_outcome = Some(outcome);

    match platform.get_name(&name).await? {
        Some(doc) => {
            tracing::info!(
                "name: {}->{}",
                doc.get_str("normalizedLabel").unwrap_or_default(),
                doc.to_json()
            );
            report.name_document = Some(doc);
        }
        None => tracing::warn!("name {} not found after registration", name),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_carry_prefix_and_number() {
        let name = generate_name("hashengineering");
        let n = name.strip_prefix("hashengineering-").expect("prefix");
        assert!(n.parse::<u32>().is_ok(), "{}", name);
    }

    #[test]
    fn generated_names_vary() {
        let names: std::collections::HashSet<_> = (0..16).map(|_| generate_name("p")).collect();
        assert!(names.len() > 1);
    }
}
