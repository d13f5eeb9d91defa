//! DapiClient - `PlatformClient` over the platform gateway's JSON-RPC
//! interface. Name registrations are signed locally with the identity's
//! authentication key.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::{ecdsa::Signature, Message, Secp256k1, SecretKey};
use serde_json::json;

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{Document, DocumentQuery, Identity, IdentityType, NameRegistration, PlatformClient};
use crate::rpc::RpcClient;
use crate::wallet::{AuthenticationKey, CreditFundingTransaction};

pub struct DapiClient {
    client: RpcClient,
}

impl DapiClient {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn connect(url: impl Into<String>) -> PlatformResult<Self> {
        Ok(Self::new(RpcClient::new(url)?))
    }
}

/// Digest a name claim commits to: `sha256d(name || identity id)`.
pub fn name_claim_digest(name: &str, identity_id: &str) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(name.len() + identity_id.len());
    preimage.extend_from_slice(name.as_bytes());
    preimage.extend_from_slice(identity_id.as_bytes());
    sha256d::Hash::hash(&preimage).to_byte_array()
}

pub fn sign_name_claim(name: &str, identity_id: &str, secret_key: &SecretKey) -> Signature {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(name_claim_digest(name, identity_id));
    secp.sign_ecdsa(&message, secret_key)
}

#[async_trait]
impl PlatformClient for DapiClient {
    async fn register_identity(
        &self,
        identity_type: IdentityType,
        funding: &CreditFundingTransaction,
    ) -> PlatformResult<String> {
        let outpoint = bitcoin::consensus::encode::serialize(&funding.locked_outpoint());
        let params = json!({
            "type": identity_type,
            "fundingTransaction": funding.txid().to_string(),
            "lockedOutPoint": STANDARD.encode(outpoint),
            "publicKeyHash": hex::encode(funding.public_key_id()),
        });
        Ok(self.client.call("registerIdentity", params).await?)
    }

    async fn get_identity(&self, id: &str) -> PlatformResult<Option<Identity>> {
        Ok(self.client.call("getIdentity", json!({ "id": id })).await?)
    }

    async fn get_documents(&self, document_type: &str, query: &DocumentQuery) -> PlatformResult<Vec<Document>> {
        let params = json!({ "type": document_type, "query": query });
        Ok(self.client.call("getDocuments", params).await?)
    }

    async fn register_name(
        &self,
        name: &str,
        identity: &Identity,
        key: &AuthenticationKey,
    ) -> PlatformResult<NameRegistration> {
        let secret_key = key.secret_key.as_ref().ok_or(PlatformError::MissingSecretKey(key.index))?;
        let signature = sign_name_claim(name, &identity.id, secret_key);
        let params = json!({
            "name": name,
            "identityId": identity.id,
            "publicKeyId": key.index,
            "publicKey": STANDARD.encode(key.public_key.serialize()),
            "signature": STANDARD.encode(signature.serialize_compact()),
        });
        Ok(self.client.call("registerName", params).await?)
    }

    async fn get_name(&self, name: &str) -> PlatformResult<Option<Document>> {
        Ok(self.client.call("getName", json!({ "name": name })).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::PublicKey;

    #[test]
    fn claim_signature_verifies_against_key() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[9; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);

        let sig = sign_name_claim("hashengineering-7", "4Zv1", &secret);
        let msg = Message::from_digest(name_claim_digest("hashengineering-7", "4Zv1"));
        assert!(secp.verify_ecdsa(&msg, &sig, &public).is_ok());

        let other = Message::from_digest(name_claim_digest("hashengineering-8", "4Zv1"));
        assert!(secp.verify_ecdsa(&other, &sig, &public).is_err());
    }

    #[test]
    fn digest_binds_identity() {
        assert_ne!(name_claim_digest("a", "x"), name_claim_digest("a", "y"));
    }

    #[tokio::test]
    async fn public_only_key_cannot_claim_names() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[9; 32]).unwrap();
        let key = AuthenticationKey::public_only(4, PublicKey::from_secret_key(&secp, &secret));
        let identity = Identity { id: "id".into(), identity_type: IdentityType::User, public_keys: vec![], balance: 0 };
        // Never reaches the network: the key check comes first.
        let client = DapiClient::connect("http://127.0.0.1:9").unwrap();
        let err = client.register_name("n", &identity, &key).await.unwrap_err();
        assert!(matches!(err, PlatformError::MissingSecretKey(4)));
    }
}
