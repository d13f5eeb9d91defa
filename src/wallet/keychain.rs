//! Identity-funding authentication keys, derived with BIP32 along
//! `m/9'/<coin>'/5'/1'/<index>`.

use std::fmt;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use bitcoin::NetworkKind;

use crate::config::Network;
use crate::error::{WalletError, WalletResult};

const FEATURE_PURPOSE: u32 = 9;
const FEATURE_IDENTITIES: u32 = 5;
const SUBFEATURE_REGISTRATION_FUNDING: u32 = 1;

/// Public half always present; the secret only when the wallet hands it out.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticationKey {
    pub index: u32,
    pub public_key: PublicKey,
    pub secret_key: Option<SecretKey>,
}

impl AuthenticationKey {
    pub fn public_only(index: u32, public_key: PublicKey) -> Self {
        Self { index, public_key, secret_key: None }
    }

    /// HASH160 of the compressed public key.
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160::Hash::hash(&self.public_key.serialize()).to_byte_array()
    }
}

impl fmt::Debug for AuthenticationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationKey")
            .field("index", &self.index)
            .field("public_key", &self.public_key)
            .field("secret_key", &self.secret_key.map(|_| "<redacted>"))
            .finish()
    }
}

pub struct AuthenticationKeyChain {
    account: Xpriv,
    issued: u32,
    secp: Secp256k1<All>,
}

impl AuthenticationKeyChain {
    pub fn from_seed(seed: &[u8], network: &Network) -> WalletResult<Self> {
        let secp = Secp256k1::new();
        let kind = if network.is_mainnet() { NetworkKind::Main } else { NetworkKind::Test };
        let master = Xpriv::new_master(kind, seed).map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let path = DerivationPath::from(vec![
            hardened(FEATURE_PURPOSE)?,
            hardened(network.coin_type())?,
            hardened(FEATURE_IDENTITIES)?,
            hardened(SUBFEATURE_REGISTRATION_FUNDING)?,
        ]);
        let account = master.derive_priv(&secp, &path).map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        Ok(Self { account, issued: 0, secp })
    }

    /// Number of keys handed out so far.
    pub fn issued(&self) -> u32 { self.issued }

    pub fn fresh_key(&mut self) -> WalletResult<AuthenticationKey> {
        let key = self.key_at(self.issued)?;
        self.issued += 1;
        Ok(key)
    }

    /// Last issued key; issues the first one if none has been yet.
    pub fn current_key(&mut self) -> WalletResult<AuthenticationKey> {
        match self.issued {
            0 => self.fresh_key(),
            n => self.key_at(n - 1),
        }
    }

    pub fn key_at(&self, index: u32) -> WalletResult<AuthenticationKey> {
        let child = ChildNumber::from_normal_idx(index).map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let xpriv = self
            .account
            .derive_priv(&self.secp, &[child])
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let secret_key = xpriv.private_key;
        Ok(AuthenticationKey {
            index,
            public_key: PublicKey::from_secret_key(&self.secp, &secret_key),
            secret_key: Some(secret_key),
        })
    }
}

fn hardened(index: u32) -> WalletResult<ChildNumber> {
    ChildNumber::from_hardened_idx(index).map_err(|e| WalletError::KeyDerivation(e.to_string()))
}
