//! Error taxonomy. One enum per seam, `WorkflowError` for the fatal tier.

use thiserror::Error;

use crate::address::AddressError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing forwarding address")]
    MissingAddress,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("key crypter: {0}")]
    KeyCrypter(String),

    #[error("key derivation: {0}")]
    KeyDerivation(String),

    #[error("wallet not started")]
    NotStarted,

    #[error("wallet service: {0}")]
    Service(String),
}

impl WalletError {
    /// Errors that can only mean a balance-accounting or key-handling bug.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, WalletError::InsufficientFunds(_) | WalletError::KeyCrypter(_))
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    #[error("query rejected: {0}")]
    Query(String),

    #[error("platform gateway: {0}")]
    Gateway(String),

    #[error("authentication key {0} has no secret key to sign with")]
    MissingSecretKey(u32),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("watch cancelled")]
    Cancelled,

    #[error("confirmation source closed before depth {depth} of {txid}")]
    Closed { txid: String, depth: u32 },
}

/// JSON-RPC transport failures shared by the HTTP adapters.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    #[error("rpc error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<RpcError> for WalletError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Remote { code: -6, message } => WalletError::InsufficientFunds(message),
            RpcError::Remote { code: -13, message } | RpcError::Remote { code: -14, message } => {
                WalletError::KeyCrypter(message)
            }
            other => WalletError::Service(other.to_string()),
        }
    }
}

impl From<RpcError> for PlatformError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Remote { message, .. } => PlatformError::Query(message),
            other => PlatformError::Gateway(other.to_string()),
        }
    }
}

/// Errors that stop the forwarder. Everything else is logged and skipped.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("forwarding {txid}: {source}")]
    Forward { txid: String, source: WalletError },

    #[error("funding identity from {txid}: {source}")]
    Funding { txid: String, source: WalletError },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("payment stream closed")]
    PaymentStreamClosed,
}

pub type WalletResult<T> = Result<T, WalletError>;
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Failures inside identity/name registration. Logged, never fatal.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("funding transaction {0} was never broadcast")]
    NotBroadcast(String),
}
