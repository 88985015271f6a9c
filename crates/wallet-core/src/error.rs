//! Error types for wallet core operations

use thiserror::Error;

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

/// Errors that can occur during wallet operations
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Device authentication denied or unavailable")]
    AuthenticationDenied,

    #[error("Secure storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Stored key material is corrupt: {0}")]
    CorruptKeyMaterial(String),

    #[error("Invalid counterparty public key: {0}")]
    InvalidCounterparty(String),

    #[error("Amount out of range: {0} satoshis")]
    AmountOutOfRange(u64),

    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Backend request failed: {0}")]
    BackendRequestFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Unsupported derivation scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("No active session")]
    NoSession,

    #[error("QR code operation failed: {0}")]
    QrCodeError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::SerializationError(err.to_string())
    }
}
