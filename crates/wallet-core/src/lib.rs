//! Core of a mobile peer-to-peer payment wallet
//!
//! This crate implements the wallet's engineering kernel: custody of the
//! root private scalar behind device authentication, an explicit identity
//! session lifecycle, and a non-interactive ECDH payment derivation that
//! produces a fresh, unlinkable one-time output for any recipient known only
//! by a public identity key. UI, camera scanning and the storage/signing
//! backend are external collaborators behind the traits in `custodian` and
//! `store`.

pub mod commands;
pub mod custodian;
pub mod error;
pub mod keys;
pub mod payment;
pub mod qr;
pub mod script;
pub mod session;
pub mod store;

// Re-export main types
pub use commands::{CommandDispatcher, WalletCommand, WalletResponse};
pub use custodian::{DeviceAuthenticator, KeyCustodian, MemorySecureStore, SecureStore};
pub use error::{WalletError, WalletResult};
pub use keys::{IdentityKey, KeyDeriver, PrivateScalar};
pub use payment::{
    recover_output_key, DerivationNonce, PaymentDeriver, PaymentInstructions, PaymentIntent,
    MAX_SATOSHIS, PAYMENT_PROTOCOL_ID, SCHEME_TAG,
};
pub use qr::QrCodeHandler;
pub use session::{Session, SessionManager, SessionState};
pub use store::{
    ActionOptions, ActionOutput, CreateActionArgs, CreateActionResult, MemoryWalletStore,
    WalletStore,
};
