//! Key custody behind device authentication and secure storage
//!
//! The custodian owns the root private scalar. Every read is gated by a
//! device/biometric challenge; the scalar is persisted hex-encoded in a
//! single named slot of the platform secure store and is never handed out
//! when the challenge is declined.

use crate::error::{WalletError, WalletResult};
use crate::keys::PrivateScalar;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Storage slot name for the root scalar. At most one slot is ever used.
const ROOT_KEY_SLOT: &str = "root-key";

/// Prompt shown by the device authentication challenge
const UNLOCK_PROMPT: &str = "Authenticate to access wallet keys";

/// Platform secure storage (iOS Keychain, Android Keystore, ...)
///
/// Encryption at rest is the platform's responsibility behind this seam;
/// the custodian only ever stores the hex encoding of the scalar.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a value under a named slot, overwriting any previous value
    async fn set_item(&self, key: &str, value: &str) -> WalletResult<()>;

    /// Read a named slot, `None` if absent
    async fn get_item(&self, key: &str) -> WalletResult<Option<String>>;

    /// Delete a named slot; deleting an absent slot is not an error
    async fn delete_item(&self, key: &str) -> WalletResult<()>;
}

/// Device-level authentication challenge (biometrics or passcode)
#[async_trait]
pub trait DeviceAuthenticator: Send + Sync {
    /// Present the challenge and report whether the user passed it
    ///
    /// `Ok(false)` is a decline; `Err` means the challenge could not be
    /// presented at all. Both surface as `AuthenticationDenied` upstream.
    async fn authenticate(&self, prompt: &str) -> WalletResult<bool>;
}

/// Custodian for the root private scalar
pub struct KeyCustodian {
    store: Arc<dyn SecureStore>,
    authenticator: Arc<dyn DeviceAuthenticator>,
    // The device prompt is a blocking, user-facing operation; serialize the
    // whole read path so it is never raised from two call paths at once.
    gate: Mutex<()>,
}

impl KeyCustodian {
    pub fn new(store: Arc<dyn SecureStore>, authenticator: Arc<dyn DeviceAuthenticator>) -> Self {
        Self {
            store,
            authenticator,
            gate: Mutex::new(()),
        }
    }

    /// Load the stored root scalar, generating and persisting one on first use
    ///
    /// The device challenge runs first; if it is declined or unavailable the
    /// stored secret is never read and `AuthenticationDenied` is returned.
    /// Stored bytes that no longer parse as a valid scalar are
    /// `CorruptKeyMaterial`, which is fatal here: recovery is an explicit,
    /// user-confirmed `erase` at a higher layer, never a silent repair.
    pub async fn load_or_create(&self) -> WalletResult<PrivateScalar> {
        let _gate = self.gate.lock().await;

        let passed = self
            .authenticator
            .authenticate(UNLOCK_PROMPT)
            .await
            .map_err(|_| WalletError::AuthenticationDenied)?;
        if !passed {
            warn!("Device authentication declined; no key material released");
            return Err(WalletError::AuthenticationDenied);
        }

        match self.store.get_item(ROOT_KEY_SLOT).await? {
            Some(encoded) => PrivateScalar::from_hex(&encoded),
            None => {
                let scalar = PrivateScalar::generate()?;
                self.store.set_item(ROOT_KEY_SLOT, &scalar.to_hex()).await?;
                info!("Generated and persisted a new root key");
                Ok(scalar)
            }
        }
    }

    /// Import a user-supplied root scalar, overwriting any stored one
    ///
    /// This is the restore half of the backup path: the hex the user saved
    /// from [`export_key`] (or another wallet) becomes the root of trust.
    /// Anything that does not parse as a valid field scalar is rejected and
    /// the slot is left untouched.
    ///
    /// [`export_key`]: KeyCustodian::export_key
    pub async fn import_key(&self, encoded: &str) -> WalletResult<PrivateScalar> {
        let _gate = self.gate.lock().await;

        let passed = self
            .authenticator
            .authenticate(UNLOCK_PROMPT)
            .await
            .map_err(|_| WalletError::AuthenticationDenied)?;
        if !passed {
            warn!("Device authentication declined; import refused");
            return Err(WalletError::AuthenticationDenied);
        }

        let scalar = PrivateScalar::from_hex(encoded)?;
        self.store.set_item(ROOT_KEY_SLOT, &scalar.to_hex()).await?;
        info!("Imported a root key into the secure slot");
        Ok(scalar)
    }

    /// Export the stored scalar's hex encoding for the user's backup
    ///
    /// Gated by the device challenge like any other read. `None` when no
    /// key has been generated or imported yet.
    pub async fn export_key(&self) -> WalletResult<Option<String>> {
        let _gate = self.gate.lock().await;

        let passed = self
            .authenticator
            .authenticate(UNLOCK_PROMPT)
            .await
            .map_err(|_| WalletError::AuthenticationDenied)?;
        if !passed {
            warn!("Device authentication declined; export refused");
            return Err(WalletError::AuthenticationDenied);
        }

        match self.store.get_item(ROOT_KEY_SLOT).await? {
            Some(encoded) => {
                // Validate before handing out: a corrupt slot must never be
                // backed up as if it were a key.
                let scalar = PrivateScalar::from_hex(&encoded)?;
                Ok(Some(scalar.to_hex()))
            }
            None => Ok(None),
        }
    }

    /// Irreversibly remove the stored scalar
    ///
    /// Idempotent: erasing an absent key is not an error. After this the
    /// only recovery path is whatever backup the user made.
    pub async fn erase(&self) -> WalletResult<()> {
        let _gate = self.gate.lock().await;
        self.store.delete_item(ROOT_KEY_SLOT).await?;
        info!("Root key slot erased");
        Ok(())
    }

    /// Whether a root scalar exists, without raising the device prompt
    pub async fn has_key(&self) -> WalletResult<bool> {
        Ok(self.store.get_item(ROOT_KEY_SLOT).await?.is_some())
    }
}

/// In-memory secure store
///
/// Stands in for the platform keystore in tests and development, the same
/// role the in-memory storage plays for the platform backends elsewhere.
#[derive(Default)]
pub struct MemorySecureStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_item(&self, key: &str, value: &str) -> WalletResult<()> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn delete_item(&self, key: &str) -> WalletResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}
