//! Identity session lifecycle
//!
//! A session represents "logged in" wallet state: the identity key pair
//! derived from the custodied root scalar plus a confirmed storage backend
//! handle. Exactly one session exists at a time; re-authentication replaces
//! it wholesale rather than mutating it in place, so concurrent observers
//! never see torn state.

use crate::custodian::KeyCustodian;
use crate::error::{WalletError, WalletResult};
use crate::keys::{IdentityKey, KeyDeriver};
use crate::payment::PaymentDeriver;
use crate::store::{CreateActionResult, WalletStore};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Authentication lifecycle state
///
/// `Authenticating` is the only state in which the custodian's blocking
/// device prompt may be outstanding. It moves to `Authenticated` only after
/// both key derivation and the storage handshake succeed, otherwise back to
/// `Unauthenticated` with the originating error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// An established wallet session
///
/// Owned behind `Arc`: callers that captured a session keep a coherent view
/// even after the manager replaces it.
pub struct Session {
    deriver: KeyDeriver,
    store: Arc<dyn WalletStore>,
}

impl Session {
    /// The published identity key (QR / clipboard display)
    pub fn identity_key(&self) -> &IdentityKey {
        self.deriver.identity_key()
    }

    /// The session key deriver, for payment derivation and recovery
    pub fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    /// Derive a one-time output for `recipient` and submit the Action
    pub async fn send_payment(
        &self,
        recipient: &str,
        amount_satoshis: u64,
    ) -> WalletResult<CreateActionResult> {
        PaymentDeriver::new(&self.deriver)
            .send_payment(self.store.as_ref(), recipient, amount_satoshis)
            .await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity_key().to_hex())
            .finish_non_exhaustive()
    }
}

/// Single-slot session manager
pub struct SessionManager {
    custodian: KeyCustodian,
    store: Arc<dyn WalletStore>,
    state: RwLock<SessionState>,
    session: RwLock<Option<Arc<Session>>>,
    // Serializes authenticate/logout: a second call while one is in flight
    // queues behind it instead of racing two storage handshakes.
    op: Mutex<()>,
}

impl SessionManager {
    pub fn new(custodian: KeyCustodian, store: Arc<dyn WalletStore>) -> Self {
        Self {
            custodian,
            store,
            state: RwLock::new(SessionState::Unauthenticated),
            session: RwLock::new(None),
            op: Mutex::new(()),
        }
    }

    /// Authenticate and establish a session
    ///
    /// Loads (or creates) the root scalar through the custodian, derives the
    /// identity key pair, and confirms the storage backend before exposing
    /// anything. Any failure restores `Unauthenticated`; no half-open
    /// session is ever observable. A successful call while a session is
    /// already active replaces it (no stacking).
    pub async fn authenticate(&self) -> WalletResult<Arc<Session>> {
        let _op = self.op.lock().await;
        *self.state.write().await = SessionState::Authenticating;

        match self.establish().await {
            Ok(session) => {
                let session = Arc::new(session);
                *self.session.write().await = Some(session.clone());
                *self.state.write().await = SessionState::Authenticated;
                info!(identity = %session.identity_key(), "Session established");
                Ok(session)
            }
            Err(err) => {
                *self.session.write().await = None;
                *self.state.write().await = SessionState::Unauthenticated;
                warn!(error = %err, "Authentication failed");
                Err(err)
            }
        }
    }

    async fn establish(&self) -> WalletResult<Session> {
        let root = self.custodian.load_or_create().await?;
        let deriver = KeyDeriver::from_root(&root)?;
        debug!(identity = %deriver.identity_key(), "Identity key derived, opening storage");

        // Storage handshake failures are surfaced, not retried; retry is a
        // user-initiated re-authentication.
        self.store.make_available(deriver.identity_key()).await?;

        Ok(Session {
            deriver,
            store: self.store.clone(),
        })
    }

    /// Tear down the session and erase the stored root scalar
    ///
    /// Destructive: afterwards the only recovery path is the user's backup
    /// of the exported key.
    pub async fn logout(&self) -> WalletResult<()> {
        let _op = self.op.lock().await;
        *self.session.write().await = None;
        *self.state.write().await = SessionState::Unauthenticated;
        self.custodian.erase().await?;
        info!("Logged out and erased root key");
        Ok(())
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// The active session, if any
    pub async fn session(&self) -> Option<Arc<Session>> {
        self.session.read().await.clone()
    }

    /// Identity key of the active session
    pub async fn identity_key(&self) -> WalletResult<IdentityKey> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.identity_key().clone())
            .ok_or(WalletError::NoSession)
    }
}
