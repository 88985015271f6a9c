//! Typed command set for the UI bridge
//!
//! The embedded UI layer drives the core through a closed set of tagged
//! commands with typed inputs and outputs. Unknown tags are rejected as a
//! distinct error instead of falling through to some default call.

use crate::error::{WalletError, WalletResult};
use crate::session::SessionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Commands the UI layer may issue
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WalletCommand {
    Authenticate,
    Logout,
    #[serde(rename_all = "camelCase")]
    DerivePayment {
        recipient_public_key: String,
        amount_satoshis: u64,
    },
    IdentityKey,
}

/// Tags accepted by [`WalletCommand`]; anything else is `UnknownCommand`
const KNOWN_TAGS: [&str; 4] = ["authenticate", "logout", "derivePayment", "identityKey"];

impl WalletCommand {
    /// Parse a raw JSON message from the bridge
    pub fn parse(raw: &str) -> WalletResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| WalletError::UnknownCommand("<missing type tag>".into()))?;
        if !KNOWN_TAGS.contains(&tag) {
            return Err(WalletError::UnknownCommand(tag.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Typed responses back to the UI layer
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WalletResponse {
    #[serde(rename_all = "camelCase")]
    Authenticated { identity_key: String },
    LoggedOut,
    #[serde(rename_all = "camelCase")]
    PaymentSent { txid: String },
    #[serde(rename_all = "camelCase")]
    IdentityKey { identity_key: String },
}

/// Dispatches bridge commands against the session manager
pub struct CommandDispatcher {
    manager: Arc<SessionManager>,
}

impl CommandDispatcher {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub async fn dispatch(&self, command: WalletCommand) -> WalletResult<WalletResponse> {
        debug!(?command, "Dispatching bridge command");
        match command {
            WalletCommand::Authenticate => {
                let session = self.manager.authenticate().await?;
                Ok(WalletResponse::Authenticated {
                    identity_key: session.identity_key().to_hex(),
                })
            }
            WalletCommand::Logout => {
                self.manager.logout().await?;
                Ok(WalletResponse::LoggedOut)
            }
            WalletCommand::DerivePayment {
                recipient_public_key,
                amount_satoshis,
            } => {
                let session = self.manager.session().await.ok_or(WalletError::NoSession)?;
                let result = session
                    .send_payment(&recipient_public_key, amount_satoshis)
                    .await?;
                Ok(WalletResponse::PaymentSent { txid: result.txid })
            }
            WalletCommand::IdentityKey => {
                let identity_key = self.manager.identity_key().await?;
                Ok(WalletResponse::IdentityKey {
                    identity_key: identity_key.to_hex(),
                })
            }
        }
    }

    /// Parse and dispatch a raw bridge message in one step
    pub async fn handle_raw(&self, raw: &str) -> WalletResult<WalletResponse> {
        let command = WalletCommand::parse(raw)?;
        self.dispatch(command).await
    }
}
