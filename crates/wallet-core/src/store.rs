//! Wallet storage/signing service boundary
//!
//! The core submits transaction-construction requests ("Actions") to an
//! external service and treats the result as opaque beyond success or
//! failure. Input selection, signing, broadcast and the wire protocol all
//! live on the far side of this trait.

use crate::error::WalletResult;
use crate::keys::IdentityKey;
use crate::payment::PaymentInstructions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One output of an Action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutput {
    /// Hex-encoded locking script committing to the derived output key
    pub locking_script: String,
    pub satoshis: u64,
    pub output_description: String,
    /// Spend-recovery metadata for the recipient, positionally associated
    /// with this output
    pub custom_instructions: PaymentInstructions,
}

/// Options controlling Action construction
///
/// Output order must stay as specified because custom instructions are
/// positionally associated, and the sender expects synchronous construction,
/// so both flags are always off for payment Actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOptions {
    pub randomize_outputs: bool,
    pub accept_delayed_broadcast: bool,
}

/// A transaction-construction request for the external service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActionArgs {
    pub description: String,
    pub outputs: Vec<ActionOutput>,
    pub options: ActionOptions,
}

/// Opaque construction result; the core only inspects the reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActionResult {
    pub txid: String,
}

/// External wallet storage/signing service
///
/// The core performs no implicit retries and no timeout fallback against
/// this boundary; transient failures surface as `BackendRequestFailed` and
/// retry policy belongs to the caller.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Handshake: bind the backend to the given identity key and confirm it
    /// is reachable. A session is only ready once this succeeds.
    async fn make_available(&self, identity_key: &IdentityKey) -> WalletResult<()>;

    /// Submit an Action for construction and signing
    async fn create_action(&self, args: CreateActionArgs) -> WalletResult<CreateActionResult>;
}

/// In-memory wallet store that records submitted Actions
///
/// Backend stand-in for tests and development; real deployments wire a
/// remote client through the same trait.
#[derive(Default)]
pub struct MemoryWalletStore {
    actions: RwLock<Vec<CreateActionArgs>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions submitted so far, oldest first
    pub async fn submitted(&self) -> Vec<CreateActionArgs> {
        self.actions.read().await.clone()
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn make_available(&self, _identity_key: &IdentityKey) -> WalletResult<()> {
        Ok(())
    }

    async fn create_action(&self, args: CreateActionArgs) -> WalletResult<CreateActionResult> {
        let mut actions = self.actions.write().await;
        let txid = format!("local-{:04}", actions.len());
        actions.push(args);
        Ok(CreateActionResult { txid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::SCHEME_TAG;

    fn sample_args() -> CreateActionArgs {
        CreateActionArgs {
            description: "mobile p2p payment".to_string(),
            outputs: vec![ActionOutput {
                locking_script: "76a914000000000000000000000000000000000000000088ac".to_string(),
                satoshis: 1000,
                output_description: "the funds".to_string(),
                custom_instructions: PaymentInstructions {
                    derivation_prefix: "cHJlZml4".to_string(),
                    derivation_suffix: "c3VmZml4".to_string(),
                    counterparty: test_identity(),
                    scheme: SCHEME_TAG.to_string(),
                },
            }],
            options: ActionOptions {
                randomize_outputs: false,
                accept_delayed_broadcast: false,
            },
        }
    }

    fn test_identity() -> IdentityKey {
        let deriver = crate::keys::KeyDeriver::from_root(
            &crate::keys::PrivateScalar::from_hex(&format!("{}05", "00".repeat(31))).unwrap(),
        )
        .unwrap();
        deriver.identity_key().clone()
    }

    #[tokio::test]
    async fn test_memory_store_records_actions() {
        let store = MemoryWalletStore::new();
        let result = store.create_action(sample_args()).await.unwrap();
        assert_eq!(result.txid, "local-0000");

        let submitted = store.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].outputs[0].satoshis, 1000);
    }

    #[test]
    fn test_action_serializes_with_camel_case_wire_names() {
        let json = serde_json::to_value(sample_args()).unwrap();

        assert_eq!(json["options"]["randomizeOutputs"], false);
        assert_eq!(json["options"]["acceptDelayedBroadcast"], false);
        let output = &json["outputs"][0];
        assert!(output["lockingScript"].is_string());
        assert_eq!(output["customInstructions"]["type"], SCHEME_TAG);
        assert!(output["customInstructions"]["derivationPrefix"].is_string());
        assert!(output["customInstructions"]["counterparty"].is_string());
    }
}
