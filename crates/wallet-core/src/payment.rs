//! Non-interactive one-time payment derivation (sender and recipient side)
//!
//! For every payment the sender draws a fresh nonce pair, derives a one-time
//! output key from (own scalar, recipient identity key, nonce) and submits a
//! single-output Action whose custom instructions let the recipient redo the
//! derivation with roles reversed. An observer who only sees the chain cannot
//! link the output back to the recipient's identity key.

use crate::error::{WalletError, WalletResult};
use crate::keys::{IdentityKey, KeyDeriver};
use crate::script;
use crate::store::{ActionOptions, ActionOutput, CreateActionArgs, CreateActionResult, WalletStore};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k256::SecretKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Protocol identifier bound into every derivation invoice
pub const PAYMENT_PROTOCOL_ID: &str = "3241645161d8";

/// Scheme tag carried in custom instructions; fixes the 8-byte nonce-half
/// convention as part of the protocol version
pub const SCHEME_TAG: &str = "one-time-derivation-v1";

/// Byte length of each nonce half
const NONCE_HALF_LEN: usize = 8;

/// Total fixed supply of the ledger in satoshis (21M coins)
pub const MAX_SATOSHIS: u64 = 2_100_000_000_000_000;

/// Per-payment derivation salt: two independently drawn random halves
///
/// Never reused; a repeated pair would make two payments linkable and could
/// collide one-time addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationNonce {
    pub prefix: String,
    pub suffix: String,
}

impl DerivationNonce {
    /// Draw a fresh nonce pair from the OS entropy source
    ///
    /// Entropy failure is fatal to the payment attempt; a fixed or
    /// predictable nonce is never substituted.
    pub fn generate() -> WalletResult<Self> {
        Ok(Self {
            prefix: random_half()?,
            suffix: random_half()?,
        })
    }

    /// Key ID for the derivation: prefix, single space, suffix
    pub fn key_id(&self) -> String {
        format!("{} {}", self.prefix, self.suffix)
    }
}

fn random_half() -> WalletResult<String> {
    use rand::RngCore;

    let mut bytes = [0u8; NONCE_HALF_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| WalletError::EntropyUnavailable(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// Spend-recovery metadata attached to a payment output
///
/// `counterparty` is the *sender's* identity key: from the recipient's point
/// of view the sender is their counterparty, and this is what lets the
/// recipient redo the derivation with roles reversed. The `type` field
/// versions the scheme; recovery rejects tags it does not know rather than
/// guessing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    pub derivation_prefix: String,
    pub derivation_suffix: String,
    pub counterparty: IdentityKey,
    #[serde(rename = "type")]
    pub scheme: String,
}

impl PaymentInstructions {
    fn key_id(&self) -> String {
        format!("{} {}", self.derivation_prefix, self.derivation_suffix)
    }
}

/// A payment fully derived and ready to submit
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub recipient: IdentityKey,
    pub amount_satoshis: u64,
    pub derived_output_key: IdentityKey,
    pub locking_script: String,
    /// Base58check rendering of the one-time output, for display and
    /// transaction-history surfaces
    pub derived_address: String,
    pub nonce: DerivationNonce,
}

/// Sender-side payment derivation over an authenticated session's deriver
pub struct PaymentDeriver<'a> {
    deriver: &'a KeyDeriver,
}

impl<'a> PaymentDeriver<'a> {
    pub fn new(deriver: &'a KeyDeriver) -> Self {
        Self { deriver }
    }

    /// Derive a fresh one-time output for `recipient`
    ///
    /// Validates amount and counterparty before any nonce draw or
    /// derivation; rejection here never touches the network.
    pub fn derive_intent(
        &self,
        recipient: &str,
        amount_satoshis: u64,
    ) -> WalletResult<PaymentIntent> {
        if amount_satoshis == 0 || amount_satoshis > MAX_SATOSHIS {
            warn!(amount_satoshis, "Rejecting out-of-range payment amount");
            return Err(WalletError::AmountOutOfRange(amount_satoshis));
        }
        let recipient = IdentityKey::parse(recipient)?;

        let nonce = DerivationNonce::generate()?;
        let derived_output_key =
            self.deriver
                .derive_output_key(&recipient, PAYMENT_PROTOCOL_ID, &nonce.key_id())?;
        let locking_script = script::p2pkh_locking_script(&derived_output_key);
        let derived_address = script::p2pkh_address(&derived_output_key);

        debug!(
            recipient = %recipient,
            address = %derived_address,
            "Derived one-time payment output"
        );

        Ok(PaymentIntent {
            recipient,
            amount_satoshis,
            derived_output_key,
            locking_script,
            derived_address,
            nonce,
        })
    }

    /// Assemble the single-output Action for an intent
    ///
    /// Output randomization and delayed broadcast are disabled: instructions
    /// are positionally associated with their output, and the sender expects
    /// synchronous construction.
    pub fn to_action(&self, intent: &PaymentIntent) -> CreateActionArgs {
        CreateActionArgs {
            description: "mobile p2p payment".to_string(),
            outputs: vec![ActionOutput {
                locking_script: intent.locking_script.clone(),
                satoshis: intent.amount_satoshis,
                output_description: "the funds".to_string(),
                custom_instructions: PaymentInstructions {
                    derivation_prefix: intent.nonce.prefix.clone(),
                    derivation_suffix: intent.nonce.suffix.clone(),
                    counterparty: self.deriver.identity_key().clone(),
                    scheme: SCHEME_TAG.to_string(),
                },
            }],
            options: ActionOptions {
                randomize_outputs: false,
                accept_delayed_broadcast: false,
            },
        }
    }

    /// Derive and submit a payment in one step
    ///
    /// The intent is consumed into the submitted Action; only the Action's
    /// custom instructions retain the derivation metadata afterwards.
    pub async fn send_payment(
        &self,
        store: &dyn WalletStore,
        recipient: &str,
        amount_satoshis: u64,
    ) -> WalletResult<CreateActionResult> {
        let intent = self.derive_intent(recipient, amount_satoshis)?;
        let action = self.to_action(&intent);

        let result = store
            .create_action(action)
            .await
            .map_err(|e| match e {
                err @ WalletError::BackendRequestFailed(_) => err,
                other => WalletError::BackendRequestFailed(other.to_string()),
            })?;

        info!(
            txid = %result.txid,
            satoshis = amount_satoshis,
            "Payment action constructed"
        );
        Ok(result)
    }
}

/// Recipient-side recovery of a received one-time output
///
/// Recomputes the output key the sender derived, plus the matching spending
/// secret, from the instructions attached to the output and this wallet's
/// own deriver. Unknown scheme tags are rejected, never guessed at.
pub fn recover_output_key(
    deriver: &KeyDeriver,
    instructions: &PaymentInstructions,
) -> WalletResult<(IdentityKey, SecretKey)> {
    if instructions.scheme != SCHEME_TAG {
        return Err(WalletError::UnsupportedScheme(instructions.scheme.clone()));
    }
    let key_id = instructions.key_id();
    let secret =
        deriver.derive_output_secret(&instructions.counterparty, PAYMENT_PROTOCOL_ID, &key_id)?;
    let public = IdentityKey::from_public(secret.public_key());
    Ok((public, secret))
}
