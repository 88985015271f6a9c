//! Identity keys and two-party payment key derivation
//!
//! The root private scalar never leaves the custodian except into the
//! session's `KeyDeriver`, which derives the long-lived identity key pair and
//! the per-payment one-time output keys. Derivation is a non-interactive
//! ECDH construction: both parties can compute the same child key from their
//! own secret, the other party's public identity key, and a shared key ID.

use crate::error::{WalletError, WalletResult};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ProjectivePoint, PublicKey, Scalar, SecretKey, U256};
use sha2::Sha256;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Domain separation tag for the root-to-identity derivation
const IDENTITY_KDF_TAG: &[u8] = b"wallet identity v1";

/// Security level prefix used in derivation invoice numbers
pub const SECURITY_LEVEL: u8 = 2;

/// Length of a compressed SEC1 public key in hex characters
const COMPRESSED_HEX_LEN: usize = 66;

/// The root private scalar, sole root of trust for a wallet
///
/// Exactly zero or one of these exists in persistent storage per device
/// profile. The custodian hands it transiently to [`KeyDeriver::from_root`]
/// and nothing else.
pub struct PrivateScalar(SecretKey);

impl PrivateScalar {
    /// Generate a fresh scalar from the OS entropy source
    ///
    /// Fails with `EntropyUnavailable` if the source cannot be read. Never
    /// returns a zero or partially-generated scalar.
    pub fn generate() -> WalletResult<Self> {
        use rand::RngCore;

        let mut bytes = [0u8; 32];
        // A draw landing outside the scalar field is astronomically unlikely
        // but cheap to retry.
        for _ in 0..8 {
            rand::rngs::OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| WalletError::EntropyUnavailable(e.to_string()))?;
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                bytes.zeroize();
                return Ok(Self(secret));
            }
        }
        bytes.zeroize();
        Err(WalletError::EntropyUnavailable(
            "entropy source repeatedly produced an invalid scalar".into(),
        ))
    }

    /// Parse a scalar from its hex encoding at rest
    ///
    /// Bytes that do not form a valid non-zero scalar in the secp256k1 field
    /// are `CorruptKeyMaterial`, which is fatal: the caller must never try to
    /// repair the value in place.
    pub fn from_hex(encoded: &str) -> WalletResult<Self> {
        let mut bytes = hex::decode(encoded)
            .map_err(|e| WalletError::CorruptKeyMaterial(format!("not hex: {}", e)))?;
        if bytes.len() != 32 {
            let len = bytes.len();
            bytes.zeroize();
            return Err(WalletError::CorruptKeyMaterial(format!(
                "expected 32 bytes, found {}",
                len
            )));
        }
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|_| WalletError::CorruptKeyMaterial("not a valid field scalar".into()));
        bytes.zeroize();
        Ok(Self(secret?))
    }

    /// Hex encoding used for the secure storage slot
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub(crate) fn secret_scalar(&self) -> Scalar {
        *self.0.to_nonzero_scalar()
    }
}

impl std::fmt::Debug for PrivateScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.write_str("PrivateScalar(..)")
    }
}

/// A shareable public identity key (compressed SEC1 point)
///
/// This is the wallet's long-lived address for receiving and the
/// counterparty handle in payment derivation. Rendered and transmitted as
/// its canonical compressed hex encoding (`02`/`03` prefix, 33 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey(PublicKey);

impl IdentityKey {
    /// Parse a compressed-hex identity key scanned from external input
    ///
    /// Length and encoding are validated before the value is usable as a
    /// counterparty; anything else is `InvalidCounterparty`, never coerced.
    pub fn parse(encoded: &str) -> WalletResult<Self> {
        let encoded = encoded.trim();
        if encoded.len() != COMPRESSED_HEX_LEN {
            return Err(WalletError::InvalidCounterparty(format!(
                "expected {} hex characters, found {}",
                COMPRESSED_HEX_LEN,
                encoded.len()
            )));
        }
        let bytes = hex::decode(encoded)
            .map_err(|e| WalletError::InvalidCounterparty(format!("not hex: {}", e)))?;
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(WalletError::InvalidCounterparty(
                "not a compressed point encoding".into(),
            ));
        }
        let public = PublicKey::from_sec1_bytes(&bytes)
            .map_err(|_| WalletError::InvalidCounterparty("point is not on the curve".into()))?;
        Ok(Self(public))
    }

    /// Canonical compressed hex encoding (QR / clipboard representation)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_encoded_point(true).as_bytes())
    }

    /// Compressed SEC1 bytes (33 bytes)
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    pub(crate) fn from_public(public: PublicKey) -> Self {
        Self(public)
    }

    fn as_point(&self) -> ProjectivePoint {
        ProjectivePoint::from(*self.0.as_affine())
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl serde::Serialize for IdentityKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for IdentityKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = <String as serde::Deserialize>::deserialize(deserializer)?;
        IdentityKey::parse(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Deterministic key deriver bound to one identity key pair
///
/// Created once per session from the custodied root scalar. The identity
/// scalar is a one-way function of the root, so the published identity key is
/// stable across reinstalls that restore the same backed-up scalar, while the
/// root itself is never recoverable from session state.
pub struct KeyDeriver {
    identity_secret: SecretKey,
    identity_public: IdentityKey,
}

impl KeyDeriver {
    /// Derive the session identity key pair from the root scalar
    pub fn from_root(root: &PrivateScalar) -> WalletResult<Self> {
        let root_bytes = root.0.to_bytes();
        let identity_scalar = hash_to_scalar(&root_bytes, IDENTITY_KDF_TAG)?;
        if bool::from(identity_scalar.is_zero()) {
            return Err(WalletError::KeyDerivationFailed(
                "identity scalar reduced to zero".into(),
            ));
        }
        let identity_secret = SecretKey::from_bytes(&identity_scalar.to_bytes())
            .map_err(|e| WalletError::KeyDerivationFailed(e.to_string()))?;
        let identity_public = IdentityKey(identity_secret.public_key());
        Ok(Self {
            identity_secret,
            identity_public,
        })
    }

    /// The shareable identity key for this session
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_public
    }

    /// Derive the one-time output public key for paying `counterparty`
    ///
    /// `derived = counterparty + H(ecdh(self, counterparty), invoice) * G`
    ///
    /// Deterministic in its three inputs: re-deriving with the same
    /// counterparty, protocol and key ID yields the identical key, which is
    /// what lets the recipient recover the matching private key later.
    pub fn derive_output_key(
        &self,
        counterparty: &IdentityKey,
        protocol_id: &str,
        key_id: &str,
    ) -> WalletResult<IdentityKey> {
        let offset = self.derivation_offset(counterparty, protocol_id, key_id)?;
        let derived = counterparty.as_point() + ProjectivePoint::GENERATOR * offset;
        let public = PublicKey::from_affine(derived.to_affine())
            .map_err(|_| WalletError::KeyDerivationFailed("derived point is the identity".into()))?;
        Ok(IdentityKey(public))
    }

    /// Derive the private key matching an output the counterparty sent us
    ///
    /// Role-reversed counterpart of [`derive_output_key`]: `counterparty`
    /// here is the sender's identity key and the result is
    /// `self + H(ecdh(self, counterparty), invoice)` in the scalar field,
    /// which is the spending key for the derived output point.
    ///
    /// [`derive_output_key`]: KeyDeriver::derive_output_key
    pub fn derive_output_secret(
        &self,
        counterparty: &IdentityKey,
        protocol_id: &str,
        key_id: &str,
    ) -> WalletResult<SecretKey> {
        let offset = self.derivation_offset(counterparty, protocol_id, key_id)?;
        let derived = self.secret_scalar() + offset;
        if bool::from(derived.is_zero()) {
            return Err(WalletError::KeyDerivationFailed(
                "derived secret reduced to zero".into(),
            ));
        }
        SecretKey::from_bytes(&derived.to_bytes())
            .map_err(|e| WalletError::KeyDerivationFailed(e.to_string()))
    }

    /// Shared derivation offset `H(ecdh(self, counterparty), invoice)`
    ///
    /// ECDH is symmetric, so both parties compute the same offset from their
    /// own secret and the other's public key.
    fn derivation_offset(
        &self,
        counterparty: &IdentityKey,
        protocol_id: &str,
        key_id: &str,
    ) -> WalletResult<Scalar> {
        let shared = counterparty.as_point() * self.secret_scalar();
        if shared == ProjectivePoint::IDENTITY {
            return Err(WalletError::KeyDerivationFailed(
                "shared secret is the identity point".into(),
            ));
        }
        let shared_bytes = shared.to_affine().to_encoded_point(true);
        let invoice = invoice_number(protocol_id, key_id);
        hash_to_scalar(shared_bytes.as_bytes(), invoice.as_bytes())
    }

    fn secret_scalar(&self) -> Scalar {
        *self.identity_secret.to_nonzero_scalar()
    }
}

impl std::fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("identity", &self.identity_public.to_hex())
            .finish_non_exhaustive()
    }
}

/// Invoice number binding security level, protocol and key ID
fn invoice_number(protocol_id: &str, key_id: &str) -> String {
    format!("{}-{}-{}", SECURITY_LEVEL, protocol_id, key_id)
}

/// HMAC-SHA256 the message under `key`, reduced into the scalar field
fn hash_to_scalar(key: &[u8], message: &[u8]) -> WalletResult<Scalar> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| WalletError::KeyDerivationFailed(e.to_string()))?;
    mac.update(message);
    let digest = mac.finalize().into_bytes();
    Ok(<Scalar as Reduce<U256>>::reduce_bytes(&digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_from_seed(seed: u8) -> PrivateScalar {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        PrivateScalar::from_hex(&hex::encode(bytes)).unwrap()
    }

    #[test]
    fn test_generate_produces_valid_scalar() {
        let scalar = PrivateScalar::generate().unwrap();
        let encoded = scalar.to_hex();
        assert_eq!(encoded.len(), 64, "Scalar should encode to 64 hex chars");

        // Round-trip through the at-rest encoding
        let restored = PrivateScalar::from_hex(&encoded).unwrap();
        assert_eq!(restored.to_hex(), encoded);
    }

    #[test]
    fn test_generate_produces_unique_scalars() {
        let a = PrivateScalar::generate().unwrap();
        let b = PrivateScalar::generate().unwrap();
        assert_ne!(a.to_hex(), b.to_hex(), "Each generation should be unique");
    }

    #[test]
    fn test_from_hex_rejects_corrupt_material() {
        let zero = "00".repeat(32);
        let above_order = "ff".repeat(32);
        let too_long = format!("{}00", "11".repeat(32));
        let corrupt_cases = [
            "",
            "zz",
            "abcd",
            zero.as_str(),
            above_order.as_str(),
            too_long.as_str(),
        ];
        for corrupt in corrupt_cases {
            let result = PrivateScalar::from_hex(corrupt);
            assert!(
                matches!(result, Err(WalletError::CorruptKeyMaterial(_))),
                "Should reject corrupt material: {:?}",
                corrupt
            );
        }
    }

    #[test]
    fn test_identity_key_is_deterministic() {
        let root = scalar_from_seed(7);
        let deriver1 = KeyDeriver::from_root(&root).unwrap();
        let deriver2 = KeyDeriver::from_root(&root).unwrap();
        assert_eq!(
            deriver1.identity_key(),
            deriver2.identity_key(),
            "Same root scalar must yield the same identity key"
        );
    }

    #[test]
    fn test_identity_key_differs_from_root_public() {
        let root = scalar_from_seed(7);
        let root_public = hex::encode(
            root.0
                .public_key()
                .to_encoded_point(true)
                .as_bytes(),
        );
        let deriver = KeyDeriver::from_root(&root).unwrap();
        assert_ne!(
            deriver.identity_key().to_hex(),
            root_public,
            "Identity key must be a one-way derivation, not the root public key"
        );
    }

    #[test]
    fn test_identity_key_parse_round_trip() {
        let deriver = KeyDeriver::from_root(&scalar_from_seed(9)).unwrap();
        let encoded = deriver.identity_key().to_hex();
        assert_eq!(encoded.len(), 66);
        assert!(encoded.starts_with("02") || encoded.starts_with("03"));

        let parsed = IdentityKey::parse(&encoded).unwrap();
        assert_eq!(&parsed, deriver.identity_key());
    }

    #[test]
    fn test_identity_key_parse_rejects_invalid() {
        let uncompressed_prefix = "04".repeat(33);
        let wrong_prefix = "ff".repeat(33);
        let invalid_cases = [
            "",
            "03ab",
            uncompressed_prefix.as_str(),
            wrong_prefix.as_str(),
            "not hex at all, clearly the wrong shape for a public key here!!!!!",
        ];
        for invalid in invalid_cases {
            let result = IdentityKey::parse(invalid);
            assert!(
                matches!(result, Err(WalletError::InvalidCounterparty(_))),
                "Should reject invalid encoding: {:?}",
                invalid
            );
        }
    }

    #[test]
    fn test_derive_output_key_deterministic() {
        let sender = KeyDeriver::from_root(&scalar_from_seed(11)).unwrap();
        let recipient = KeyDeriver::from_root(&scalar_from_seed(13)).unwrap();

        let key1 = sender
            .derive_output_key(recipient.identity_key(), "3241645161d8", "prefix suffix")
            .unwrap();
        let key2 = sender
            .derive_output_key(recipient.identity_key(), "3241645161d8", "prefix suffix")
            .unwrap();

        assert_eq!(key1, key2, "Same inputs must derive the identical key");
    }

    #[test]
    fn test_distinct_key_ids_derive_distinct_keys() {
        let sender = KeyDeriver::from_root(&scalar_from_seed(11)).unwrap();
        let recipient = KeyDeriver::from_root(&scalar_from_seed(13)).unwrap();

        let key1 = sender
            .derive_output_key(recipient.identity_key(), "3241645161d8", "aaaa bbbb")
            .unwrap();
        let key2 = sender
            .derive_output_key(recipient.identity_key(), "3241645161d8", "cccc dddd")
            .unwrap();

        assert_ne!(key1, key2, "Distinct key IDs must derive distinct keys");
    }

    #[test]
    fn test_sender_recipient_round_trip() {
        // The core correctness law: the recipient, holding their own scalar,
        // the sender's identity key and the same key ID, recomputes the key
        // the sender paid to.
        let sender = KeyDeriver::from_root(&scalar_from_seed(21)).unwrap();
        let recipient = KeyDeriver::from_root(&scalar_from_seed(23)).unwrap();
        let key_id = "c29tZSByYW5kb20= bm9uY2UgaGFsZg==";

        let sender_view = sender
            .derive_output_key(recipient.identity_key(), "3241645161d8", key_id)
            .unwrap();

        let recipient_secret = recipient
            .derive_output_secret(sender.identity_key(), "3241645161d8", key_id)
            .unwrap();
        let recipient_view = IdentityKey(recipient_secret.public_key());

        assert_eq!(
            sender_view, recipient_view,
            "Recipient must recover the exact output key the sender derived"
        );
    }

    #[test]
    fn test_derivation_differs_per_counterparty() {
        let sender = KeyDeriver::from_root(&scalar_from_seed(31)).unwrap();
        let recipient_a = KeyDeriver::from_root(&scalar_from_seed(33)).unwrap();
        let recipient_b = KeyDeriver::from_root(&scalar_from_seed(35)).unwrap();

        let key_a = sender
            .derive_output_key(recipient_a.identity_key(), "3241645161d8", "x y")
            .unwrap();
        let key_b = sender
            .derive_output_key(recipient_b.identity_key(), "3241645161d8", "x y")
            .unwrap();

        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_identity_key_serde_as_hex_string() {
        let deriver = KeyDeriver::from_root(&scalar_from_seed(41)).unwrap();
        let key = deriver.identity_key().clone();

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_hex()));

        let restored: IdentityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, key);
    }

    #[test]
    fn test_debug_never_prints_key_material() {
        let root = scalar_from_seed(43);
        let debug = format!("{:?}", root);
        assert!(!debug.contains(&root.to_hex()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn derivation_is_deterministic(seed_a in 1u8..=250, seed_b in 1u8..=250, key_id in "[a-zA-Z0-9+/=]{8,24} [a-zA-Z0-9+/=]{8,24}") {
                prop_assume!(seed_a != seed_b);
                let sender = KeyDeriver::from_root(&scalar_from_seed(seed_a)).unwrap();
                let recipient = KeyDeriver::from_root(&scalar_from_seed(seed_b)).unwrap();

                let k1 = sender.derive_output_key(recipient.identity_key(), "3241645161d8", &key_id).unwrap();
                let k2 = sender.derive_output_key(recipient.identity_key(), "3241645161d8", &key_id).unwrap();
                prop_assert_eq!(k1, k2);
            }

            #[test]
            fn round_trip_law_holds(seed_a in 1u8..=250, seed_b in 1u8..=250, key_id in "[a-zA-Z0-9+/=]{8,24} [a-zA-Z0-9+/=]{8,24}") {
                prop_assume!(seed_a != seed_b);
                let sender = KeyDeriver::from_root(&scalar_from_seed(seed_a)).unwrap();
                let recipient = KeyDeriver::from_root(&scalar_from_seed(seed_b)).unwrap();

                let sender_view = sender.derive_output_key(recipient.identity_key(), "3241645161d8", &key_id).unwrap();
                let secret = recipient.derive_output_secret(sender.identity_key(), "3241645161d8", &key_id).unwrap();
                prop_assert_eq!(sender_view.to_hex(), hex::encode(secret.public_key().to_encoded_point(true).as_bytes()));
            }
        }
    }
}
