//! Pay-to-public-key-hash locking commitments

use crate::keys::IdentityKey;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Address version byte for mainnet P2PKH
const ADDRESS_VERSION: u8 = 0x00;

// Script opcodes
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// RIPEMD160(SHA256(data)), the standard public key hash
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// P2PKH locking script for a derived output key, hex-encoded
///
/// `OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_locking_script(key: &IdentityKey) -> String {
    let pkh = hash160(&key.to_sec1_bytes());
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(&pkh);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    hex::encode(script)
}

/// Base58check address for a derived output key
pub fn p2pkh_address(key: &IdentityKey) -> String {
    let pkh = hash160(&key.to_sec1_bytes());
    bs58::encode(pkh)
        .with_check_version(ADDRESS_VERSION)
        .into_string()
}
