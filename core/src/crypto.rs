//! Cryptographic façade.
//!
//! Pure functions only — no global state. Everything else in the crate
//! reaches the outside cryptographic world exclusively through this module,
//! so swapping an algorithm later (e.g. a different curve) touches one file.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::{Address, Hash, Sign};

/// Sha256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> Hash {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Ripemd160 digest of `bytes`.
pub fn ripemd160(bytes: &[u8]) -> [u8; 20] {
    let digest = Ripemd160::digest(bytes);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

pub fn base58_encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

pub fn base58_decode(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s)
        .into_vec()
        .map_err(|_| Error::InvalidArgument("invalid base58"))
}

pub fn base64_encode(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(bytes)
}

pub fn base64_decode(s: &str) -> Result<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|_| Error::InvalidArgument("invalid base64"))
}

/// Signs `msg32` (a digest, never raw message bytes) with `priv_key`,
/// returning a 65-byte canonical signature: `r(32) || s(32) || recovery_id(1)`.
pub fn secp256k1_sign(priv_key: &SigningKey, msg32: &Hash) -> Sign {
    let (sig, recid): (EcdsaSignature, RecoveryId) = priv_key
        .sign_prehash_recoverable(msg32)
        .expect("signing a 32-byte prehash cannot fail");
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recid.to_byte();
    out
}

/// Recovers the public key that produced `sig` over `msg32`.
pub fn secp256k1_recover(sig: &Sign, msg32: &Hash) -> Result<VerifyingKey> {
    let signature = EcdsaSignature::from_slice(&sig[..64])
        .map_err(|_| Error::InvalidSignature)?;
    let recid = RecoveryId::from_byte(sig[64]).ok_or(Error::InvalidSignature)?;
    VerifyingKey::recover_from_prehash(msg32, &signature, recid).map_err(|_| Error::InvalidSignature)
}

/// Verifies `sig` over `msg32` against a known public key, without recovery.
pub fn secp256k1_verify(pubkey: &VerifyingKey, msg32: &Hash, sig: &Sign) -> bool {
    let signature = match EcdsaSignature::from_slice(&sig[..64]) {
        Ok(s) => s,
        Err(_) => return false,
    };
    pubkey.verify_prehash(msg32, &signature).is_ok()
}

/// Derives a 20-byte address from a public key: the bottom 20 bytes of the
/// Sha256 hash of its uncompressed point coordinates.
pub fn address_from_pubkey(pubkey: &VerifyingKey) -> Address {
    let encoded = pubkey.to_encoded_point(false);
    let digest = sha256(&encoded.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..32]);
    addr
}

/// Derives a contract address per §3: `ripemd160(code_hash || creator || ascii(nonce+1))`.
pub fn contract_address(code_hash: &Hash, creator: &Address, nonce_after_bump: u64) -> Address {
    let mut preimage = Vec::with_capacity(32 + 20 + 20);
    preimage.extend_from_slice(code_hash);
    preimage.extend_from_slice(creator);
    preimage.extend_from_slice(nonce_after_bump.to_string().as_bytes());
    ripemd160(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_and_recover_round_trip() {
        let key = SigningKey::random(&mut OsRng);
        let msg = sha256(b"hello obscura");
        let sig = secp256k1_sign(&key, &msg);
        let recovered = secp256k1_recover(&sig, &msg).unwrap();
        assert_eq!(recovered, *key.verifying_key());
    }

    #[test]
    fn address_matches_pubkey_derivation() {
        let key = SigningKey::random(&mut OsRng);
        let addr1 = address_from_pubkey(key.verifying_key());
        let addr2 = address_from_pubkey(key.verifying_key());
        assert_eq!(addr1, addr2);
    }

    #[test]
    fn base58_round_trips() {
        let bytes = [1u8, 2, 3, 4, 5];
        let encoded = base58_encode(&bytes);
        assert_eq!(base58_decode(&encoded).unwrap(), bytes.to_vec());
    }

    #[test]
    fn base64_round_trips() {
        let bytes = [9u8, 8, 7, 6];
        let encoded = base64_encode(&bytes);
        assert_eq!(base64_decode(&encoded).unwrap(), bytes.to_vec());
    }
}
