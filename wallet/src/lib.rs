//! Obscura Wallet
//!
//! A thin keypair/address wrapper around `core::crypto`'s secp256k1
//! primitives, used by the `cli`'s `Wallet` subcommand and by tests that
//! need signed transactions.

use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use thiserror::Error;

use obscura_core::transaction::Transaction;
use obscura_core::{crypto, Address};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid private key hex: {0}")]
    InvalidKey(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;

/// A keypair plus the address it derives to.
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Generates a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = crypto::address_from_pubkey(signing_key.verifying_key());
        Self { signing_key, address }
    }

    /// Loads a wallet from a hex-encoded 32-byte secret scalar.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str).map_err(|_| Error::InvalidKey("not valid hex"))?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| Error::InvalidKey("not a valid secp256k1 scalar"))?;
        let address = crypto::address_from_pubkey(signing_key.verifying_key());
        Ok(Self { signing_key, address })
    }

    pub fn to_secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn address_base58(&self) -> String {
        crypto::base58_encode(&self.address)
    }

    /// Signs `tx` in place, setting its `sign` field.
    pub fn sign_transaction(&self, tx: &mut Transaction) {
        tx.sign(&self.signing_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscura_core::transaction::TransactionBuilder;
    use obscura_core::Balance;

    #[test]
    fn generated_wallet_signs_transactions_it_can_verify() {
        let wallet = Wallet::generate();
        let mut tx = TransactionBuilder::new()
            .from(wallet.address())
            .to([2u8; 20])
            .amount(Balance::from(10u64))
            .fee(1)
            .build()
            .unwrap();
        wallet.sign_transaction(&mut tx);
        assert!(tx.check_sign());
    }

    #[test]
    fn secret_hex_round_trips_to_the_same_address() {
        let wallet = Wallet::generate();
        let hex_secret = wallet.to_secret_hex();
        let reloaded = Wallet::from_secret_hex(&hex_secret).unwrap();
        assert_eq!(wallet.address(), reloaded.address());
    }

    #[test]
    fn invalid_hex_is_rejected() {
        assert!(Wallet::from_secret_hex("not hex").is_err());
    }
}
