//! Obscura Core Library
//!
//! Provides the consensus-adjacent data structures shared by every other
//! crate in the workspace: the binary serialization archive, the crypto
//! façade, the account/contract world state, transactions, blocks, and the
//! mempool/chain manager that ties them together.
//!
//! Contract *execution* is out of scope: a contract-creation transaction's
//! `data` decodes to [`transaction::ContractData`] and a contract account
//! carries a `code_hash`, but the VM that would interpret that code against
//! a call is treated as an external collaborator this crate never invokes.

pub mod archive;
pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod pow;
pub mod state;
pub mod transaction;

pub use error::{Error, Result};

use std::time::{SystemTime, UNIX_EPOCH};

/// 32-byte Sha256 digest used for block/transaction hashes and content
/// addressing of contract code.
pub type Hash = [u8; 32];

/// 20-byte account identifier, derived either from a public key or (for
/// contract accounts) from `ripemd160(code_hash || creator || nonce)`.
pub type Address = [u8; 20];

/// Unsigned 256-bit amount. All arithmetic on it is checked.
pub type Balance = primitive_types::U256;

/// Fixed-size canonical secp256k1 signature: `r || s || recovery_id`.
pub type Sign = [u8; 65];

/// All-zero hash, used as `prev_block_hash` for genesis and as the code
/// hash of non-contract accounts.
pub const NULL_HASH: Hash = [0u8; 32];

/// All-zero address, meaning "no recipient" (contract creation).
pub const NULL_ADDRESS: Address = [0u8; 20];

/// All-zero signature, meaning "unsigned".
pub const NULL_SIGN: Sign = [0u8; 65];

/// Seconds since the Unix epoch, truncated to 32 bits per the wire format.
pub fn now_ts() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs() as u32
}
