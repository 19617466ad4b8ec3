//! The transaction type: a typed transfer / contract-call / contract-create
//! message with an attached signature.
//!
//! `hashOfTransaction` is computed over the transaction *header* — every
//! field except `sign` — so that signing does not create a circular
//! dependency on its own output. This is the single hash used both for
//! `sign`/`checkSign` and as the mempool/block key.

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

use crate::archive::{Decode, Encode, IArchive, OArchive};
use crate::error::{Error, Result};
use crate::{crypto, now_ts, Address, Balance, Hash, Sign, NULL_ADDRESS, NULL_SIGN};

/// Opaque contract-creation payload. Only meaningful when `to == NULL_ADDRESS`;
/// the EVM-style executor that interprets `message`/`abi` is out of scope
/// here (see [`crate`] root docs) — this type just carries the bytes the
/// wire format names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractData {
    pub message: Vec<u8>,
    pub abi: Vec<u8>,
}

impl Encode for ContractData {
    fn encode(&self, oa: &mut OArchive) {
        oa.write_bytes(&self.message);
        oa.write_bytes(&self.abi);
    }
}

impl Decode for ContractData {
    fn decode(ia: &mut IArchive) -> crate::archive::Result<Self> {
        let message = ia.read_bytes()?;
        let abi = ia.read_bytes()?;
        Ok(Self { message, abi })
    }
}

/// A typed transfer of value, optionally carrying contract call/creation
/// data. See §3/§4.3 for the field invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: Balance,
    pub fee: u64,
    pub timestamp: u32,
    pub data: Vec<u8>,
    pub sign: Sign,
}

impl Transaction {
    /// Writes every field except `sign` — the message that `sign`/`checkSign`
    /// operate over.
    fn serialize_header(&self, oa: &mut OArchive) {
        oa.write_raw(&self.from);
        oa.write_raw(&self.to);
        self.amount.encode(oa);
        oa.write_u64(self.fee);
        oa.write_u32(self.timestamp);
        oa.write_bytes(&self.data);
    }

    /// `sha256(serializeHeader(tx))`, independent of `tx.sign` (§8 property 2).
    pub fn hash_of_transaction(&self) -> Hash {
        let mut oa = OArchive::new();
        self.serialize_header(&mut oa);
        crypto::sha256(&oa.into_bytes())
    }

    /// Signs the transaction with `key`, overwriting `sign`.
    pub fn sign(&mut self, key: &SigningKey) {
        self.sign = crypto::secp256k1_sign(key, &self.hash_of_transaction());
    }

    /// Recovers the signer from `sign` and checks it matches `from`.
    /// A null signature never checks out.
    pub fn check_sign(&self) -> bool {
        if self.sign == NULL_SIGN {
            return false;
        }
        match crypto::secp256k1_recover(&self.sign, &self.hash_of_transaction()) {
            Ok(pubkey) => crypto::address_from_pubkey(&pubkey) == self.from,
            Err(_) => false,
        }
    }

    /// `to == NULL_ADDRESS` denotes contract creation.
    pub fn is_contract_creation(&self) -> bool {
        self.to == NULL_ADDRESS
    }

    /// Decodes `data` as a [`ContractData`] record. Only valid when
    /// [`Transaction::is_contract_creation`] holds.
    pub fn contract_data(&self) -> Result<ContractData> {
        if !self.is_contract_creation() {
            return Err(Error::InvalidArgument("not a contract-creation transaction"));
        }
        let mut ia = IArchive::new(&self.data);
        let cd = ContractData::decode(&mut ia).map_err(Error::Archive)?;
        ia.finish().map_err(Error::Archive)?;
        Ok(cd)
    }

    fn check_amount_invariant(&self) -> Result<()> {
        if !self.is_contract_creation() && self.amount.is_zero() {
            return Err(Error::LogicError(
                "non-contract transaction must carry a positive amount",
            ));
        }
        Ok(())
    }
}

impl Encode for Transaction {
    fn encode(&self, oa: &mut OArchive) {
        self.serialize_header(oa);
        oa.write_raw(&self.sign);
    }
}

impl Decode for Transaction {
    fn decode(ia: &mut IArchive) -> crate::archive::Result<Self> {
        let from: Address = Decode::decode(ia)?;
        let to: Address = Decode::decode(ia)?;
        let amount = Balance::decode(ia)?;
        let fee = ia.read_u64()?;
        let timestamp = ia.read_u32()?;
        let data = ia.read_bytes()?;
        let sign: Sign = {
            let bytes = ia.read_raw(65)?;
            let mut out = [0u8; 65];
            out.copy_from_slice(bytes);
            out
        };
        Ok(Transaction { from, to, amount, fee, timestamp, data, sign })
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "from: {} to: {} amount: {} fee: {} timestamp: {}",
            crypto::base58_encode(&self.from),
            crypto::base58_encode(&self.to),
            self.amount,
            self.fee,
            self.timestamp
        )
    }
}

/// Fluent builder accumulating optional fields; fails to build if a
/// required field (`from`, `to`, `amount`, `fee`) is missing.
#[derive(Default)]
pub struct TransactionBuilder {
    from: Option<Address>,
    to: Option<Address>,
    amount: Option<Balance>,
    fee: Option<u64>,
    timestamp: Option<u32>,
    data: Option<Vec<u8>>,
    sign: Option<Sign>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    pub fn amount(mut self, amount: Balance) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn sign(mut self, sign: Sign) -> Self {
        self.sign = Some(sign);
        self
    }

    /// Builds the transaction, applying the amount invariant from §3.
    pub fn build(self) -> Result<Transaction> {
        let tx = Transaction {
            from: self.from.ok_or(Error::LogicError("missing `from`"))?,
            to: self.to.ok_or(Error::LogicError("missing `to`"))?,
            amount: self.amount.ok_or(Error::LogicError("missing `amount`"))?,
            fee: self.fee.ok_or(Error::LogicError("missing `fee`"))?,
            timestamp: self.timestamp.unwrap_or_else(now_ts),
            data: self.data.unwrap_or_default(),
            sign: self.sign.unwrap_or(NULL_SIGN),
        };
        tx.check_amount_invariant()?;
        Ok(tx)
    }
}

/// Outcome of executing a transaction against the state manager / `Vm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    Rejected,
    Revert,
    Failed,
}

/// What kind of state transition a transaction performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    None,
    Transfer,
    ContractCall,
    ContractCreation,
}

/// Result of applying a transaction, returned by the RPC-facing `push_transaction`
/// path and by direct calls into the state manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatus {
    pub status: StatusCode,
    pub action: ActionType,
    pub fee_left: u64,
    pub message: String,
}

impl TransactionStatus {
    pub fn new(status: StatusCode, action: ActionType, fee_left: u64, message: impl Into<String>) -> Self {
        Self { status, action, fee_left, message: message.into() }
    }

    /// Mirrors the source's `operator bool`: `true` iff `status == Success`.
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn addr_from(key: &SigningKey) -> Address {
        crypto::address_from_pubkey(key.verifying_key())
    }

    #[test]
    fn hash_is_independent_of_signature() {
        let key = SigningKey::random(&mut OsRng);
        let from = addr_from(&key);
        let mut tx = TransactionBuilder::new()
            .from(from)
            .to([2u8; 20])
            .amount(Balance::from(100u64))
            .fee(1)
            .timestamp(1000)
            .build()
            .unwrap();
        let hash_before = tx.hash_of_transaction();
        tx.sign(&key);
        let hash_after = tx.hash_of_transaction();
        assert_eq!(hash_before, hash_after);
    }

    #[test]
    fn check_sign_true_iff_address_matches_key() {
        let key = SigningKey::random(&mut OsRng);
        let from = addr_from(&key);
        let mut tx = TransactionBuilder::new()
            .from(from)
            .to([2u8; 20])
            .amount(Balance::from(100u64))
            .fee(1)
            .build()
            .unwrap();
        tx.sign(&key);
        assert!(tx.check_sign());

        let other_key = SigningKey::random(&mut OsRng);
        tx.sign(&other_key);
        assert!(!tx.check_sign());
    }

    #[test]
    fn round_trip_through_archive() {
        let key = SigningKey::random(&mut OsRng);
        let from = addr_from(&key);
        let mut tx = TransactionBuilder::new()
            .from(from)
            .to([9u8; 20])
            .amount(Balance::from(42u64))
            .fee(3)
            .timestamp(123456)
            .data(vec![1, 2, 3])
            .build()
            .unwrap();
        tx.sign(&key);

        let mut oa = OArchive::new();
        tx.encode(&mut oa);
        let bytes = oa.into_bytes();

        let mut ia = IArchive::new(&bytes);
        let decoded = Transaction::decode(&mut ia).unwrap();
        ia.finish().unwrap();

        assert_eq!(tx, decoded);
    }

    #[test]
    fn non_contract_transfer_rejects_zero_amount() {
        let err = TransactionBuilder::new()
            .from([1u8; 20])
            .to([2u8; 20])
            .amount(Balance::zero())
            .fee(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::LogicError(_)));
    }

    #[test]
    fn contract_creation_allows_zero_amount() {
        let tx = TransactionBuilder::new()
            .from([1u8; 20])
            .to(NULL_ADDRESS)
            .amount(Balance::zero())
            .fee(0)
            .build()
            .unwrap();
        assert!(tx.is_contract_creation());
    }
}
