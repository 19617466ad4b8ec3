//! The state manager: the account/contract world-state and its update
//! rules under transactions and blocks.
//!
//! Guarded by a single `RwLock` per §5: read-only queries
//! (`has_account`/`get_account`/`get_balance`/`check_transaction`) take the
//! shared lock; mutations take the exclusive lock, held for the whole
//! duration of a block application so the update is atomic (§4.5, §8
//! property 6).
//!
//! Follows the REDESIGN FLAG from §9: `ensure_account` (explicit lazy
//! creation, returned as a guarded mutable view) is a distinct operation
//! from `get_account` (`Option`-returning, never creates), rather than the
//! source's single mutable getter that silently inserts on lookup miss.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{RwLock, RwLockWriteGuard};

use crate::crypto;
use crate::error::{Error, Result};
use crate::{Address, Balance, Hash, NULL_HASH};

/// A single key/value storage slot inside a contract account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageValue {
    pub data: Vec<u8>,
    pub was_modified: bool,
}

/// The state of one account: nonce, balance, and (for contracts) code hash
/// plus key/value storage. `code_hash == NULL_HASH` iff this is a plain
/// client account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: Balance,
    pub code_hash: Hash,
    pub storage: HashMap<Hash, StorageValue>,
}

impl AccountState {
    pub fn new(code_hash: Hash) -> Self {
        Self {
            nonce: 0,
            balance: Balance::zero(),
            code_hash,
            storage: HashMap::new(),
        }
    }

    pub fn is_contract(&self) -> bool {
        self.code_hash != NULL_HASH
    }

    pub fn check_storage_value(&self, key: &Hash) -> bool {
        self.storage.contains_key(key)
    }

    pub fn get_storage_value(&self, key: &Hash) -> Option<&StorageValue> {
        self.storage.get(key)
    }

    pub fn set_storage_value(&mut self, key: Hash, data: Vec<u8>) {
        self.storage.insert(key, StorageValue { data, was_modified: true });
    }
}

/// A guarded mutable view into one account, created on demand by
/// [`StateManager::ensure_account`]. Holds the exclusive lock for its
/// lifetime, mirroring a `&mut AccountState` without letting the lock
/// outlive the map.
pub struct AccountRefMut<'a> {
    guard: RwLockWriteGuard<'a, HashMap<Address, AccountState>>,
    addr: Address,
}

impl Deref for AccountRefMut<'_> {
    type Target = AccountState;
    fn deref(&self) -> &AccountState {
        self.guard.get(&self.addr).expect("account created by ensure_account")
    }
}

impl DerefMut for AccountRefMut<'_> {
    fn deref_mut(&mut self) -> &mut AccountState {
        self.guard.get_mut(&self.addr).expect("account created by ensure_account")
    }
}

/// The authoritative world-state: accounts and, alongside it, the
/// content-addressed contract code store.
#[derive(Debug, Default)]
pub struct StateManager {
    accounts: RwLock<HashMap<Address, AccountState>>,
    code: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_account(&self, addr: &Address) -> bool {
        self.accounts.read().unwrap().contains_key(addr)
    }

    /// Returns a clone of the account state, or `None` if it does not exist.
    /// Never creates an account — see [`StateManager::ensure_account`] for
    /// the lazy-creation counterpart.
    pub fn get_account(&self, addr: &Address) -> Option<AccountState> {
        self.accounts.read().unwrap().get(addr).cloned()
    }

    /// 0 for non-existent accounts.
    pub fn get_balance(&self, addr: &Address) -> Balance {
        self.get_account(addr).map(|a| a.balance).unwrap_or_else(Balance::zero)
    }

    /// Sender exists and has a balance at least `tx.amount`.
    pub fn check_transaction(&self, tx: &crate::transaction::Transaction) -> bool {
        self.accounts
            .read()
            .unwrap()
            .get(&tx.from)
            .map(|a| a.balance >= tx.amount)
            .unwrap_or(false)
    }

    /// Creates `addr` with `code_hash`. Errors if it already exists.
    pub fn new_account(&self, addr: Address, code_hash: Hash) -> Result<()> {
        let mut guard = self.accounts.write().unwrap();
        if guard.contains_key(&addr) {
            return Err(Error::AccountExists);
        }
        guard.insert(addr, AccountState::new(code_hash));
        Ok(())
    }

    /// Explicit lazy-creation accessor: inserts a default account if absent
    /// and returns a guarded mutable view.
    pub fn ensure_account(&self, addr: Address) -> AccountRefMut<'_> {
        let mut guard = self.accounts.write().unwrap();
        guard.entry(addr).or_insert_with(|| AccountState::new(NULL_HASH));
        AccountRefMut { guard, addr }
    }

    /// Bumps `creator_addr`'s nonce, derives the deterministic contract
    /// address per §3, creates it, and returns the new address.
    pub fn new_contract(&self, creator_addr: Address, code_hash: Hash) -> Result<Address> {
        let nonce_after_bump = {
            let mut account = self.ensure_account(creator_addr);
            account.nonce += 1;
            account.nonce
        };
        let contract_addr = crypto::contract_address(&code_hash, &creator_addr, nonce_after_bump);
        self.new_account(contract_addr, code_hash)?;
        Ok(contract_addr)
    }

    /// Atomic check-then-act transfer. Creates `to` with a null code hash
    /// if it does not yet exist. Returns `false` rather than erroring when
    /// the sender is unknown or underfunded.
    pub fn try_transfer_money(&self, from: &Address, to: &Address, amount: Balance) -> bool {
        let mut guard = self.accounts.write().unwrap();
        let has_enough = match guard.get(from) {
            Some(account) => account.balance >= amount,
            None => false,
        };
        if !has_enough {
            return false;
        }
        guard.get_mut(from).unwrap().balance -= amount;
        guard.entry(*to).or_insert_with(|| AccountState::new(NULL_HASH)).balance += amount;
        true
    }

    /// Debits `amount + fee` from the sender, credits `amount` to the
    /// (lazily created) receiver, and increments the sender's nonce. The
    /// fee is not credited anywhere here — the caller (block application)
    /// sweeps collected fees into the coinbase once the whole block has
    /// applied cleanly.
    pub fn update_transaction(&self, tx: &crate::transaction::Transaction) -> Result<()> {
        let mut guard = self.accounts.write().unwrap();
        self.update_transaction_locked(&mut guard, tx)
    }

    fn update_transaction_locked(
        &self,
        guard: &mut HashMap<Address, AccountState>,
        tx: &crate::transaction::Transaction,
    ) -> Result<()> {
        let total_debit = tx
            .amount
            .checked_add(Balance::from(tx.fee))
            .ok_or(Error::InsufficientFunds)?;
        let from_state = guard.get_mut(&tx.from).ok_or(Error::InsufficientFunds)?;
        if from_state.balance < total_debit {
            return Err(Error::InsufficientFunds);
        }
        from_state.balance -= total_debit;
        from_state.nonce += 1;
        guard
            .entry(tx.to)
            .or_insert_with(|| AccountState::new(NULL_HASH))
            .balance += tx.amount;
        Ok(())
    }

    /// Applies every transaction in `block` in insertion order, crediting
    /// `reward` plus the sum of collected fees to `block.coinbase`.
    ///
    /// Not a no-op-on-failure loop: the whole application is atomic. If any
    /// transaction fails, the account map is left exactly as it was before
    /// the call (§8 property 6) — this is the hardened behavior called for
    /// by the REDESIGN FLAG in §9, which notes the source applied
    /// transactions one at a time and left partial state on failure.
    pub fn update_block(&self, block: &crate::block::Block, reward: u64) -> Result<()> {
        let mut guard = self.accounts.write().unwrap();
        let snapshot = guard.clone();

        let mut fee_sum: u64 = 0;
        for tx in block.transactions.iter() {
            if let Err(e) = self.update_transaction_locked(&mut guard, tx) {
                *guard = snapshot;
                return Err(e);
            }
            fee_sum += tx.fee;
        }

        let total_reward = Balance::from(reward) + Balance::from(fee_sum);
        guard
            .entry(block.coinbase)
            .or_insert_with(|| AccountState::new(NULL_HASH))
            .balance += total_reward;
        Ok(())
    }

    /// Genesis-only path: every transaction's `to` becomes a new account
    /// with `balance = amount`; there are no sender debits.
    pub fn update_from_genesis(&self, block: &crate::block::Block) -> Result<()> {
        let mut guard = self.accounts.write().unwrap();
        for tx in block.transactions.iter() {
            guard.entry(tx.to).or_insert_with(|| AccountState::new(NULL_HASH)).balance += tx.amount;
        }
        Ok(())
    }

    pub fn total_balance(&self) -> Balance {
        self.accounts.read().unwrap().values().fold(Balance::zero(), |acc, a| acc + a.balance)
    }

    pub fn get_code(&self, hash: &Hash) -> Option<Vec<u8>> {
        self.code.read().unwrap().get(hash).cloned()
    }

    /// Computes `sha256(code)` internally; idempotent.
    pub fn save_code(&self, code: Vec<u8>) -> Hash {
        let hash = crypto::sha256(&code);
        self.code.write().unwrap().entry(hash).or_insert(code);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, TransactionsSet};
    use crate::transaction::TransactionBuilder;

    fn tx(from: u8, to: u8, amount: u64, fee: u64) -> crate::transaction::Transaction {
        TransactionBuilder::new()
            .from([from; 20])
            .to([to; 20])
            .amount(Balance::from(amount))
            .fee(fee)
            .build()
            .unwrap()
    }

    #[test]
    fn genesis_credits_recipients_without_debits() {
        let state = StateManager::new();
        let txs = TransactionsSet::from_vec(vec![tx(0, 1, 1000, 0)]).unwrap();
        let genesis = Block::genesis([9u8; 20], txs);
        state.update_from_genesis(&genesis).unwrap();
        assert_eq!(state.get_balance(&[1u8; 20]), Balance::from(1000u64));
    }

    #[test]
    fn block_update_applies_transfer_and_rewards_coinbase() {
        let state = StateManager::new();
        let genesis = Block::genesis([9u8; 20], TransactionsSet::from_vec(vec![tx(0, 1, 1000, 0)]).unwrap());
        state.update_from_genesis(&genesis).unwrap();

        let txs = TransactionsSet::from_vec(vec![tx(1, 2, 100, 1)]).unwrap();
        let block = Block::new(1, genesis.hash(), [9u8; 20], txs);
        state.update_block(&block, 50).unwrap();

        assert_eq!(state.get_balance(&[1u8; 20]), Balance::from(899u64));
        assert_eq!(state.get_balance(&[2u8; 20]), Balance::from(100u64));
        assert_eq!(state.get_balance(&[9u8; 20]), Balance::from(51u64));
    }

    #[test]
    fn failed_block_update_rolls_back_atomically() {
        let state = StateManager::new();
        let genesis = Block::genesis([9u8; 20], TransactionsSet::from_vec(vec![tx(0, 1, 1000, 0)]).unwrap());
        state.update_from_genesis(&genesis).unwrap();

        let before = state.get_account(&[1u8; 20]).unwrap();

        let txs = TransactionsSet::from_vec(vec![
            tx(1, 2, 100, 1),
            tx(1, 3, 100_000, 1), // insufficient funds, should abort the whole block
        ])
        .unwrap();
        let block = Block::new(1, genesis.hash(), [9u8; 20], txs);
        let result = state.update_block(&block, 50);
        assert!(result.is_err());

        let after = state.get_account(&[1u8; 20]).unwrap();
        assert_eq!(before, after);
        assert!(!state.has_account(&[2u8; 20]));
    }

    #[test]
    fn ensure_account_creates_lazily_get_account_does_not() {
        let state = StateManager::new();
        assert!(state.get_account(&[5u8; 20]).is_none());
        {
            let mut account = state.ensure_account([5u8; 20]);
            account.nonce = 3;
        }
        assert!(state.has_account(&[5u8; 20]));
        assert_eq!(state.get_account(&[5u8; 20]).unwrap().nonce, 3);
    }

    #[test]
    fn new_contract_derives_stable_address_and_bumps_nonce() {
        let state = StateManager::new();
        state.new_account([1u8; 20], NULL_HASH).unwrap();
        let code_hash = crypto::sha256(b"contract code");
        let addr = state.new_contract([1u8; 20], code_hash).unwrap();
        assert!(state.has_account(&addr));
        assert_eq!(state.get_account(&[1u8; 20]).unwrap().nonce, 1);
    }

    #[test]
    fn save_and_get_code_round_trips() {
        let state = StateManager::new();
        let hash = state.save_code(b"hello".to_vec());
        assert_eq!(state.get_code(&hash), Some(b"hello".to_vec()));
    }
}
