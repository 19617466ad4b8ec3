//! The chain manager: tracks every known block, maintains the active
//! longest-chain tip, and owns the mempool of pending transactions.
//!
//! Reorg strategy: rather than tracking per-transaction undo deltas, a
//! reorg replays the winning branch from genesis into a fresh state
//! manager and swaps it in atomically under the outer lock. Simpler than
//! delta-based undo and still gives the same end state — acceptable at
//! the scale this crate targets, same trade-off `StateManager::update_block`
//! makes by cloning the whole account map for its own rollback.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use tracing::{info, warn};

use crate::block::Block;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::StateManager;
use crate::transaction::Transaction;
use crate::{Hash, NULL_HASH};

/// Pending, not-yet-mined transactions, keyed by `hashOfTransaction`.
#[derive(Debug, Default)]
pub struct Mempool {
    pending: HashMap<Hash, Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.pending.contains_key(hash)
    }

    pub fn add(&mut self, tx: Transaction) -> bool {
        let hash = tx.hash_of_transaction();
        if self.pending.contains_key(&hash) {
            return false;
        }
        self.pending.insert(hash, tx);
        true
    }

    pub fn remove(&mut self, hash: &Hash) -> Option<Transaction> {
        self.pending.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.pending.values()
    }

    /// Takes up to `limit` pending transactions, in arbitrary order — the
    /// `Miner` subcommand drains these into the next block body.
    pub fn take(&mut self, limit: usize) -> Vec<Transaction> {
        let hashes: Vec<Hash> = self.pending.keys().take(limit).cloned().collect();
        hashes.into_iter().filter_map(|h| self.pending.remove(&h)).collect()
    }
}

struct ChainTip {
    hash: Hash,
    depth: u64,
}

/// Synchronous outcome of [`ChainManager::try_add_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// Newly admitted: structurally valid, PoW met, and its transactions
    /// applied cleanly to the parent's state.
    Added,
    /// Already present in the block index; no-op.
    AlreadyKnown,
}

/// Owns every known block (including side branches), the active chain tip,
/// the live world state, and the pending-transaction mempool.
pub struct ChainManager {
    config: Config,
    state: RwLock<StateManager>,
    blocks: RwLock<HashMap<Hash, Block>>,
    tip: RwLock<ChainTip>,
    mempool: Mutex<Mempool>,
}

impl ChainManager {
    /// Constructs a chain seeded with `genesis`. `genesis` must satisfy
    /// [`Block::is_genesis`].
    pub fn new(config: Config, genesis: Block) -> Result<Self> {
        if !genesis.is_genesis() {
            return Err(Error::InvalidBlock("expected a genesis block"));
        }
        let state = StateManager::new();
        state.update_from_genesis(&genesis)?;
        let genesis_hash = genesis.hash();

        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis);

        Ok(Self {
            config,
            state: RwLock::new(state),
            blocks: RwLock::new(blocks),
            tip: RwLock::new(ChainTip { hash: genesis_hash, depth: 0 }),
            mempool: Mutex::new(Mempool::new()),
        })
    }

    pub fn top_block_hash(&self) -> Hash {
        self.tip.read().unwrap().hash
    }

    pub fn top_block_depth(&self) -> u64 {
        self.tip.read().unwrap().depth
    }

    pub fn get_block(&self, hash: &Hash) -> Option<Block> {
        self.blocks.read().unwrap().get(hash).cloned()
    }

    pub fn has_block(&self, hash: &Hash) -> bool {
        self.blocks.read().unwrap().contains_key(hash)
    }

    pub fn get_balance(&self, addr: &crate::Address) -> crate::Balance {
        self.state.read().unwrap().get_balance(addr)
    }

    pub fn get_account(&self, addr: &crate::Address) -> Option<crate::state::AccountState> {
        self.state.read().unwrap().get_account(addr)
    }

    pub fn get_code(&self, hash: &Hash) -> Option<Vec<u8>> {
        self.state.read().unwrap().get_code(hash)
    }

    /// Validates `tx` (signature, sender funded for `amount + fee`) and
    /// admits it to the mempool. Rejects duplicates silently (returns
    /// `Ok(false)`).
    pub fn try_add_transaction(&self, tx: Transaction) -> Result<bool> {
        if !tx.check_sign() {
            return Err(Error::InvalidSignature);
        }
        let required = tx
            .amount
            .checked_add(crate::Balance::from(tx.fee))
            .ok_or(Error::InsufficientFunds)?;
        if self.state.read().unwrap().get_balance(&tx.from) < required {
            return Err(Error::InsufficientFunds);
        }
        Ok(self.mempool.lock().unwrap().add(tx))
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().unwrap().len()
    }

    pub fn drain_mempool(&self, limit: usize) -> Vec<Transaction> {
        self.mempool.lock().unwrap().take(limit)
    }

    /// Validates `block` structurally (PoW, known parent, depth
    /// continuity) and against the parent's state (every transaction must
    /// apply cleanly) before admitting it to the block index. A block that
    /// fails any of these checks is never stored — only a structurally and
    /// state-valid block can become "known". If it extends the active
    /// chain to a new maximum depth, switches to it — replaying from
    /// genesis if the new tip sits on a different branch than the current
    /// one. Ties at equal depth keep the current active branch.
    pub fn try_add_block(&self, block: Block) -> Result<AddResult> {
        let block_hash = block.hash();
        if self.has_block(&block_hash) {
            return Ok(AddResult::AlreadyKnown);
        }

        let parent_depth = {
            let blocks = self.blocks.read().unwrap();
            let parent = blocks
                .get(&block.prev_block_hash)
                .ok_or(Error::UnknownParent)?;
            parent.depth
        };
        if block.depth != parent_depth + 1 {
            return Err(Error::InvalidBlock("depth does not continue parent"));
        }
        if !crate::pow::hash_meets_target(&block_hash, &self.config.pow_target) {
            return Err(Error::InvalidBlock("proof-of-work target not met"));
        }

        {
            let blocks = self.blocks.read().unwrap();
            let parent_state = self.state_at(&blocks, block.prev_block_hash)?;
            parent_state.update_block(&block, self.config.block_reward).map_err(|_| {
                Error::InvalidStateTransition("a transaction in this block does not apply to the parent's state")
            })?;
        }

        self.blocks.write().unwrap().insert(block_hash, block.clone());

        let current_depth = self.top_block_depth();
        if block.depth > current_depth {
            self.reorganize_to(block_hash)?;
        }
        Ok(AddResult::Added)
    }

    /// Replays genesis plus every block from genesis up to and including
    /// `tip` into a fresh, disposable `StateManager` — used both to
    /// validate a candidate block's state transition before admission and
    /// (by `reorganize_to`) to compute the state of the winning branch.
    fn state_at(&self, blocks: &HashMap<Hash, Block>, tip: Hash) -> Result<StateManager> {
        let path = self.path_to_genesis(blocks, tip);
        let state = StateManager::new();
        let genesis_block = blocks.get(&path[0]).expect("genesis present");
        state.update_from_genesis(genesis_block)?;
        for hash in &path[1..] {
            let block = blocks.get(hash).expect("path ancestor present");
            state.update_block(block, self.config.block_reward)?;
        }
        Ok(state)
    }

    fn path_to_genesis(&self, blocks: &HashMap<Hash, Block>, mut hash: Hash) -> Vec<Hash> {
        let mut path = vec![hash];
        while hash != NULL_HASH {
            let block = blocks.get(&hash).expect("path_to_genesis: missing ancestor");
            if block.is_genesis() {
                break;
            }
            hash = block.prev_block_hash;
            path.push(hash);
        }
        path.reverse();
        path
    }

    fn reorganize_to(&self, new_tip: Hash) -> Result<()> {
        let blocks = self.blocks.read().unwrap();
        let old_tip = self.top_block_hash();

        let old_path = self.path_to_genesis(&blocks, old_tip);
        let new_path = self.path_to_genesis(&blocks, new_tip);

        let common_len = old_path
            .iter()
            .zip(new_path.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let is_simple_extension = common_len == old_path.len();
        if !is_simple_extension {
            warn!(
                old_tip = hex::encode(old_tip),
                new_tip = hex::encode(new_tip),
                "reorganizing active chain"
            );
        }

        let fresh_state = self.state_at(&blocks, new_tip)?;

        let mut included_in_new: std::collections::HashSet<Hash> = std::collections::HashSet::new();
        for hash in &new_path[1..] {
            let block = blocks.get(hash).unwrap();
            for tx in block.transactions.iter() {
                included_in_new.insert(tx.hash_of_transaction());
            }
        }

        let mut returned_to_mempool = Vec::new();
        for hash in &old_path[common_len..] {
            let block = blocks.get(hash).unwrap();
            for tx in block.transactions.iter() {
                let tx_hash = tx.hash_of_transaction();
                if !included_in_new.contains(&tx_hash) {
                    returned_to_mempool.push(tx.clone());
                }
            }
        }
        drop(blocks);

        *self.state.write().unwrap() = fresh_state;
        *self.tip.write().unwrap() = ChainTip { hash: new_tip, depth: new_path.len() as u64 - 1 };

        let state = self.state.read().unwrap();
        let mut mempool = self.mempool.lock().unwrap();
        for hash in &new_path[1..] {
            for tx in self.blocks.read().unwrap().get(hash).unwrap().transactions.iter() {
                mempool.remove(&tx.hash_of_transaction());
            }
        }
        for tx in returned_to_mempool {
            let required = match tx.amount.checked_add(crate::Balance::from(tx.fee)) {
                Some(v) => v,
                None => continue,
            };
            if tx.check_sign() && state.get_balance(&tx.from) >= required {
                mempool.add(tx);
            }
        }

        info!(depth = new_path.len() as u64 - 1, hash = hex::encode(new_tip), "new chain tip");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::TransactionsSet;
    use crate::transaction::TransactionBuilder;
    use crate::Balance;

    fn tx(from: u8, to: u8, amount: u64, fee: u64) -> Transaction {
        TransactionBuilder::new()
            .from([from; 20])
            .to([to; 20])
            .amount(Balance::from(amount))
            .fee(fee)
            .build()
            .unwrap()
    }

    fn genesis_with(to: u8, amount: u64) -> Block {
        Block::genesis([0u8; 20], TransactionsSet::from_vec(vec![tx(0, to, amount, 0)]).unwrap())
    }

    #[test]
    fn linear_extension_advances_tip() {
        let config = Config::default();
        let genesis = genesis_with(1, 1000).mine(&config.pow_target);
        let chain = ChainManager::new(config.clone(), genesis.clone()).unwrap();

        let txs = TransactionsSet::from_vec(vec![tx(1, 2, 100, 1)]).unwrap();
        let block = Block::new(1, genesis.hash(), [9u8; 20], txs).mine(&config.pow_target);
        let block_hash = block.hash();
        chain.try_add_block(block).unwrap();

        assert_eq!(chain.top_block_hash(), block_hash);
        assert_eq!(chain.top_block_depth(), 1);
        assert_eq!(chain.get_balance(&[2u8; 20]), Balance::from(100u64));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let config = Config::default();
        let genesis = genesis_with(1, 1000).mine(&config.pow_target);
        let chain = ChainManager::new(config.clone(), genesis).unwrap();

        let orphan = Block::new(5, [0xABu8; 32], [9u8; 20], TransactionsSet::new()).mine(&config.pow_target);
        assert!(matches!(chain.try_add_block(orphan), Err(Error::UnknownParent)));
    }

    #[test]
    fn deeper_competing_branch_triggers_reorg() {
        let config = Config::default();
        let genesis = genesis_with(1, 1000).mine(&config.pow_target);
        let chain = ChainManager::new(config.clone(), genesis.clone()).unwrap();

        let branch_a = Block::new(1, genesis.hash(), [1u8; 20], TransactionsSet::from_vec(vec![tx(1, 2, 100, 1)]).unwrap())
            .mine(&config.pow_target);
        chain.try_add_block(branch_a.clone()).unwrap();
        assert_eq!(chain.top_block_hash(), branch_a.hash());

        let branch_b1 = Block::new(1, genesis.hash(), [2u8; 20], TransactionsSet::from_vec(vec![tx(1, 3, 50, 1)]).unwrap())
            .mine(&config.pow_target);
        let branch_b2 = Block::new(2, branch_b1.hash(), [2u8; 20], TransactionsSet::new()).mine(&config.pow_target);
        chain.try_add_block(branch_b1).unwrap();
        chain.try_add_block(branch_b2.clone()).unwrap();

        assert_eq!(chain.top_block_hash(), branch_b2.hash());
        assert_eq!(chain.top_block_depth(), 2);
        assert_eq!(chain.get_balance(&[3u8; 20]), Balance::from(50u64));
        assert_eq!(chain.get_balance(&[2u8; 20]), Balance::zero());
    }

    #[test]
    fn equal_depth_competitor_does_not_displace_active_tip() {
        let config = Config::default();
        let genesis = genesis_with(1, 1000).mine(&config.pow_target);
        let chain = ChainManager::new(config.clone(), genesis.clone()).unwrap();

        let first = Block::new(1, genesis.hash(), [1u8; 20], TransactionsSet::new()).mine(&config.pow_target);
        chain.try_add_block(first.clone()).unwrap();

        let competitor = Block::new(1, genesis.hash(), [2u8; 20], TransactionsSet::new()).mine(&config.pow_target);
        chain.try_add_block(competitor).unwrap();

        assert_eq!(chain.top_block_hash(), first.hash());
    }

    #[test]
    fn transaction_admission_requires_valid_signature_and_funds() {
        let config = Config::default();
        let genesis = genesis_with(1, 1000).mine(&config.pow_target);
        let chain = ChainManager::new(config, genesis).unwrap();

        let unsigned = tx(1, 2, 100, 1);
        assert!(matches!(chain.try_add_transaction(unsigned), Err(Error::InvalidSignature)));
    }
}
