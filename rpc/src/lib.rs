//! Obscura RPC
//!
//! A thin adapter over the shared chain state: five read/write operations
//! naming the methods a node-facing client needs (account lookup, block
//! lookup, transaction submission, node status, and a read-only contract
//! probe). No wire schema is specified here — these are plain async
//! functions a `jsonrpsee` server can register as methods; the server
//! wiring itself is out of scope for this crate today.

use std::sync::Arc;

use serde::Serialize;

use obscura_core::block::Block;
use obscura_core::chain::ChainManager;
use obscura_core::state::AccountState;
use obscura_core::transaction::{ActionType, StatusCode, Transaction, TransactionStatus};
use obscura_core::{Address, Hash};

/// Shared handle every RPC function operates against.
#[derive(Clone)]
pub struct RpcContext {
    pub chain: Arc<ChainManager>,
    pub network: String,
}

impl RpcContext {
    pub fn new(chain: Arc<ChainManager>, network: impl Into<String>) -> Self {
        Self { chain, network: network.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub head_hash: String,
    pub head_depth: u64,
    pub mempool_len: usize,
    pub network: String,
}

pub async fn get_account(ctx: &RpcContext, addr: Address) -> Option<AccountState> {
    ctx.chain.get_account(&addr)
}

pub async fn get_block(ctx: &RpcContext, hash: Hash) -> Option<Block> {
    ctx.chain.get_block(&hash)
}

/// Submits `tx` to the mempool, returning the same [`TransactionStatus`]
/// shape used for on-chain execution results so callers don't need a
/// separate "was it admitted" type.
pub async fn push_transaction(ctx: &RpcContext, tx: Transaction) -> TransactionStatus {
    match ctx.chain.try_add_transaction(tx) {
        Ok(true) => TransactionStatus::new(StatusCode::Success, ActionType::Transfer, 0, "accepted into mempool"),
        Ok(false) => {
            TransactionStatus::new(StatusCode::Rejected, ActionType::None, 0, "duplicate transaction")
        }
        Err(e) => TransactionStatus::new(StatusCode::Rejected, ActionType::None, 0, e.to_string()),
    }
}

pub async fn node_info(ctx: &RpcContext) -> NodeInfo {
    NodeInfo {
        head_hash: hex::encode(ctx.chain.top_block_hash()),
        head_depth: ctx.chain.top_block_depth(),
        mempool_len: ctx.chain.mempool_len(),
        network: ctx.network.clone(),
    }
}

/// Reads a contract account's stored code. Executing it is the job of the
/// `Vm`, which this crate treats as opaque (see the core crate's root
/// docs) — this is a read-only probe, not a call.
pub async fn view_call(ctx: &RpcContext, addr: Address) -> Option<Vec<u8>> {
    let account = ctx.chain.get_account(&addr)?;
    if !account.is_contract() {
        return None;
    }
    ctx.chain.get_code(&account.code_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscura_core::block::{Block, TransactionsSet};
    use obscura_core::config::Config;
    use obscura_core::transaction::TransactionBuilder;
    use obscura_core::Balance;

    fn ctx_with_balance(addr: Address, amount: u64) -> RpcContext {
        let config = Config::default();
        let tx = TransactionBuilder::new()
            .from([0u8; 20])
            .to(addr)
            .amount(Balance::from(amount))
            .fee(0)
            .build()
            .unwrap();
        let genesis = Block::genesis([9u8; 20], TransactionsSet::from_vec(vec![tx]).unwrap())
            .mine(&config.pow_target);
        let chain = ChainManager::new(config, genesis).unwrap();
        RpcContext::new(Arc::new(chain), "test")
    }

    #[tokio::test]
    async fn get_account_reflects_genesis_balance() {
        let ctx = ctx_with_balance([7u8; 20], 500);
        let account = get_account(&ctx, [7u8; 20]).await.unwrap();
        assert_eq!(account.balance, Balance::from(500u64));
    }

    #[tokio::test]
    async fn node_info_reports_head_and_network() {
        let ctx = ctx_with_balance([7u8; 20], 500);
        let info = node_info(&ctx).await;
        assert_eq!(info.head_depth, 0);
        assert_eq!(info.network, "test");
    }

    #[tokio::test]
    async fn view_call_on_plain_account_is_none() {
        let ctx = ctx_with_balance([7u8; 20], 500);
        assert!(view_call(&ctx, [7u8; 20]).await.is_none());
    }
}
