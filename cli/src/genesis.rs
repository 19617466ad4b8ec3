//! Genesis block construction: read a persisted one from disk, or mint a
//! default single-recipient genesis for local experimentation.

use std::path::Path;

use obscura_core::archive::{Decode, Encode, IArchive, OArchive};
use obscura_core::block::{Block, TransactionsSet};
use obscura_core::config::Config;
use obscura_core::transaction::TransactionBuilder;
use obscura_core::{Address, Balance, NULL_ADDRESS};

/// The address minted in the default development genesis. Not a real key —
/// nothing ever signs with it, it just needs somewhere to put the initial
/// supply. Deliberately distinct from `NULL_ADDRESS` so the mint
/// transaction is an ordinary transfer, not a contract creation.
const DEV_GENESIS_RECIPIENT: Address = [0xFFu8; 20];

pub fn load_or_default(path: Option<&Path>, config: &Config) -> anyhow::Result<Block> {
    match path {
        Some(path) if path.exists() => {
            let bytes = std::fs::read(path)?;
            let mut ia = IArchive::new(&bytes);
            let block = Block::decode(&mut ia)?;
            ia.finish()?;
            Ok(block)
        }
        _ => Ok(default_genesis(config)),
    }
}

pub fn save(path: &Path, genesis: &Block) -> anyhow::Result<()> {
    let mut oa = OArchive::new();
    genesis.encode(&mut oa);
    std::fs::write(path, oa.into_bytes())?;
    Ok(())
}

fn default_genesis(config: &Config) -> Block {
    let mint_tx = TransactionBuilder::new()
        .from(NULL_ADDRESS)
        .to(DEV_GENESIS_RECIPIENT)
        .amount(Balance::from(1_000_000u64))
        .fee(0)
        .timestamp(0)
        .build()
        .expect("well-formed development mint transaction");
    let txs = TransactionsSet::from_vec(vec![mint_tx]).expect("single-transaction set has no duplicates");
    Block::genesis(NULL_ADDRESS, txs).mine(&config.pow_target)
}
