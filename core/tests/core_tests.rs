use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

use obscura_core::block::{Block, TransactionsSet};
use obscura_core::chain::ChainManager;
use obscura_core::config::Config;
use obscura_core::transaction::TransactionBuilder;
use obscura_core::{crypto, pow, Balance};

#[test]
fn pow_zero_difficulty_passes() {
    let random_hash = [0xAAu8; 32];
    assert!(pow::hash_meets_difficulty(&random_hash, 0));
}

#[test]
fn mining_produces_valid_block() {
    let config = Config::default();
    let coinbase = TransactionBuilder::new()
        .from([0u8; 20])
        .to([1u8; 20])
        .amount(Balance::from(50u64))
        .fee(0)
        .build()
        .unwrap();
    let block = Block::genesis([1u8; 20], TransactionsSet::from_vec(vec![coinbase]).unwrap()).mine(&config.pow_target);
    assert!(pow::hash_meets_target(&block.hash(), &config.pow_target));
}

/// End-to-end: mint to an owner at genesis, spend part of it in a signed
/// transaction mined into the next block, and check the resulting
/// balances through the chain manager.
#[test]
fn chain_applies_a_signed_transfer_on_top_of_genesis() {
    let config = Config::default();

    let owner_key = SigningKey::random(&mut OsRng);
    let owner_addr = crypto::address_from_pubkey(owner_key.verifying_key());
    let recipient_addr = [4u8, 5, 6].iter().cycle().take(20).copied().collect::<Vec<u8>>();
    let mut recipient = [0u8; 20];
    recipient.copy_from_slice(&recipient_addr);

    let mint = TransactionBuilder::new()
        .from([0u8; 20])
        .to(owner_addr)
        .amount(Balance::from(50u64))
        .fee(0)
        .build()
        .unwrap();
    let genesis = Block::genesis([9u8; 20], TransactionsSet::from_vec(vec![mint]).unwrap()).mine(&config.pow_target);

    let chain = ChainManager::new(config.clone(), genesis.clone()).expect("chain from genesis");
    assert_eq!(chain.top_block_depth(), 0);
    assert_eq!(chain.get_balance(&owner_addr), Balance::from(50u64));

    let mut spend = TransactionBuilder::new()
        .from(owner_addr)
        .to(recipient)
        .amount(Balance::from(30u64))
        .fee(1)
        .build()
        .unwrap();
    spend.sign(&owner_key);
    assert!(spend.check_sign());

    let block2 = Block::new(1, genesis.hash(), [9u8; 20], TransactionsSet::from_vec(vec![spend]).unwrap())
        .mine(&config.pow_target);
    chain.try_add_block(block2).expect("apply block2");

    assert_eq!(chain.top_block_depth(), 1);
    assert_eq!(chain.get_balance(&owner_addr), Balance::from(19u64)); // 50 - 30 - 1 fee
    assert_eq!(chain.get_balance(&recipient), Balance::from(30u64));
    assert_eq!(chain.get_balance(&[9u8; 20]), Balance::from(config.block_reward + 1));
}
