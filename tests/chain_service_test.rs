/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests of the ingestion service on a short chain of normal blocks: inserting blocks with transfers, the
//! queries the service answers afterwards, deduplication, and rejection of blocks whose commitments do
//! not match their replay.

use std::{
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use log::LevelFilter;

use powbft_rs::{
    chain::ChainReadView,
    errors::ChainError,
    events::{InsertBlockEvent, RejectBlockEvent},
    service::ChainServiceSpec,
    types::data_types::{Amount, CryptoHash},
    vm::DisabledVm,
};

mod common;

use crate::common::{
    chain_builder::{address, TestChain, BLOCK_REWARD, INITIAL_BALANCE},
    logging::setup_logger,
    mem_db::MemDB,
    mock_pool::{MockPool, PoolCall},
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn drain(receiver: &Receiver<u64>) -> Vec<u64> {
    let mut received = Vec::new();
    while let Ok(number) = receiver.recv_timeout(Duration::from_millis(300)) {
        received.push(number);
    }
    received
}

#[test]
fn genesis_is_written_once() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let kv_store = MemDB::new();

    let genesis_hash = {
        let service = test_chain.start(kv_store.clone(), MockPool::new());
        let genesis = service.current_block().unwrap();
        assert_eq!(genesis.number(), 0);
        assert_eq!(
            service.current_balance(&test_chain.user(0)).unwrap(),
            Amount::from(INITIAL_BALANCE)
        );
        genesis.hash()
    };

    // Starting again over the same store keeps the chain.
    let keys_before = kv_store.len();
    let service = test_chain.start(kv_store.clone(), MockPool::new());
    assert_eq!(service.chain().genesis().unwrap().hash(), genesis_hash);
    assert_eq!(kv_store.len(), keys_before);
}

#[test]
fn transfers_move_balances_and_nonces() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let tx_pool = MockPool::new();
    let service = test_chain.start(MemDB::new(), tx_pool.clone());
    let chain = service.chain();
    let (alice, bob) = (&test_chain.users[0], test_chain.user(1));

    let genesis = service.current_block().unwrap();
    let first = test_chain.transfer(alice, 0, bob, 500);
    let second = test_chain.transfer(alice, 1, bob, 250);
    let block_1 = test_chain.next_block(chain, &genesis, vec![first.clone(), second.clone()]);
    service
        .save_block(block_1.clone(), test_chain.commit_votes(chain, &block_1))
        .unwrap();

    let fees = first.gas_limit() + second.gas_limit();
    assert_eq!(service.current_block().unwrap().hash(), block_1.hash());
    assert_eq!(
        service.current_balance(&address(alice)).unwrap(),
        Amount::from(INITIAL_BALANCE - 750 - fees)
    );
    assert_eq!(
        service.current_balance(&bob).unwrap(),
        Amount::from(INITIAL_BALANCE + 750)
    );
    assert_eq!(service.get_transaction_nonce(&address(alice)).unwrap(), 2);

    // The miner gets its share of the block reward and the fees.
    assert_eq!(
        service.current_balance(&address(&test_chain.miner)).unwrap(),
        Amount::from(BLOCK_REWARD * 80 / 100 + fees)
    );

    let receipts = chain.get_receipts(&block_1.hash()).unwrap().unwrap();
    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[1].cumulative_gas_used, fees);
    let (found, lookup) = chain.get_transaction(&second.hash()).unwrap().unwrap();
    assert_eq!(found, second);
    assert_eq!((lookup.block_number, lookup.index), (1, 1));

    assert_eq!(
        tx_pool.calls(),
        vec![
            PoolCall::Reset {
                old_head: 0,
                new_head: 1
            },
            PoolCall::RemoveTxs(1),
        ]
    );
}

#[test]
fn verifier_votes_are_rewarded_from_the_second_block() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();

    let mut parent = service.current_block().unwrap();
    for _ in 0..2 {
        let block = test_chain.next_block(chain, &parent, vec![]);
        service.save_block_without_votes(block.clone()).unwrap();
        parent = block;
    }

    let share = BLOCK_REWARD * 20 / 100 / test_chain.config.verifier_number as u64;
    for verifier in &test_chain.default_verifiers {
        assert_eq!(
            service.current_balance(&address(verifier)).unwrap(),
            Amount::from(share)
        );
    }
}

#[test]
fn seen_commits_are_stored_with_their_block() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();

    let genesis = service.current_block().unwrap();
    let block_1 = test_chain.next_block(chain, &genesis, vec![]);
    let votes = test_chain.commit_votes(chain, &block_1);
    service.save_block(block_1.clone(), votes.clone()).unwrap();
    assert_eq!(service.get_seen_commit(1).unwrap(), votes);

    // Block 2 carries the votes on block 1 as its verifications.
    let block_2 = test_chain.next_block(chain, &block_1, vec![]);
    assert_eq!(block_2.verifications, votes);
    service.save_block_without_votes(block_2).unwrap();
    assert!(service.get_seen_commit(2).unwrap().is_empty());
    assert!(matches!(
        service.get_seen_commit(3),
        Err(ChainError::BlockNotFound)
    ));
}

#[test]
fn saving_a_canonical_block_again_is_silent() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let (insert_sender, insert_receiver) = mpsc::channel();
    let service = ChainServiceSpec::builder()
        .kv_store(MemDB::new())
        .config(test_chain.config.clone())
        .genesis(test_chain.genesis.clone())
        .tx_pool(MockPool::new())
        .economy_model(test_chain.economy_model())
        .vm(DisabledVm)
        .log_events(true)
        .on_insert_block(move |event: &InsertBlockEvent| {
            insert_sender.send(event.block.number()).unwrap();
        })
        .build()
        .start()
        .unwrap();
    let chain = service.chain();

    let mut blocks = vec![service.current_block().unwrap()];
    for _ in 0..4 {
        let block = test_chain.next_block(chain, blocks.last().unwrap(), vec![]);
        service.save_block_without_votes(block.clone()).unwrap();
        blocks.push(block);
    }
    assert_eq!(drain(&insert_receiver), vec![1, 2, 3, 4]);

    // Within the rollback window, a known block is accepted without being inserted again.
    service.save_block_without_votes(blocks[2].clone()).unwrap();
    service.save_block_without_votes(blocks[4].clone()).unwrap();
    assert!(drain(&insert_receiver).is_empty());

    // Below it, the block is refused.
    assert!(matches!(
        service.save_block_without_votes(blocks[1].clone()),
        Err(ChainError::AlreadyHaveThisBlock)
    ));
    assert_eq!(service.current_block().unwrap().number(), 4);
}

#[test]
fn a_block_that_does_not_extend_the_head_is_rejected() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();

    let genesis = service.current_block().unwrap();
    let block_1 = test_chain.next_block(chain, &genesis, vec![]);
    let sibling = test_chain.next_block(
        chain,
        &genesis,
        vec![test_chain.transfer(&test_chain.users[0], 0, test_chain.user(1), 1)],
    );
    service.save_block_without_votes(block_1).unwrap();
    assert!(matches!(
        service.save_block_without_votes(sibling),
        Err(ChainError::NormalBlockHeightTooLow)
    ));
}

#[test]
fn rejected_blocks_are_reported_with_the_reason() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let (reject_sender, reject_receiver) = mpsc::channel();
    let service = ChainServiceSpec::builder()
        .kv_store(MemDB::new())
        .config(test_chain.config.clone())
        .genesis(test_chain.genesis.clone())
        .tx_pool(MockPool::new())
        .economy_model(test_chain.economy_model())
        .vm(DisabledVm)
        .on_reject_block(move |event: &RejectBlockEvent| {
            reject_sender
                .send((event.block.number(), event.reason.clone()))
                .unwrap();
        })
        .build()
        .start()
        .unwrap();
    let chain = service.chain();

    let genesis = service.current_block().unwrap();
    let mut block_1 = test_chain.next_block(
        chain,
        &genesis,
        vec![test_chain.transfer(&test_chain.users[0], 0, test_chain.user(1), 10)],
    );
    block_1.header.state_root = CryptoHash::new([7u8; 32]);
    let result = service.save_block_without_votes(block_1);
    assert!(matches!(result, Err(ChainError::StateRootNotMatch)));

    let (number, reason) = reject_receiver.recv_timeout(EVENT_TIMEOUT).unwrap();
    assert_eq!(number, 1);
    assert_eq!(reason, ChainError::StateRootNotMatch.to_string());
    assert_eq!(service.current_block().unwrap().number(), 0);
}

#[test]
fn transaction_checks_run_against_the_parent_state() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();
    let alice = &test_chain.users[0];

    let skipped_nonce = test_chain.next_block(
        chain,
        &genesis,
        vec![test_chain.transfer(alice, 1, test_chain.user(1), 1)],
    );
    assert!(matches!(
        service.save_block_without_votes(skipped_nonce),
        Err(ChainError::TxNonceNotMatch)
    ));

    let overdraft = test_chain.next_block(
        chain,
        &genesis,
        vec![test_chain.transfer(alice, 0, test_chain.user(1), INITIAL_BALANCE)],
    );
    assert!(matches!(
        service.save_block_without_votes(overdraft),
        Err(ChainError::TxSenderBalanceNotEnough)
    ));

    let mut under_gassed = test_chain.transfer(alice, 0, test_chain.user(1), 1);
    under_gassed.data.gas_limit -= 1;
    let under_gassed = test_chain.config.signer().sign(under_gassed.data, alice);
    let block = test_chain.next_block(chain, &genesis, vec![under_gassed]);
    assert!(matches!(
        service.save_block_without_votes(block),
        Err(ChainError::TxGasLimitNotEnough)
    ));
}
