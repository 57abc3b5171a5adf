/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests of special blocks: boot-node-signed blocks that may replace recent canonical blocks.

use std::{sync::mpsc, time::Duration};

use log::LevelFilter;

use powbft_rs::{
    chain::ChainReadView,
    errors::ChainError,
    events::RollbackBlockEvent,
    middleware::{BlockContext, Variant},
    service::ChainServiceSpec,
    types::{
        data_types::Amount,
        vote::{Vote, VoteMessage, VoteType},
    },
    vm::DisabledVm,
};

mod common;

use crate::common::{
    chain_builder::{address, TestChain, INITIAL_BALANCE},
    logging::setup_logger,
    mem_db::MemDB,
    mock_pool::MockPool,
};

#[test]
fn special_block_replaces_the_head_and_re_pools_its_transactions() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let tx_pool = MockPool::new();
    let (rollback_sender, rollback_receiver) = mpsc::channel();
    let service = ChainServiceSpec::builder()
        .kv_store(MemDB::new())
        .config(test_chain.config.clone())
        .genesis(test_chain.genesis.clone())
        .tx_pool(tx_pool.clone())
        .economy_model(test_chain.economy_model())
        .vm(DisabledVm)
        .log_events(true)
        .on_rollback_block(move |event: &RollbackBlockEvent| {
            rollback_sender.send(event.number).unwrap();
        })
        .build()
        .start()
        .unwrap();
    let chain = service.chain();
    let (alice, bob, carol) = (&test_chain.users[0], &test_chain.users[1], test_chain.user(2));

    let genesis = service.current_block().unwrap();
    let block_1 = test_chain.next_block(chain, &genesis, vec![]);
    service
        .save_block(block_1.clone(), test_chain.commit_votes(chain, &block_1))
        .unwrap();
    let block_2 = test_chain.next_block(
        chain,
        &block_1,
        vec![test_chain.transfer(alice, 0, address(bob), 100)],
    );
    service
        .save_block(block_2.clone(), test_chain.commit_votes(chain, &block_2))
        .unwrap();
    let displaced_tx = test_chain.transfer(bob, 0, carol, 40);
    let block_3 = test_chain.next_block(chain, &block_2, vec![displaced_tx.clone()]);
    service
        .save_block(block_3.clone(), test_chain.commit_votes(chain, &block_3))
        .unwrap();
    assert!(chain.get_transaction(&displaced_tx.hash()).unwrap().is_some());

    // A special block at height 3 replaces block 3.
    let special = test_chain.special_block(chain, &block_2);
    assert!(special.is_special());
    let boot_vote = test_chain.commit_votes(chain, &special);
    service.save_block(special.clone(), boot_vote.clone()).unwrap();

    assert_eq!(service.current_block().unwrap().hash(), special.hash());
    assert_eq!(
        chain.get_block_by_number(3).unwrap().unwrap().hash(),
        special.hash()
    );
    assert!(chain.get_block_by_hash(&block_3.hash()).unwrap().is_some());
    assert!(chain.get_transaction(&displaced_tx.hash()).unwrap().is_none());
    assert_eq!(service.get_seen_commit(3).unwrap(), boot_vote);
    assert_eq!(tx_pool.re_added(), vec![displaced_tx.hash()]);
    assert_eq!(
        rollback_receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
        3
    );
    assert_eq!(
        service.current_balance(&carol).unwrap(),
        Amount::from(INITIAL_BALANCE)
    );

    // The displaced transaction can be included again on top of the special block, whose only vote is the
    // boot vote.
    let block_4 = test_chain.next_block(chain, &special, vec![displaced_tx.clone()]);
    assert_eq!(block_4.verifications, boot_vote);
    service
        .save_block(block_4.clone(), test_chain.commit_votes(chain, &block_4))
        .unwrap();
    let (_, lookup) = chain.get_transaction(&displaced_tx.hash()).unwrap().unwrap();
    assert_eq!(lookup.block_number, 4);
    assert_eq!(
        service.current_balance(&carol).unwrap(),
        Amount::from(INITIAL_BALANCE + 40)
    );

    // A special block ends its slot.
    assert_eq!(
        chain.get_slot(&block_4).unwrap(),
        chain.get_slot(&special).unwrap() + 1
    );
}

#[test]
fn special_blocks_reach_back_at_most_the_rollback_limit() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let tx_pool = MockPool::new();
    let service = test_chain.start(MemDB::new(), tx_pool.clone());
    let chain = service.chain();

    let mut blocks = vec![service.current_block().unwrap()];
    for nonce in 0..4 {
        let tx = test_chain.transfer(&test_chain.users[0], nonce, test_chain.user(1), 1);
        let block = test_chain.next_block(chain, blocks.last().unwrap(), vec![tx]);
        service.save_block_without_votes(block.clone()).unwrap();
        blocks.push(block);
    }
    let limit = test_chain.config.rollback_limit;
    assert_eq!(limit, 3);

    // Head is 4: height 1 is out of reach, height 2 is the lowest a special block may replace.
    let too_deep = test_chain.special_block(chain, &blocks[0]);
    assert!(matches!(
        service.save_block_without_votes(too_deep),
        Err(ChainError::AlreadyHaveThisBlock)
    ));

    let special = test_chain.special_block(chain, &blocks[1]);
    service.save_block_without_votes(special.clone()).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), special.hash());
    assert!(chain.get_block_by_number(3).unwrap().is_none());
    assert!(chain.get_block_by_number(4).unwrap().is_none());

    // Only the transactions of the block at the special block's own height go back to the pool.
    assert_eq!(
        tx_pool.re_added(),
        vec![blocks[2].transactions()[0].hash()]
    );
}

#[test]
fn votes_on_a_special_block_start_with_a_boot_vote() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();

    let genesis = service.current_block().unwrap();
    let special = test_chain.special_block(chain, &genesis);
    let message = |vote_type| VoteMessage {
        height: 1,
        round: 0,
        block_hash: special.hash(),
        vote_type,
    };

    let verifier_first = vec![Vote::new(
        message(VoteType::Vote),
        &test_chain.default_verifiers[0],
    )];
    assert!(matches!(
        service.save_block(special.clone(), verifier_first),
        Err(ChainError::InvalidFirstVoteInSpecialBlock)
    ));

    let boot_then_outsider = vec![
        Vote::new(message(VoteType::VerifierBootVote), &test_chain.boot),
        Vote::new(message(VoteType::Vote), &test_chain.users[0]),
    ];
    assert!(matches!(
        service.save_block(special.clone(), boot_then_outsider),
        Err(ChainError::NotCurrentVerifier)
    ));

    let boot_then_verifier = vec![
        Vote::new(message(VoteType::VerifierBootVote), &test_chain.boot),
        Vote::new(message(VoteType::Vote), &test_chain.default_verifiers[1]),
    ];
    service.save_block(special.clone(), boot_then_verifier).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), special.hash());
}

#[test]
fn special_blocks_are_mined_by_boot_nodes_and_carry_no_transactions() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();

    let mut with_tx = test_chain.special_block(chain, &genesis);
    with_tx.body.transactions =
        vec![test_chain.transfer(&test_chain.users[0], 0, test_chain.user(1), 1)];
    with_tx.header.tx_root = powbft_rs::types::derive_sha::derive_sha(&with_tx.body.transactions);
    assert!(matches!(
        service.save_block_without_votes(with_tx),
        Err(ChainError::TxInSpecialBlock)
    ));

    let mut wrong_coinbase = test_chain.special_block(chain, &genesis);
    wrong_coinbase.header.coinbase = address(&test_chain.miner);
    assert!(matches!(
        service.save_block_without_votes(wrong_coinbase),
        Err(ChainError::InvalidCoinBase)
    ));
}

#[test]
fn a_special_block_and_the_blocks_it_displaces_are_written_at_once() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let kv_store = MemDB::new();
    let service = test_chain.start(kv_store.clone(), MockPool::new());
    let chain = service.chain();

    let mut blocks = vec![service.current_block().unwrap()];
    for nonce in 0..3 {
        let tx = test_chain.transfer(&test_chain.users[0], nonce, test_chain.user(1), 1);
        let block = test_chain.next_block(chain, blocks.last().unwrap(), vec![tx]);
        service.save_block_without_votes(block.clone()).unwrap();
        blocks.push(block);
    }

    let special = test_chain.special_block(chain, &blocks[1]);
    let economy_model = test_chain.economy_model();
    let writes_before = kv_store.writes();
    let mut ctx = BlockContext::new(&special, chain, &economy_model, &DisabledVm)
        .with_variant(Variant::BftWithoutVotes);
    ctx.process().unwrap();

    assert_eq!(kv_store.writes(), writes_before + 1);
    assert_eq!(
        ctx.displaced().iter().map(|old| old.number()).collect::<Vec<_>>(),
        vec![2, 3]
    );
    assert_eq!(chain.current_block().unwrap().hash(), special.hash());
    assert_eq!(
        chain.get_block_by_number(2).unwrap().unwrap().hash(),
        special.hash()
    );
    assert!(chain.get_block_by_number(3).unwrap().is_none());
    for old in &blocks[2..] {
        let displaced_tx = old.transactions()[0].hash();
        assert!(chain.get_transaction(&displaced_tx).unwrap().is_none());
    }
}
