/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests of the header and vote checks a block goes through before it is replayed.

use std::time::Duration;

use log::LevelFilter;

use powbft_rs::{
    errors::ChainError,
    service::ChainService,
    types::{
        block::Block,
        crypto_primitives::keccak256,
        data_types::{Amount, CryptoHash},
        derive_sha::derive_sha,
        difficulty::{next_work_difficulty, Difficulty},
        vote::{Vote, VoteMessage, VoteType},
    },
};

mod common;

use crate::common::{
    chain_builder::{now_nanos, seal, Draft, TestChain, GENESIS_GAS_LIMIT, INITIAL_BALANCE},
    logging::setup_logger,
    mem_db::MemDB,
    mock_pool::MockPool,
};

/// Save the next block on the head, built from `draft`, with the votes that commit it.
fn save_draft(
    test_chain: &TestChain,
    service: &ChainService<MemDB>,
    draft: Draft,
) -> Result<Block, ChainError> {
    let chain = service.chain();
    let head = service.current_block()?;
    let block = test_chain.build(chain, &head, draft);
    let votes = test_chain.commit_votes(chain, &block);
    service.save_block(block.clone(), votes)?;
    Ok(block)
}

fn with_gas_limit(gas_limit: u64) -> Draft {
    Draft {
        gas_limit: Some(gas_limit),
        ..Draft::default()
    }
}

#[test]
fn gas_limit_moves_less_than_a_1024th_of_the_parent() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let bound = GENESIS_GAS_LIMIT / test_chain.config.gas_limit_bound_divisor;
    assert_eq!(bound, 10_000);

    assert!(matches!(
        save_draft(&test_chain, &service, with_gas_limit(GENESIS_GAS_LIMIT + bound)),
        Err(ChainError::InvalidHeaderGasLimit)
    ));
    assert!(matches!(
        save_draft(&test_chain, &service, with_gas_limit(GENESIS_GAS_LIMIT - bound)),
        Err(ChainError::InvalidHeaderGasLimit)
    ));
    let block = save_draft(&test_chain, &service, with_gas_limit(GENESIS_GAS_LIMIT + bound - 1)).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), block.hash());

    assert!(matches!(
        save_draft(&test_chain, &service, with_gas_limit(test_chain.config.min_gas_limit - 1)),
        Err(ChainError::HeaderGasLimitNotEnough)
    ));
}

#[test]
fn gas_limit_never_exceeds_the_configured_maximum() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let max_gas_limit = test_chain.config.max_gas_limit;
    let test_chain = test_chain.with_genesis(|genesis| genesis.gas_limit = max_gas_limit);
    let service = test_chain.start(MemDB::new(), MockPool::new());

    assert!(matches!(
        save_draft(&test_chain, &service, with_gas_limit(max_gas_limit + 1)),
        Err(ChainError::InvalidHeaderGasLimit)
    ));
    save_draft(&test_chain, &service, with_gas_limit(max_gas_limit)).unwrap();
}

#[test]
fn timestamps_may_run_ahead_of_the_local_clock_only_so_far() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let a_minute = Duration::from_secs(60).as_nanos() as u64;
    let ahead = Draft {
        timestamp: Some(now_nanos() + a_minute),
        ..Draft::default()
    };
    assert!(matches!(
        save_draft(&test_chain, &service, ahead),
        Err(ChainError::InvalidBlockTimeStamp)
    ));

    // Blocks fetched during sync are not held to the local clock.
    let chain = service.chain();
    let genesis = service.current_block().unwrap();
    let synced = test_chain.build(
        chain,
        &genesis,
        Draft {
            timestamp: Some(now_nanos() + a_minute),
            ..Draft::default()
        },
    );
    service.save_block_without_votes(synced.clone()).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), synced.hash());
}

#[test]
fn headers_must_carry_the_chain_version_and_a_valid_seed() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();

    let mut wrong_version = test_chain.next_block(chain, &genesis, vec![]);
    wrong_version.header.version = test_chain.config.version + 1;
    assert!(matches!(
        service.save_block_without_votes(wrong_version),
        Err(ChainError::InvalidBlockVersion)
    ));

    let mut wrong_seed = test_chain.next_block(chain, &genesis, vec![]);
    wrong_seed.header.seed = keccak256(b"not a vrf output");
    assert!(matches!(
        service.save_block_without_votes(wrong_seed),
        Err(ChainError::SeedNotMatch) | Err(ChainError::InvalidVrfProof)
    ));

    let mut wrong_parent = test_chain.next_block(chain, &genesis, vec![]);
    wrong_parent.header.pre_hash = keccak256(b"someone else's genesis");
    assert!(matches!(
        service.save_block_without_votes(wrong_parent),
        Err(ChainError::PreBlockHashNotMatch)
    ));
}

#[test]
fn the_first_block_carries_no_verifications() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();

    let mut block_1 = test_chain.next_block(chain, &genesis, vec![]);
    block_1.verifications = vec![Vote::new(
        VoteMessage {
            height: 0,
            round: 0,
            block_hash: genesis.hash(),
            vote_type: VoteType::Vote,
        },
        &test_chain.default_verifiers[0],
    )];
    block_1.header.verification_root = derive_sha(&block_1.verifications);
    let votes = test_chain.commit_votes(chain, &block_1);
    assert!(matches!(
        service.save_block(block_1, votes),
        Err(ChainError::FirstBlockHaveVerifications)
    ));
}

#[test]
fn verifications_must_commit_the_parent() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let block_1 = save_draft(&test_chain, &service, Draft::default()).unwrap();

    let mut too_few = test_chain.next_block(chain, &block_1, vec![]);
    too_few.verifications.truncate(test_chain.config.vote_threshold() - 1);
    too_few.header.verification_root = derive_sha(&too_few.verifications);
    assert!(matches!(
        service.save_block(too_few, vec![]),
        Err(ChainError::BlockVotesNotEnough)
    ));

    let mut wrong_root = test_chain.next_block(chain, &block_1, vec![]);
    wrong_root.header.verification_root = CryptoHash::new([9u8; 32]);
    assert!(matches!(
        service.save_block(wrong_root, vec![]),
        Err(ChainError::VerificationRootNotMatch)
    ));

    let mut for_another_block = test_chain.next_block(chain, &block_1, vec![]);
    for vote in for_another_block.verifications.iter_mut() {
        *vote = Vote::new(
            VoteMessage {
                height: 1,
                round: 0,
                block_hash: keccak256(b"a sibling of block 1"),
                vote_type: VoteType::Vote,
            },
            &test_chain.default_verifiers[0],
        );
    }
    for_another_block.verifications.truncate(1);
    for_another_block.header.verification_root = derive_sha(&for_another_block.verifications);
    assert!(matches!(
        service.save_block(for_another_block, vec![]),
        Err(ChainError::InvalidBlockHashInVotes)
    ));

    let block_2 = test_chain.next_block(chain, &block_1, vec![]);
    service.save_block(block_2, vec![]).unwrap();
}

#[test]
fn seen_commits_come_from_distinct_verifiers_of_the_slot() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();
    let block_1 = test_chain.next_block(chain, &genesis, vec![]);
    let votes = test_chain.commit_votes(chain, &block_1);

    let mut with_outsider = votes.clone();
    with_outsider.push(Vote::new(
        VoteMessage {
            height: 1,
            round: 0,
            block_hash: block_1.hash(),
            vote_type: VoteType::Vote,
        },
        &test_chain.users[0],
    ));
    assert!(matches!(
        service.save_block(block_1.clone(), with_outsider),
        Err(ChainError::NotCurrentVerifier)
    ));

    let mut with_duplicate = votes.clone();
    with_duplicate.push(votes[0].clone());
    assert!(matches!(
        service.save_block(block_1.clone(), with_duplicate),
        Err(ChainError::SameVoteSignerInVotes)
    ));

    let too_few = votes[..test_chain.config.vote_threshold() - 1].to_vec();
    assert!(matches!(
        service.save_block(block_1.clone(), too_few),
        Err(ChainError::BlockVotesNotEnough)
    ));

    service.save_block(block_1, votes).unwrap();
}

#[test]
fn proof_of_work_blocks_skip_the_verifier_checks() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();

    let transfer = test_chain.transfer(&test_chain.users[0], 0, test_chain.user(1), 42);
    let block_1 = test_chain.next_block(chain, &genesis, vec![transfer]);
    service.save_pow_block(block_1.clone()).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), block_1.hash());
    assert_eq!(
        service.current_balance(&test_chain.user(1)).unwrap(),
        Amount::from(INITIAL_BALANCE + 42)
    );
}

#[test]
fn the_highest_block_number_is_a_future_block() {
    setup_logger(LevelFilter::Debug);
    let test_chain = TestChain::new();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();

    let mut highest = test_chain.next_block(chain, &genesis, vec![]);
    highest.header.number = u64::MAX;
    service.save_block_without_votes(highest.clone()).unwrap();
    assert_eq!(service.future_block_count(), 1);
    assert_eq!(service.current_block().unwrap().hash(), genesis.hash());

    let mut highest_and_far_ahead = highest;
    highest_and_far_ahead.header.timestamp = now_nanos() + Duration::from_secs(60 * 60).as_nanos() as u64;
    assert!(matches!(
        service.save_block(highest_and_far_ahead, vec![]),
        Err(ChainError::FutureBlockTooFarAway)
    ));
    assert_eq!(service.future_block_count(), 1);

    // The head still moves on.
    save_draft(&test_chain, &service, Draft::default()).unwrap();
    assert_eq!(service.current_block().unwrap().number(), 1);
}

/// A chain that checks proof of work, retargeting every two blocks. Its genesis is stamped with the
/// current time, so the first period looks far too fast.
fn mined_chain() -> TestChain {
    TestChain::new()
        .with_config(|config| {
            config.ignore_difficulty_validation = false;
            config.block_count_of_period = 2;
        })
        .with_genesis(|genesis| genesis.timestamp = now_nanos())
}

#[test]
fn mined_blocks_carry_the_expected_difficulty_and_meet_it() {
    setup_logger(LevelFilter::Debug);
    let test_chain = mined_chain();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();

    // Within a period every block carries the difficulty of the latest normal block.
    let easier = Draft {
        difficulty: Some(Difficulty::new([0x20, 0x7f, 0xff, 0xff])),
        ..Draft::default()
    };
    let wrong_difficulty = seal(test_chain.build(chain, &genesis, easier), true);
    assert!(matches!(
        service.save_block_without_votes(wrong_difficulty),
        Err(ChainError::InvalidDiff)
    ));

    let unsealed = seal(test_chain.next_block(chain, &genesis, vec![]), false);
    assert_eq!(unsealed.header.difficulty, genesis.header.difficulty);
    assert!(matches!(
        service.save_block_without_votes(unsealed),
        Err(ChainError::InvalidHashDiff)
    ));

    let block_1 = seal(test_chain.next_block(chain, &genesis, vec![]), true);
    service.save_block_without_votes(block_1.clone()).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), block_1.hash());

    // Block 2 opens a new period. It came far faster than expected, so its target shrinks.
    let stale = seal(test_chain.next_block(chain, &block_1, vec![]), true);
    assert!(matches!(
        service.save_block_without_votes(stale),
        Err(ChainError::InvalidDiff)
    ));

    let retargeted = next_work_difficulty(
        &test_chain.config.retarget_params(),
        genesis.header.timestamp,
        (block_1.header.timestamp, block_1.header.difficulty),
        1,
    )
    .unwrap();
    assert!(retargeted.to_big().unwrap() < block_1.header.difficulty.to_big().unwrap());
    let harder = Draft {
        difficulty: Some(retargeted),
        ..Draft::default()
    };
    let block_2 = seal(test_chain.build(chain, &block_1, harder), true);
    service.save_block_without_votes(block_2.clone()).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), block_2.hash());
}

#[test]
fn special_blocks_need_no_proof_of_work() {
    setup_logger(LevelFilter::Debug);
    let test_chain = mined_chain();
    let service = test_chain.start(MemDB::new(), MockPool::new());
    let chain = service.chain();
    let genesis = service.current_block().unwrap();

    let special = test_chain.special_block(chain, &genesis);
    service.save_block_without_votes(special.clone()).unwrap();
    assert_eq!(service.current_block().unwrap().hash(), special.hash());
}
