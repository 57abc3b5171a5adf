/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Checks on the two vote lists a block comes with.
//!
//! A block carries in its body the votes that committed its parent (`verifications`), committed to by
//! `verification_root`. When it is received from consensus, it also comes with the votes that committed
//! the block itself (its seen commits). Both lists are checked against the verifiers of the slot of the
//! block they vote for.
//!
//! ## Votes on a special block
//!
//! A special block is committed by a verifier boot node alone. The first vote on it must be a
//! [`VerifierBootVote`](VoteType::VerifierBootVote) signed by a boot node. Any vote after it must come from
//! a verifier of the slot.

use std::collections::BTreeSet;

use crate::{
    chain::{ChainInterface, ChainReadView},
    config::ChainConfig,
    errors::ChainError,
    types::{
        address::Address,
        block::Block,
        derive_sha::derive_sha,
        vote::{Vote, VoteType},
    },
};

use super::BlockContext;

pub fn validate_votes<C: ChainInterface>(ctx: &mut BlockContext<'_, C>) -> Result<(), ChainError> {
    let block = ctx.block;
    let chain = ctx.chain;

    if !ctx.seen_commits.is_empty() {
        let verifiers = chain.get_verifiers(chain.get_slot(block)?)?;
        validate_votes_for_block(chain.config(), ctx.seen_commits, block, &verifiers)?;
    }

    // Nothing committed genesis.
    if block.number() == 1 {
        if !block.verifications.is_empty()
            || block.header.verification_root != derive_sha::<Vote>(&[])
        {
            return Err(ChainError::FirstBlockHaveVerifications);
        }
        return Ok(());
    }

    if derive_sha(&block.verifications) != block.header.verification_root {
        return Err(ChainError::VerificationRootNotMatch);
    }
    let pre_block = ctx.pre_block()?;
    let verifiers = chain.get_verifiers(chain.get_slot(pre_block)?)?;
    validate_votes_for_block(chain.config(), &block.verifications, pre_block, &verifiers)
}

/// Check that `votes` commit `block`, given the `verifiers` of its slot.
pub fn validate_votes_for_block(
    config: &ChainConfig,
    votes: &[Vote],
    block: &Block,
    verifiers: &[Address],
) -> Result<(), ChainError> {
    if votes.is_empty() {
        return Err(ChainError::EmptyVoteList);
    }

    let mut signers = BTreeSet::new();
    for vote in votes {
        if !signers.insert(vote.signer()?) {
            return Err(ChainError::SameVoteSignerInVotes);
        }
        if vote.block_hash() != block.hash() {
            return Err(ChainError::InvalidBlockHashInVotes);
        }
    }

    if block.is_special() {
        let boot_vote = &votes[0];
        if boot_vote.vote_type() != VoteType::VerifierBootVote
            || !config.is_boot_node(&boot_vote.witness)
        {
            return Err(ChainError::InvalidFirstVoteInSpecialBlock);
        }
        for vote in &votes[1..] {
            if vote.vote_type() == VoteType::VerifierBootVote || !verifiers.contains(&vote.witness) {
                return Err(ChainError::NotCurrentVerifier);
            }
        }
        return Ok(());
    }

    if votes.len() < config.vote_threshold() {
        return Err(ChainError::BlockVotesNotEnough);
    }
    if let Some(outsider) = votes.iter().find(|vote| !verifiers.contains(&vote.witness)) {
        log::debug!(
            "vote by {} on block {} is not from a verifier of its slot",
            outsider.witness,
            block.number()
        );
        return Err(ChainError::NotCurrentVerifier);
    }
    Ok(())
}
