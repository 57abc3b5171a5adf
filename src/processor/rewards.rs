/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Block rewards and verifier bookkeeping.

use crate::{
    chain::ChainReadView,
    economy_model::EconomyModel,
    errors::ChainError,
    trie::NodeSource,
    types::block::Block,
};

use super::BlockProcessor;

/// Performance change of a verifier whose commit count grew during a slot.
pub const PERFORMANCE_REWARD: i64 = 1;

/// Performance change of a verifier that committed nothing during a slot.
pub const PERFORMANCE_PENALTY: i64 = -10;

impl<S: NodeSource + Clone> BlockProcessor<S> {
    /// Pay the rewards of `block` and update the counters of the verifiers of its parent.
    ///
    /// `is_package` is set when the block is being assembled by a miner rather than validated, which
    /// stops a special block from being treated as a change point.
    pub fn process_except_txs<C: ChainReadView>(
        &mut self,
        block: &Block,
        chain: &C,
        economy_model: &dyn EconomyModel,
        is_package: bool,
    ) -> Result<(), ChainError> {
        if block.number() == 0 {
            return Ok(());
        }
        let pre_block = chain
            .get_block_by_hash(&block.pre_hash())?
            .ok_or(ChainError::PreBlockIsNil)?;

        self.do_rewards(block, &pre_block, economy_model)?;
        self.process_commit_list(block, &pre_block, chain, is_package)
    }

    fn do_rewards(
        &mut self,
        block: &Block,
        pre_block: &Block,
        economy_model: &dyn EconomyModel,
    ) -> Result<(), ChainError> {
        if !block.is_special() {
            let reward = economy_model.mine_master_reward(block);
            self.credit(&block.header.coinbase, &reward)?;
        }

        if block.number() >= 2 {
            let reward = economy_model.verifier_reward(pre_block);
            for vote in &block.verifications {
                self.credit(&vote.signer()?, &reward)?;
            }
        }
        Ok(())
    }

    fn process_commit_list<C: ChainReadView>(
        &mut self,
        block: &Block,
        pre_block: &Block,
        chain: &C,
        is_package: bool,
    ) -> Result<(), ChainError> {
        let pre_slot = chain.get_slot(pre_block)?;
        let verifiers = chain.get_verifiers(pre_slot)?;
        for verifier in &verifiers {
            self.state.process_verifier_number(verifier)?;
        }

        // The first vote on a special parent is the boot node's.
        let skip = usize::from(pre_block.is_special());
        for vote in block.verifications.iter().skip(skip) {
            self.state.process_verification(&vote.signer()?)?;
        }

        let slot = chain.get_slot(block)?;
        if !chain.is_change_point(block, is_package)? || slot < self.config.slot_margin {
            return Ok(());
        }

        let first_state = if chain.is_change_point(pre_block, false)? {
            chain.state_at_by_state_root(pre_block.header.state_root)?
        } else {
            let last_point = chain.get_last_change_point(block)?;
            chain.state_at_by_block_number(last_point + 1)?
        };
        for verifier in &verifiers {
            let commit_num = self.state.get_commit_num(verifier)?;
            let first_commit_num = first_state.get_commit_num(verifier)?;
            let delta = if commit_num > first_commit_num {
                PERFORMANCE_REWARD
            } else {
                PERFORMANCE_PENALTY
            };
            self.state.process_performance(verifier, delta)?;
        }
        log::debug!(
            "updated performance of {} verifiers at the end of slot {}",
            verifiers.len(),
            slot
        );
        Ok(())
    }
}
