/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Block rewards and locked balances.
//!
//! Reward tables are a policy decision outside of the ingestion pipeline, so the pipeline only consumes
//! them through the [`EconomyModel`] trait. [`FixedRewardModel`] is a simple policy that pays a constant
//! reward per block.

use std::collections::BTreeMap;

use num_bigint::BigUint;

use crate::types::{address::Address, block::Block, data_types::Amount};

pub trait EconomyModel: Send + Sync {
    /// Reward credited to the coinbase of a normal `block`.
    fn mine_master_reward(&self, block: &Block) -> Amount;

    /// Reward credited to each verifier that voted for `block`.
    fn verifier_reward(&self, block: &Block) -> Amount;

    /// Part of the balance of `address` that may not be spent at `height`.
    fn locked_money(&self, address: &Address, height: u64) -> Amount;
}

/// Pays `block_reward` per block: `mine_master_proportion` percent to the miner, and the rest split
/// evenly between `verifier_number` verifiers.
#[derive(Clone, Debug)]
pub struct FixedRewardModel {
    block_reward: Amount,
    mine_master_proportion: u64,
    verifier_number: usize,
    /// Balances that unlock at a given height.
    locks: BTreeMap<Address, (Amount, u64)>,
}

impl FixedRewardModel {
    pub fn new(block_reward: Amount, mine_master_proportion: u64, verifier_number: usize) -> Self {
        FixedRewardModel {
            block_reward,
            mine_master_proportion: mine_master_proportion.min(100),
            verifier_number: verifier_number.max(1),
            locks: BTreeMap::new(),
        }
    }

    /// Lock `amount` of the balance of `address` until (and excluding) `unlock_height`.
    pub fn with_lock(mut self, address: Address, amount: Amount, unlock_height: u64) -> Self {
        self.locks.insert(address, (amount, unlock_height));
        self
    }

    fn proportion(&self, percent: u64) -> BigUint {
        self.block_reward.int() * BigUint::from(percent) / BigUint::from(100u8)
    }
}

impl Default for FixedRewardModel {
    fn default() -> Self {
        FixedRewardModel::new(Amount::from(20_000_000_000u64), 87, 22)
    }
}

impl EconomyModel for FixedRewardModel {
    fn mine_master_reward(&self, block: &Block) -> Amount {
        if block.is_special() {
            return Amount::zero();
        }
        Amount::new(self.proportion(self.mine_master_proportion))
    }

    fn verifier_reward(&self, _block: &Block) -> Amount {
        let share = self.proportion(100 - self.mine_master_proportion);
        Amount::new(share / BigUint::from(self.verifier_number))
    }

    fn locked_money(&self, address: &Address, height: u64) -> Amount {
        match self.locks.get(address) {
            Some((amount, unlock_height)) if height < *unlock_height => amount.clone(),
            _ => Amount::zero(),
        }
    }
}

/// Pays nothing and locks nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRewardModel;

impl EconomyModel for NoRewardModel {
    fn mine_master_reward(&self, _block: &Block) -> Amount {
        Amount::zero()
    }

    fn verifier_reward(&self, _block: &Block) -> Amount {
        Amount::zero()
    }

    fn locked_money(&self, _address: &Address, _height: u64) -> Amount {
        Amount::zero()
    }
}
