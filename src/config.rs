/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Chain parameters shared by every component of the block ingestion pipeline.
//!
//! A [`ChainConfig`] is built with the builder pattern. Every parameter has a default, so the smallest
//! valid configuration is:
//!
//! ```ignore
//! let config = ChainConfig::builder().build();
//! ```
//!
//! Tests typically shrink slots and switch off difficulty validation:
//!
//! ```ignore
//! let config = ChainConfig::builder()
//!     .slot_size(3)
//!     .verifier_number(4)
//!     .verifier_boot_nodes(vec![boot])
//!     .default_verifiers(defaults)
//!     .ignore_difficulty_validation(true)
//!     .build();
//! ```

use std::time::Duration;

use num_bigint::BigUint;
use typed_builder::TypedBuilder;

use crate::{
    state::StateParams,
    types::{
        address::Address, data_types::Amount, difficulty::RetargetParams, transaction::Signer,
    },
};

#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ChainConfig]. Every parameter is optional and defaults to the
    production value of the chain.
"))]
pub struct ChainConfig {
    /* ↓↓↓ Chain identity ↓↓↓ */
    #[builder(default = 0, setter(doc = "Set the block version every block must carry. Optional."))]
    pub version: u64,
    #[builder(default = 1, setter(doc = "Set the chain ID that transaction signatures are bound to. Optional."))]
    pub chain_id: u64,

    /* ↓↓↓ Slots and verifiers ↓↓↓ */
    #[builder(default = 110, setter(doc = "Set the number of blocks in a slot (verifier round). Optional."))]
    pub slot_size: u64,
    #[builder(default = 4, setter(doc = "Set how many slots stake stays locked after a cancel transaction. Optional."))]
    pub stake_lock_slot: u64,
    #[builder(default = 2, setter(doc = "Set how many slots ahead the verifiers of a slot are elected. Optional."))]
    pub slot_margin: u64,
    #[builder(default = 22, setter(doc = "Set the number of verifiers in every slot. Optional."))]
    pub verifier_number: usize,
    #[builder(default = 0, setter(doc = "Set the priority given to default verifiers that pad an elected set. Optional."))]
    pub system_verifier_priority: u64,
    #[builder(default, setter(doc = "Set the addresses of the verifier boot nodes, which sign special blocks. Optional."))]
    pub verifier_boot_nodes: Vec<Address>,
    #[builder(default, setter(doc = "Set the default verifiers, used for the first slots and for padding elected sets. Optional."))]
    pub default_verifiers: Vec<Address>,
    #[builder(default = Amount::from(100u64), setter(doc = "Set the minimum amount every stake transaction must pledge. Optional."))]
    pub min_pledge_value: Amount,
    #[builder(default = 30, setter(doc = "Set the performance score of new accounts. Optional."))]
    pub performance_initial: u64,
    #[builder(default = 100, setter(doc = "Set the upper bound of performance scores. Optional."))]
    pub performance_max: u64,

    /* ↓↓↓ Proof of work ↓↓↓ */
    #[builder(default = (BigUint::from(1u8) << 253u32) - 1u8, setter(doc = "Set the easiest allowed PoW target. Optional."))]
    pub main_pow_limit: BigUint,
    #[builder(default = 13, setter(doc = "Set the expected number of seconds between blocks. Optional."))]
    pub block_generate_secs: u64,
    #[builder(default = 4096, setter(doc = "Set the number of blocks in a difficulty retargeting period. Optional."))]
    pub block_count_of_period: u64,
    #[builder(default = false, setter(doc = "Skip difficulty validation of normal blocks. Meant for tests. Optional."))]
    pub ignore_difficulty_validation: bool,

    /* ↓↓↓ Time and height ↓↓↓ */
    #[builder(default = Duration::from_secs(15), setter(doc = "Set how far ahead of the local clock a block timestamp may be. Optional."))]
    pub block_time_restriction: Duration,
    #[builder(default = Duration::from_secs(30), setter(doc = "Set how far in the future a queued block's timestamp may be. Optional."))]
    pub max_future_window: Duration,
    #[builder(default = 3, setter(doc = "Set how many blocks below the head a special block may replace. Optional."))]
    pub rollback_limit: u64,

    /* ↓↓↓ Gas ↓↓↓ */
    #[builder(default = 5000, setter(doc = "Set the lowest allowed block gas limit. Optional."))]
    pub min_gas_limit: u64,
    #[builder(default = 3_360_000_000, setter(doc = "Set the highest allowed block gas limit. Optional."))]
    pub max_gas_limit: u64,
    #[builder(default = 1024, setter(doc = "Set the bound divisor of gas limit changes between consecutive blocks. Optional."))]
    pub gas_limit_bound_divisor: u64,
    #[builder(default = 21_000, setter(doc = "Set the intrinsic gas of a transaction. Optional."))]
    pub tx_gas: u64,
    #[builder(default = 53_000, setter(doc = "Set the intrinsic gas of a contract creation. Optional."))]
    pub tx_gas_contract_creation: u64,
    #[builder(default = 4, setter(doc = "Set the intrinsic gas per zero byte of transaction data. Optional."))]
    pub tx_data_zero_gas: u64,
    #[builder(default = 68, setter(doc = "Set the intrinsic gas per non-zero byte of transaction data. Optional."))]
    pub tx_data_non_zero_gas: u64,
    #[builder(default = 24_576, setter(doc = "Set the maximum size of contract code. Optional."))]
    pub max_code_size: usize,
    #[builder(default = 1024, setter(doc = "Set the maximum depth of nested contract calls. Optional."))]
    pub call_create_depth: usize,
    #[builder(default = 2 * 1024 * 1024, setter(doc = "Set the maximum encoded size of a block. Optional."))]
    pub max_block_size: usize,

    /* ↓↓↓ Caches and the future-block queue ↓↓↓ */
    #[builder(default = 256, setter(doc = "Set the capacity of the future-block queue. Optional."))]
    pub max_future_blocks: usize,
    #[builder(default = Duration::from_secs(5), setter(doc = "Set the period of the future-block drainer. Optional."))]
    pub future_block_tick: Duration,
    #[builder(default = 256, setter(doc = "Set the capacity of the block, header, and body caches. Optional."))]
    pub block_cache_capacity: usize,
    #[builder(default = 64, setter(doc = "Set the capacity of the verifier and slot caches. Optional."))]
    pub verifier_cache_capacity: usize,
}

impl ChainConfig {
    pub fn signer(&self) -> Signer {
        Signer::new(self.chain_id)
    }

    pub fn state_params(&self) -> StateParams {
        StateParams {
            performance_initial: self.performance_initial,
            performance_max: self.performance_max,
        }
    }

    pub fn retarget_params(&self) -> RetargetParams {
        RetargetParams {
            block_count_of_period: self.block_count_of_period,
            block_generate_secs: self.block_generate_secs,
            main_pow_limit: self.main_pow_limit.clone(),
        }
    }

    /// Number of blocks after a cancel transaction before stake can be withdrawn.
    pub fn cancel_cooldown(&self) -> u64 {
        self.stake_lock_slot * self.slot_size
    }

    /// Number of votes that commit a block.
    pub fn vote_threshold(&self) -> usize {
        self.verifier_number * 2 / 3 + 1
    }

    pub fn is_boot_node(&self, address: &Address) -> bool {
        self.verifier_boot_nodes.contains(address)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig::builder().build()
    }
}
