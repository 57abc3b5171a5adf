/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The ordered chain of checks and state updates that every incoming block runs through.
//!
//! A [`Middleware`] is a plain function over a [`BlockContext`]. The context holds the block being
//! ingested, a borrowed view of the chain it is being inserted into, and whatever intermediate results the
//! steps before it produced (the parent block, the replayed state, the replayed register). Steps run in
//! registration order and the first error aborts the chain. Nothing is written to storage before
//! [`insert_block`](state::insert_block), so a block that fails any check leaves the chain untouched.
//!
//! Three chains are defined, one per [`Variant`]:
//!
//! |Step                         |`Bft`|`BftWithoutVotes`|`Pow`|
//! |-----------------------------|:---:|:---------------:|:---:|
//! |`validate_block_number`      |  ✓  |        ✓        |  ✓  |
//! |`validate_block_difficulty`  |  ✓  |        ✓        |  ✓  |
//! |`validate_block_version`     |  ✓  |        ✓        |     |
//! |`validate_block_hash`        |  ✓  |        ✓        |  ✓  |
//! |`validate_block_coinbase`    |  ✓  |        ✓        |     |
//! |`validate_seed`              |  ✓  |        ✓        |     |
//! |`validate_block_time`        |  ✓  |                 |     |
//! |`validate_gas_limit`         |  ✓  |                 |     |
//! |`validate_block_txs`         |  ✓  |        ✓        |  ✓  |
//! |`validate_votes`             |  ✓  |                 |     |
//! |`update_state_root`          |  ✓  |        ✓        |  ✓  |
//! |`update_block_verifier`      |  ✓  |        ✓        |     |
//! |`valid_gas_used_and_receipts`|  ✓  |                 |     |
//! |`next_round_verifier`        |  ✓  |        ✓        |     |
//! |`insert_block`               |  ✓  |        ✓        |  ✓  |
//!
//! `insert_block` writes everything the block changes, a reorg included, in one batch.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    chain::ChainInterface,
    economy_model::EconomyModel,
    errors::ChainError,
    processor::BlockProcessor,
    register_db::RegisterDB,
    types::{address::Address, block::Block, vote::Vote},
    vm::Vm,
};

pub mod block;

pub mod state;

pub mod txs;

pub mod votes;

/// One step of a validation chain.
pub type Middleware<C> = fn(&mut BlockContext<'_, C>) -> Result<(), ChainError>;

/// Which validation chain a block goes through.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Variant {
    /// Full validation of a block received with the votes that committed it.
    Bft,
    /// Validation of a block fetched during sync, whose votes are not at hand.
    BftWithoutVotes,
    /// Validation of a block of a pure proof-of-work chain, which has no verifier register.
    Pow,
}

impl Variant {
    pub fn middlewares<C: ChainInterface>(&self) -> Vec<Middleware<C>> {
        match self {
            Variant::Bft => vec![
                block::validate_block_number,
                block::validate_block_difficulty,
                block::validate_block_version,
                block::validate_block_hash,
                block::validate_block_coinbase,
                block::validate_seed,
                block::validate_block_time,
                block::validate_gas_limit,
                txs::validate_block_txs,
                votes::validate_votes,
                state::update_state_root,
                state::update_block_verifier,
                state::valid_gas_used_and_receipts,
                state::next_round_verifier,
                state::insert_block,
            ],
            Variant::BftWithoutVotes => vec![
                block::validate_block_number,
                block::validate_block_difficulty,
                block::validate_block_version,
                block::validate_block_hash,
                block::validate_block_coinbase,
                block::validate_seed,
                txs::validate_block_txs,
                state::update_state_root,
                state::update_block_verifier,
                state::next_round_verifier,
                state::insert_block,
            ],
            Variant::Pow => vec![
                block::validate_block_number,
                block::validate_block_difficulty,
                block::validate_block_hash,
                txs::validate_block_txs,
                state::update_state_root,
                state::insert_block,
            ],
        }
    }
}

pub struct BlockContext<'a, C: ChainInterface> {
    pub block: &'a Block,
    pub chain: &'a C,
    pub economy_model: &'a dyn EconomyModel,
    pub vm: &'a dyn Vm,
    /// Votes that committed `block`. Empty when they are not at hand.
    pub seen_commits: &'a [Vote],

    middlewares: Vec<Middleware<C>>,
    index: usize,

    /* ↓↓↓ Produced by the steps ↓↓↓ */
    pre_block: Option<Block>,
    processor: Option<BlockProcessor<C::Store>>,
    register: Option<RegisterDB<C::Store>>,
    displaced: Vec<Block>,
    elected: Option<(u64, Vec<Address>)>,
}

impl<'a, C: ChainInterface> BlockContext<'a, C> {
    pub fn new(
        block: &'a Block,
        chain: &'a C,
        economy_model: &'a dyn EconomyModel,
        vm: &'a dyn Vm,
    ) -> BlockContext<'a, C> {
        BlockContext {
            block,
            chain,
            economy_model,
            vm,
            seen_commits: &[],
            middlewares: Vec::new(),
            index: 0,
            pre_block: None,
            processor: None,
            register: None,
            displaced: Vec::new(),
            elected: None,
        }
    }

    pub fn with_seen_commits(mut self, seen_commits: &'a [Vote]) -> Self {
        self.seen_commits = seen_commits;
        self
    }

    /// Register every step of `variant`, in order.
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.middlewares.extend(variant.middlewares::<C>());
        self
    }

    /// Append `middleware` to the chain.
    pub fn use_middleware(&mut self, middleware: Middleware<C>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Run the chain from its first step.
    pub fn process(&mut self) -> Result<(), ChainError> {
        self.index = 0;
        self.next()
    }

    /// Run every step after the current one. A step may call this to wrap the rest of the chain. Once
    /// it returns the chain is exhausted, and the steps are not run a second time.
    pub fn next(&mut self) -> Result<(), ChainError> {
        while let Some(middleware) = self.middlewares.get(self.index).copied() {
            self.index += 1;
            middleware(self)?;
        }
        Ok(())
    }

    /// Canonical blocks that `insert_block` took off the canonical chain, lowest first.
    pub fn displaced(&self) -> &[Block] {
        &self.displaced
    }

    /// The verifier set `next_round_verifier` elected ahead of time, and the slot it serves.
    pub fn elected(&self) -> Option<&(u64, Vec<Address>)> {
        self.elected.as_ref()
    }

    /// The parent of `block` on the canonical chain, loaded on first use.
    pub(crate) fn pre_block(&mut self) -> Result<&Block, ChainError> {
        if self.pre_block.is_none() {
            let number = self
                .block
                .number()
                .checked_sub(1)
                .ok_or(ChainError::InvalidBlockNum)?;
            let pre_block = self
                .chain
                .get_block_by_number(number)?
                .ok_or(ChainError::PreBlockIsNil)?;
            self.pre_block = Some(pre_block);
        }
        self.pre_block.as_ref().ok_or(ChainError::PreBlockIsNil)
    }
}

/// Nanoseconds since the Unix epoch on the local clock.
pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_nanos() as u64)
        .unwrap_or(0)
}
