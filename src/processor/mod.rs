/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Replays a block on top of its parent's state.
//!
//! A [`BlockProcessor`] is forked from the state root of a block's parent. Processing a block happens in
//! two phases:
//! 1. [`process_except_txs`](BlockProcessor::process_except_txs): pay the block rewards, and update the
//!    participation counters and performance scores of verifiers.
//! 2. [`process_tx`](BlockProcessor::process_tx), once for every transaction in block order, each producing
//!    a [`Receipt`].
//!
//! [`finalise`](BlockProcessor::finalise) then yields the state root the block must carry, and
//! [`commit`](BlockProcessor::commit) writes the new state into a write batch.
//!
//! ## Failures
//!
//! An error returned by either phase rejects the whole block. The only failures a block may contain are
//! contract executions that the VM reports as failed. Those are reverted, keep their nonce and gas
//! payment, and produce a receipt with `failed` set.

use crate::{
    chain::ChainReadView,
    config::ChainConfig,
    economy_model::EconomyModel,
    errors::ChainError,
    state::AccountStateDB,
    storage::pluggables::WriteBatch,
    trie::NodeSource,
    types::{block::Block, data_types::CryptoHash, receipt::Receipt, transaction::Signer},
    vm::Vm,
};

pub mod builtin_contracts;

pub mod rewards;

pub mod transactions;

pub use transactions::{contract_address, intrinsic_gas};

pub struct BlockProcessor<S: NodeSource + Clone> {
    state: AccountStateDB<S>,
    config: ChainConfig,
    signer: Signer,
    gas_used: u64,
    receipts: Vec<Receipt>,
}

impl<S: NodeSource + Clone> BlockProcessor<S> {
    pub fn new(state: AccountStateDB<S>, config: ChainConfig) -> BlockProcessor<S> {
        let signer = config.signer();
        BlockProcessor {
            state,
            config,
            signer,
            gas_used: 0,
            receipts: Vec::new(),
        }
    }

    /// Fork a processor from `state_root` in `source`.
    pub fn fork(source: S, state_root: CryptoHash, config: &ChainConfig) -> Result<Self, ChainError> {
        let state = AccountStateDB::new(source, state_root, config.state_params())?;
        Ok(BlockProcessor::new(state, config.clone()))
    }

    /// Apply `block` in full: rewards and verifier bookkeeping first, then every transaction.
    pub fn process<C: ChainReadView>(
        &mut self,
        block: &Block,
        chain: &C,
        economy_model: &dyn EconomyModel,
        vm: &dyn Vm,
    ) -> Result<(), ChainError> {
        self.process_except_txs(block, chain, economy_model, false)?;
        if block.is_special() {
            return Ok(());
        }
        for (index, tx) in block.transactions().iter().enumerate() {
            self.process_tx(tx, index, &block.header, vm)?;
        }
        log::debug!(
            "processed block {} with {} transactions, gas used {}",
            block.number(),
            block.transactions().len(),
            self.gas_used
        );
        Ok(())
    }

    pub fn state(&self) -> &AccountStateDB<S> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AccountStateDB<S> {
        &mut self.state
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Receipts of the transactions processed so far, in order.
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Total gas used by the transactions processed so far.
    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn finalise(&mut self) -> Result<CryptoHash, ChainError> {
        self.state.finalise()
    }

    pub fn commit(&mut self, wb: &mut impl WriteBatch) -> Result<CryptoHash, ChainError> {
        self.state.commit(wb)
    }

    pub fn into_parts(self) -> (AccountStateDB<S>, Vec<Receipt>) {
        (self.state, self.receipts)
    }
}
