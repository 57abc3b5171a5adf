/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Read access to the chain, as seen by the validation middleware and the block processor.
//!
//! [`ChainReadView`] has a handful of required methods, and derives the rest of the reader surface
//! (headers, bodies, receipts, historical states, slots and verifiers) from them. Implementors that cache
//! (like [`CachedChainState`](super::CachedChainState)) override the derived methods they can answer
//! faster.
//!
//! ## Slots and verifiers
//!
//! The slot of a block is read from the register of its parent: it is the parent's slot, plus one if the
//! parent was the last block of its slot (a change point). The verifiers of slot `s` are elected from the
//! state of the last block of slot `s - slot_margin`. Slots before `slot_margin` use the default verifiers.

use crate::{
    config::ChainConfig,
    errors::ChainError,
    register_db::RegisterDB,
    state::AccountStateDB,
    storage::{
        pluggables::{KVGet, KVStore, TxLookupEntry},
        write_batch::ChainWriteBatch,
    },
    types::{
        address::Address,
        block::{Block, Body, Header},
        data_types::CryptoHash,
        receipt::Receipt,
        transaction::Transaction,
        vote::Vote,
    },
    verifier::Election,
};

pub trait ChainReadView {
    type Store: KVStore;

    fn config(&self) -> &ChainConfig;

    fn kv_store(&self) -> &Self::Store;

    /* ↓↓↓ Blocks ↓↓↓ */

    fn get_block_by_hash(&self, hash: &CryptoHash) -> Result<Option<Block>, ChainError> {
        Ok(self.kv_store().block(hash)?)
    }

    fn get_block_by_number(&self, number: u64) -> Result<Option<Block>, ChainError> {
        match self.kv_store().canonical_hash(number)? {
            Some(hash) => self.get_block_by_hash(&hash),
            None => Ok(None),
        }
    }

    fn get_header_by_hash(&self, hash: &CryptoHash) -> Result<Option<Header>, ChainError> {
        Ok(self.kv_store().header(hash)?)
    }

    fn get_header_by_number(&self, number: u64) -> Result<Option<Header>, ChainError> {
        match self.kv_store().canonical_hash(number)? {
            Some(hash) => self.get_header_by_hash(&hash),
            None => Ok(None),
        }
    }

    /// The body of the block with `hash`, and the votes the block carries.
    fn get_body(&self, hash: &CryptoHash) -> Result<Option<(Body, Vec<Vote>)>, ChainError> {
        match self.get_block_number(hash)? {
            Some(number) => Ok(self.kv_store().body(number, hash)?),
            None => Ok(None),
        }
    }

    fn get_block_number(&self, hash: &CryptoHash) -> Result<Option<u64>, ChainError> {
        Ok(self.kv_store().block_number(hash)?)
    }

    fn get_receipts(&self, hash: &CryptoHash) -> Result<Option<Vec<Receipt>>, ChainError> {
        Ok(self.kv_store().receipts(hash)?)
    }

    /// Find a transaction of the canonical chain by its hash.
    fn get_transaction(
        &self,
        tx_hash: &CryptoHash,
    ) -> Result<Option<(Transaction, TxLookupEntry)>, ChainError> {
        let entry = match self.kv_store().tx_lookup(tx_hash)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let block = match self.get_block_by_hash(&entry.block_hash)? {
            Some(block) => block,
            None => return Ok(None),
        };
        Ok(block
            .transactions()
            .get(entry.index as usize)
            .cloned()
            .map(|tx| (tx, entry)))
    }

    fn genesis(&self) -> Result<Block, ChainError> {
        self.get_block_by_number(0)?.ok_or(ChainError::NoGenesis)
    }

    fn current_block(&self) -> Result<Block, ChainError> {
        let hash = self
            .kv_store()
            .head_block_hash()?
            .ok_or(ChainError::NoGenesis)?;
        self.get_block_by_hash(&hash)?
            .ok_or(ChainError::BlockNotFound)
    }

    fn current_header(&self) -> Result<Header, ChainError> {
        let hash = self
            .kv_store()
            .head_header_hash()?
            .ok_or(ChainError::NoGenesis)?;
        self.get_header_by_hash(&hash)?
            .ok_or(ChainError::BlockNotFound)
    }

    fn current_seed(&self) -> Result<CryptoHash, ChainError> {
        Ok(self.current_block()?.header.seed)
    }

    /// The most recent canonical block that is not special. Falls back to genesis.
    fn get_latest_normal_block(&self) -> Result<Block, ChainError> {
        let mut block = self.current_block()?;
        while block.is_special() && block.number() > 0 {
            block = self
                .get_block_by_number(block.number() - 1)?
                .ok_or(ChainError::BlockNotFound)?;
        }
        Ok(block)
    }

    /* ↓↓↓ State ↓↓↓ */

    fn state_at_by_state_root(
        &self,
        root: CryptoHash,
    ) -> Result<AccountStateDB<Self::Store>, ChainError> {
        AccountStateDB::new(self.kv_store().clone(), root, self.config().state_params())
    }

    fn state_at_by_block_number(
        &self,
        number: u64,
    ) -> Result<AccountStateDB<Self::Store>, ChainError> {
        let header = self
            .get_header_by_number(number)?
            .ok_or(ChainError::BlockNotFound)?;
        self.state_at_by_state_root(header.state_root)
    }

    fn current_state(&self) -> Result<AccountStateDB<Self::Store>, ChainError> {
        self.state_at_by_state_root(self.current_header()?.state_root)
    }

    fn build_register_processor(
        &self,
        root: CryptoHash,
    ) -> Result<RegisterDB<Self::Store>, ChainError> {
        RegisterDB::new(self.kv_store().clone(), root, self.config().slot_size)
    }

    /* ↓↓↓ Slots ↓↓↓ */

    /// The slot `block` belongs to.
    fn get_slot(&self, block: &Block) -> Result<u64, ChainError> {
        if block.number() == 0 {
            return Ok(0);
        }
        let pre_block = self
            .get_block_by_hash(&block.pre_hash())?
            .ok_or(ChainError::PreBlockIsNil)?;
        self.slot_after(&pre_block)
    }

    /// The slot of the canonical block at `number`, or of a block that would extend the canonical block at
    /// `number - 1`.
    fn get_slot_by_num(&self, number: u64) -> Result<u64, ChainError> {
        if number < 1 {
            return Ok(0);
        }
        let pre_block = self
            .get_block_by_number(number - 1)?
            .ok_or(ChainError::BlockNotFound)?;
        self.slot_after(&pre_block)
    }

    /// The slot of any child of `pre_block`.
    fn slot_after(&self, pre_block: &Block) -> Result<u64, ChainError> {
        let register = self.build_register_processor(pre_block.header.register_root)?;
        let slot = register.get_slot()?;
        if register.is_change_point(pre_block, false)? {
            Ok(slot + 1)
        } else {
            Ok(slot)
        }
    }

    /// Whether `block` is the last block of its slot.
    fn is_change_point(&self, block: &Block, is_package: bool) -> Result<bool, ChainError> {
        let register_root = if block.number() == 0 {
            block.header.register_root
        } else {
            self.get_header_by_hash(&block.pre_hash())?
                .ok_or(ChainError::PreBlockIsNil)?
                .register_root
        };
        self.build_register_processor(register_root)?
            .is_change_point(block, is_package)
    }

    /// The number of the last block of the slot before the slot of `block`.
    fn get_last_change_point(&self, block: &Block) -> Result<u64, ChainError> {
        if block.number() == 0 {
            return Ok(0);
        }
        let pre_block = self
            .get_block_by_hash(&block.pre_hash())?
            .ok_or(ChainError::PreBlockIsNil)?;
        if pre_block.is_special() || self.is_change_point(&pre_block, false)? {
            return Ok(pre_block.number());
        }
        self.build_register_processor(pre_block.header.register_root)?
            .get_last_change_point()
    }

    /// The number of the last canonical block of `slot`. `None` if the chain has not reached `slot` yet, or
    /// `slot` is the current slot and its last block is not in yet.
    fn get_num_by_slot(&self, slot: u64) -> Result<Option<u64>, ChainError> {
        let mut block = self.current_block()?;
        let mut current_slot = self.get_slot(&block)?;
        if current_slot < slot {
            return Ok(None);
        }
        if current_slot == slot && !block.is_special() && !self.is_change_point(&block, false)? {
            log::debug!("slot {} is not complete at block {}", slot, block.number());
            return Ok(None);
        }
        while current_slot > slot {
            let last_point = self.get_last_change_point(&block)?;
            block = self
                .get_block_by_number(last_point)?
                .ok_or(ChainError::BlockNotFound)?;
            current_slot = self.get_slot(&block)?;
        }
        Ok(Some(block.number()))
    }

    /// The number of the block the verifiers of `slot` are elected from.
    fn num_before_last_by_slot(&self, slot: u64) -> Result<Option<u64>, ChainError> {
        let slot_margin = self.config().slot_margin;
        if slot < slot_margin {
            return Ok(Some(0));
        }
        self.get_num_by_slot(slot - slot_margin)
    }

    /* ↓↓↓ Verifiers ↓↓↓ */

    fn get_verifiers(&self, slot: u64) -> Result<Vec<Address>, ChainError> {
        if slot < self.config().slot_margin {
            return Ok(self.election().defaults());
        }
        let number = self
            .num_before_last_by_slot(slot)?
            .ok_or(ChainError::NoVerifiersForSlot { slot })?;
        let block = self
            .get_block_by_number(number)?
            .ok_or(ChainError::BlockNotFound)?;
        self.cal_verifiers(&block)
    }

    fn get_curr_verifiers(&self) -> Result<Vec<Address>, ChainError> {
        let slot = self.get_slot(&self.current_block()?)?;
        self.get_verifiers(slot)
    }

    fn get_next_verifiers(&self) -> Result<Vec<Address>, ChainError> {
        let slot = self.get_slot(&self.current_block()?)?;
        self.get_verifiers(slot + 1)
    }

    /// Elect verifiers from the candidates registered at `block`, using its seed as the source of luck.
    fn cal_verifiers(&self, block: &Block) -> Result<Vec<Address>, ChainError> {
        let candidates = self
            .build_register_processor(block.header.register_root)?
            .get_register_data()?;
        let state = self.state_at_by_state_root(block.header.state_root)?;
        self.election()
            .elect(&candidates, &block.header.seed, &state)
    }

    fn election(&self) -> Election<'_> {
        let config = self.config();
        Election {
            verifier_number: config.verifier_number,
            default_verifiers: &config.default_verifiers,
            system_verifier_priority: config.system_verifier_priority,
        }
    }
}

/// A chain that blocks can be inserted into.
pub trait ChainInterface: ChainReadView {
    /// Write `wb` to the store atomically.
    fn write(&self, wb: ChainWriteBatch<<Self::Store as KVStore>::WriteBatch>);

    /// Remember the verifier set of `slot`, computed ahead of time. Chains without a verifier cache
    /// ignore this.
    fn cache_verifiers(&self, _slot: u64, _verifiers: Vec<Address>) {}

    /// Drop every remembered verifier set, after a special block changed the canonical chain.
    fn forget_verifiers(&self) {}
}
