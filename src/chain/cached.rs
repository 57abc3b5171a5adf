/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [`ChainState`] behind LRU caches of blocks, headers, bodies, slots, and verifier sets.
//!
//! Blocks, headers, bodies and slots are keyed by block hash, and so stay valid across reorgs. Verifier sets
//! are keyed by slot, and are dropped whenever the chain is rolled back.

use std::{hash::Hash, num::NonZeroUsize};

use lru::LruCache;
use parking_lot::Mutex;

use crate::{
    config::ChainConfig,
    errors::ChainError,
    storage::{pluggables::KVStore, write_batch::ChainWriteBatch},
    types::{
        address::Address,
        block::{Block, Body, Header},
        data_types::CryptoHash,
        vote::Vote,
    },
};

use super::{
    chain_state::ChainState,
    genesis::Genesis,
    reader::{ChainInterface, ChainReadView},
};

pub struct CachedChainState<K: KVStore> {
    chain: ChainState<K>,
    blocks: Mutex<LruCache<CryptoHash, Block>>,
    headers: Mutex<LruCache<CryptoHash, Header>>,
    bodies: Mutex<LruCache<CryptoHash, (Body, Vec<Vote>)>>,
    slots: Mutex<LruCache<CryptoHash, u64>>,
    verifiers: Mutex<LruCache<u64, Vec<Address>>>,
}

impl<K: KVStore> CachedChainState<K> {
    pub fn new(kv_store: K, config: ChainConfig) -> CachedChainState<K> {
        let block_capacity = config.block_cache_capacity;
        let verifier_capacity = config.verifier_cache_capacity;
        CachedChainState {
            chain: ChainState::new(kv_store, config),
            blocks: lru_cache(block_capacity),
            headers: lru_cache(block_capacity),
            bodies: lru_cache(block_capacity),
            slots: lru_cache(block_capacity),
            verifiers: lru_cache(verifier_capacity),
        }
    }

    pub fn is_initialized(&self) -> Result<bool, ChainError> {
        self.chain.is_initialized()
    }

    pub fn initialize(&self, genesis: &Genesis) -> Result<(), ChainError> {
        self.chain.initialize(genesis)
    }

    pub fn cached_verifiers(&self, slot: u64) -> Option<Vec<Address>> {
        self.verifiers.lock().get(&slot).cloned()
    }
}

fn lru_cache<K: Hash + Eq, V>(capacity: usize) -> Mutex<LruCache<K, V>> {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
}

impl<K: KVStore> ChainReadView for CachedChainState<K> {
    type Store = K;

    fn config(&self) -> &ChainConfig {
        self.chain.config()
    }

    fn kv_store(&self) -> &K {
        self.chain.kv_store()
    }

    fn get_block_by_hash(&self, hash: &CryptoHash) -> Result<Option<Block>, ChainError> {
        if let Some(block) = self.blocks.lock().get(hash) {
            return Ok(Some(block.clone()));
        }
        let block = self.chain.get_block_by_hash(hash)?;
        if let Some(block) = &block {
            self.blocks.lock().put(*hash, block.clone());
        }
        Ok(block)
    }

    fn get_header_by_hash(&self, hash: &CryptoHash) -> Result<Option<Header>, ChainError> {
        if let Some(header) = self.headers.lock().get(hash) {
            return Ok(Some(header.clone()));
        }
        if let Some(block) = self.blocks.lock().get(hash) {
            return Ok(Some(block.header.clone()));
        }
        let header = self.chain.get_header_by_hash(hash)?;
        if let Some(header) = &header {
            self.headers.lock().put(*hash, header.clone());
        }
        Ok(header)
    }

    fn get_body(&self, hash: &CryptoHash) -> Result<Option<(Body, Vec<Vote>)>, ChainError> {
        if let Some(body) = self.bodies.lock().get(hash) {
            return Ok(Some(body.clone()));
        }
        let body = self.chain.get_body(hash)?;
        if let Some(body) = &body {
            self.bodies.lock().put(*hash, body.clone());
        }
        Ok(body)
    }

    fn get_slot(&self, block: &Block) -> Result<u64, ChainError> {
        let hash = block.hash();
        if let Some(slot) = self.slots.lock().get(&hash) {
            return Ok(*slot);
        }
        let slot = self.chain.get_slot(block)?;
        self.slots.lock().put(hash, slot);
        Ok(slot)
    }

    /// Like the uncached reader, but answers from the verifier cache when it can. A computed set is only
    /// cached once its source block is below the head, since until then a special block may still
    /// replace it.
    fn get_verifiers(&self, slot: u64) -> Result<Vec<Address>, ChainError> {
        if slot < self.config().slot_margin {
            return Ok(self.election().defaults());
        }
        if let Some(verifiers) = self.cached_verifiers(slot) {
            return Ok(verifiers);
        }

        let number = self
            .num_before_last_by_slot(slot)?
            .ok_or(ChainError::NoVerifiersForSlot { slot })?;
        let block = self
            .get_block_by_number(number)?
            .ok_or(ChainError::BlockNotFound)?;
        let verifiers = self.cal_verifiers(&block)?;
        if number < self.current_block()?.number() {
            self.cache_verifiers(slot, verifiers.clone());
        }
        Ok(verifiers)
    }
}

impl<K: KVStore> ChainInterface for CachedChainState<K> {
    fn write(&self, wb: ChainWriteBatch<K::WriteBatch>) {
        self.chain.write(wb)
    }

    fn cache_verifiers(&self, slot: u64, verifiers: Vec<Address>) {
        self.verifiers.lock().put(slot, verifiers);
    }

    fn forget_verifiers(&self) {
        self.verifiers.lock().clear();
    }
}
