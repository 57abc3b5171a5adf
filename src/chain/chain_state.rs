/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The persistent chain: canonical blocks, headers, bodies, receipts, and the head pointer, read straight
//! from the [`KVStore`].

use crate::{
    config::ChainConfig,
    errors::ChainError,
    storage::{
        pluggables::{KVGet, KVStore},
        write_batch::ChainWriteBatch,
    },
};

use super::{
    genesis::Genesis,
    reader::{ChainInterface, ChainReadView},
};

#[derive(Clone)]
pub struct ChainState<K: KVStore> {
    kv_store: K,
    config: ChainConfig,
}

impl<K: KVStore> ChainState<K> {
    pub fn new(kv_store: K, config: ChainConfig) -> ChainState<K> {
        ChainState { kv_store, config }
    }

    /// Whether a genesis block has been written to the store.
    pub fn is_initialized(&self) -> Result<bool, ChainError> {
        Ok(self.kv_store.canonical_hash(0)?.is_some())
    }

    /// Write `genesis` as block 0, unless the store already holds a genesis block.
    pub fn initialize(&self, genesis: &Genesis) -> Result<(), ChainError> {
        if self.is_initialized()? {
            log::debug!("genesis already present, skipping initialization");
            return Ok(());
        }
        let mut wb = ChainWriteBatch::new();
        let block = genesis.apply(&self.config, self.kv_store.clone(), &mut wb)?;
        log::info!("initialized chain with genesis {}", block.hash());
        self.write(wb);
        Ok(())
    }
}

impl<K: KVStore> ChainReadView for ChainState<K> {
    type Store = K;

    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn kv_store(&self) -> &K {
        &self.kv_store
    }
}

impl<K: KVStore> ChainInterface for ChainState<K> {
    fn write(&self, wb: ChainWriteBatch<K::WriteBatch>) {
        let mut kv_store = self.kv_store.clone();
        kv_store.write(wb.into_inner());
    }
}
