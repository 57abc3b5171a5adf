/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Storage of seen commits: the votes that finalised each block.

use crate::{
    errors::ChainError,
    storage::{
        pluggables::{KVGet, KVStore},
        write_batch::ChainWriteBatch,
    },
    types::{data_types::CryptoHash, vote::Vote},
};

pub trait CacheDB: Send {
    fn get_seen_commits(
        &self,
        height: u64,
        hash: &CryptoHash,
    ) -> Result<Option<Vec<Vote>>, ChainError>;

    fn save_seen_commits(
        &mut self,
        height: u64,
        hash: &CryptoHash,
        votes: &[Vote],
    ) -> Result<(), ChainError>;

    fn delete_seen_commits(&mut self, height: u64, hash: &CryptoHash) -> Result<(), ChainError>;
}

/// Persists seen commits in the chain's own key-value store, under
/// [`SEEN_COMMITS`](crate::storage::variables::SEEN_COMMITS).
#[derive(Clone)]
pub struct KVCacheDB<K: KVStore>(K);

impl<K: KVStore> KVCacheDB<K> {
    pub fn new(kv_store: K) -> KVCacheDB<K> {
        KVCacheDB(kv_store)
    }
}

impl<K: KVStore> CacheDB for KVCacheDB<K> {
    fn get_seen_commits(
        &self,
        height: u64,
        hash: &CryptoHash,
    ) -> Result<Option<Vec<Vote>>, ChainError> {
        Ok(self.0.seen_commits(height, hash)?)
    }

    fn save_seen_commits(
        &mut self,
        height: u64,
        hash: &CryptoHash,
        votes: &[Vote],
    ) -> Result<(), ChainError> {
        let mut wb = ChainWriteBatch::<K::WriteBatch>::new();
        wb.set_seen_commits(height, hash, votes);
        self.0.write(wb.into_inner());
        Ok(())
    }

    fn delete_seen_commits(&mut self, height: u64, hash: &CryptoHash) -> Result<(), ChainError> {
        let mut wb = ChainWriteBatch::<K::WriteBatch>::new();
        wb.delete_seen_commits(height, hash);
        self.0.write(wb.into_inner());
        Ok(())
    }
}
