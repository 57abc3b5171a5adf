/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Typed write handle over a user-provided [`WriteBatch`].
//!
//! Every write of a block (its header, body, receipts, canonical index entries, seen commits, and the
//! dirty nodes of the block-state and register tries) goes into one `ChainWriteBatch`, which is then
//! written to the [`KVStore`](super::pluggables::KVStore) atomically.

use crate::types::{
    block::Block,
    data_types::{encode, CryptoHash},
    receipt::Receipt,
    vote::Vote,
};

use super::{
    pluggables::{body_key, seen_commits_key, TxLookupEntry, WriteBatch},
    variables::{self, concat},
};

pub struct ChainWriteBatch<W: WriteBatch>(pub(crate) W);

impl<W: WriteBatch> ChainWriteBatch<W> {
    pub fn new() -> ChainWriteBatch<W> {
        ChainWriteBatch(W::new())
    }

    pub fn into_inner(self) -> W {
        self.0
    }

    /* ↓↓↓ Block ↓↓↓  */

    /// Write the header, body, verifications and number of `block`. Does not touch the canonical index.
    pub fn set_block(&mut self, block: &Block) {
        let hash = block.hash();
        self.0
            .set(&concat(&variables::HEADER, &hash.bytes()), &encode(&block.header));
        self.0.set(
            &body_key(block.number(), &hash),
            &encode(&(&block.body, &block.verifications)),
        );
        self.0.set(
            &concat(&variables::BLOCK_NUMBER, &hash.bytes()),
            &encode(&block.number()),
        );
    }

    pub fn delete_block(&mut self, block: &Block) {
        let hash = block.hash();
        self.0.delete(&concat(&variables::HEADER, &hash.bytes()));
        self.0.delete(&body_key(block.number(), &hash));
        self.0.delete(&concat(&variables::BLOCK_NUMBER, &hash.bytes()));
        self.0.delete(&concat(&variables::RECEIPTS, &hash.bytes()));
    }

    pub fn set_receipts(&mut self, block: &CryptoHash, receipts: &[Receipt]) {
        self.0.set(
            &concat(&variables::RECEIPTS, &block.bytes()),
            &encode(&receipts.to_vec()),
        );
    }

    /* ↓↓↓ Canonical chain ↓↓↓ */

    pub fn set_canonical_hash(&mut self, number: u64, hash: &CryptoHash) {
        self.0.set(
            &concat(&variables::CANONICAL_HASH, &number.to_be_bytes()),
            &encode(hash),
        );
    }

    pub fn delete_canonical_hash(&mut self, number: u64) {
        self.0
            .delete(&concat(&variables::CANONICAL_HASH, &number.to_be_bytes()));
    }

    /// Point both the head block and the head header at `hash`.
    pub fn set_head(&mut self, hash: &CryptoHash) {
        self.0.set(variables::HEAD_BLOCK, &encode(hash));
        self.0.set(variables::HEAD_HEADER, &encode(hash));
    }

    /// Index every transaction of `block` by its hash.
    pub fn set_tx_lookups(&mut self, block: &Block) {
        let block_hash = block.hash();
        for (index, tx) in block.transactions().iter().enumerate() {
            let entry = TxLookupEntry {
                block_hash,
                block_number: block.number(),
                index: index as u64,
            };
            self.0.set(
                &concat(&variables::TX_LOOKUP, &tx.hash().bytes()),
                &encode(&entry),
            );
        }
    }

    pub fn delete_tx_lookups(&mut self, block: &Block) {
        for tx in block.transactions() {
            self.0
                .delete(&concat(&variables::TX_LOOKUP, &tx.hash().bytes()));
        }
    }

    /* ↓↓↓ Seen commits ↓↓↓ */

    pub fn set_seen_commits(&mut self, height: u64, hash: &CryptoHash, votes: &[Vote]) {
        self.0
            .set(&seen_commits_key(height, hash), &encode(&votes.to_vec()));
    }

    pub fn delete_seen_commits(&mut self, height: u64, hash: &CryptoHash) {
        self.0.delete(&seen_commits_key(height, hash));
    }
}

impl<W: WriteBatch> Default for ChainWriteBatch<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trie nodes are committed straight through a `ChainWriteBatch`, so that they land in the same atomic
/// write as the block that produced them.
impl<W: WriteBatch> WriteBatch for ChainWriteBatch<W> {
    fn new() -> Self {
        ChainWriteBatch(W::new())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.0.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) {
        self.0.delete(key)
    }
}
