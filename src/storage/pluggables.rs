/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable chain persistence.
//!
//! Library users provide an ordered key-value store by implementing [`KVStore`]. Everything this crate
//! persists (blocks, receipts, the canonical-number index, seen commits, and the nodes of every trie)
//! goes through this interface, at the keys described in [`variables`](super::variables).

use std::fmt::{self, Display};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::{Block, Body, Header},
    data_types::CryptoHash,
    receipt::Receipt,
    vote::Vote,
};

use super::variables::{self, concat};

pub trait KVStore: KVGet + Clone + Send + Sync + 'static {
    type WriteBatch: WriteBatch;
    type Snapshot<'a>: 'a + KVGet;

    fn write(&mut self, wb: Self::WriteBatch);
    fn snapshot<'b>(&'b self) -> Self::Snapshot<'_>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// All key-value pairs whose key starts with `prefix`, in key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;

    /// Get the value at `key` and deserialize it, describing `key` with `describe` in errors.
    fn get_value<T: BorshDeserialize>(
        &self,
        key: &[u8],
        describe: impl FnOnce() -> Key,
    ) -> Result<Option<T>, KVGetError> {
        match self.get(key) {
            None => Ok(None),
            Some(bytes) => T::deserialize(&mut bytes.as_slice())
                .map(Some)
                .map_err(|source| KVGetError::DeserializeValueError {
                    key: describe(),
                    source,
                }),
        }
    }

    /* ↓↓↓ Block ↓↓↓  */

    fn block(&self, hash: &CryptoHash) -> Result<Option<Block>, KVGetError> {
        let number = match self.block_number(hash)? {
            Some(number) => number,
            None => return Ok(None),
        };

        // Safety: if a block number is stored for a hash, then its header and body are stored too.
        let header = self
            .header(hash)?
            .ok_or(KVGetError::ValueExpectedButNotFound {
                key: Key::Header { block: *hash },
            })?;
        let (body, verifications) =
            self.body(number, hash)?
                .ok_or(KVGetError::ValueExpectedButNotFound {
                    key: Key::BlockBody { block: *hash },
                })?;

        Ok(Some(Block::new(header, body, verifications)))
    }

    fn header(&self, hash: &CryptoHash) -> Result<Option<Header>, KVGetError> {
        self.get_value(&concat(&variables::HEADER, &hash.bytes()), || Key::Header {
            block: *hash,
        })
    }

    fn body(
        &self,
        number: u64,
        hash: &CryptoHash,
    ) -> Result<Option<(Body, Vec<Vote>)>, KVGetError> {
        self.get_value(&body_key(number, hash), || Key::BlockBody { block: *hash })
    }

    fn block_number(&self, hash: &CryptoHash) -> Result<Option<u64>, KVGetError> {
        self.get_value(&concat(&variables::BLOCK_NUMBER, &hash.bytes()), || {
            Key::BlockNumber { block: *hash }
        })
    }

    fn receipts(&self, hash: &CryptoHash) -> Result<Option<Vec<Receipt>>, KVGetError> {
        self.get_value(&concat(&variables::RECEIPTS, &hash.bytes()), || {
            Key::Receipts { block: *hash }
        })
    }

    /* ↓↓↓ Canonical chain ↓↓↓ */

    fn canonical_hash(&self, number: u64) -> Result<Option<CryptoHash>, KVGetError> {
        self.get_value(
            &concat(&variables::CANONICAL_HASH, &number.to_be_bytes()),
            || Key::CanonicalHash { number },
        )
    }

    fn head_block_hash(&self) -> Result<Option<CryptoHash>, KVGetError> {
        self.get_value(variables::HEAD_BLOCK, || Key::HeadBlock)
    }

    fn head_header_hash(&self) -> Result<Option<CryptoHash>, KVGetError> {
        self.get_value(variables::HEAD_HEADER, || Key::HeadHeader)
    }

    /* ↓↓↓ Seen commits ↓↓↓ */

    fn seen_commits(
        &self,
        height: u64,
        hash: &CryptoHash,
    ) -> Result<Option<Vec<Vote>>, KVGetError> {
        self.get_value(&seen_commits_key(height, hash), || Key::SeenCommits {
            height,
            block: *hash,
        })
    }

    /* ↓↓↓ Tx lookup ↓↓↓ */

    fn tx_lookup(&self, tx_hash: &CryptoHash) -> Result<Option<TxLookupEntry>, KVGetError> {
        self.get_value(&concat(&variables::TX_LOOKUP, &tx_hash.bytes()), || {
            Key::TxLookup { tx: *tx_hash }
        })
    }

    /* ↓↓↓ Trie nodes ↓↓↓ */

    fn trie_node(&self, hash: &CryptoHash) -> Option<Vec<u8>> {
        self.get(&concat(&variables::TRIE_NODES, &hash.bytes()))
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Where a transaction lives in the canonical chain.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct TxLookupEntry {
    pub block_hash: CryptoHash,
    pub block_number: u64,
    pub index: u64,
}

pub(crate) fn body_key(number: u64, hash: &CryptoHash) -> Vec<u8> {
    concat(
        &concat(&variables::BLOCK_BODY, &number.to_be_bytes()),
        &hash.bytes(),
    )
}

pub(crate) fn seen_commits_key(height: u64, hash: &CryptoHash) -> Vec<u8> {
    concat(
        &concat(&variables::SEEN_COMMITS, &height.to_be_bytes()),
        &hash.bytes(),
    )
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found, although another stored value implies
///    that it must exist.
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
    ValueExpectedButNotFound { key: Key },
}

impl Display for KVGetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KVGetError::DeserializeValueError { key, source } => {
                write!(f, "failed to deserialize {}: {}", key, source)
            }
            KVGetError::ValueExpectedButNotFound { key } => {
                write!(f, "expected {} but found nothing", key)
            }
        }
    }
}

impl std::error::Error for KVGetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KVGetError::DeserializeValueError { source, .. } => Some(source),
            KVGetError::ValueExpectedButNotFound { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum Key {
    Header { block: CryptoHash },
    BlockBody { block: CryptoHash },
    BlockNumber { block: CryptoHash },
    Receipts { block: CryptoHash },
    CanonicalHash { number: u64 },
    HeadBlock,
    HeadHeader,
    SeenCommits { height: u64, block: CryptoHash },
    TxLookup { tx: CryptoHash },
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            &Key::Header { block } => write!(f, "Header for block {}", block),
            &Key::BlockBody { block } => write!(f, "Body for block {}", block),
            &Key::BlockNumber { block } => write!(f, "Block number for block {}", block),
            &Key::Receipts { block } => write!(f, "Receipts for block {}", block),
            &Key::CanonicalHash { number } => write!(f, "Canonical block at number {}", number),
            &Key::HeadBlock => write!(f, "Head block"),
            &Key::HeadHeader => write!(f, "Head header"),
            &Key::SeenCommits { height, block } => {
                write!(f, "Seen commits at height {} for block {}", height, block)
            }
            &Key::TxLookup { tx } => write!(f, "Lookup entry for transaction {}", tx),
        }
    }
}
