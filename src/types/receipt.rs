/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction receipts, logs, and the 2048-bit log bloom.

use std::fmt::{self, Debug, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    address::Address,
    crypto_primitives::keccak256,
    data_types::CryptoHash,
};

pub const BLOOM_BYTE_LENGTH: usize = 256;

/// An event emitted by a transaction.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<CryptoHash>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub tx_hash: CryptoHash,
    pub tx_index: u32,
    /// Position of the log among all logs of the block.
    pub index: u32,
}

/// 2048-bit bloom filter over log addresses and topics.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Bloom([u8; BLOOM_BYTE_LENGTH]);

impl Bloom {
    pub const fn empty() -> Bloom {
        Bloom([0u8; BLOOM_BYTE_LENGTH])
    }

    pub const fn bytes(&self) -> &[u8; BLOOM_BYTE_LENGTH] {
        &self.0
    }

    /// Set the three bits selected by `keccak256(input)`.
    pub fn accrue(&mut self, input: &[u8]) {
        let hash = keccak256(input).bytes();
        for i in [0usize, 2, 4] {
            let bit = ((hash[i] as usize) << 8 | hash[i + 1] as usize) & 2047;
            self.0[BLOOM_BYTE_LENGTH - 1 - bit / 8] |= 1 << (bit % 8);
        }
    }

    pub fn accrue_log(&mut self, log: &Log) {
        self.accrue(&log.address.bytes());
        for topic in &log.topics {
            self.accrue(&topic.bytes());
        }
    }

    pub fn accrue_bloom(&mut self, other: &Bloom) {
        for (byte, other_byte) in self.0.iter_mut().zip(other.0.iter()) {
            *byte |= other_byte;
        }
    }

    /// Whether `input` may have been accrued into this bloom.
    pub fn may_contain(&self, input: &[u8]) -> bool {
        let mut wanted = Bloom::empty();
        wanted.accrue(input);
        wanted
            .0
            .iter()
            .zip(self.0.iter())
            .all(|(wanted_byte, byte)| wanted_byte & byte == *wanted_byte)
    }

    pub fn from_logs(logs: &[Log]) -> Bloom {
        let mut bloom = Bloom::empty();
        logs.iter().for_each(|log| bloom.accrue_log(log));
        bloom
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Bloom::empty()
    }
}

impl Debug for Bloom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Bloom(0x{})", hex::encode(self.0))
    }
}

/// The outcome of applying one transaction.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Receipt {
    pub tx_hash: CryptoHash,
    pub failed: bool,
    /// Total gas used by this and all preceding transactions of the block.
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    /// Intermediate state root right after this transaction.
    pub post_state: CryptoHash,
    pub logs: Vec<Log>,
    pub log_bloom: Bloom,
    /// Set on contract-create transactions.
    pub contract_address: Option<Address>,
}

/// Merge the blooms of all `receipts` into the block-level bloom.
pub fn create_bloom(receipts: &[Receipt]) -> Bloom {
    let mut bloom = Bloom::empty();
    receipts
        .iter()
        .for_each(|receipt| bloom.accrue_bloom(&receipt.log_bloom));
    bloom
}
