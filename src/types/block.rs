/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definition of the [`Block`] type, its [`Header`] and [`Body`].

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    address::Address,
    crypto_primitives::keccak256,
    data_types::{encode, BlockNonce, CryptoHash},
    difficulty::Difficulty,
    receipt::Bloom,
    transaction::Transaction,
    vote::Vote,
};
use crate::errors::ChainError;

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Header {
    pub version: u64,
    pub number: u64,
    pub pre_hash: CryptoHash,
    /// VRF output of the miner over the parent's seed.
    pub seed: CryptoHash,
    /// VRF proof of `seed`.
    pub proof: Vec<u8>,
    /// sr25519 public key of the miner. Its normal address must equal `coinbase`.
    pub miner_pubkey: Vec<u8>,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
    pub coinbase: Address,
    pub difficulty: Difficulty,
    pub nonce: BlockNonce,
    pub state_root: CryptoHash,
    pub register_root: CryptoHash,
    pub tx_root: CryptoHash,
    pub receipt_root: CryptoHash,
    pub verification_root: CryptoHash,
    pub bloom_log: Bloom,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub interlink_root: CryptoHash,
}

impl Header {
    pub fn hash(&self) -> CryptoHash {
        keccak256(&encode(self))
    }

    /// A header is special iff both its difficulty and its nonce are zero.
    pub fn is_special(&self) -> bool {
        self.difficulty.is_zero() && self.nonce.is_zero()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct Body {
    pub transactions: Vec<Transaction>,
    /// `interlinks[i]` is the hash of the latest ancestor whose hash beats its target by at least `i`
    /// leading zero bits.
    pub interlinks: Vec<CryptoHash>,
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: Header,
    pub body: Body,
    /// Votes that committed the parent block.
    pub verifications: Vec<Vote>,
}

impl Block {
    pub fn new(header: Header, body: Body, verifications: Vec<Vote>) -> Block {
        Block {
            header,
            body,
            verifications,
        }
    }

    pub fn hash(&self) -> CryptoHash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn pre_hash(&self) -> CryptoHash {
        self.header.pre_hash
    }

    pub fn is_special(&self) -> bool {
        self.header.is_special()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    pub fn size(&self) -> usize {
        encode(self).len()
    }

    pub fn decode(bytes: &[u8]) -> Result<Block, ChainError> {
        Block::deserialize(&mut &*bytes).map_err(|source| ChainError::Decode {
            what: "block",
            source,
        })
    }

    /// The interlinks a child of this block must carry.
    ///
    /// A special child copies this block's interlinks. A normal child replaces the first `level + 1`
    /// entries with this block's hash, where `level` is how many leading zero bits this block's hash has
    /// beyond those its target requires.
    pub fn child_interlinks(&self, child_is_special: bool) -> Vec<CryptoHash> {
        let mut interlinks = self.body.interlinks.clone();
        if child_is_special || self.is_special() {
            return interlinks;
        }

        let level = match self.header.difficulty.to_target() {
            Ok(target) => leading_zero_bits(&self.hash())
                .saturating_sub(leading_zero_bits(&target)) as usize,
            Err(_) => 0,
        };
        if interlinks.len() <= level {
            interlinks.resize(level + 1, CryptoHash::zero());
        }
        interlinks[..=level]
            .iter_mut()
            .for_each(|link| *link = self.hash());
        interlinks
    }
}

fn leading_zero_bits(hash: &CryptoHash) -> u32 {
    let mut count = 0;
    for byte in hash.bytes() {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}
