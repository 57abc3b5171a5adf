/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Compact proof-of-work difficulty and retargeting.
//!
//! A [`Difficulty`] is a 4-byte compact number: one exponent byte `e` followed by three mantissa bytes.
//! It expands into the 256-bit big-endian target whose bytes `[32 - e .. 32 - e + 3]` hold the mantissa.
//! A block's hash, read as a big-endian integer, satisfies its difficulty iff it is `<=` that target.

use std::fmt::{self, Debug, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};
use num_bigint::BigUint;
use num_traits::Zero;

use super::data_types::CryptoHash;
use crate::errors::ChainError;

/// The difficulty used when difficulty validation is switched off by configuration.
pub const IGNORED_DIFFICULTY: Difficulty = Difficulty([0x1f, 0xff, 0xff, 0xff]);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, BorshSerialize, BorshDeserialize)]
pub struct Difficulty([u8; 4]);

impl Difficulty {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 4])
    }

    pub const fn bytes(&self) -> [u8; 4] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 4]
    }

    /// Expand into a 256-bit target.
    ///
    /// Fails with `InvalidDiff` if the exponent does not leave room for the three mantissa bytes inside
    /// 32 bytes (exponent `< 3` or `> 32`).
    pub fn to_target(&self) -> Result<CryptoHash, ChainError> {
        let exponent = self.0[0] as usize;
        if exponent < 3 || exponent > 32 {
            return Err(ChainError::InvalidDiff);
        }
        let offset = 32 - exponent;
        let mut target = [0u8; 32];
        target[offset..offset + 3].copy_from_slice(&self.0[1..4]);
        Ok(CryptoHash::new(target))
    }

    pub fn to_big(&self) -> Result<BigUint, ChainError> {
        Ok(BigUint::from_bytes_be(&self.to_target()?.bytes()))
    }

    /// Compact a 256-bit target into a `Difficulty`.
    pub fn from_target(target: &BigUint) -> Difficulty {
        if target.is_zero() {
            return Difficulty::zero();
        }

        let bytes = target.to_bytes_be();
        let mut exponent = bytes.len() as u32;
        let mut mantissa: u32 = if exponent <= 3 {
            let mut buf = [0u8; 4];
            buf[4 - bytes.len()..].copy_from_slice(&bytes);
            u32::from_be_bytes(buf) << (8 * (3 - exponent))
        } else {
            u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
        };

        // The top mantissa bit is a sign bit in the compact form.
        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            exponent += 1;
        }

        Difficulty(((exponent << 24) | mantissa).to_be_bytes())
    }

    /// Whether `hash`, read as a big-endian integer, is at most the target of this difficulty.
    pub fn is_satisfied_by(&self, hash: &CryptoHash) -> Result<bool, ChainError> {
        Ok(hash.bytes() <= self.to_target()?.bytes())
    }
}

impl Debug for Difficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Parameters of the retargeting rule.
#[derive(Clone, Debug)]
pub struct RetargetParams {
    pub block_count_of_period: u64,
    pub block_generate_secs: u64,
    pub main_pow_limit: BigUint,
}

impl RetargetParams {
    /// The expected duration of one period, in seconds.
    pub fn target_timespan(&self) -> u64 {
        self.block_count_of_period * self.block_generate_secs
    }

    /// The number of the last block of the period that `number` belongs to.
    pub fn last_period_block_num(&self, number: u64) -> u64 {
        number / self.block_count_of_period * self.block_count_of_period
    }
}

/// Compute the difficulty that block `current_number + 1` must carry.
///
/// `pre_span_timestamp` is the timestamp (nanoseconds) of the last block of the previous retargeting
/// span, and `last_normal` is the `(timestamp, difficulty)` of the latest non-special block.
pub fn next_work_difficulty(
    params: &RetargetParams,
    pre_span_timestamp: u64,
    last_normal: (u64, Difficulty),
    current_number: u64,
) -> Result<Difficulty, ChainError> {
    let (last_timestamp, last_difficulty) = last_normal;
    if (current_number + 1) % params.block_count_of_period != 0 {
        return Ok(last_difficulty);
    }

    let expected = params.target_timespan();
    let actual = (last_timestamp.saturating_sub(pre_span_timestamp) / 1_000_000_000)
        .clamp(expected / 4, expected * 4);

    let last_target = last_difficulty.to_big()?;
    let mut new_target = last_target * BigUint::from(actual) / BigUint::from(expected);
    if new_target > params.main_pow_limit {
        new_target = params.main_pow_limit.clone();
    }

    Ok(Difficulty::from_target(&new_target))
}
