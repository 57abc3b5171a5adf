/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The election priority of a candidate verifier.
//!
//! A candidate's *reputation* is a weighted sum of three saturating curves, one over each of its stake,
//! its nonce (how active it has been), and its performance score. Its *priority* scales the reputation by
//! the cube of a VRF-derived luck byte, so that the same reputation does not always win.

use crate::types::{
    address::Address,
    crypto_primitives::keccak256,
    data_types::{Amount, CryptoHash},
};

/// Output range of each reputation curve.
const SCALE: f64 = 10_000.0;

/// Candidates with less stake than this have no reputation.
pub const STAKE_VALUE_MIN: f64 = 100.0;

const STAKE_CURVE: Curve = Curve {
    knee: 10_000.0,
    steepness: 0.001,
    midpoint: 1_000.0,
};

const NONCE_CURVE: Curve = Curve {
    knee: 100.0,
    steepness: 0.008,
    midpoint: 500.0,
};

const PERFORMANCE_CURVE: Curve = Curve {
    knee: 1.0,
    steepness: 5.0,
    midpoint: 0.1,
};

const STAKE_WEIGHT: f64 = 0.2;
const NONCE_WEIGHT: f64 = 0.1;
const PERFORMANCE_WEIGHT: f64 = 0.7;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PriorityError {
    #[error("stake {stake} is below the minimum of {}", STAKE_VALUE_MIN)]
    StakeNotSufficient { stake: f64 },
    #[error("negative curve input {0}")]
    InvalidNumber(f64),
}

/// A curve that grows like a square root up to `knee` and like a logistic function after it.
struct Curve {
    knee: f64,
    steepness: f64,
    midpoint: f64,
}

impl Curve {
    fn eval(&self, x: f64) -> Result<f64, PriorityError> {
        if x < 0.0 {
            Err(PriorityError::InvalidNumber(x))
        } else if x >= self.knee {
            Ok(SCALE / (1.0 + (-self.steepness * (x - self.midpoint)).exp()))
        } else {
            Ok(SCALE * x.sqrt()
                / (self.knee.sqrt() * (1.0 + (self.steepness * (self.midpoint - self.knee)).exp())))
        }
    }
}

pub fn reputation(nonce: u64, stake: &Amount, performance: u64) -> Result<u64, PriorityError> {
    let stake = stake.to_f64();
    if stake < STAKE_VALUE_MIN {
        return Err(PriorityError::StakeNotSufficient { stake });
    }

    let r_stake = STAKE_CURVE.eval(stake)?;
    let r_nonce = NONCE_CURVE.eval(nonce as f64)?;
    let r_performance = PERFORMANCE_CURVE.eval(performance as f64 / 100.0)?;

    Ok((STAKE_WEIGHT * r_stake + NONCE_WEIGHT * r_nonce + PERFORMANCE_WEIGHT * r_performance) as u64)
}

/// Scale `reputation` by `(luck[31] / 256)^3`.
pub fn priority(luck: &CryptoHash, reputation: u64) -> u64 {
    let luck = luck.bytes()[31] as f64 / 256.0;
    (reputation as f64 * luck.powi(3)) as u64
}

pub fn elect_priority(
    luck: &CryptoHash,
    nonce: u64,
    stake: &Amount,
    performance: u64,
) -> Result<u64, PriorityError> {
    Ok(priority(luck, reputation(nonce, stake, performance)?))
}

/// The luck of `address` under `seed`: `keccak256(seed || address)`.
pub fn luck(seed: &CryptoHash, address: &Address) -> CryptoHash {
    let mut bytes = seed.bytes().to_vec();
    bytes.extend_from_slice(&address.bytes());
    keccak256(&bytes)
}
