/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Checks on the header of an incoming block against its parent and the local clock.

use crate::{
    chain::ChainInterface,
    errors::ChainError,
    types::{
        address::{Address, AddressType},
        crypto_primitives::vrf_verify,
        derive_sha::derive_sha,
        difficulty::next_work_difficulty,
    },
};

use super::{now_nanos, BlockContext};

/// Place the block relative to the current head.
///
/// A normal block must extend the head. A special block may replace any of the last `rollback_limit`
/// blocks. A block further ahead is a future block, unless its timestamp is too far ahead of the local
/// clock to ever be accepted.
pub fn validate_block_number<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let config = ctx.chain.config();
    let head = ctx.chain.current_header()?;

    if head.number >= block.number().saturating_add(config.rollback_limit) {
        return Err(ChainError::BlockHeightTooLow);
    }
    if head.number >= block.number() {
        if !block.is_special() {
            return Err(ChainError::NormalBlockHeightTooLow);
        }
        log::debug!(
            "special block {} replaces canonical block at the same height or below the head",
            block.number()
        );
        return Ok(());
    }
    if head.number.saturating_add(1) < block.number() {
        let window = config.max_future_window.as_nanos() as u64;
        if block.header.timestamp > now_nanos().saturating_add(window) {
            return Err(ChainError::FutureBlockTooFarAway);
        }
        return Err(ChainError::FutureBlock);
    }
    Ok(())
}

/// Check the difficulty of a normal block against the retargeting rule, and its hash against the difficulty.
pub fn validate_block_difficulty<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let chain = ctx.chain;
    let config = chain.config();
    if config.ignore_difficulty_validation || block.is_special() {
        return Ok(());
    }

    let current_number = block
        .number()
        .checked_sub(1)
        .ok_or(ChainError::InvalidBlockNum)?;
    let params = config.retarget_params();
    let pre_span = chain
        .get_header_by_number(params.last_period_block_num(current_number))?
        .ok_or(ChainError::BlockNotFound)?;
    let last_normal = chain.get_latest_normal_block()?;

    let target = next_work_difficulty(
        &params,
        pre_span.timestamp,
        (last_normal.header.timestamp, last_normal.header.difficulty),
        current_number,
    )?;
    if target != block.header.difficulty {
        return Err(ChainError::InvalidDiff);
    }
    if !block.header.difficulty.is_satisfied_by(&block.hash())? {
        return Err(ChainError::InvalidHashDiff);
    }
    Ok(())
}

pub fn validate_block_version<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    if ctx.block.header.version != ctx.chain.config().version {
        return Err(ChainError::InvalidBlockVersion);
    }
    Ok(())
}

/// The block must point at the canonical block below it, and carry the interlinks that block hands down.
pub fn validate_block_hash<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let pre_block = ctx.pre_block()?;
    if pre_block.hash() != block.pre_hash() {
        log::debug!(
            "pre hash {} of block {} does not match canonical parent {}",
            block.pre_hash(),
            block.number(),
            pre_block.hash()
        );
        return Err(ChainError::PreBlockHashNotMatch);
    }

    let interlinks = &block.body.interlinks;
    if *interlinks != pre_block.child_interlinks(block.is_special())
        || derive_sha(interlinks) != block.header.interlink_root
    {
        return Err(ChainError::InterlinkRootNotMatch);
    }
    Ok(())
}

/// Only verifier boot nodes mine special blocks.
pub fn validate_block_coinbase<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    if block.is_special() && !ctx.chain.config().is_boot_node(&block.header.coinbase) {
        return Err(ChainError::InvalidCoinBase);
    }
    Ok(())
}

/// The seed must be the miner's VRF output over the parent's seed, and the miner must be the coinbase.
pub fn validate_seed<C: ChainInterface>(ctx: &mut BlockContext<'_, C>) -> Result<(), ChainError> {
    let block = ctx.block;
    let header = &block.header;
    let pre_seed = ctx.pre_block()?.header.seed;
    if header.miner_pubkey.is_empty() {
        return Err(ChainError::InvalidVrfProof);
    }

    vrf_verify(&header.miner_pubkey, &pre_seed, &header.seed, &header.proof)?;

    if Address::from_public_key(AddressType::Normal, &header.miner_pubkey) != header.coinbase {
        return Err(ChainError::InvalidCoinBase);
    }
    Ok(())
}

pub fn validate_block_time<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let restriction = ctx.chain.config().block_time_restriction.as_nanos() as u64;
    if ctx.block.header.timestamp > now_nanos().saturating_add(restriction) {
        return Err(ChainError::InvalidBlockTimeStamp);
    }
    Ok(())
}

/// Bound the gas limit, and how far it may move away from the parent's.
pub fn validate_gas_limit<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    if block.is_special() {
        return Ok(());
    }
    let chain = ctx.chain;
    let config = chain.config();
    let gas_limit = block.header.gas_limit;
    if gas_limit < config.min_gas_limit {
        return Err(ChainError::HeaderGasLimitNotEnough);
    }
    if gas_limit > config.max_gas_limit {
        return Err(ChainError::InvalidHeaderGasLimit);
    }

    let parent_limit = ctx.pre_block()?.header.gas_limit;
    let bound = parent_limit / config.gas_limit_bound_divisor.max(1);
    if gas_limit.abs_diff(parent_limit) >= bound {
        return Err(ChainError::InvalidHeaderGasLimit);
    }
    Ok(())
}
