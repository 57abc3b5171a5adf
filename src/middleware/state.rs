/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Replaying the block, and writing it.

use crate::{
    chain::ChainInterface,
    errors::ChainError,
    processor::BlockProcessor,
    storage::write_batch::ChainWriteBatch,
    types::{derive_sha::derive_sha, receipt::create_bloom},
};

use super::BlockContext;

/// Replay the block on its parent's state. The resulting state root must be the one the block carries.
pub fn update_state_root<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let chain = ctx.chain;
    let state_root = ctx.pre_block()?.header.state_root;

    let mut processor = BlockProcessor::fork(chain.kv_store().clone(), state_root, chain.config())?;
    processor.process(block, chain, ctx.economy_model, ctx.vm)?;
    let root = processor.finalise()?;
    if root != block.header.state_root {
        log::debug!(
            "state root of block {} is {}, replay produced {}",
            block.number(),
            block.header.state_root,
            root
        );
        return Err(ChainError::StateRootNotMatch);
    }
    ctx.processor = Some(processor);
    Ok(())
}

/// Replay the register changes of the block. The resulting register root must be the one the block carries.
pub fn update_block_verifier<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let chain = ctx.chain;
    let pre_block = ctx.pre_block()?;

    let mut register = chain.build_register_processor(pre_block.header.register_root)?;
    register.process(block, &chain.config().signer(), Some(pre_block))?;
    if register.finalise() != block.header.register_root {
        return Err(ChainError::RegisterRootNotMatch);
    }
    ctx.register = Some(register);
    Ok(())
}

/// Check the gas and receipt commitments of the header against the receipts the replay produced.
pub fn valid_gas_used_and_receipts<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let processor = ctx.processor.as_ref().ok_or(ChainError::ChainOrBlockNil)?;
    let receipts = processor.receipts();

    if derive_sha(receipts) != block.header.receipt_root
        || create_bloom(receipts) != block.header.bloom_log
    {
        return Err(ChainError::ReceiptRootNotMatch);
    }

    let gas_used = receipts
        .last()
        .map(|receipt| receipt.cumulative_gas_used)
        .unwrap_or(0);
    if gas_used != block.header.gas_used {
        return Err(ChainError::InvalidHeaderGasUsed);
    }
    if gas_used > block.header.gas_limit {
        return Err(ChainError::HeaderGasUsedOverRanging);
    }
    for (receipt, tx) in receipts.iter().zip(block.transactions()) {
        if receipt.gas_used > tx.gas_limit() {
            return Err(ChainError::InvalidGasUsed);
        }
    }
    Ok(())
}

/// Write the block, its receipts, and the state and register it produced, and make it the head. Once
/// written, the verifiers `next_round_verifier` elected are cached.
///
/// A special block may land at or below the head. The canonical blocks it displaces are recorded in the
/// context, and taken off the canonical index in the same write.
pub fn insert_block<C: ChainInterface>(ctx: &mut BlockContext<'_, C>) -> Result<(), ChainError> {
    let block = ctx.block;
    let chain = ctx.chain;
    let hash = block.hash();
    let head_number = chain.current_header()?.number;

    let mut displaced = Vec::new();
    for number in block.number()..=head_number {
        if let Some(old) = chain.get_block_by_number(number)? {
            displaced.push(old);
        }
    }

    let mut wb = ChainWriteBatch::new();
    let processor = ctx.processor.as_mut().ok_or(ChainError::ChainOrBlockNil)?;
    processor.commit(&mut wb)?;
    if let Some(register) = &ctx.register {
        register.commit(&mut wb);
    }
    for old in &displaced {
        wb.delete_tx_lookups(old);
        if old.number() > block.number() {
            wb.delete_canonical_hash(old.number());
        }
    }
    wb.set_block(block);
    wb.set_receipts(&hash, processor.receipts());
    wb.set_canonical_hash(block.number(), &hash);
    wb.set_tx_lookups(block);
    wb.set_head(&hash);
    chain.write(wb);

    if !displaced.is_empty() {
        chain.forget_verifiers();
        log::info!(
            "special block {} replaced {} canonical blocks from height {}",
            hash,
            displaced.len(),
            block.number()
        );
    }
    if let Some((slot, verifiers)) = &ctx.elected {
        chain.cache_verifiers(*slot, verifiers.clone());
    }
    log::debug!("inserted block {} at height {}", hash, block.number());
    ctx.displaced = displaced;
    Ok(())
}

/// At the end of a slot, elect the verifiers whose election this block decides, from the register and state
/// the replay produced. Nothing is cached until `insert_block` has written the block.
pub fn next_round_verifier<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let chain = ctx.chain;
    if !chain.is_change_point(block, false)? {
        return Ok(());
    }

    let slot = chain.get_slot(block)? + chain.config().slot_margin;
    let register = ctx.register.as_ref().ok_or(ChainError::ChainOrBlockNil)?;
    let processor = ctx.processor.as_ref().ok_or(ChainError::ChainOrBlockNil)?;
    let verifiers = chain.election().elect(
        &register.get_register_data()?,
        &block.header.seed,
        processor.state(),
    )?;
    log::debug!(
        "elected {} verifiers for slot {} at block {}",
        verifiers.len(),
        slot,
        block.number()
    );
    ctx.elected = Some((slot, verifiers));
    Ok(())
}
