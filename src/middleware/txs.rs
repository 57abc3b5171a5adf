/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Stateless and parent-state checks on the transactions of an incoming block.
//!
//! These run against the state of the parent block, before any transaction is applied, and so reject a
//! block cheaply. Checks that depend on the effects of earlier transactions in the same block (balances
//! after transfers, for instance) are left to the block processor.

use std::collections::BTreeMap;

use crate::{
    chain::{ChainInterface, ChainReadView},
    config::ChainConfig,
    errors::ChainError,
    processor::{intrinsic_gas, transactions::check_verifier_tx},
    state::AccountStateDB,
    trie::NodeSource,
    types::{
        address::{Address, AddressType},
        derive_sha::derive_sha,
        transaction::Transaction,
        vote::EvidenceProof,
    },
};

use super::BlockContext;

pub fn validate_block_txs<C: ChainInterface>(
    ctx: &mut BlockContext<'_, C>,
) -> Result<(), ChainError> {
    let block = ctx.block;
    let chain = ctx.chain;
    let config = chain.config();
    let txs = block.transactions();

    if derive_sha(txs) != block.header.tx_root {
        return Err(ChainError::TxRootNotMatch);
    }
    if block.is_special() {
        if !txs.is_empty() {
            return Err(ChainError::TxInSpecialBlock);
        }
        return Ok(());
    }
    if block.size() > config.max_block_size {
        return Err(ChainError::BlockSizeTooLarge);
    }
    if txs.is_empty() {
        return Ok(());
    }

    let state_root = ctx.pre_block()?.header.state_root;
    let state = chain.state_at_by_state_root(state_root)?;
    let signer = config.signer();
    let height = block.number();

    // Several transactions of one sender take consecutive nonces.
    let mut nonces: BTreeMap<Address, u64> = BTreeMap::new();
    for tx in txs {
        let sender = signer.sender(tx)?;
        let expected = match nonces.get(&sender) {
            Some(nonce) => *nonce,
            None => state.get_nonce(&sender)?,
        };
        if tx.nonce() != expected {
            return Err(ChainError::TxNonceNotMatch);
        }
        nonces.insert(sender, expected + 1);

        let usage = tx.amount().clone()
            + tx.max_fee()
            + ctx.economy_model.locked_money(&sender, height);
        if state.get_balance(&sender)? < usage {
            return Err(ChainError::TxSenderBalanceNotEnough);
        }

        let creation = tx.tx_type() == Some(AddressType::ContractCreate);
        if intrinsic_gas(config, tx.extra_data(), creation)? > tx.gas_limit() {
            return Err(ChainError::TxGasLimitNotEnough);
        }

        validate_by_type(chain, &state, config, tx, &sender, height)?;
    }
    log::debug!("validated {} transactions of block {}", txs.len(), height);
    Ok(())
}

fn validate_by_type<C: ChainReadView, S: NodeSource + Clone>(
    chain: &C,
    state: &AccountStateDB<S>,
    config: &ChainConfig,
    tx: &Transaction,
    sender: &Address,
    height: u64,
) -> Result<(), ChainError> {
    match tx.tx_type() {
        Some(AddressType::Stake) | Some(AddressType::Cancel) | Some(AddressType::UnStake) => {
            if tx.to().body() != sender.body() {
                return Err(ChainError::InvalidStakeReceiver);
            }
            check_verifier_tx(state, config, tx, sender, height)
        }
        Some(AddressType::Evidence) => validate_evidence(chain, state, config, tx, height),
        Some(AddressType::Cross) => Err(ChainError::TxNotSupported),
        Some(AddressType::Normal)
        | Some(AddressType::Erc20)
        | Some(AddressType::EarlyReward)
        | Some(AddressType::ContractCreate)
        | Some(AddressType::ContractCall) => Ok(()),
        Some(AddressType::Contract) | None => Err(ChainError::InvalidTxType),
    }
}

/// An evidence transaction must name a staked verifier, and carry two conflicting votes that the verifier
/// signed while it was a verifier and while its stake was still locked.
fn validate_evidence<C: ChainReadView, S: NodeSource + Clone>(
    chain: &C,
    state: &AccountStateDB<S>,
    config: &ChainConfig,
    tx: &Transaction,
    height: u64,
) -> Result<(), ChainError> {
    let accused = tx.to().with_type(AddressType::Normal);
    if state.is_empty_account(&accused)? || state.get_stake(&accused)?.is_zero() {
        return Err(ChainError::InvalidEvidenceTarget);
    }

    let proof = EvidenceProof::decode(tx.extra_data())?;
    proof.validate(&accused)?;

    let vote_height = proof.first.height();
    if vote_height > height {
        return Err(ChainError::InvalidEvidenceTime);
    }
    let last_elect = state.get_last_elect(&accused)?;
    if last_elect != 0 {
        let slots_since_cancel = height / config.slot_size - last_elect / config.slot_size;
        if height < last_elect || slots_since_cancel > config.stake_lock_slot {
            return Err(ChainError::InvalidEvidenceTime);
        }
    }

    let slot = chain.get_slot_by_num(vote_height)?;
    if !chain.get_verifiers(slot)?.contains(&accused) {
        return Err(ChainError::NotCurrentVerifier);
    }
    Ok(())
}
