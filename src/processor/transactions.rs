/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Application of single transactions.
//!
//! Every transaction except contract creates and calls goes through the same basic step first: check the
//! nonce, charge `intrinsic_gas * gas_price` to the sender (credited to the coinbase), and bump the
//! sender's nonce. Then the type of the transaction decides what else happens.
//!
//! Contract creates and calls instead buy their whole gas limit up front, run in the [`Vm`], and get
//! refunded for the gas the VM did not use.

use crate::{
    config::ChainConfig,
    errors::ChainError,
    state::AccountStateDB,
    trie::NodeSource,
    types::{
        address::{Address, AddressType},
        block::Header,
        crypto_primitives::keccak256,
        data_types::{encode, Amount},
        receipt::{Bloom, Log, Receipt},
        transaction::Transaction,
    },
    vm::{CreatePayload, Message, StateAdapter, Vm, VmOutcome},
};

use super::{builtin_contracts, BlockProcessor};

/// The gas a transaction costs before it does anything: a base cost plus a cost per byte of
/// `extra_data`.
pub fn intrinsic_gas(
    config: &ChainConfig,
    data: &[u8],
    contract_creation: bool,
) -> Result<u64, ChainError> {
    let base = if contract_creation {
        config.tx_gas_contract_creation
    } else {
        config.tx_gas
    };
    let non_zero = data.iter().filter(|byte| **byte != 0).count() as u64;
    let zero = data.len() as u64 - non_zero;

    non_zero
        .checked_mul(config.tx_data_non_zero_gas)
        .and_then(|gas| gas.checked_add(base))
        .and_then(|gas| {
            zero.checked_mul(config.tx_data_zero_gas)
                .and_then(|zero_gas| gas.checked_add(zero_gas))
        })
        .ok_or(ChainError::OutOfGas)
}

/// The address of the contract that `sender` creates with its transaction of nonce `nonce`.
pub fn contract_address(sender: &Address, nonce: u64) -> Address {
    let mut preimage = sender.bytes().to_vec();
    preimage.extend_from_slice(&encode(&nonce));
    Address::from_public_key(AddressType::ContractCreate, &keccak256(&preimage).bytes())
}

/// Check the state preconditions of a stake, cancel, or un-stake transaction from `sender`, for inclusion
/// in the block at `height`. Every stake, top-ups included, must pledge at least `min_pledge_value`. Other
/// transaction types pass unchecked.
pub fn check_verifier_tx<S: NodeSource + Clone>(
    state: &AccountStateDB<S>,
    config: &ChainConfig,
    tx: &Transaction,
    sender: &Address,
    height: u64,
) -> Result<(), ChainError> {
    match tx.tx_type() {
        Some(AddressType::Stake) => {
            if tx.amount() < &config.min_pledge_value {
                return Err(ChainError::TxDelegatesNotEnough);
            }
        }
        Some(AddressType::Cancel) => {
            if state.get_stake(sender)?.is_zero() {
                return Err(ChainError::SendRegisterTxFirst);
            }
            if state.get_last_elect(sender)? != 0 {
                return Err(ChainError::SendRegisterTxFirst);
            }
        }
        Some(AddressType::UnStake) => {
            if state.get_stake(sender)?.is_zero() {
                return Err(ChainError::SendRegisterTxFirst);
            }
            let last_elect = state.get_last_elect(sender)?;
            if last_elect == 0 {
                return Err(ChainError::SendCancelTxFirst);
            }
            if height < last_elect + config.cancel_cooldown() {
                return Err(ChainError::InvalidUnStakeTime);
            }
        }
        _ => {}
    }
    Ok(())
}

impl<S: NodeSource + Clone> BlockProcessor<S> {
    /// Apply `tx`, the `index`-th transaction of the block with `header`, and record its receipt.
    pub fn process_tx(
        &mut self,
        tx: &Transaction,
        index: usize,
        header: &Header,
        vm: &dyn Vm,
    ) -> Result<Receipt, ChainError> {
        let receipt = match tx.tx_type() {
            Some(AddressType::ContractCreate) | Some(AddressType::ContractCall) => {
                self.process_contract_tx(tx, index, header, vm)?
            }
            _ => self.process_basic_tx(tx, header)?,
        };
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }

    fn process_basic_tx(&mut self, tx: &Transaction, header: &Header) -> Result<Receipt, ChainError> {
        let sender = self.signer.sender(tx)?;
        if sender.is_empty() || tx.to().is_empty() {
            return Err(ChainError::TxSenderOrReceiverEmpty);
        }
        if self.state.is_empty_account(&sender)? {
            return Err(ChainError::AccountNotExist);
        }
        if tx.nonce() != self.state.get_nonce(&sender)? {
            return Err(ChainError::TxNonceNotMatch);
        }
        let gas = intrinsic_gas(&self.config, tx.extra_data(), false)?;
        if gas > tx.gas_limit() {
            return Err(ChainError::TxGasUsedIsOverGasLimit);
        }
        let cumulative_gas_used = self
            .gas_used
            .checked_add(gas)
            .filter(|total| *total <= header.gas_limit)
            .ok_or(ChainError::GasLimitReached)?;

        let fee = tx.gas_price() * gas;
        self.state.sub_balance(&sender, &fee)?;
        self.credit(&header.coinbase, &fee)?;
        self.state.add_nonce(&sender, 1)?;

        match tx.tx_type() {
            Some(AddressType::Normal) => self.process_normal_tx(tx, &sender)?,
            Some(AddressType::Cross) => return Err(ChainError::TxNotSupported),
            Some(AddressType::Erc20) => {
                builtin_contracts::process(&mut self.state, &sender, tx, false)?
            }
            Some(AddressType::EarlyReward) => {
                builtin_contracts::process(&mut self.state, &sender, tx, true)?
            }
            Some(AddressType::Stake) => {
                // Replay holds only the first stake to the minimum pledge.
                if self.state.get_stake(&sender)?.is_zero()
                    && tx.amount() < &self.config.min_pledge_value
                {
                    return Err(ChainError::TxDelegatesNotEnough);
                }
                self.state.stake(&sender, tx.amount())?;
            }
            Some(AddressType::Cancel) => {
                check_verifier_tx(&self.state, &self.config, tx, &sender, header.number)?;
                self.state.set_last_elect(&sender, header.number)?;
            }
            Some(AddressType::UnStake) => {
                check_verifier_tx(&self.state, &self.config, tx, &sender, header.number)?;
                self.state.un_stake(&sender)?;
            }
            Some(AddressType::Evidence) => self.process_evidence_tx(tx, &sender)?,
            _ => return Err(ChainError::InvalidTxType),
        }

        self.gas_used = cumulative_gas_used;
        log::trace!("applied transaction {} from {}", tx.hash(), sender);
        Ok(Receipt {
            tx_hash: tx.hash(),
            failed: false,
            cumulative_gas_used,
            gas_used: gas,
            post_state: self.state.intermediate_root()?,
            logs: vec![],
            log_bloom: Bloom::empty(),
            contract_address: None,
        })
    }

    fn process_normal_tx(&mut self, tx: &Transaction, sender: &Address) -> Result<(), ChainError> {
        let receiver = tx.to();
        if self.state.is_empty_account(receiver)? {
            self.state.new_account_state(receiver)?;
        }
        self.state.sub_balance(sender, tx.amount())?;
        self.state.add_balance(receiver, tx.amount())
    }

    /// Seize the stake of the accused (the normal address behind the evidence address) and give it to
    /// the sender.
    fn process_evidence_tx(&mut self, tx: &Transaction, sender: &Address) -> Result<(), ChainError> {
        if sender.address_type() != Some(AddressType::Normal) {
            return Err(ChainError::InvalidAddress);
        }
        let accused = tx.to().with_type(AddressType::Normal);
        if self.state.is_empty_account(&accused)? {
            return Err(ChainError::ReceiverNotExist);
        }
        self.state.move_stake_to_address(&accused, sender)
    }

    fn process_contract_tx(
        &mut self,
        tx: &Transaction,
        index: usize,
        header: &Header,
        vm: &dyn Vm,
    ) -> Result<Receipt, ChainError> {
        let sender = self.signer.sender(tx)?;
        if self.state.is_empty_account(&sender)? {
            return Err(ChainError::AccountNotExist);
        }
        let nonce = self.state.get_nonce(&sender)?;
        if tx.nonce() != nonce {
            return Err(ChainError::TxNonceNotMatch);
        }

        // Buy the whole gas limit.
        let max_fee = tx.max_fee();
        if self.state.get_balance(&sender)? < max_fee {
            return Err(ChainError::InsufficientBalanceForGas);
        }
        if self.gas_used.saturating_add(tx.gas_limit()) > header.gas_limit {
            return Err(ChainError::GasLimitReached);
        }
        self.state.sub_balance(&sender, &max_fee)?;

        let create = tx.tx_type() == Some(AddressType::ContractCreate);
        let intrinsic = intrinsic_gas(&self.config, tx.extra_data(), create)?;
        if intrinsic > tx.gas_limit() {
            return Err(ChainError::OutOfGas);
        }
        self.state.add_nonce(&sender, 1)?;

        let target = if create {
            contract_address(&sender, nonce)
        } else {
            tx.to().with_type(AddressType::ContractCreate)
        };
        let snapshot = self.state.snapshot();
        let available = tx.gas_limit() - intrinsic;
        let outcome = match self.execute(tx, &sender, &target, available, header, vm) {
            Ok(outcome) if !outcome.failed => outcome,
            Ok(outcome) => {
                log::debug!("contract transaction {} failed in the VM", tx.hash());
                self.state.revert_to_snapshot(snapshot)?;
                VmOutcome {
                    logs: vec![],
                    ..outcome
                }
            }
            Err(err) => {
                log::debug!("contract transaction {} reverted: {}", tx.hash(), err);
                self.state.revert_to_snapshot(snapshot)?;
                VmOutcome {
                    gas_used: available,
                    failed: true,
                    ..VmOutcome::default()
                }
            }
        };

        let gas_used = intrinsic + outcome.gas_used.min(available);
        let refund = tx.gas_price() * (tx.gas_limit() - gas_used);
        self.state.add_balance(&sender, &refund)?;
        self.credit(&header.coinbase, &(tx.gas_price() * gas_used))?;
        self.gas_used += gas_used;

        let tx_hash = tx.hash();
        let first_log_index = self.receipts.iter().map(|r| r.logs.len()).sum::<usize>();
        let logs: Vec<Log> = outcome
            .logs
            .into_iter()
            .enumerate()
            .map(|(position, entry)| Log {
                block_number: header.number,
                tx_hash,
                tx_index: index as u32,
                index: (first_log_index + position) as u32,
                ..entry
            })
            .collect();
        if !logs.is_empty() {
            self.state.add_logs(tx_hash, logs.clone());
        }

        Ok(Receipt {
            tx_hash,
            failed: outcome.failed,
            cumulative_gas_used: self.gas_used,
            gas_used,
            post_state: self.state.intermediate_root()?,
            log_bloom: Bloom::from_logs(&logs),
            logs,
            contract_address: (create && !outcome.failed).then_some(target),
        })
    }

    /// Run a contract create or call against the contract at `target`. Errors mean the execution
    /// failed, and are reverted by the caller.
    fn execute(
        &mut self,
        tx: &Transaction,
        sender: &Address,
        target: &Address,
        gas_limit: u64,
        header: &Header,
        vm: &dyn Vm,
    ) -> Result<VmOutcome, ChainError> {
        let create = tx.tx_type() == Some(AddressType::ContractCreate);
        let (code, abi, input) = if create {
            let payload = CreatePayload::decode(tx.extra_data())?;
            if payload.code.len() > self.config.max_code_size {
                return Err(ChainError::MaxCodeSizeExceeded);
            }
            if !self.state.is_empty_account(target)? {
                return Err(ChainError::ContractAddressCollision);
            }
            self.state.new_account_state(target)?;
            self.state.set_code(target, payload.code.clone())?;
            self.state.set_abi(target, payload.abi.clone())?;
            (payload.code, payload.abi, payload.input)
        } else {
            if self.state.is_empty_account(target)? {
                return Err(ChainError::ContractNotExist);
            }
            let code = self.state.get_code(target)?;
            if code.is_empty() {
                return Err(ChainError::ContractNotExist);
            }
            (code, self.state.get_abi(target)?, tx.extra_data().to_vec())
        };

        if !tx.amount().is_zero() {
            self.state.sub_balance(sender, tx.amount())?;
            self.state.add_balance(target, tx.amount())?;
        }

        let message = Message {
            caller: *sender,
            to: *target,
            value: tx.amount().clone(),
            gas_price: tx.gas_price().clone(),
            gas_limit,
            input,
            code,
            abi,
            create,
            tx_hash: tx.hash(),
            block_number: header.number,
            timestamp: header.timestamp,
            coinbase: header.coinbase,
            depth: 0,
            max_depth: self.config.call_create_depth,
        };
        vm.execute(&message, &mut StateAdapter(&mut self.state))
    }

    pub(super) fn credit(&mut self, address: &Address, amount: &Amount) -> Result<(), ChainError> {
        if amount.is_zero() {
            return Ok(());
        }
        if self.state.is_empty_account(address)? {
            self.state.new_account_state(address)?;
        }
        self.state.add_balance(address, amount)
    }
}
