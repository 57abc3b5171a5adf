/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Account-state operations on stake and verifier bookkeeping.

use crate::{
    errors::ChainError,
    trie::NodeSource,
    types::{address::Address, data_types::Amount},
};

use super::AccountStateDB;

impl<S: NodeSource + Clone> AccountStateDB<S> {
    /// Move `amount` from the balance of `address` to its stake, and mark it as active.
    pub fn stake(&mut self, address: &Address, amount: &Amount) -> Result<(), ChainError> {
        if &self.get_balance(address)? < amount {
            return Err(ChainError::TxSenderBalanceNotEnough);
        }
        self.sub_balance(address, amount)?;
        self.add_stake(address, amount)?;
        self.set_last_elect(address, 0)?;
        log::debug!("stake {} from {}", amount, address);
        Ok(())
    }

    /// Move the whole stake of `address` back to its balance.
    pub fn un_stake(&mut self, address: &Address) -> Result<(), ChainError> {
        let stake = self.get_stake(address)?;
        if stake.is_zero() {
            return Err(ChainError::TxSenderStakeNotEnough);
        }
        self.add_balance(address, &stake)?;
        self.sub_stake(address, &stake)?;
        log::debug!("un-stake {} to {}", stake, address);
        Ok(())
    }

    /// Seize the whole stake of `from` and credit it to the balance of `to`, creating `to` if needed.
    pub fn move_stake_to_address(&mut self, from: &Address, to: &Address) -> Result<(), ChainError> {
        let stake = self.get_stake(from)?;
        if stake.is_zero() {
            return Err(ChainError::TxSenderStakeNotEnough);
        }
        if self.is_empty_account(to)? {
            self.new_account_state(to)?;
        }
        self.sub_stake(from, &stake)?;
        self.add_balance(to, &stake)?;
        log::debug!("move stake {} from {} to {}", stake, from, to);
        Ok(())
    }

    /// Count one more round in which `address` was a verifier.
    pub fn process_verifier_number(&mut self, address: &Address) -> Result<(), ChainError> {
        self.add_verify_num(address)
    }

    /// Count one more commit vote by `address`.
    pub fn process_verification(&mut self, address: &Address) -> Result<(), ChainError> {
        self.add_commit_num(address)
    }

    pub fn process_performance(&mut self, address: &Address, delta: i64) -> Result<(), ChainError> {
        self.add_performance(address, delta)
    }
}
