/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable contract executor.
//!
//! Contract-create and contract-call transactions are handed to a [`Vm`] as a [`Message`]. The VM reads
//! and writes accounts through a [`ContractState`], which the block processor backs with the journaled
//! account state of the block being processed. Whatever the VM writes is reverted by the processor if the
//! VM reports failure.
//!
//! A VM that lets contracts call other contracts derives each inner message with
//! [`Message::nested_call`], which bounds how deep calls may nest.

use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    errors::ChainError,
    state::AccountStateDB,
    trie::NodeSource,
    types::{
        address::Address,
        data_types::{Amount, CryptoHash},
        receipt::Log,
    },
};

/// The payload (`extra_data`) of a contract-create transaction.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct CreatePayload {
    pub code: Vec<u8>,
    pub abi: Vec<u8>,
    pub input: Vec<u8>,
}

impl CreatePayload {
    pub fn decode(bytes: &[u8]) -> Result<CreatePayload, ChainError> {
        CreatePayload::deserialize(&mut &*bytes).map_err(|source| ChainError::Decode {
            what: "contract create payload",
            source,
        })
    }
}

/// A call into the VM.
#[derive(Clone, Debug)]
pub struct Message {
    pub caller: Address,
    /// The contract being created or called.
    pub to: Address,
    pub value: Amount,
    pub gas_price: Amount,
    pub gas_limit: u64,
    /// Call input, or the constructor input of a create.
    pub input: Vec<u8>,
    pub code: Vec<u8>,
    pub abi: Vec<u8>,
    pub create: bool,
    pub tx_hash: CryptoHash,
    pub block_number: u64,
    pub timestamp: u64,
    pub coinbase: Address,
    /// How many calls this message is nested in. A transaction's own message is at depth 0.
    pub depth: usize,
    /// The deepest a nested call may go.
    pub max_depth: usize,
}

impl Message {
    /// The message of a call from the contract of this message into the contract at `to`, one level deeper.
    /// Moving `value` is left to the VM.
    ///
    /// Fails with [`ChainError::Depth`] if this message is already at `max_depth`.
    pub fn nested_call(
        &self,
        to: Address,
        value: Amount,
        gas_limit: u64,
        input: Vec<u8>,
        state: &dyn ContractState,
    ) -> Result<Message, ChainError> {
        if self.depth >= self.max_depth {
            return Err(ChainError::Depth);
        }
        let code = state.get_code(&to)?;
        if code.is_empty() {
            return Err(ChainError::ContractNotExist);
        }
        Ok(Message {
            caller: self.to,
            to,
            value,
            gas_price: self.gas_price.clone(),
            gas_limit,
            input,
            code,
            abi: state.get_abi(&to)?,
            create: false,
            tx_hash: self.tx_hash,
            block_number: self.block_number,
            timestamp: self.timestamp,
            coinbase: self.coinbase,
            depth: self.depth + 1,
            max_depth: self.max_depth,
        })
    }
}

/// What the VM reports after executing a message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VmOutcome {
    pub return_data: Vec<u8>,
    pub gas_used: u64,
    /// Execution failed (e.g. reverted or ran out of gas). The processor reverts every write.
    pub failed: bool,
    pub logs: Vec<Log>,
}

/// The view of the account state a contract executes against.
pub trait ContractState {
    fn account_exists(&self, address: &Address) -> Result<bool, ChainError>;
    fn get_balance(&self, address: &Address) -> Result<Amount, ChainError>;
    fn get_nonce(&self, address: &Address) -> Result<u64, ChainError>;
    /// The code of the contract at `address`. Empty if there is none.
    fn get_code(&self, address: &Address) -> Result<Vec<u8>, ChainError>;
    fn get_abi(&self, address: &Address) -> Result<Vec<u8>, ChainError>;
    fn get_data(&self, address: &Address, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError>;
    fn set_data(&mut self, address: &Address, key: &[u8], value: Vec<u8>) -> Result<(), ChainError>;
    /// Move `amount` from `from` to `to`, creating `to` if it does not exist.
    fn transfer(&mut self, from: &Address, to: &Address, amount: &Amount) -> Result<(), ChainError>;
}

pub trait Vm: Send + Sync {
    fn execute(
        &self,
        message: &Message,
        state: &mut dyn ContractState,
    ) -> Result<VmOutcome, ChainError>;
}

impl<V: Vm + ?Sized> Vm for Arc<V> {
    fn execute(
        &self,
        message: &Message,
        state: &mut dyn ContractState,
    ) -> Result<VmOutcome, ChainError> {
        (**self).execute(message, state)
    }
}

/// A VM that reverts every message. Chains without smart contracts use this.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledVm;

impl Vm for DisabledVm {
    fn execute(
        &self,
        _message: &Message,
        _state: &mut dyn ContractState,
    ) -> Result<VmOutcome, ChainError> {
        Err(ChainError::ExecutionReverted)
    }
}

/// Adapts an [`AccountStateDB`] into the [`ContractState`] a VM sees.
pub struct StateAdapter<'a, S>(pub &'a mut AccountStateDB<S>);

impl<'a, S: NodeSource + Clone> ContractState for StateAdapter<'a, S> {
    fn account_exists(&self, address: &Address) -> Result<bool, ChainError> {
        self.0.account_exists(address)
    }

    fn get_balance(&self, address: &Address) -> Result<Amount, ChainError> {
        self.0.get_balance(address)
    }

    fn get_nonce(&self, address: &Address) -> Result<u64, ChainError> {
        self.0.get_nonce(address)
    }

    fn get_code(&self, address: &Address) -> Result<Vec<u8>, ChainError> {
        if !self.0.account_exists(address)? {
            return Ok(Vec::new());
        }
        self.0.get_code(address)
    }

    fn get_abi(&self, address: &Address) -> Result<Vec<u8>, ChainError> {
        if !self.0.account_exists(address)? {
            return Ok(Vec::new());
        }
        self.0.get_abi(address)
    }

    fn get_data(&self, address: &Address, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
        self.0.get_data(address, key)
    }

    fn set_data(&mut self, address: &Address, key: &[u8], value: Vec<u8>) -> Result<(), ChainError> {
        self.0.set_data(address, key, value)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: &Amount) -> Result<(), ChainError> {
        if !self.0.account_exists(to)? {
            self.0.new_account_state(to)?;
        }
        self.0.sub_balance(from, amount)?;
        self.0.add_balance(to, amount)
    }
}
