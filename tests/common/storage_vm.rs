//! A [`Vm`] that runs a tiny fixed contract, so tests can exercise contract transactions end to end.
//!
//! The contract stores the constructor input under `init`, and every call input under `last`, logging
//! each store. A call with input `fail` fails in the VM. A call with input `recurse` calls itself until
//! calls can nest no deeper, and stores the depth it reached under `depth`.

use powbft_rs::{
    errors::ChainError,
    types::{crypto_primitives::keccak256, data_types::CryptoHash, receipt::Log},
    vm::{ContractState, Message, Vm, VmOutcome},
};

/// Gas every successful message uses.
pub(crate) const STORE_GAS: u64 = 5_000;
/// Gas a failing message uses.
pub(crate) const FAIL_GAS: u64 = 7_000;

pub(crate) const INIT_KEY: &[u8] = b"init";
pub(crate) const LAST_KEY: &[u8] = b"last";
pub(crate) const DEPTH_KEY: &[u8] = b"depth";

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StorageVm;

impl StorageVm {
    fn stored(message: &Message, data: Vec<u8>) -> VmOutcome {
        VmOutcome {
            return_data: vec![],
            gas_used: STORE_GAS,
            failed: false,
            logs: vec![Log {
                address: message.to,
                topics: vec![keccak256(b"Stored")],
                data,
                block_number: 0,
                tx_hash: CryptoHash::zero(),
                tx_index: 0,
                index: 0,
            }],
        }
    }

    /// Call into `message.to` again until that fails with `Depth`, and return the depth reached.
    fn descend(&self, message: &Message, state: &mut dyn ContractState) -> Result<usize, ChainError> {
        let inner = message.nested_call(
            message.to,
            message.value.clone(),
            message.gas_limit,
            message.input.clone(),
            &*state,
        );
        match inner {
            Ok(inner) => self.descend(&inner, state),
            Err(ChainError::Depth) => Ok(message.depth),
            Err(err) => Err(err),
        }
    }
}

impl Vm for StorageVm {
    fn execute(
        &self,
        message: &Message,
        state: &mut dyn ContractState,
    ) -> Result<VmOutcome, ChainError> {
        if message.create {
            state.set_data(&message.to, INIT_KEY, message.input.clone())?;
            return Ok(StorageVm::stored(message, message.input.clone()));
        }
        match message.input.as_slice() {
            b"fail" => {
                state.set_data(&message.to, LAST_KEY, message.input.clone())?;
                Ok(VmOutcome {
                    gas_used: FAIL_GAS,
                    failed: true,
                    ..VmOutcome::default()
                })
            }
            b"recurse" => {
                let depth = self.descend(message, state)?;
                let depth = vec![depth as u8];
                state.set_data(&message.to, DEPTH_KEY, depth.clone())?;
                Ok(StorageVm::stored(message, depth))
            }
            input => {
                state.set_data(&message.to, LAST_KEY, input.to_vec())?;
                Ok(StorageVm::stored(message, input.to_vec()))
            }
        }
    }
}
