/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The register DB: the trie of stake-registered candidate verifiers, plus the current slot and the
//! height at which that slot began.
//!
//! # Layout
//!
//! |Key|Value|
//! |---|---|
//! |`slot_key`|current slot, `u64`|
//! |`last_change_point_key`|number of the block at which the current slot began, `u64`|
//! |22-byte address|the address itself (presence is what matters)|

use borsh::BorshDeserialize;

use crate::{
    errors::ChainError,
    storage::pluggables::WriteBatch,
    trie::{NodeSource, Trie},
    types::{
        address::{Address, AddressType, ADDRESS_LENGTH},
        block::Block,
        data_types::{encode, CryptoHash},
        transaction::Signer,
    },
};

pub const SLOT_KEY: &[u8] = b"slot_key";
pub const LAST_CHANGE_POINT_KEY: &[u8] = b"last_change_point_key";

#[derive(Clone)]
pub struct RegisterDB<S> {
    trie: Trie<S>,
    slot_size: u64,
}

impl<S: NodeSource> RegisterDB<S> {
    pub fn new(source: S, root: CryptoHash, slot_size: u64) -> Result<Self, ChainError> {
        Ok(RegisterDB {
            trie: Trie::new(source, root)?,
            slot_size,
        })
    }

    /// Initialise an empty register: slot 0, change point 0.
    pub fn prepare(&mut self) -> Result<(), ChainError> {
        self.set_slot(0)?;
        self.set_last_change_point(0)
    }

    pub fn get_slot(&self) -> Result<u64, ChainError> {
        self.get_u64(SLOT_KEY, "slot")
    }

    pub fn get_last_change_point(&self) -> Result<u64, ChainError> {
        self.get_u64(LAST_CHANGE_POINT_KEY, "last change point")
    }

    /// Every registered address, in byte order.
    pub fn get_register_data(&self) -> Result<Vec<Address>, ChainError> {
        Ok(self
            .trie
            .entries()?
            .into_iter()
            .filter(|(key, _)| key.len() == ADDRESS_LENGTH)
            .filter_map(|(key, _)| Address::from_slice(&key).ok())
            .collect())
    }

    pub fn is_registered(&self, address: &Address) -> Result<bool, ChainError> {
        Ok(self.trie.get(&address.bytes())?.is_some())
    }

    pub fn save_register_data(&mut self, address: &Address) -> Result<(), ChainError> {
        Ok(self.trie.insert(&address.bytes(), address.bytes().to_vec())?)
    }

    pub fn delete_register_data(&mut self, address: &Address) -> Result<(), ChainError> {
        Ok(self.trie.delete(&address.bytes())?)
    }

    /// Apply the stake and cancel transactions of `block`, then advance the slot if `pre_block` was the
    /// last block of its slot.
    pub fn process(
        &mut self,
        block: &Block,
        signer: &Signer,
        pre_block: Option<&Block>,
    ) -> Result<(), ChainError> {
        for tx in block.transactions() {
            match tx.tx_type() {
                Some(AddressType::Stake) => {
                    self.save_register_data(&signer.sender(tx)?)?;
                }
                Some(AddressType::Cancel) => {
                    self.delete_register_data(&signer.sender(tx)?)?;
                }
                _ => {}
            }
        }

        if block.number() > 1 {
            let pre_block = pre_block.ok_or(ChainError::PreBlockIsNil)?;
            self.process_slot(pre_block)?;
        }
        Ok(())
    }

    fn process_slot(&mut self, pre_block: &Block) -> Result<(), ChainError> {
        if self.is_change_point(pre_block, false)? {
            let slot = self.get_slot()?;
            self.set_slot(slot + 1)?;
            self.set_last_change_point(pre_block.number())?;
            log::debug!("slot {} begins after block {}", slot + 1, pre_block.number());
        }
        Ok(())
    }

    /// Whether `block` is the last block of its slot.
    ///
    /// A block is a change point if it is `slot_size` blocks after the last change point (the very first
    /// slot is one block longer, since it starts at genesis), or, unless `is_package` is set, if it is
    /// special.
    pub fn is_change_point(&self, block: &Block, is_package: bool) -> Result<bool, ChainError> {
        let last_point = self.get_last_change_point()?;
        let mut diff = block.number().saturating_sub(last_point);
        if last_point == 0 {
            diff += 1;
        }
        Ok(diff == self.slot_size || (!is_package && block.is_special()))
    }

    pub fn finalise(&self) -> CryptoHash {
        self.trie.root_hash()
    }

    pub fn commit(&self, wb: &mut impl WriteBatch) -> CryptoHash {
        self.trie.commit(wb)
    }

    fn set_slot(&mut self, slot: u64) -> Result<(), ChainError> {
        Ok(self.trie.insert(SLOT_KEY, encode(&slot))?)
    }

    fn set_last_change_point(&mut self, number: u64) -> Result<(), ChainError> {
        Ok(self.trie.insert(LAST_CHANGE_POINT_KEY, encode(&number))?)
    }

    fn get_u64(&self, key: &[u8], what: &'static str) -> Result<u64, ChainError> {
        let bytes = self.trie.get(key)?.ok_or(ChainError::Decode {
            what,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "register not prepared"),
        })?;
        u64::deserialize(&mut bytes.as_slice()).map_err(|source| ChainError::Decode { what, source })
    }
}
