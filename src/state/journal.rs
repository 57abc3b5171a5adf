/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The change journal of [`AccountStateDB`](super::AccountStateDB).
//!
//! Every mutation of the account state appends one [`StateChange`] that carries what is needed to undo
//! it. A snapshot is just the journal length at the time it was taken, so reverting to it pops and
//! undoes entries until the journal is that long again.

use std::collections::BTreeMap;

use crate::{
    errors::ChainError,
    state::contracts::ContractObject,
    types::{address::Address, data_types::CryptoHash},
};

use super::account_state::Field;

/// Raw storage writes of one account that are not yet folded into its storage trie. `None` deletes the key.
pub(crate) type PendingData = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

#[derive(Clone, Debug)]
pub(crate) enum StateChange {
    /// `was_live` records whether the account already existed, in which case creation was a no-op.
    NewAccount { account: Address, was_live: bool },
    /// `previous` holds the raw encoding of every field the account had, and `pending_data` and
    /// `pending_contract` the storage writes it had not yet finalised.
    DeleteAccount {
        account: Address,
        previous: Vec<(Field, Vec<u8>)>,
        pending_data: Option<PendingData>,
        pending_contract: Option<ContractObject>,
    },
    Field {
        account: Address,
        field: Field,
        previous: Option<Vec<u8>>,
        current: Vec<u8>,
    },
    /// A raw contract-storage write. `previous` is the pending overlay entry before the write (`None`
    /// if the key had no pending write).
    Data {
        account: Address,
        key: Vec<u8>,
        previous: Option<Option<Vec<u8>>>,
    },
    /// A typed contract object put. `previous` is the pending object before the put.
    Contract {
        account: Address,
        previous: Option<ContractObject>,
    },
    Logs {
        tx_hash: CryptoHash,
        previous_len: usize,
    },
    /// Pending storage folded into the storage tries. The new `_data_root`s are journaled separately as
    /// [`Field`](StateChange::Field) changes.
    Finalise {
        pending_data: BTreeMap<Address, PendingData>,
        pending_contracts: BTreeMap<Address, ContractObject>,
    },
}

impl StateChange {
    pub(crate) fn account(&self) -> Option<&Address> {
        match self {
            StateChange::NewAccount { account, .. }
            | StateChange::DeleteAccount { account, .. }
            | StateChange::Field { account, .. }
            | StateChange::Data { account, .. }
            | StateChange::Contract { account, .. } => Some(account),
            StateChange::Logs { .. } | StateChange::Finalise { .. } => None,
        }
    }
}

/// What happened to one account over the whole journal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Lifecycle {
    Created,
    Deleted,
    /// Deleted and then created again.
    Recreated,
    Modified,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Journal {
    changes: Vec<StateChange>,
}

impl Journal {
    pub(crate) fn push(&mut self, change: StateChange) {
        self.changes.push(change)
    }

    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }

    /// Pop the changes made after snapshot `id`, most recent first.
    ///
    /// # Panics
    ///
    /// If `id` is not a snapshot of this journal.
    pub(crate) fn drain_to(&mut self, id: usize) -> Vec<StateChange> {
        if id > self.changes.len() {
            panic!(
                "revert to unknown snapshot {} (journal holds {} changes)",
                id,
                self.changes.len()
            );
        }
        let mut undone = self.changes.split_off(id);
        undone.reverse();
        undone
    }

    pub(crate) fn clear(&mut self) {
        self.changes.clear()
    }

    /// Merge the journal into one lifecycle entry per touched account.
    pub(crate) fn digest(&self) -> Result<BTreeMap<Address, Lifecycle>, ChainError> {
        let mut digest: BTreeMap<Address, Lifecycle> = BTreeMap::new();
        for change in &self.changes {
            let account = match change.account() {
                Some(account) => *account,
                None => continue,
            };
            let previous = digest.get(&account).copied();
            let next = match change {
                StateChange::NewAccount { .. } => match previous {
                    Some(Lifecycle::Created) | Some(Lifecycle::Recreated) => {
                        return Err(ChainError::JournalDoubleCreate)
                    }
                    Some(Lifecycle::Deleted) => Lifecycle::Recreated,
                    _ => Lifecycle::Created,
                },
                StateChange::DeleteAccount { .. } => match previous {
                    Some(Lifecycle::Deleted) => return Err(ChainError::JournalDoubleDelete),
                    _ => Lifecycle::Deleted,
                },
                _ => previous.unwrap_or(Lifecycle::Modified),
            };
            digest.insert(account, next);
        }
        Ok(digest)
    }
}
