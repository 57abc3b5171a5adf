/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Election of a verifier set from the registered candidates.

use crate::{
    errors::ChainError,
    state::AccountStateDB,
    trie::NodeSource,
    types::{
        address::Address,
        data_types::CryptoHash,
    },
};

use super::priority::{elect_priority, luck};

/// A bounded list of addresses, kept sorted by descending priority.
///
/// A newcomer is inserted in front of every entry with the same priority. Once the list is full, a
/// newcomer that does not beat the lowest priority is dropped, and otherwise the lowest entry is evicted.
#[derive(Clone, Debug)]
pub struct TopVerifiers {
    capacity: usize,
    entries: Vec<(Address, u64)>,
}

impl TopVerifiers {
    pub fn new(capacity: usize) -> TopVerifiers {
        TopVerifiers {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn insert(&mut self, address: Address, priority: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.is_full() {
            match self.entries.last() {
                Some((_, lowest)) if priority <= *lowest => return,
                _ => {}
            }
        }
        if self.entries.iter().any(|(existing, _)| *existing == address) {
            return;
        }

        let position = self
            .entries
            .iter()
            .filter(|(_, other)| priority < *other)
            .count();
        self.entries.insert(position, (address, priority));
        self.entries.truncate(self.capacity);
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.entries.iter().map(|(address, _)| *address).collect()
    }
}

/// Parameters of an election.
pub struct Election<'a> {
    pub verifier_number: usize,
    pub default_verifiers: &'a [Address],
    pub system_verifier_priority: u64,
}

impl<'a> Election<'a> {
    /// The default set: the first `verifier_number` default verifiers.
    pub fn defaults(&self) -> Vec<Address> {
        self.default_verifiers
            .iter()
            .take(self.verifier_number)
            .copied()
            .collect()
    }

    /// Rank `candidates` by their priority under `seed`, reading their accounts from `state`, then pad
    /// the result with default verifiers.
    ///
    /// A candidate whose priority cannot be computed (e.g. its stake is too low) competes with priority
    /// zero.
    pub fn elect<S: NodeSource + Clone>(
        &self,
        candidates: &[Address],
        seed: &CryptoHash,
        state: &AccountStateDB<S>,
    ) -> Result<Vec<Address>, ChainError> {
        let mut top = TopVerifiers::new(self.verifier_number);
        for candidate in candidates {
            let luck = luck(seed, candidate);
            let priority = match state.account_exists(candidate)? {
                true => {
                    let nonce = state.get_nonce(candidate)?;
                    let stake = state.get_stake(candidate)?;
                    let performance = state.get_performance(candidate)?;
                    elect_priority(&luck, nonce, &stake, performance).unwrap_or_else(|err| {
                        log::info!("priority of {} falls back to 0: {}", candidate, err);
                        0
                    })
                }
                false => 0,
            };
            top.insert(*candidate, priority);
        }

        for default in self.defaults() {
            if top.is_full() {
                break;
            }
            top.insert(default, self.system_verifier_priority);
        }

        Ok(top.addresses())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::StateParams,
        trie::Detached,
        types::{address::AddressType, data_types::Amount},
    };

    fn address(byte: u8) -> Address {
        Address::from_parts(AddressType::Normal, &[byte; 20])
    }

    #[test]
    fn keeps_the_highest_priorities_in_descending_order() {
        let mut top = TopVerifiers::new(3);
        top.insert(address(1), 10);
        top.insert(address(2), 30);
        top.insert(address(3), 20);
        top.insert(address(4), 5);
        assert_eq!(top.addresses(), vec![address(2), address(3), address(1)]);

        top.insert(address(5), 25);
        assert_eq!(top.addresses(), vec![address(2), address(5), address(3)]);
    }

    #[test]
    fn ties_go_in_front_and_duplicates_are_ignored() {
        let mut top = TopVerifiers::new(3);
        top.insert(address(1), 10);
        top.insert(address(2), 10);
        top.insert(address(1), 50);
        assert_eq!(top.addresses(), vec![address(2), address(1)]);

        top.insert(address(3), 10);
        top.insert(address(4), 10);
        assert_eq!(top.addresses(), vec![address(3), address(2), address(1)]);
    }

    #[test]
    fn election_pads_with_defaults() {
        let mut state =
            AccountStateDB::new(Detached, CryptoHash::zero(), StateParams::default()).unwrap();
        let candidate = address(7);
        state.new_account_state(&candidate).unwrap();
        state.set_stake(&candidate, Amount::from(100_000u64)).unwrap();

        let defaults = vec![address(1), address(2), address(3)];
        let election = Election {
            verifier_number: 3,
            default_verifiers: &defaults,
            system_verifier_priority: 0,
        };
        let elected = election
            .elect(&[candidate], &CryptoHash::zero(), &state)
            .unwrap();

        assert_eq!(elected.len(), 3);
        assert!(elected.contains(&candidate));
        assert!(elected.contains(&address(1)));
        assert!(elected.contains(&address(2)));
        assert!(!elected.contains(&address(3)));
    }
}
