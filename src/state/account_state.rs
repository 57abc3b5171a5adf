/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The account state engine.
//!
//! # Layout
//!
//! Every account field is a separate entry of the block-state trie, keyed by `address || suffix`:
//!
//! |Field|Suffix|Value|
//! |---|---|---|
//! |Nonce|`_nonce`|`u64`|
//! |Balance|`_balance`|[`Amount`]|
//! |Stake|`_stake`|[`Amount`]|
//! |Commit num|`_commit_num`|`u64`|
//! |Verify num|`_verify_num`|`u64`|
//! |Last elect|`_last_elect`|`u64`|
//! |Performance|`_performance`|`u64`|
//! |Hash lock|`_hash_lock`|[`CryptoHash`]|
//! |Time lock|`_time_lock`|[`Amount`]|
//! |Data root|`_data_root`|[`CryptoHash`] of the account's storage trie|
//! |Code|`_code`|`Vec<u8>`|
//! |ABI|`_abi`|`Vec<u8>`|
//!
//! Values are Borsh-encoded. An account exists iff its `_nonce` entry exists.
//!
//! Each account with storage has its own storage trie, rooted at its `_data_root`. Storage tries are looked
//! up by account and root, so restoring an account's `_data_root` also restores its storage. Keys in a storage trie
//! are prefixed with the owning account's address. Storage holds either raw key-value pairs written with
//! [`set_data`](AccountStateDB::set_data), or the [JSON-KV](crate::json_kv) flattening of a typed
//! [`ContractObject`] written with [`put_contract`](AccountStateDB::put_contract).
//!
//! # Journaling
//!
//! Storage writes and contract puts are kept in pending overlays and only folded into the storage tries
//! when the state is [finalised](AccountStateDB::finalise). All other mutations go straight into the
//! block-state trie's in-memory overlay. Either way, each mutation is journaled so that
//! [`revert_to_snapshot`](AccountStateDB::revert_to_snapshot) can undo it. Finalisation is journaled too,
//! so a snapshot taken before it can still be reverted to.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    errors::ChainError,
    json_kv,
    storage::pluggables::WriteBatch,
    trie::{NodeSource, Trie},
    types::{
        address::{Address, ADDRESS_LENGTH},
        data_types::{encode, Amount, CryptoHash},
        receipt::Log,
    },
};

use super::{
    contracts::ContractObject,
    journal::{Journal, Lifecycle, PendingData, StateChange},
};

/// One field of an account record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Field {
    Nonce,
    Balance,
    Stake,
    CommitNum,
    VerifyNum,
    LastElect,
    Performance,
    HashLock,
    TimeLock,
    DataRoot,
    Code,
    Abi,
}

impl Field {
    pub(crate) const ALL: [Field; 12] = [
        Field::Nonce,
        Field::Balance,
        Field::Stake,
        Field::CommitNum,
        Field::VerifyNum,
        Field::LastElect,
        Field::Performance,
        Field::HashLock,
        Field::TimeLock,
        Field::DataRoot,
        Field::Code,
        Field::Abi,
    ];

    pub(crate) const fn suffix(&self) -> &'static str {
        match self {
            Field::Nonce => "_nonce",
            Field::Balance => "_balance",
            Field::Stake => "_stake",
            Field::CommitNum => "_commit_num",
            Field::VerifyNum => "_verify_num",
            Field::LastElect => "_last_elect",
            Field::Performance => "_performance",
            Field::HashLock => "_hash_lock",
            Field::TimeLock => "_time_lock",
            Field::DataRoot => "_data_root",
            Field::Code => "_code",
            Field::Abi => "_abi",
        }
    }

    pub(crate) fn key(&self, address: &Address) -> Vec<u8> {
        let mut key = address.bytes().to_vec();
        key.extend_from_slice(self.suffix().as_bytes());
        key
    }
}

/// Bounds on the performance score of accounts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StateParams {
    /// Performance of a newly created account.
    pub performance_initial: u64,
    pub performance_max: u64,
}

impl Default for StateParams {
    fn default() -> Self {
        StateParams {
            performance_initial: 30,
            performance_max: 100,
        }
    }
}

/// A full account record.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Account {
    pub nonce: u64,
    pub balance: Amount,
    pub stake: Amount,
    pub commit_num: u64,
    pub verify_num: u64,
    pub last_elect: u64,
    pub performance: u64,
    pub hash_lock: CryptoHash,
    pub time_lock: Amount,
    pub data_root: CryptoHash,
    pub code: Vec<u8>,
    pub abi: Vec<u8>,
}

/// Journaled, snapshot-capable view of the accounts at one block, backed by the block-state trie.
#[derive(Clone)]
pub struct AccountStateDB<S> {
    source: S,
    params: StateParams,
    pre_state_root: CryptoHash,
    trie: Trie<S>,
    /// Storage tries produced by finalisation, keyed by owner and root.
    storage_tries: HashMap<(Address, CryptoHash), Trie<S>>,
    pending_data: BTreeMap<Address, PendingData>,
    pending_contracts: BTreeMap<Address, ContractObject>,
    logs: HashMap<CryptoHash, Vec<Log>>,
    journal: Journal,
    finalised: Option<CryptoHash>,
}

impl<S: NodeSource + Clone> AccountStateDB<S> {
    /// Open the account state at `root`. The zero root opens an empty state.
    pub fn new(source: S, root: CryptoHash, params: StateParams) -> Result<Self, ChainError> {
        let trie = Trie::new(source.clone(), root)?;
        Ok(AccountStateDB {
            source,
            params,
            pre_state_root: root,
            trie,
            storage_tries: HashMap::new(),
            pending_data: BTreeMap::new(),
            pending_contracts: BTreeMap::new(),
            logs: HashMap::new(),
            journal: Journal::default(),
            finalised: None,
        })
    }

    /// The root this state was opened at.
    pub fn pre_state_root(&self) -> CryptoHash {
        self.pre_state_root
    }

    pub fn params(&self) -> StateParams {
        self.params
    }

    /* ↓↓↓ Account lifecycle ↓↓↓ */

    pub fn account_exists(&self, address: &Address) -> Result<bool, ChainError> {
        Ok(self.trie.get(&Field::Nonce.key(address))?.is_some())
    }

    pub fn is_empty_account(&self, address: &Address) -> Result<bool, ChainError> {
        Ok(!self.account_exists(address)?)
    }

    /// Create an account with all fields at their defaults. Calling this on a live account changes
    /// nothing, but is still journaled.
    pub fn new_account_state(&mut self, address: &Address) -> Result<(), ChainError> {
        let was_live = self.account_exists(address)?;
        if !was_live {
            for field in Field::ALL {
                let value = match field {
                    Field::Nonce | Field::CommitNum | Field::VerifyNum | Field::LastElect => {
                        encode(&0u64)
                    }
                    Field::Performance => encode(&self.params.performance_initial),
                    Field::Balance | Field::Stake | Field::TimeLock => encode(&Amount::zero()),
                    Field::HashLock | Field::DataRoot => encode(&CryptoHash::zero()),
                    Field::Code | Field::Abi => encode(&Vec::<u8>::new()),
                };
                self.trie.insert(&field.key(address), value)?;
            }
            log::trace!("new account {}", address);
        }
        self.record(StateChange::NewAccount {
            account: *address,
            was_live,
        });
        Ok(())
    }

    pub fn delete_account_state(&mut self, address: &Address) -> Result<(), ChainError> {
        self.require_account(address)?;
        let mut previous = Vec::with_capacity(Field::ALL.len());
        for field in Field::ALL {
            let key = field.key(address);
            if let Some(value) = self.trie.get(&key)? {
                previous.push((field, value));
                self.trie.delete(&key)?;
            }
        }
        let pending_data = self.pending_data.remove(address);
        let pending_contract = self.pending_contracts.remove(address);
        self.record(StateChange::DeleteAccount {
            account: *address,
            previous,
            pending_data,
            pending_contract,
        });
        Ok(())
    }

    pub fn get_account(&self, address: &Address) -> Result<Account, ChainError> {
        Ok(Account {
            nonce: self.get_nonce(address)?,
            balance: self.get_balance(address)?,
            stake: self.get_stake(address)?,
            commit_num: self.get_commit_num(address)?,
            verify_num: self.get_verify_num(address)?,
            last_elect: self.get_last_elect(address)?,
            performance: self.get_performance(address)?,
            hash_lock: self.get_hash_lock(address)?,
            time_lock: self.get_time_lock(address)?,
            data_root: self.get_data_root(address)?,
            code: self.get_code(address)?,
            abi: self.get_abi(address)?,
        })
    }

    /* ↓↓↓ Nonce ↓↓↓ */

    pub fn get_nonce(&self, address: &Address) -> Result<u64, ChainError> {
        self.get_field(address, Field::Nonce)
    }

    pub fn set_nonce(&mut self, address: &Address, nonce: u64) -> Result<(), ChainError> {
        self.set_field(address, Field::Nonce, &nonce)
    }

    pub fn add_nonce(&mut self, address: &Address, delta: u64) -> Result<(), ChainError> {
        let nonce = self.get_nonce(address)?;
        self.set_nonce(address, nonce + delta)
    }

    /* ↓↓↓ Balance ↓↓↓ */

    pub fn get_balance(&self, address: &Address) -> Result<Amount, ChainError> {
        self.get_field(address, Field::Balance)
    }

    pub fn set_balance(&mut self, address: &Address, balance: Amount) -> Result<(), ChainError> {
        self.set_field(address, Field::Balance, &balance)
    }

    pub fn add_balance(&mut self, address: &Address, amount: &Amount) -> Result<(), ChainError> {
        let balance = self.get_balance(address)?;
        self.set_balance(address, &balance + amount)
    }

    /// Fails with `BalanceNegative` if the balance is smaller than `amount`.
    pub fn sub_balance(&mut self, address: &Address, amount: &Amount) -> Result<(), ChainError> {
        let balance = self
            .get_balance(address)?
            .checked_sub(amount)
            .ok_or(ChainError::BalanceNegative)?;
        self.set_balance(address, balance)
    }

    /* ↓↓↓ Stake ↓↓↓ */

    pub fn get_stake(&self, address: &Address) -> Result<Amount, ChainError> {
        self.get_field(address, Field::Stake)
    }

    pub fn set_stake(&mut self, address: &Address, stake: Amount) -> Result<(), ChainError> {
        self.set_field(address, Field::Stake, &stake)
    }

    pub fn add_stake(&mut self, address: &Address, amount: &Amount) -> Result<(), ChainError> {
        let stake = self.get_stake(address)?;
        self.set_stake(address, &stake + amount)
    }

    pub fn sub_stake(&mut self, address: &Address, amount: &Amount) -> Result<(), ChainError> {
        let stake = self
            .get_stake(address)?
            .checked_sub(amount)
            .ok_or(ChainError::TxSenderStakeNotEnough)?;
        self.set_stake(address, stake)
    }

    /* ↓↓↓ Verifier counters ↓↓↓ */

    pub fn get_commit_num(&self, address: &Address) -> Result<u64, ChainError> {
        self.get_field(address, Field::CommitNum)
    }

    pub fn set_commit_num(&mut self, address: &Address, num: u64) -> Result<(), ChainError> {
        self.set_field(address, Field::CommitNum, &num)
    }

    pub fn add_commit_num(&mut self, address: &Address) -> Result<(), ChainError> {
        let num = self.get_commit_num(address)?;
        self.set_commit_num(address, num + 1)
    }

    pub fn get_verify_num(&self, address: &Address) -> Result<u64, ChainError> {
        self.get_field(address, Field::VerifyNum)
    }

    pub fn set_verify_num(&mut self, address: &Address, num: u64) -> Result<(), ChainError> {
        self.set_field(address, Field::VerifyNum, &num)
    }

    pub fn add_verify_num(&mut self, address: &Address) -> Result<(), ChainError> {
        let num = self.get_verify_num(address)?;
        self.set_verify_num(address, num + 1)
    }

    pub fn get_last_elect(&self, address: &Address) -> Result<u64, ChainError> {
        self.get_field(address, Field::LastElect)
    }

    pub fn set_last_elect(&mut self, address: &Address, height: u64) -> Result<(), ChainError> {
        self.set_field(address, Field::LastElect, &height)
    }

    pub fn get_performance(&self, address: &Address) -> Result<u64, ChainError> {
        self.get_field(address, Field::Performance)
    }

    pub fn set_performance(&mut self, address: &Address, performance: u64) -> Result<(), ChainError> {
        self.set_field(address, Field::Performance, &performance)
    }

    /// Adjust performance by `delta`, clamped to `[0, performance_max]`.
    pub fn add_performance(&mut self, address: &Address, delta: i64) -> Result<(), ChainError> {
        let current = self.get_performance(address)? as i64;
        let next = (current + delta).clamp(0, self.params.performance_max as i64) as u64;
        self.set_performance(address, next)
    }

    /* ↓↓↓ Locks ↓↓↓ */

    pub fn get_hash_lock(&self, address: &Address) -> Result<CryptoHash, ChainError> {
        self.get_field(address, Field::HashLock)
    }

    pub fn set_hash_lock(&mut self, address: &Address, lock: CryptoHash) -> Result<(), ChainError> {
        self.set_field(address, Field::HashLock, &lock)
    }

    pub fn get_time_lock(&self, address: &Address) -> Result<Amount, ChainError> {
        self.get_field(address, Field::TimeLock)
    }

    pub fn set_time_lock(&mut self, address: &Address, lock: Amount) -> Result<(), ChainError> {
        self.set_field(address, Field::TimeLock, &lock)
    }

    /* ↓↓↓ Contract fields ↓↓↓ */

    pub fn get_data_root(&self, address: &Address) -> Result<CryptoHash, ChainError> {
        self.get_field(address, Field::DataRoot)
    }

    pub fn set_data_root(&mut self, address: &Address, root: CryptoHash) -> Result<(), ChainError> {
        self.set_field(address, Field::DataRoot, &root)
    }

    pub fn get_code(&self, address: &Address) -> Result<Vec<u8>, ChainError> {
        self.get_field(address, Field::Code)
    }

    pub fn set_code(&mut self, address: &Address, code: Vec<u8>) -> Result<(), ChainError> {
        self.set_field(address, Field::Code, &code)
    }

    pub fn get_abi(&self, address: &Address) -> Result<Vec<u8>, ChainError> {
        self.get_field(address, Field::Abi)
    }

    pub fn set_abi(&mut self, address: &Address, abi: Vec<u8>) -> Result<(), ChainError> {
        self.set_field(address, Field::Abi, &abi)
    }

    /* ↓↓↓ Contract storage ↓↓↓ */

    /// Read raw storage of `address`, including writes not yet finalised.
    pub fn get_data(&self, address: &Address, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
        if let Some(pending) = self.pending_data.get(address).and_then(|data| data.get(key)) {
            return Ok(pending.clone());
        }
        if !self.account_exists(address)? {
            return Ok(None);
        }
        let trie = self.storage_trie(address)?;
        Ok(trie.get(&storage_key(address, key))?)
    }

    /// Write raw storage of `address`. An empty `value` deletes the key.
    pub fn set_data(
        &mut self,
        address: &Address,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), ChainError> {
        self.require_account(address)?;
        let value = (!value.is_empty()).then_some(value);
        let previous = self
            .pending_data
            .entry(*address)
            .or_default()
            .insert(key.to_vec(), value);
        self.record(StateChange::Data {
            account: *address,
            key: key.to_vec(),
            previous,
        });
        Ok(())
    }

    pub fn put_contract(
        &mut self,
        address: &Address,
        contract: ContractObject,
    ) -> Result<(), ChainError> {
        self.require_account(address)?;
        let previous = self.pending_contracts.insert(*address, contract);
        self.record(StateChange::Contract {
            account: *address,
            previous,
        });
        Ok(())
    }

    pub fn get_contract(&self, address: &Address) -> Result<ContractObject, ChainError> {
        if let Some(contract) = self.pending_contracts.get(address) {
            return Ok(contract.clone());
        }
        if !self.account_exists(address)? {
            return Err(ChainError::ContractNotExist);
        }

        let trie = self.storage_trie(address)?;
        let mut kv = BTreeMap::new();
        for (key, value) in trie.entries_with_prefix(&address.bytes())? {
            let path = String::from_utf8(key[ADDRESS_LENGTH..].to_vec());
            let leaf = String::from_utf8(value);
            match (path, leaf) {
                (Ok(path), Ok(leaf)) => {
                    kv.insert(path, leaf);
                }
                _ => {
                    return Err(ChainError::InvalidContractData {
                        reason: format!("non UTF-8 entry in storage of {}", address),
                    })
                }
            }
        }
        if kv.is_empty() {
            return Err(ChainError::ContractNotExist);
        }
        ContractObject::from_kv(address, &kv)
    }

    pub fn contract_exists(&self, address: &Address) -> Result<bool, ChainError> {
        match self.get_contract(address) {
            Ok(_) => Ok(true),
            Err(ChainError::ContractNotExist) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /* ↓↓↓ Logs ↓↓↓ */

    pub fn add_logs(&mut self, tx_hash: CryptoHash, logs: Vec<Log>) {
        let entry = self.logs.entry(tx_hash).or_default();
        let previous_len = entry.len();
        entry.extend(logs);
        self.record(StateChange::Logs {
            tx_hash,
            previous_len,
        });
    }

    pub fn get_logs(&self, tx_hash: &CryptoHash) -> Vec<Log> {
        self.logs.get(tx_hash).cloned().unwrap_or_default()
    }

    /* ↓↓↓ Snapshots ↓↓↓ */

    pub fn snapshot(&self) -> usize {
        self.journal.len()
    }

    /// Undo every mutation made since `snapshot` was taken.
    ///
    /// # Panics
    ///
    /// If `snapshot` was not returned by [`snapshot`](Self::snapshot) on this state.
    pub fn revert_to_snapshot(&mut self, snapshot: usize) -> Result<(), ChainError> {
        for change in self.journal.drain_to(snapshot) {
            self.undo(change)?;
        }
        self.finalised = None;
        Ok(())
    }

    /// Summarise what happened to each touched account since the last commit.
    pub fn digest(&self) -> Result<BTreeMap<Address, Lifecycle>, ChainError> {
        self.journal.digest()
    }

    /* ↓↓↓ Finalisation ↓↓↓ */

    /// The state root the state would have if it were finalised now. Does not change the state.
    pub fn intermediate_root(&self) -> Result<CryptoHash, ChainError> {
        let mut trie = self.trie.clone();
        for (address, storage) in self.folded()? {
            trie.insert(&Field::DataRoot.key(&address), encode(&storage.root_hash()))?;
        }
        Ok(trie.root_hash())
    }

    /// Fold pending contract objects and storage writes into the storage tries, record their roots as the
    /// accounts' `_data_root`, and return the resulting state root.
    ///
    /// Calling this again without intervening mutations returns the same root.
    pub fn finalise(&mut self) -> Result<CryptoHash, ChainError> {
        if let Some(root) = self.finalised {
            return Ok(root);
        }
        self.journal.digest()?;

        let folded = self.folded()?;
        if !self.pending_data.is_empty() || !self.pending_contracts.is_empty() {
            let pending_data = std::mem::take(&mut self.pending_data);
            let pending_contracts = std::mem::take(&mut self.pending_contracts);
            self.record(StateChange::Finalise {
                pending_data,
                pending_contracts,
            });
        }
        for (address, storage) in folded {
            let data_root = storage.root_hash();
            self.storage_tries.insert((address, data_root), storage);
            self.set_data_root(&address, data_root)?;
        }

        let root = self.trie.root_hash();
        self.finalised = Some(root);
        log::debug!("finalised state root {}", root);
        Ok(root)
    }

    /// Finalise, write every dirty node of the storage tries and the block-state trie into `wb`, and clear
    /// the journal.
    pub fn commit(&mut self, wb: &mut impl WriteBatch) -> Result<CryptoHash, ChainError> {
        let root = self.finalise()?;
        // Only the storage tries the accounts still point at are written and kept.
        let mut live = HashMap::new();
        for ((address, data_root), storage) in std::mem::take(&mut self.storage_tries) {
            if self.trie.get(&Field::DataRoot.key(&address))? == Some(encode(&data_root)) {
                storage.commit(wb);
                live.insert((address, data_root), storage);
            }
        }
        self.storage_tries = live;
        self.trie.commit(wb);
        self.journal.clear();
        Ok(root)
    }

    /* ↓↓↓ Internals ↓↓↓ */

    fn record(&mut self, change: StateChange) {
        self.finalised = None;
        self.journal.push(change);
    }

    fn require_account(&self, address: &Address) -> Result<(), ChainError> {
        if self.account_exists(address)? {
            Ok(())
        } else {
            Err(ChainError::AccountNotExist)
        }
    }

    fn get_field<T: BorshDeserialize>(&self, address: &Address, field: Field) -> Result<T, ChainError> {
        let bytes = self
            .trie
            .get(&field.key(address))?
            .ok_or(ChainError::AccountNotExist)?;
        T::deserialize(&mut bytes.as_slice()).map_err(|source| ChainError::Decode {
            what: field.suffix(),
            source,
        })
    }

    fn set_field<T: BorshSerialize>(
        &mut self,
        address: &Address,
        field: Field,
        value: &T,
    ) -> Result<(), ChainError> {
        self.require_account(address)?;
        let key = field.key(address);
        let current = encode(value);
        let previous = self.trie.get(&key)?;
        self.trie.insert(&key, current.clone())?;
        self.record(StateChange::Field {
            account: *address,
            field,
            previous,
            current,
        });
        Ok(())
    }

    fn undo(&mut self, change: StateChange) -> Result<(), ChainError> {
        match change {
            StateChange::NewAccount { account, was_live } => {
                if !was_live {
                    for field in Field::ALL {
                        self.trie.delete(&field.key(&account))?;
                    }
                }
            }
            StateChange::DeleteAccount {
                account,
                previous,
                pending_data,
                pending_contract,
            } => {
                for (field, value) in previous {
                    self.trie.insert(&field.key(&account), value)?;
                }
                if let Some(data) = pending_data {
                    self.pending_data.insert(account, data);
                }
                if let Some(contract) = pending_contract {
                    self.pending_contracts.insert(account, contract);
                }
            }
            StateChange::Field {
                account,
                field,
                previous,
                ..
            } => match previous {
                Some(value) => self.trie.insert(&field.key(&account), value)?,
                None => self.trie.delete(&field.key(&account))?,
            },
            StateChange::Data {
                account,
                key,
                previous,
            } => {
                let data = self.pending_data.entry(account).or_default();
                match previous {
                    Some(value) => {
                        data.insert(key, value);
                    }
                    None => {
                        data.remove(&key);
                    }
                }
                if data.is_empty() {
                    self.pending_data.remove(&account);
                }
            }
            StateChange::Contract { account, previous } => match previous {
                Some(contract) => {
                    self.pending_contracts.insert(account, contract);
                }
                None => {
                    self.pending_contracts.remove(&account);
                }
            },
            StateChange::Logs {
                tx_hash,
                previous_len,
            } => {
                if let Some(logs) = self.logs.get_mut(&tx_hash) {
                    logs.truncate(previous_len);
                    if logs.is_empty() {
                        self.logs.remove(&tx_hash);
                    }
                }
            }
            StateChange::Finalise {
                pending_data,
                pending_contracts,
            } => {
                self.pending_data = pending_data;
                self.pending_contracts = pending_contracts;
            }
        }
        Ok(())
    }

    /// The storage trie `address`'s `_data_root` points at.
    fn storage_trie(&self, address: &Address) -> Result<Trie<S>, ChainError> {
        let data_root = self.get_data_root(address)?;
        match self.storage_tries.get(&(*address, data_root)) {
            Some(trie) => Ok(trie.clone()),
            None => Ok(Trie::new(self.source.clone(), data_root)?),
        }
    }

    /// The storage tries of every live account with pending storage, with that storage folded in.
    fn folded(&self) -> Result<BTreeMap<Address, Trie<S>>, ChainError> {
        let mut storage_tries = BTreeMap::new();

        let touched: BTreeSet<Address> = self
            .pending_contracts
            .keys()
            .chain(self.pending_data.keys())
            .copied()
            .collect();
        for address in touched {
            if !self.account_exists(&address)? {
                continue;
            }
            let mut storage = self.storage_trie(&address)?;

            if let Some(contract) = self.pending_contracts.get(&address) {
                let kv = json_kv::to_kv(contract)?;
                let stale: Vec<Vec<u8>> = storage
                    .entries_with_prefix(&address.bytes())?
                    .into_iter()
                    .map(|(key, _)| key)
                    .filter(|key| {
                        std::str::from_utf8(&key[ADDRESS_LENGTH..])
                            .map_or(true, |path| !kv.contains_key(path))
                    })
                    .collect();
                for key in stale {
                    storage.delete(&key)?;
                }
                for (path, leaf) in kv {
                    storage.insert(&storage_key(&address, path.as_bytes()), leaf.into_bytes())?;
                }
            }

            if let Some(data) = self.pending_data.get(&address) {
                for (key, value) in data {
                    match value {
                        Some(value) => storage.insert(&storage_key(&address, key), value.clone())?,
                        None => storage.delete(&storage_key(&address, key))?,
                    }
                }
            }

            storage_tries.insert(address, storage);
        }

        Ok(storage_tries)
    }
}

fn storage_key(address: &Address, key: &[u8]) -> Vec<u8> {
    let mut storage_key = address.bytes().to_vec();
    storage_key.extend_from_slice(key);
    storage_key
}
