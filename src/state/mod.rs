/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The account state engine: per-address account records and contract storage, journaled for
//! snapshot and revert, and committed as a trie root.

pub mod account_state;

pub mod contracts;

mod journal;

mod verifier_ops;

pub use account_state::{Account, AccountStateDB, StateParams};

pub use contracts::{ContractCall, ContractObject, EarlyReward, Erc20Token};

pub use journal::Lifecycle;
