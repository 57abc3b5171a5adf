/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that are shared by every component of the block ingestion pipeline: hashes, amounts,
//! addresses, keys, transactions, votes, receipts, and blocks.

pub mod address;

pub mod block;

pub mod crypto_primitives;

pub mod data_types;

pub mod derive_sha;

pub mod difficulty;

pub mod receipt;

pub mod transaction;

pub mod vote;
