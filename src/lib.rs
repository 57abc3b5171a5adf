/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A block ingestion pipeline for a blockchain that combines proof-of-work mining with BFT voting by an
//! elected set of verifiers.
//!
//! Blocks come in from the network and are handed to a [`ChainService`](service::ChainService). The service
//! runs each block through a chain of validation steps ([`middleware`]), replays its transactions on the
//! parent's state ([`processor`]), updates the verifier registry ([`register_db`]), and writes the block and
//! everything it produced to a pluggable key-value store ([`storage`]) in a single atomic batch. Blocks
//! that arrive too early are queued and retried. Every few blocks the chain elects the verifiers of an
//! upcoming slot ([`verifier`]).
//!
//! The crate does no networking, mining, or transaction pool management. The pool, the economy model, and
//! the VM are collaborators passed in by the user.

pub mod types;

pub mod trie;

pub mod json_kv;

pub mod storage;

pub mod state;

pub mod register_db;

pub mod verifier;

pub mod chain;

pub mod processor;

pub mod middleware;

pub mod config;

pub mod errors;

pub mod tx_pool;

pub mod cache_db;

pub mod economy_model;

pub mod vm;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub mod service;
