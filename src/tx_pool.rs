/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The transaction pool, as seen by the ingestion service.
//!
//! The pool itself (admission, pricing, eviction) lives outside of this crate. The
//! [ingestion service](crate::service::ChainService) only tells it when the head moves and hands it the
//! transactions displaced by a fork reorg.

use std::collections::BTreeMap;

use crate::types::{
    address::Address,
    block::{Block, Header},
    transaction::Transaction,
};

pub trait TxPool: Send {
    /// The head of the chain moved from `old_head` to `new_head`. Drop transactions that became stale.
    fn reset(&mut self, old_head: &Header, new_head: &Header);

    /// Re-admit transactions that are no longer part of the canonical chain.
    fn add_remotes(&mut self, txs: Vec<Transaction>);

    /// Forget the transactions included in `block`.
    fn remove_txs(&mut self, block: &Block);

    /// Executable transactions, grouped by sender and ordered by nonce.
    fn pending(&self) -> BTreeMap<Address, Vec<Transaction>>;
}

/// A pool that holds nothing. Suitable for nodes that only follow the chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTxPool;

impl TxPool for NoopTxPool {
    fn reset(&mut self, _old_head: &Header, _new_head: &Header) {}

    fn add_remotes(&mut self, _txs: Vec<Transaction>) {}

    fn remove_txs(&mut self, _block: &Block) {}

    fn pending(&self) -> BTreeMap<Address, Vec<Transaction>> {
        BTreeMap::new()
    }
}
