//! A [`TxPool`] that records what the chain service tells it.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use powbft_rs::{
    tx_pool::TxPool,
    types::{
        address::Address,
        block::{Block, Header},
        data_types::CryptoHash,
        transaction::Transaction,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PoolCall {
    Reset { old_head: u64, new_head: u64 },
    AddRemotes(Vec<CryptoHash>),
    RemoveTxs(u64),
}

/// Clones share their record, so a test can keep one and hand the other to the service.
#[derive(Clone, Default)]
pub(crate) struct MockPool(Arc<Mutex<Vec<PoolCall>>>);

impl MockPool {
    pub(crate) fn new() -> MockPool {
        MockPool::default()
    }

    pub(crate) fn calls(&self) -> Vec<PoolCall> {
        self.0.lock().unwrap().clone()
    }

    /// Hashes of every transaction handed back to the pool, in order.
    pub(crate) fn re_added(&self) -> Vec<CryptoHash> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PoolCall::AddRemotes(hashes) => Some(hashes),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl TxPool for MockPool {
    fn reset(&mut self, old_head: &Header, new_head: &Header) {
        self.0.lock().unwrap().push(PoolCall::Reset {
            old_head: old_head.number,
            new_head: new_head.number,
        });
    }

    fn add_remotes(&mut self, txs: Vec<Transaction>) {
        self.0
            .lock()
            .unwrap()
            .push(PoolCall::AddRemotes(txs.iter().map(|tx| tx.hash()).collect()));
    }

    fn remove_txs(&mut self, block: &Block) {
        self.0
            .lock()
            .unwrap()
            .push(PoolCall::RemoveTxs(block.number()));
    }

    fn pending(&self) -> BTreeMap<Address, Vec<Transaction>> {
        BTreeMap::new()
    }
}
