/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block ingestion service.
//!
//! A [`ChainService`] owns the chain and is the only writer to it. It is built from a [`ChainServiceSpec`],
//! which names the store, the genesis block, and the collaborators (transaction pool, economy model, VM)
//! the service works with. [`start`](ChainServiceSpec::start) writes the genesis block if the store is
//! empty, and starts two threads:
//! 1. The future-block drainer, which retries queued future blocks every
//!    [`future_block_tick`](crate::config::ChainConfig::future_block_tick), lowest first.
//! 2. The event bus, if event logging is enabled or any event handler is registered.
//!
//! ## Saving a block
//!
//! Block writes are serialised by a single lock. A block is run through one of the validation chains of
//! [`middleware`](crate::middleware) and, if every step passes, becomes the head. A block that does not yet
//! connect to the head is queued instead of rejected, and is retried by the drainer. A special block may
//! replace up to `rollback_limit` canonical blocks; the transactions of the block it replaces at its own
//! height go back to the transaction pool.
//!
//! Dropping the service stops its threads.

use std::num::NonZeroUsize;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use lru::LruCache;
use parking_lot::Mutex;
use typed_builder::TypedBuilder;

use crate::{
    cache_db::{CacheDB, KVCacheDB},
    chain::{CachedChainState, ChainReadView, Genesis},
    config::ChainConfig,
    economy_model::EconomyModel,
    errors::ChainError,
    event_bus::*,
    events::*,
    middleware::{BlockContext, Variant},
    storage::pluggables::KVStore,
    tx_pool::TxPool,
    types::{
        address::Address,
        block::Block,
        data_types::{Amount, CryptoHash},
        vote::Vote,
    },
    vm::Vm,
};

#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ChainServiceSpec]. On the builder call the following methods to construct a valid [ChainServiceSpec].

    Required:
    - `.kv_store(...)`
    - `.config(...)`
    - `.genesis(...)`
    - `.tx_pool(...)`
    - `.economy_model(...)`
    - `.vm(...)`

    Optional:
    - `.cache_db(...)`
    - `.log_events(...)`
    - `.on_insert_block(...)`
    - `.on_rollback_block(...)`
    - `.on_update_verifiers(...)`
    - `.on_reject_block(...)`
    - `.on_queue_future_block(...)`
    - `.on_drop_future_block(...)`
    - `.on_start_future_block_drain(...)`
"))]
pub struct ChainServiceSpec<K: KVStore> {
    #[builder(setter(doc = "Set the key-value store the chain lives in. The argument must implement the [KVStore](crate::storage::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the [chain parameters](ChainConfig). Required."))]
    config: ChainConfig,
    #[builder(setter(doc = "Set the genesis block, written if the store holds no chain yet. Required."))]
    genesis: Genesis,
    #[builder(setter(transform = |tx_pool: impl TxPool + 'static| Box::new(tx_pool) as Box<dyn TxPool>,
    doc = "Set the transaction pool that is told about head changes and displaced transactions. Required."))]
    tx_pool: Box<dyn TxPool>,
    #[builder(setter(transform = |economy_model: impl EconomyModel + 'static| Arc::new(economy_model) as Arc<dyn EconomyModel>,
    doc = "Set the economy model that decides block rewards and locked balances. Required."))]
    economy_model: Arc<dyn EconomyModel>,
    #[builder(setter(transform = |vm: impl Vm + 'static| Arc::new(vm) as Arc<dyn Vm>,
    doc = "Set the VM that executes contract transactions. Required."))]
    vm: Arc<dyn Vm>,
    #[builder(default, setter(transform = |cache_db: impl CacheDB + 'static| Some(Box::new(cache_db) as Box<dyn CacheDB>),
    doc = "Set where seen commits are kept. Defaults to the chain's own key-value store. Optional."))]
    cache_db: Option<Box<dyn CacheDB>>,
    #[builder(default = false, setter(doc = "Enable logging of events? Optional."))]
    log_events: bool,
    #[builder(default, setter(transform = |handler: impl Fn(&InsertBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertBlockEvent>),
    doc = "Register a handler closure to be invoked after a block becomes the head of the chain. Optional."))]
    on_insert_block: Option<HandlerPtr<InsertBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RollbackBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RollbackBlockEvent>),
    doc = "Register a handler closure to be invoked after a special block takes a block off the canonical chain. Optional."))]
    on_rollback_block: Option<HandlerPtr<RollbackBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateVerifiersEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateVerifiersEvent>),
    doc = "Register a handler closure to be invoked after the verifiers of an upcoming slot are elected. Optional."))]
    on_update_verifiers: Option<HandlerPtr<UpdateVerifiersEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectBlockEvent>),
    doc = "Register a handler closure to be invoked after a block fails validation. Optional."))]
    on_reject_block: Option<HandlerPtr<RejectBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&QueueFutureBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<QueueFutureBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is queued as a future block. Optional."))]
    on_queue_future_block: Option<HandlerPtr<QueueFutureBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DropFutureBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DropFutureBlockEvent>),
    doc = "Register a handler closure to be invoked after a queued future block is dropped. Optional."))]
    on_drop_future_block: Option<HandlerPtr<DropFutureBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartFutureBlockDrainEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartFutureBlockDrainEvent>),
    doc = "Register a handler closure to be invoked when the drainer starts retrying queued future blocks. Optional."))]
    on_start_future_block_drain: Option<HandlerPtr<StartFutureBlockDrainEvent>>,
}

impl<K: KVStore> ChainServiceSpec<K> {
    /// Write the genesis block if needed, and start the threads of the service.
    pub fn start(self) -> Result<ChainService<K>, ChainError> {
        let tick = self.config.future_block_tick;
        let queue_capacity =
            NonZeroUsize::new(self.config.max_future_blocks).unwrap_or(NonZeroUsize::MIN);

        let chain = CachedChainState::new(self.kv_store.clone(), self.config);
        chain.initialize(&self.genesis)?;

        let cache_db = self
            .cache_db
            .unwrap_or_else(|| Box::new(KVCacheDB::new(self.kv_store.clone())));

        let event_handlers = EventHandlers::new(
            self.log_events,
            self.on_insert_block,
            self.on_rollback_block,
            self.on_update_verifiers,
            self.on_reject_block,
            self.on_queue_future_block,
            self.on_drop_future_block,
            self.on_start_future_block_drain,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let core = Arc::new(ChainCore {
            chain,
            tx_pool: Mutex::new(self.tx_pool),
            cache_db: Mutex::new(cache_db),
            economy_model: self.economy_model,
            vm: self.vm,
            future_blocks: Mutex::new(LruCache::new(queue_capacity)),
            save_lock: Mutex::new(()),
        });

        let (drainer_shutdown, drainer_shutdown_receiver) = mpsc::channel();
        let drainer = start_future_block_drainer(
            core.clone(),
            tick,
            event_publisher.clone(),
            drainer_shutdown_receiver,
        );

        let (event_bus_shutdown, event_bus_shutdown_receiver) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };
        let event_bus = event_subscriber.and_then(|event_subscriber| {
            event_bus_shutdown_receiver.map(|shutdown| {
                start_event_bus(event_handlers, event_subscriber, shutdown)
            })
        });

        Ok(ChainService {
            core,
            event_publisher,
            drainer: Some(drainer),
            drainer_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

pub struct ChainService<K: KVStore> {
    core: Arc<ChainCore<K>>,
    event_publisher: Option<Sender<Event>>,
    drainer: Option<JoinHandle<()>>,
    drainer_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> ChainService<K> {
    /// Validate `block` in full, including the `seen_commits` that committed it, and make it the head.
    ///
    /// A block that does not yet connect to the head is queued and `Ok` is returned.
    pub fn save_block(&self, block: Block, seen_commits: Vec<Vote>) -> Result<(), ChainError> {
        self.core
            .save(block, seen_commits, Variant::Bft, &self.event_publisher)
    }

    /// Save a block fetched during sync, without its votes.
    pub fn save_block_without_votes(&self, block: Block) -> Result<(), ChainError> {
        self.core
            .save(block, Vec::new(), Variant::BftWithoutVotes, &self.event_publisher)
    }

    /// Save a block of a pure proof-of-work chain.
    pub fn save_pow_block(&self, block: Block) -> Result<(), ChainError> {
        self.core
            .save(block, Vec::new(), Variant::Pow, &self.event_publisher)
    }

    pub fn chain(&self) -> &CachedChainState<K> {
        &self.core.chain
    }

    pub fn current_block(&self) -> Result<Block, ChainError> {
        self.core.chain.current_block()
    }

    pub fn current_balance(&self, address: &Address) -> Result<Amount, ChainError> {
        self.core.chain.current_state()?.get_balance(address)
    }

    /// The nonce the next transaction of `address` must carry.
    pub fn get_transaction_nonce(&self, address: &Address) -> Result<u64, ChainError> {
        self.core.chain.current_state()?.get_nonce(address)
    }

    /// The votes that committed the canonical block at `height`.
    pub fn get_seen_commit(&self, height: u64) -> Result<Vec<Vote>, ChainError> {
        let hash = self
            .core
            .chain
            .get_header_by_number(height)?
            .ok_or(ChainError::BlockNotFound)?
            .hash();
        Ok(self
            .core
            .cache_db
            .lock()
            .get_seen_commits(height, &hash)?
            .unwrap_or_default())
    }

    pub fn future_block_count(&self) -> usize {
        self.core.future_blocks.lock().len()
    }
}

impl<K: KVStore> Drop for ChainService<K> {
    fn drop(&mut self) {
        // Safety: the drainer publishes events, so it is stopped before the event bus. A thread that has
        // already exited has dropped its receiver, which makes the send fail; that is ignored.

        let _ = self.drainer_shutdown.send(());
        if let Some(drainer) = self.drainer.take() {
            let _ = drainer.join();
        }

        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| {
                let _ = shutdown.send(());
            });
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}

/// A block waiting in the future-block queue, with what it was saved with.
#[derive(Clone)]
struct QueuedBlock {
    block: Block,
    seen_commits: Vec<Vote>,
    variant: Variant,
}

/// The state the service shares with its drainer thread.
struct ChainCore<K: KVStore> {
    chain: CachedChainState<K>,
    tx_pool: Mutex<Box<dyn TxPool>>,
    cache_db: Mutex<Box<dyn CacheDB>>,
    economy_model: Arc<dyn EconomyModel>,
    vm: Arc<dyn Vm>,
    future_blocks: Mutex<LruCache<CryptoHash, QueuedBlock>>,
    save_lock: Mutex<()>,
}

impl<K: KVStore> ChainCore<K> {
    /// Insert `block`, queueing it if it is a future block.
    fn save(
        &self,
        block: Block,
        seen_commits: Vec<Vote>,
        variant: Variant,
        event_publisher: &Option<Sender<Event>>,
    ) -> Result<(), ChainError> {
        match self.insert(&block, &seen_commits, variant, event_publisher) {
            Ok(()) => Ok(()),
            Err(err) if err.is_soft() => {
                log::debug!("queueing future block {} at height {}", block.hash(), block.number());
                self.future_blocks.lock().put(
                    block.hash(),
                    QueuedBlock {
                        block: block.clone(),
                        seen_commits,
                        variant,
                    },
                );
                Event::publish(
                    event_publisher,
                    Event::QueueFutureBlock(QueueFutureBlockEvent {
                        timestamp: SystemTime::now(),
                        block,
                    }),
                );
                Ok(())
            }
            Err(err) => {
                Event::publish(
                    event_publisher,
                    Event::RejectBlock(RejectBlockEvent {
                        timestamp: SystemTime::now(),
                        block,
                        reason: err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    fn insert(
        &self,
        block: &Block,
        seen_commits: &[Vote],
        variant: Variant,
        event_publisher: &Option<Sender<Event>>,
    ) -> Result<(), ChainError> {
        let _save_guard = self.save_lock.lock();
        let chain = &self.chain;
        let hash = block.hash();
        let old_head = chain.current_header()?;

        if block.number().saturating_add(chain.config().rollback_limit) <= old_head.number {
            return Err(ChainError::AlreadyHaveThisBlock);
        }
        if block.number() <= old_head.number
            && chain.get_header_by_number(block.number())?.map(|header| header.hash()) == Some(hash)
        {
            log::debug!("block {} is already canonical", hash);
            self.future_blocks.lock().pop(&hash);
            return Ok(());
        }

        let mut ctx = BlockContext::new(block, chain, &*self.economy_model, &*self.vm)
            .with_seen_commits(seen_commits)
            .with_variant(variant);
        ctx.process()?;
        let displaced = ctx.displaced().to_vec();
        let elected = ctx.elected().cloned();

        {
            let mut cache_db = self.cache_db.lock();
            for old in &displaced {
                cache_db.delete_seen_commits(old.number(), &old.hash())?;
            }
            if !seen_commits.is_empty() {
                cache_db.save_seen_commits(block.number(), &hash, seen_commits)?;
            }
        }

        {
            let new_head = chain.current_header()?;
            let mut tx_pool = self.tx_pool.lock();
            tx_pool.reset(&old_head, &new_head);
            tx_pool.remove_txs(block);
            // Only the transactions of the block replaced at the same height go back to the pool.
            if let Some(replaced) = displaced
                .first()
                .filter(|replaced| replaced.number() == block.number() && !replaced.is_special())
            {
                tx_pool.add_remotes(replaced.transactions().to_vec());
            }
        }

        for old in &displaced {
            Event::publish(
                event_publisher,
                Event::RollbackBlock(RollbackBlockEvent {
                    timestamp: SystemTime::now(),
                    number: old.number(),
                }),
            );
        }
        self.future_blocks.lock().pop(&hash);
        if let Some((slot, verifiers)) = elected {
            Event::publish(
                event_publisher,
                Event::UpdateVerifiers(UpdateVerifiersEvent {
                    timestamp: SystemTime::now(),
                    slot,
                    verifiers,
                }),
            );
        }
        Event::publish(
            event_publisher,
            Event::InsertBlock(InsertBlockEvent {
                timestamp: SystemTime::now(),
                block: block.clone(),
            }),
        );
        log::info!("new head {} at height {}", hash, block.number());
        Ok(())
    }

    /// Retry every queued future block, lowest first. Blocks that still do not connect stay queued, and
    /// blocks that fail validation are dropped.
    fn drain_future_blocks(&self, event_publisher: &Option<Sender<Event>>) {
        let mut queued: Vec<QueuedBlock> = self
            .future_blocks
            .lock()
            .iter()
            .map(|(_, queued)| queued.clone())
            .collect();
        if queued.is_empty() {
            return;
        }
        queued.sort_by_key(|queued| queued.block.number());
        Event::publish(
            event_publisher,
            Event::StartFutureBlockDrain(StartFutureBlockDrainEvent {
                timestamp: SystemTime::now(),
                queued: queued.len(),
            }),
        );

        for QueuedBlock {
            block,
            seen_commits,
            variant,
        } in queued
        {
            match self.insert(&block, &seen_commits, variant, event_publisher) {
                Ok(()) => (),
                Err(err) if err.is_soft() => (),
                Err(err) => {
                    log::debug!("dropping future block {}: {}", block.hash(), err);
                    self.future_blocks.lock().pop(&block.hash());
                    Event::publish(
                        event_publisher,
                        Event::DropFutureBlock(DropFutureBlockEvent {
                            timestamp: SystemTime::now(),
                            block,
                            reason: err.to_string(),
                        }),
                    );
                }
            }
        }
    }
}

fn start_future_block_drainer<K: KVStore>(
    core: Arc<ChainCore<K>>,
    tick: Duration,
    event_publisher: Option<Sender<Event>>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.recv_timeout(tick) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => core.drain_future_blocks(&event_publisher),
        }
    })
}
