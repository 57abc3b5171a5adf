/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events that the chain service emits as it ingests blocks.
//!
//! An event for a given action is emitted after the action has completed. Events are sent to the event bus
//! thread, which passes them to the handlers registered in the
//! [`ChainServiceSpec`](crate::service::ChainServiceSpec), and to the default loggers of
//! [`logging`](crate::logging) if event logging is enabled.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::{address::Address, block::Block};

pub enum Event {
    // Events that change the canonical chain.
    InsertBlock(InsertBlockEvent),
    RollbackBlock(RollbackBlockEvent),
    UpdateVerifiers(UpdateVerifiersEvent),
    // Events of blocks that were not inserted.
    RejectBlock(RejectBlockEvent),
    // Future-block queue events.
    QueueFutureBlock(QueueFutureBlockEvent),
    DropFutureBlock(DropFutureBlockEvent),
    StartFutureBlockDrain(StartFutureBlockDrainEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only hangs up while the service is shutting down.
            let _ = event_publisher.send(event);
        }
    }
}

/// A block was validated and became the head of the chain.
pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
}

/// The canonical block at `number` was taken off the canonical chain by a special block.
pub struct RollbackBlockEvent {
    pub timestamp: SystemTime,
    pub number: u64,
}

/// The verifiers of `slot` were elected.
pub struct UpdateVerifiersEvent {
    pub timestamp: SystemTime,
    pub slot: u64,
    pub verifiers: Vec<Address>,
}

pub struct RejectBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
    pub reason: String,
}

/// A block too far ahead of the head was put in the future-block queue.
pub struct QueueFutureBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
}

/// A queued future block failed validation when it was retried, and was dropped from the queue.
pub struct DropFutureBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
    pub reason: String,
}

/// The future-block drainer started retrying `queued` blocks.
pub struct StartFutureBlockDrainEvent {
    pub timestamp: SystemTime,
    pub queued: usize,
}
