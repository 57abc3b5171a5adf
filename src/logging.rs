/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them with the `log_events` flag of the
//! [`ChainServiceSpec`](crate::service::ChainServiceSpec).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
//! onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet is
//! how an [InsertBlock](crate::events::InsertBlockEvent) is printed:
//!
//! ```text
//! InsertBlock, 1701329264, fNGCJyk, 12, 3
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the hash of the block.
//! - The fourth value is the height of the block.
//! - The fifth value is the number of transactions in the block.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const ROLLBACK_BLOCK: &str = "RollbackBlock";
pub const UPDATE_VERIFIERS: &str = "UpdateVerifiers";
pub const REJECT_BLOCK: &str = "RejectBlock";
pub const QUEUE_FUTURE_BLOCK: &str = "QueueFutureBlock";
pub const DROP_FUTURE_BLOCK: &str = "DropFutureBlock";
pub const START_FUTURE_BLOCK_DRAIN: &str = "StartFutureBlockDrain";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_block_event: &InsertBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                INSERT_BLOCK,
                secs_since_unix_epoch(insert_block_event.timestamp),
                first_seven_base64_chars(&insert_block_event.block.hash().bytes()),
                insert_block_event.block.number(),
                insert_block_event.block.transactions().len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for RollbackBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |rollback_block_event: &RollbackBlockEvent| {
            log::info!(
                "{}, {}, {}",
                ROLLBACK_BLOCK,
                secs_since_unix_epoch(rollback_block_event.timestamp),
                rollback_block_event.number
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateVerifiersEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_verifiers_event: &UpdateVerifiersEvent| {
            let verifiers = update_verifiers_event
                .verifiers
                .iter()
                .map(|verifier| first_seven_base64_chars(&verifier.bytes()))
                .collect::<Vec<String>>()
                .join(" ");
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_VERIFIERS,
                secs_since_unix_epoch(update_verifiers_event.timestamp),
                update_verifiers_event.slot,
                verifiers
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_block_event: &RejectBlockEvent| {
            log::warn!(
                "{}, {}, {}, {}, {}",
                REJECT_BLOCK,
                secs_since_unix_epoch(reject_block_event.timestamp),
                first_seven_base64_chars(&reject_block_event.block.hash().bytes()),
                reject_block_event.block.number(),
                reject_block_event.reason
            )
        };
        Box::new(logger)
    }
}

impl Logger for QueueFutureBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |queue_future_block_event: &QueueFutureBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                QUEUE_FUTURE_BLOCK,
                secs_since_unix_epoch(queue_future_block_event.timestamp),
                first_seven_base64_chars(&queue_future_block_event.block.hash().bytes()),
                queue_future_block_event.block.number()
            )
        };
        Box::new(logger)
    }
}

impl Logger for DropFutureBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |drop_future_block_event: &DropFutureBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                DROP_FUTURE_BLOCK,
                secs_since_unix_epoch(drop_future_block_event.timestamp),
                first_seven_base64_chars(&drop_future_block_event.block.hash().bytes()),
                drop_future_block_event.block.number(),
                drop_future_block_event.reason
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartFutureBlockDrainEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_future_block_drain_event: &StartFutureBlockDrainEvent| {
            log::debug!(
                "{}, {}, {}",
                START_FUTURE_BLOCK_DRAIN,
                secs_since_unix_epoch(start_future_block_drain_event.timestamp),
                start_future_block_drain_event.queued
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or(0)
}
