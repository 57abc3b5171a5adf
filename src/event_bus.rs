/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that passes emitted events on to their handlers.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// How long the event bus waits for an event before checking for shutdown again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) insert_block_handlers: Vec<HandlerPtr<InsertBlockEvent>>,
    pub(crate) rollback_block_handlers: Vec<HandlerPtr<RollbackBlockEvent>>,
    pub(crate) update_verifiers_handlers: Vec<HandlerPtr<UpdateVerifiersEvent>>,
    pub(crate) reject_block_handlers: Vec<HandlerPtr<RejectBlockEvent>>,
    pub(crate) queue_future_block_handlers: Vec<HandlerPtr<QueueFutureBlockEvent>>,
    pub(crate) drop_future_block_handlers: Vec<HandlerPtr<DropFutureBlockEvent>>,
    pub(crate) start_future_block_drain_handlers: Vec<HandlerPtr<StartFutureBlockDrainEvent>>,
}

impl EventHandlers {
    /// Collect the user's handlers, adding the default logger of every event type in front of them if
    /// `log_events` is set.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        insert_block_handler: Option<HandlerPtr<InsertBlockEvent>>,
        rollback_block_handler: Option<HandlerPtr<RollbackBlockEvent>>,
        update_verifiers_handler: Option<HandlerPtr<UpdateVerifiersEvent>>,
        reject_block_handler: Option<HandlerPtr<RejectBlockEvent>>,
        queue_future_block_handler: Option<HandlerPtr<QueueFutureBlockEvent>>,
        drop_future_block_handler: Option<HandlerPtr<DropFutureBlockEvent>>,
        start_future_block_drain_handler: Option<HandlerPtr<StartFutureBlockDrainEvent>>,
    ) -> EventHandlers {
        fn handlers<T: Logger>(log_events: bool, user: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
            let mut handlers = Vec::new();
            if log_events {
                handlers.push(T::get_logger());
            }
            handlers.extend(user);
            handlers
        }

        EventHandlers {
            insert_block_handlers: handlers(log_events, insert_block_handler),
            rollback_block_handlers: handlers(log_events, rollback_block_handler),
            update_verifiers_handlers: handlers(log_events, update_verifiers_handler),
            reject_block_handlers: handlers(log_events, reject_block_handler),
            queue_future_block_handlers: handlers(log_events, queue_future_block_handler),
            drop_future_block_handlers: handlers(log_events, drop_future_block_handler),
            start_future_block_drain_handlers: handlers(log_events, start_future_block_drain_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.insert_block_handlers.is_empty()
            && self.rollback_block_handlers.is_empty()
            && self.update_verifiers_handlers.is_empty()
            && self.reject_block_handlers.is_empty()
            && self.queue_future_block_handlers.is_empty()
            && self.drop_future_block_handlers.is_empty()
            && self.start_future_block_drain_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertBlock(insert_block_event) => self
                .insert_block_handlers
                .iter()
                .for_each(|handler| handler(&insert_block_event)),

            Event::RollbackBlock(rollback_block_event) => self
                .rollback_block_handlers
                .iter()
                .for_each(|handler| handler(&rollback_block_event)),

            Event::UpdateVerifiers(update_verifiers_event) => self
                .update_verifiers_handlers
                .iter()
                .for_each(|handler| handler(&update_verifiers_event)),

            Event::RejectBlock(reject_block_event) => self
                .reject_block_handlers
                .iter()
                .for_each(|handler| handler(&reject_block_event)),

            Event::QueueFutureBlock(queue_future_block_event) => self
                .queue_future_block_handlers
                .iter()
                .for_each(|handler| handler(&queue_future_block_event)),

            Event::DropFutureBlock(drop_future_block_event) => self
                .drop_future_block_handlers
                .iter()
                .for_each(|handler| handler(&drop_future_block_event)),

            Event::StartFutureBlockDrain(start_future_block_drain_event) => self
                .start_future_block_drain_handlers
                .iter()
                .for_each(|handler| handler(&start_future_block_drain_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
