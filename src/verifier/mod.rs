/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic election of the verifiers of each slot.
//!
//! The verifiers of slot `s` (for `s >= slot_margin`) are elected from the candidates registered at the
//! last block of slot `s - slot_margin`, using that block's seed as the source of luck. Slots before
//! `slot_margin` are verified by the configured default verifiers.

pub mod priority;

pub mod selection;

pub use selection::{Election, TopVerifiers};
