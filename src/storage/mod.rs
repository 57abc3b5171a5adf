/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable persistence and the layout of persisted chain variables.

pub mod pluggables;

pub mod variables;

pub mod write_batch;
