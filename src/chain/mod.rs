/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The chain as the rest of the pipeline sees it.
//!
//! [`ChainReadView`] is the read surface that validation and block processing are written against, and
//! [`ChainInterface`] adds the two writes the ingestion service performs: committing a block's write batch
//! and rolling back the canonical index. [`ChainState`] reads straight from storage, and
//! [`CachedChainState`] puts LRU caches in front of it.

pub mod cached;

pub mod chain_state;

pub mod genesis;

pub mod reader;

pub use cached::CachedChainState;
pub use chain_state::ChainState;
pub use genesis::{Genesis, GenesisAccount};
pub use reader::{ChainInterface, ChainReadView};
