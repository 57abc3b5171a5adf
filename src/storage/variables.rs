/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each chain variable is stored in the user-provided key-value
//! store.
//!
//! # List of chain variables
//!
//! |Variable|Key|Value|
//! |---|---|---|
//! |Block body|`b` + `number (u64, BE)` + `hash`|Borsh [`Body`](crate::types::block::Body) and verifications|
//! |Header|`h` + `hash`|Borsh [`Header`](crate::types::block::Header)|
//! |Canonical hash|`H` + `number (u64, BE)`|[`CryptoHash`](crate::types::data_types::CryptoHash) of the canonical block at that number|
//! |Block number|`n` + `hash`|`u64`|
//! |Receipts|`r` + `hash`|Borsh `Vec<Receipt>`|
//! |Seen commits|`s` + `height (u64, BE)` + `hash`|Borsh `Vec<Vote>` that finalised the block|
//! |Tx lookup|`l` + `tx hash`|Borsh [`TxLookupEntry`](super::pluggables::TxLookupEntry)|
//! |Head block|`LastBlock`|hash of the current head block|
//! |Head header|`LastHeader`|hash of the current head header|
//! |Trie nodes|`t` + `node hash`|Borsh trie node, shared by the block-state, contract-storage and register tries|
//!
//! Block-number keys use big-endian integers so that an ordered store iterates them in chain order.

pub const BLOCK_BODY: [u8; 1] = *b"b";
pub const HEADER: [u8; 1] = *b"h";
pub const CANONICAL_HASH: [u8; 1] = *b"H";
pub const BLOCK_NUMBER: [u8; 1] = *b"n";
pub const RECEIPTS: [u8; 1] = *b"r";
pub const SEEN_COMMITS: [u8; 1] = *b"s";
pub const TX_LOOKUP: [u8; 1] = *b"l";
pub const TRIE_NODES: [u8; 1] = *b"t";

pub const HEAD_BLOCK: &[u8] = b"LastBlock";
pub const HEAD_HEADER: &[u8] = b"LastHeader";

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
