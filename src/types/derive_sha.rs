/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Commitment roots over ordered lists (transactions, receipts, votes, interlinks).

use borsh::BorshSerialize;

use super::data_types::{encode, CryptoHash};
use crate::trie::{Detached, Trie};

/// The root of a fresh trie mapping `borsh(index as u64)` to `borsh(item)`. The empty list hashes to the
/// zero hash.
pub fn derive_sha<T: BorshSerialize>(items: &[T]) -> CryptoHash {
    let mut trie = Trie::empty(Detached);
    for (index, item) in items.iter().enumerate() {
        trie.insert(&encode(&(index as u64)), encode(item))
            // Safety: a detached trie is never asked to resolve a stored node, since it starts out empty.
            .expect("detached trie insert");
    }
    trie.root_hash()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_sha_depends_on_order_and_content() {
        let a = derive_sha(&[1u64, 2, 3]);
        assert_eq!(a, derive_sha(&[1u64, 2, 3]));
        assert_ne!(a, derive_sha(&[3u64, 2, 1]));
        assert_ne!(a, derive_sha(&[1u64, 2]));
        assert!(derive_sha::<u64>(&[]).is_zero());
    }
}
