/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trie nodes in their in-memory and stored forms, and nibble-path helpers.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::keccak256,
    data_types::{encode, CryptoHash},
};

/// A trie node as held in memory.
///
/// Subtrees that have not been touched since the trie was opened stay as [`Node::Hash`] references and
/// are only resolved against the backing store when a lookup or mutation walks into them.
#[derive(Clone, Debug, Default)]
pub(crate) enum Node {
    #[default]
    Empty,
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: Box<Node>,
    },
    Branch {
        children: Box<[Node; 16]>,
        value: Option<Vec<u8>>,
    },
    Hash(CryptoHash),
}

impl Node {
    pub(crate) fn empty_branch() -> Node {
        Node::Branch {
            children: Box::new(std::array::from_fn(|_| Node::Empty)),
            value: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Hash this node, pushing the stored form of every node that is not already a bare hash reference
    /// into `dirty` (children before parents).
    ///
    /// The empty node hashes to the zero hash and is never stored.
    pub(crate) fn hash(&self, dirty: &mut Option<&mut Vec<(CryptoHash, Vec<u8>)>>) -> CryptoHash {
        let stored = match self {
            Node::Empty => return CryptoHash::zero(),
            Node::Hash(hash) => return *hash,
            Node::Leaf { path, value } => StoredNode::Leaf {
                path: path.clone(),
                value: value.clone(),
            },
            Node::Extension { path, child } => StoredNode::Extension {
                path: path.clone(),
                child: child.hash(dirty),
            },
            Node::Branch { children, value } => StoredNode::Branch {
                children: children
                    .iter()
                    .map(|child| match child {
                        Node::Empty => None,
                        child => Some(child.hash(dirty)),
                    })
                    .collect(),
                value: value.clone(),
            },
        };

        let bytes = encode(&stored);
        let hash = keccak256(&bytes);
        if let Some(dirty) = dirty {
            dirty.push((hash, bytes));
        }
        hash
    }
}

/// A trie node as persisted: children are referenced by hash.
#[derive(BorshSerialize, BorshDeserialize)]
pub(crate) enum StoredNode {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: CryptoHash,
    },
    Branch {
        children: Vec<Option<CryptoHash>>,
        value: Option<Vec<u8>>,
    },
}

impl StoredNode {
    pub(crate) fn into_node(self) -> Option<Node> {
        Some(match self {
            StoredNode::Leaf { path, value } => Node::Leaf { path, value },
            StoredNode::Extension { path, child } => Node::Extension {
                path,
                child: Box::new(Node::Hash(child)),
            },
            StoredNode::Branch {
                children: stored_children,
                value,
            } => {
                if stored_children.len() != 16 {
                    return None;
                }
                let mut children: [Node; 16] = std::array::from_fn(|_| Node::Empty);
                for (slot, child) in children.iter_mut().zip(stored_children) {
                    if let Some(hash) = child {
                        *slot = Node::Hash(hash);
                    }
                }
                Node::Branch {
                    children: Box::new(children),
                    value,
                }
            }
        })
    }
}

/// Split every byte of `key` into its high and low nibble.
pub(crate) fn key_to_nibbles(key: &[u8]) -> Vec<u8> {
    key.iter().flat_map(|byte| [byte >> 4, byte & 0x0f]).collect()
}

/// Inverse of [`key_to_nibbles`]. `nibbles` always has even length for paths that end at a value.
pub(crate) fn nibbles_to_key(nibbles: &[u8]) -> Vec<u8> {
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
