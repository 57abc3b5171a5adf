/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A hex-nibble Merkle-Patricia trie over a pluggable node store.
//!
//! # Usage
//!
//! A [`Trie`] is opened at a root hash (the zero hash opens an empty trie). Reads and writes operate on
//! an in-memory overlay: [`get`](Trie::get), [`insert`](Trie::insert), and [`delete`](Trie::delete)
//! resolve stored nodes lazily and never touch the backing store's contents. [`root_hash`](Trie::root_hash)
//! computes the root the overlay would commit to, and [`commit`](Trie::commit) additionally writes every
//! dirty node into a [`WriteBatch`].
//!
//! A handle opened at a committed root never observes later writes, because nodes are addressed by the
//! hash of their content. Many handles can therefore read different roots concurrently, while each
//! handle has a single writer (it is mutated through `&mut self`).
//!
//! # Node addressing
//!
//! Nodes are stored Borsh-encoded under `TRIE_NODES + keccak256(encoding)`. The tries of the block
//! state, of every contract's storage, and of the register DB share this one namespace.

mod node;

use std::fmt::{self, Display};

use borsh::BorshDeserialize;

use crate::{
    storage::{
        pluggables::{KVGet, WriteBatch},
        variables::{concat, TRIE_NODES},
    },
    types::data_types::CryptoHash,
};

use node::{common_prefix_len, key_to_nibbles, nibbles_to_key, Node, StoredNode};

/// Something trie nodes can be loaded from.
pub trait NodeSource {
    fn node(&self, hash: &CryptoHash) -> Option<Vec<u8>>;
}

impl<K: KVGet> NodeSource for K {
    fn node(&self, hash: &CryptoHash) -> Option<Vec<u8>> {
        self.trie_node(hash)
    }
}

/// A node source with no nodes, for tries that are only ever built from scratch in memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct Detached;

impl NodeSource for Detached {
    fn node(&self, _hash: &CryptoHash) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Debug)]
pub enum TrieError {
    MissingNode {
        hash: CryptoHash,
    },
    CorruptNode {
        hash: CryptoHash,
        source: Option<std::io::Error>,
    },
}

impl Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrieError::MissingNode { hash } => write!(f, "missing trie node {}", hash),
            TrieError::CorruptNode {
                hash,
                source: Some(source),
            } => write!(f, "corrupt trie node {}: {}", hash, source),
            TrieError::CorruptNode { hash, source: None } => {
                write!(f, "corrupt trie node {}", hash)
            }
        }
    }
}

impl std::error::Error for TrieError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrieError::CorruptNode {
                source: Some(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Trie<S> {
    source: S,
    root: Node,
}

impl<S: NodeSource> Trie<S> {
    pub fn empty(source: S) -> Trie<S> {
        Trie {
            source,
            root: Node::Empty,
        }
    }

    /// Open the trie rooted at `root`. Fails with `MissingNode` if a non-zero root is not stored.
    pub fn new(source: S, root: CryptoHash) -> Result<Trie<S>, TrieError> {
        if root.is_zero() {
            return Ok(Trie {
                source,
                root: Node::Empty,
            });
        }
        if source.node(&root).is_none() {
            return Err(TrieError::MissingNode { hash: root });
        }
        Ok(Trie {
            source,
            root: Node::Hash(root),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        self.get_in(&self.root, &key_to_nibbles(key))
    }

    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        let root = std::mem::take(&mut self.root);
        self.root = self.insert_at(root, &key_to_nibbles(key), value)?;
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let root = std::mem::take(&mut self.root);
        self.root = self.delete_at(root, &key_to_nibbles(key))?;
        Ok(())
    }

    /// The root hash the current overlay commits to.
    pub fn root_hash(&self) -> CryptoHash {
        self.root.hash(&mut None)
    }

    /// Write every node of the overlay that is not yet stored into `wb`, and return the root hash.
    ///
    /// The in-memory overlay is left as it is, so the trie can keep being read and written.
    pub fn commit(&self, wb: &mut impl WriteBatch) -> CryptoHash {
        let mut dirty = Vec::new();
        let root = self.root.hash(&mut Some(&mut dirty));
        for (hash, bytes) in dirty {
            wb.set(&concat(&TRIE_NODES, &hash.bytes()), &bytes);
        }
        root
    }

    /// Every key-value pair in the trie, in key order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TrieError> {
        let mut entries = Vec::new();
        self.collect(&self.root, &mut Vec::new(), &mut entries)?;
        Ok(entries)
    }

    /// Every key-value pair whose key starts with `prefix`, in key order.
    pub fn entries_with_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TrieError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect())
    }

    fn load(&self, hash: &CryptoHash) -> Result<Node, TrieError> {
        let bytes = self
            .source
            .node(hash)
            .ok_or(TrieError::MissingNode { hash: *hash })?;
        let stored = StoredNode::deserialize(&mut bytes.as_slice()).map_err(|err| {
            TrieError::CorruptNode {
                hash: *hash,
                source: Some(err),
            }
        })?;
        stored
            .into_node()
            .ok_or(TrieError::CorruptNode {
                hash: *hash,
                source: None,
            })
    }

    fn get_in(&self, node: &Node, path: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf {
                path: leaf_path,
                value,
            } => Ok((leaf_path.as_slice() == path).then(|| value.clone())),
            Node::Extension {
                path: extension_path,
                child,
            } => {
                if path.starts_with(extension_path) {
                    self.get_in(child, &path[extension_path.len()..])
                } else {
                    Ok(None)
                }
            }
            Node::Branch { children, value } => match path.split_first() {
                None => Ok(value.clone()),
                Some((nibble, rest)) => self.get_in(&children[*nibble as usize], rest),
            },
            Node::Hash(hash) => {
                let node = self.load(hash)?;
                self.get_in(&node, path)
            }
        }
    }

    fn insert_at(&self, node: Node, path: &[u8], value: Vec<u8>) -> Result<Node, TrieError> {
        match node {
            Node::Empty => Ok(Node::Leaf {
                path: path.to_vec(),
                value,
            }),
            Node::Hash(hash) => {
                let node = self.load(&hash)?;
                self.insert_at(node, path, value)
            }
            Node::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path == path {
                    return Ok(Node::Leaf {
                        path: leaf_path,
                        value,
                    });
                }
                let common = common_prefix_len(&leaf_path, path);
                let mut branch = Node::empty_branch();
                place_in_branch(&mut branch, &leaf_path[common..], leaf_value);
                place_in_branch(&mut branch, &path[common..], value);
                Ok(wrap_in_extension(&path[..common], branch))
            }
            Node::Extension {
                path: extension_path,
                child,
            } => {
                let common = common_prefix_len(&extension_path, path);
                if common == extension_path.len() {
                    let child = self.insert_at(*child, &path[common..], value)?;
                    return Ok(Node::Extension {
                        path: extension_path,
                        child: Box::new(child),
                    });
                }

                let mut branch = Node::empty_branch();
                if let Node::Branch { children, .. } = &mut branch {
                    let rest = &extension_path[common + 1..];
                    children[extension_path[common] as usize] = if rest.is_empty() {
                        *child
                    } else {
                        Node::Extension {
                            path: rest.to_vec(),
                            child,
                        }
                    };
                }
                place_in_branch(&mut branch, &path[common..], value);
                Ok(wrap_in_extension(&path[..common], branch))
            }
            Node::Branch {
                mut children,
                value: branch_value,
            } => match path.split_first() {
                None => Ok(Node::Branch {
                    children,
                    value: Some(value),
                }),
                Some((nibble, rest)) => {
                    let slot = std::mem::take(&mut children[*nibble as usize]);
                    children[*nibble as usize] = self.insert_at(slot, rest, value)?;
                    Ok(Node::Branch {
                        children,
                        value: branch_value,
                    })
                }
            },
        }
    }

    fn delete_at(&self, node: Node, path: &[u8]) -> Result<Node, TrieError> {
        match node {
            Node::Empty => Ok(Node::Empty),
            Node::Hash(hash) => {
                let node = self.load(&hash)?;
                self.delete_at(node, path)
            }
            Node::Leaf {
                path: leaf_path,
                value,
            } => {
                if leaf_path == path {
                    Ok(Node::Empty)
                } else {
                    Ok(Node::Leaf {
                        path: leaf_path,
                        value,
                    })
                }
            }
            Node::Extension {
                path: extension_path,
                child,
            } => {
                if !path.starts_with(&extension_path) {
                    return Ok(Node::Extension {
                        path: extension_path,
                        child,
                    });
                }
                let child = self.delete_at(*child, &path[extension_path.len()..])?;
                self.join_extension(extension_path, child)
            }
            Node::Branch {
                mut children,
                mut value,
            } => {
                match path.split_first() {
                    None => value = None,
                    Some((nibble, rest)) => {
                        let slot = std::mem::take(&mut children[*nibble as usize]);
                        children[*nibble as usize] = self.delete_at(slot, rest)?;
                    }
                }
                self.collapse_branch(children, value)
            }
        }
    }

    /// Re-normalise an extension whose child may have shrunk.
    fn join_extension(&self, path: Vec<u8>, child: Node) -> Result<Node, TrieError> {
        match child {
            Node::Empty => Ok(Node::Empty),
            Node::Leaf {
                path: child_path,
                value,
            } => Ok(Node::Leaf {
                path: [path, child_path].concat(),
                value,
            }),
            Node::Extension {
                path: child_path,
                child,
            } => Ok(Node::Extension {
                path: [path, child_path].concat(),
                child,
            }),
            Node::Hash(hash) => match self.load(&hash)? {
                Node::Branch { .. } => Ok(Node::Extension {
                    path,
                    child: Box::new(Node::Hash(hash)),
                }),
                node => self.join_extension(path, node),
            },
            branch @ Node::Branch { .. } => Ok(Node::Extension {
                path,
                child: Box::new(branch),
            }),
        }
    }

    /// Re-normalise a branch that may have lost children.
    fn collapse_branch(
        &self,
        mut children: Box<[Node; 16]>,
        value: Option<Vec<u8>>,
    ) -> Result<Node, TrieError> {
        let live: Vec<usize> = (0..16).filter(|i| !children[*i].is_empty()).collect();
        match (live.as_slice(), value) {
            ([], None) => Ok(Node::Empty),
            ([], Some(value)) => Ok(Node::Leaf {
                path: Vec::new(),
                value,
            }),
            ([only], None) => {
                let child = std::mem::take(&mut children[*only]);
                self.join_extension(vec![*only as u8], child)
            }
            (_, value) => Ok(Node::Branch { children, value }),
        }
    }

    fn collect(
        &self,
        node: &Node,
        prefix: &mut Vec<u8>,
        entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), TrieError> {
        match node {
            Node::Empty => {}
            Node::Leaf { path, value } => {
                let full = [prefix.as_slice(), path.as_slice()].concat();
                entries.push((nibbles_to_key(&full), value.clone()));
            }
            Node::Extension { path, child } => {
                let depth = prefix.len();
                prefix.extend_from_slice(path);
                self.collect(child, prefix, entries)?;
                prefix.truncate(depth);
            }
            Node::Branch { children, value } => {
                if let Some(value) = value {
                    entries.push((nibbles_to_key(prefix), value.clone()));
                }
                for (nibble, child) in children.iter().enumerate() {
                    prefix.push(nibble as u8);
                    self.collect(child, prefix, entries)?;
                    prefix.pop();
                }
            }
            Node::Hash(hash) => {
                let node = self.load(hash)?;
                self.collect(&node, prefix, entries)?;
            }
        }
        Ok(())
    }
}

/// Put `value` into `branch` at `path` (relative to the branch).
fn place_in_branch(branch: &mut Node, path: &[u8], value: Vec<u8>) {
    if let Node::Branch {
        children,
        value: branch_value,
    } = branch
    {
        match path.split_first() {
            None => *branch_value = Some(value),
            Some((nibble, rest)) => {
                children[*nibble as usize] = Node::Leaf {
                    path: rest.to_vec(),
                    value,
                }
            }
        }
    }
}

fn wrap_in_extension(path: &[u8], node: Node) -> Node {
    if path.is_empty() {
        node
    } else {
        Node::Extension {
            path: path.to_vec(),
            child: Box::new(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Default)]
    struct Nodes(BTreeMap<Vec<u8>, Vec<u8>>);

    impl WriteBatch for Nodes {
        fn new() -> Self {
            Nodes::default()
        }
        fn set(&mut self, key: &[u8], value: &[u8]) {
            self.0.insert(key.to_vec(), value.to_vec());
        }
        fn delete(&mut self, key: &[u8]) {
            self.0.remove(key);
        }
    }

    impl NodeSource for &Nodes {
        fn node(&self, hash: &CryptoHash) -> Option<Vec<u8>> {
            self.0.get(&concat(&TRIE_NODES, &hash.bytes())).cloned()
        }
    }

    #[test]
    fn insert_get_and_overwrite() {
        let mut trie = Trie::new(Detached, CryptoHash::zero()).unwrap();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(b"doge", b"coin".to_vec()).unwrap();
        trie.insert(b"do", b"verb".to_vec()).unwrap();
        trie.insert(b"horse", b"stallion".to_vec()).unwrap();
        trie.insert(b"dog", b"hound".to_vec()).unwrap();

        assert_eq!(trie.get(b"dog").unwrap(), Some(b"hound".to_vec()));
        assert_eq!(trie.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(trie.get(b"do").unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(b"d").unwrap(), None);
        assert_eq!(trie.get(b"horses").unwrap(), None);
    }

    #[test]
    fn root_is_independent_of_insertion_order() {
        let pairs: Vec<(&[u8], &[u8])> = vec![
            (b"abc", b"1"),
            (b"abd", b"2"),
            (b"b", b"3"),
            (b"", b"4"),
            (b"abcdef", b"5"),
        ];

        let mut forward = Trie::new(Detached, CryptoHash::zero()).unwrap();
        pairs
            .iter()
            .for_each(|(k, v)| forward.insert(k, v.to_vec()).unwrap());
        let mut backward = Trie::new(Detached, CryptoHash::zero()).unwrap();
        pairs
            .iter()
            .rev()
            .for_each(|(k, v)| backward.insert(k, v.to_vec()).unwrap());

        assert_eq!(forward.root_hash(), backward.root_hash());
    }

    #[test]
    fn deleting_everything_yields_the_empty_root() {
        let mut trie = Trie::new(Detached, CryptoHash::zero()).unwrap();
        trie.insert(b"abc", b"1".to_vec()).unwrap();
        trie.insert(b"abd", b"2".to_vec()).unwrap();
        trie.insert(b"x", b"3".to_vec()).unwrap();
        let with_two = {
            let mut reference = Trie::new(Detached, CryptoHash::zero()).unwrap();
            reference.insert(b"abc", b"1".to_vec()).unwrap();
            reference.insert(b"x", b"3".to_vec()).unwrap();
            reference.root_hash()
        };

        trie.delete(b"abd").unwrap();
        assert_eq!(trie.root_hash(), with_two);
        trie.delete(b"abc").unwrap();
        trie.delete(b"x").unwrap();
        assert!(trie.root_hash().is_zero());
    }

    #[test]
    fn committed_root_reopens_and_stays_immutable() {
        let mut nodes = Nodes::default();
        let mut trie = Trie::new(Detached, CryptoHash::zero()).unwrap();
        for i in 0u32..50 {
            trie.insert(&i.to_be_bytes(), vec![i as u8]).unwrap();
        }
        let root = trie.commit(&mut nodes);

        let mut reopened = Trie::new(&nodes, root).unwrap();
        assert_eq!(reopened.get(&7u32.to_be_bytes()).unwrap(), Some(vec![7]));
        reopened.delete(&7u32.to_be_bytes()).unwrap();
        reopened.insert(&100u32.to_be_bytes(), vec![100]).unwrap();
        assert_ne!(reopened.root_hash(), root);

        let original = Trie::new(&nodes, root).unwrap();
        assert_eq!(original.get(&7u32.to_be_bytes()).unwrap(), Some(vec![7]));
        assert_eq!(original.entries().unwrap().len(), 50);
    }

    #[test]
    fn entries_come_out_in_key_order() {
        let mut trie = Trie::new(Detached, CryptoHash::zero()).unwrap();
        trie.insert(b"b", b"2".to_vec()).unwrap();
        trie.insert(b"a", b"1".to_vec()).unwrap();
        trie.insert(b"ab", b"3".to_vec()).unwrap();
        let keys: Vec<Vec<u8>> = trie.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"ab".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn opening_an_unknown_root_fails() {
        let nodes = Nodes::default();
        assert!(matches!(
            Trie::new(&nodes, CryptoHash::new([1u8; 32])),
            Err(TrieError::MissingNode { .. })
        ));
    }
}
