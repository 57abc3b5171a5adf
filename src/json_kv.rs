/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Flattening of JSON objects into path-keyed maps, and back.
//!
//! Contract objects are stored in their contract's storage trie as one trie entry per JSON leaf. The key
//! of an entry is the path from the root object to the leaf, and the value is the leaf's JSON text:
//!
//! |Step|Syntax|Example|
//! |---|---|---|
//! |Into a field of an object|`.name` (no dot for a top-level field)|`balance.0x123`|
//! |Into an element of an array|`^index`|`owners^1`|
//!
//! Strings are stored quoted and escaped (`"\"abc\""`), every other leaf as its JSON literal (`10002`,
//! `true`, `null`). The root must be an object, and field names may contain neither `.` nor `^`.
//!
//! Empty objects and arrays have no leaves and therefore vanish on flattening. Types read back from a
//! flat map should mark their collection fields `#[serde(default)]`.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::errors::ChainError;

const OBJECT_SEPARATOR: char = '.';
const ARRAY_SEPARATOR: char = '^';

#[derive(Debug, thiserror::Error)]
pub enum JsonKvError {
    #[error("the root of a flattened value must be an object")]
    RootNotObject,
    #[error("field name {name:?} contains a reserved path character")]
    InvalidFieldName { name: String },
    #[error("path {path:?} mixes incompatible kinds of step")]
    TypeMismatch { path: String },
    #[error("path {path:?} has an invalid array index")]
    InvalidArrayIndex { path: String },
    #[error("array at {path:?} has missing indices")]
    SparseArray { path: String },
    #[error("leaf at {path:?} is not valid JSON: {source}")]
    InvalidLeaf {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<JsonKvError> for ChainError {
    fn from(err: JsonKvError) -> Self {
        ChainError::InvalidContractData {
            reason: err.to_string(),
        }
    }
}

/// Serialize `value` to JSON and flatten it.
pub fn to_kv<T: Serialize>(value: &T) -> Result<BTreeMap<String, String>, JsonKvError> {
    json_to_kv(&serde_json::to_value(value)?)
}

/// Rebuild a JSON object from a flat map and deserialize it into `T`.
pub fn from_kv<T: DeserializeOwned>(kv: &BTreeMap<String, String>) -> Result<T, JsonKvError> {
    Ok(serde_json::from_value(kv_to_json(kv)?)?)
}

pub fn json_to_kv(value: &Value) -> Result<BTreeMap<String, String>, JsonKvError> {
    let object = value.as_object().ok_or(JsonKvError::RootNotObject)?;
    let mut kv = BTreeMap::new();
    flatten_object("", object, &mut kv)?;
    Ok(kv)
}

fn flatten_object(
    prefix: &str,
    object: &Map<String, Value>,
    kv: &mut BTreeMap<String, String>,
) -> Result<(), JsonKvError> {
    for (name, child) in object {
        if name.contains([OBJECT_SEPARATOR, ARRAY_SEPARATOR]) {
            return Err(JsonKvError::InvalidFieldName { name: name.clone() });
        }
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}{}{}", prefix, OBJECT_SEPARATOR, name)
        };
        flatten_value(path, child, kv)?;
    }
    Ok(())
}

fn flatten_value(
    path: String,
    value: &Value,
    kv: &mut BTreeMap<String, String>,
) -> Result<(), JsonKvError> {
    match value {
        Value::Object(object) => flatten_object(&path, object, kv),
        Value::Array(elements) => {
            for (index, element) in elements.iter().enumerate() {
                flatten_value(format!("{}{}{}", path, ARRAY_SEPARATOR, index), element, kv)?;
            }
            Ok(())
        }
        leaf => {
            kv.insert(path, serde_json::to_string(leaf)?);
            Ok(())
        }
    }
}

/* ↓↓↓ Unflattening ↓↓↓ */

enum Step {
    Field(String),
    Index(usize),
}

/// Intermediate tree built from paths, before array density is checked.
enum Tree {
    Leaf(Value),
    Object(BTreeMap<String, Tree>),
    Array(BTreeMap<usize, Tree>),
}

impl Tree {
    fn for_step(step: &Step) -> Tree {
        match step {
            Step::Field(_) => Tree::Object(BTreeMap::new()),
            Step::Index(_) => Tree::Array(BTreeMap::new()),
        }
    }
}

pub fn kv_to_json(kv: &BTreeMap<String, String>) -> Result<Value, JsonKvError> {
    let mut root = Tree::Object(BTreeMap::new());
    for (path, leaf) in kv {
        let steps = parse_path(path)?;
        let leaf = serde_json::from_str(leaf).map_err(|source| JsonKvError::InvalidLeaf {
            path: path.clone(),
            source,
        })?;
        insert(&mut root, &steps, leaf, path)?;
    }
    into_json(root, "")
}

fn parse_path(path: &str) -> Result<Vec<Step>, JsonKvError> {
    let mut steps = Vec::new();
    let first_end = path
        .find([OBJECT_SEPARATOR, ARRAY_SEPARATOR])
        .unwrap_or(path.len());
    steps.push(Step::Field(path[..first_end].to_string()));

    let mut rest = &path[first_end..];
    while let Some(separator) = rest.chars().next() {
        let body = &rest[1..];
        let end = body
            .find([OBJECT_SEPARATOR, ARRAY_SEPARATOR])
            .unwrap_or(body.len());
        let segment = &body[..end];
        if separator == OBJECT_SEPARATOR {
            steps.push(Step::Field(segment.to_string()));
        } else {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(JsonKvError::InvalidArrayIndex {
                    path: path.to_string(),
                });
            }
            let index = segment
                .parse::<usize>()
                .map_err(|_| JsonKvError::InvalidArrayIndex {
                    path: path.to_string(),
                })?;
            steps.push(Step::Index(index));
        }
        rest = &body[end..];
    }
    Ok(steps)
}

fn insert(node: &mut Tree, steps: &[Step], leaf: Value, path: &str) -> Result<(), JsonKvError> {
    let mismatch = || JsonKvError::TypeMismatch {
        path: path.to_string(),
    };
    let (step, rest) = match steps.split_first() {
        Some(split) => split,
        None => return Err(mismatch()),
    };

    let child = match (node, step) {
        (Tree::Object(fields), Step::Field(name)) => {
            if rest.is_empty() {
                if fields.contains_key(name) {
                    return Err(mismatch());
                }
                fields.insert(name.clone(), Tree::Leaf(leaf));
                return Ok(());
            }
            fields
                .entry(name.clone())
                .or_insert_with(|| Tree::for_step(&rest[0]))
        }
        (Tree::Array(elements), Step::Index(index)) => {
            if rest.is_empty() {
                if elements.contains_key(index) {
                    return Err(mismatch());
                }
                elements.insert(*index, Tree::Leaf(leaf));
                return Ok(());
            }
            elements
                .entry(*index)
                .or_insert_with(|| Tree::for_step(&rest[0]))
        }
        _ => return Err(mismatch()),
    };
    insert(child, rest, leaf, path)
}

fn into_json(tree: Tree, path: &str) -> Result<Value, JsonKvError> {
    match tree {
        Tree::Leaf(value) => Ok(value),
        Tree::Object(fields) => {
            let mut object = Map::new();
            for (name, child) in fields {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{}{}{}", path, OBJECT_SEPARATOR, name)
                };
                object.insert(name, into_json(child, &child_path)?);
            }
            Ok(Value::Object(object))
        }
        Tree::Array(elements) => {
            if elements
                .keys()
                .enumerate()
                .any(|(position, index)| position != *index)
            {
                return Err(JsonKvError::SparseArray {
                    path: path.to_string(),
                });
            }
            let values = elements
                .into_iter()
                .map(|(index, child)| {
                    into_json(child, &format!("{}{}{}", path, ARRAY_SEPARATOR, index))
                })
                .collect::<Result<Vec<Value>, JsonKvError>>()?;
            Ok(Value::Array(values))
        }
    }
}
