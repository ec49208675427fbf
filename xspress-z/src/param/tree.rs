//! Slash-delimited parameter tree over a typed state struct.
//!
//! The tree does not own the state. Each leaf holds plain function pointers
//! into it, so the table is built once and every access is a walk plus a
//! call, with no name lookup on the state itself.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::message::Verb;
use crate::{Error, Result};

pub type Getter<S> = fn(&S) -> Value;
pub type FieldSetter<S> = fn(&mut S, &Value) -> std::result::Result<(), String>;

pub enum Setter<S> {
    Field(FieldSetter<S>),
    /// Writing the leaf asks for a command; the tree itself does nothing.
    Command(Verb),
}

pub struct Leaf<S> {
    get: Option<Getter<S>>,
    set: Setter<S>,
}

impl<S> Leaf<S> {
    pub fn field(get: Getter<S>, set: FieldSetter<S>) -> Self {
        Self {
            get: Some(get),
            set: Setter::Field(set),
        }
    }

    /// Write-only leaf bound to a command verb. Reads as `null`.
    pub fn command(verb: Verb) -> Self {
        Self {
            get: None,
            set: Setter::Command(verb),
        }
    }
}

pub enum ParameterNode<S> {
    Leaf(Leaf<S>),
    Branch(BTreeMap<String, ParameterNode<S>>),
}

/// What a successful `set` touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Stored,
    Command(Verb),
}

pub struct ParameterTree<S> {
    root: ParameterNode<S>,
}

impl<S> Default for ParameterTree<S> {
    fn default() -> Self {
        Self {
            root: ParameterNode::Branch(BTreeMap::new()),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn normalize(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

impl<S> ParameterTree<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leaf, creating intermediate branches as needed.
    pub fn insert(&mut self, path: &str, leaf: Leaf<S>) -> Result<()> {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            return Err(Error::configuration("cannot bind a leaf at the tree root"));
        };

        let mut node = &mut self.root;
        for part in parents {
            let ParameterNode::Branch(children) = node else {
                return Err(Error::configuration(format!(
                    "'{path}' passes through the leaf '{part}'"
                )));
            };
            node = children
                .entry((*part).to_string())
                .or_insert_with(|| ParameterNode::Branch(BTreeMap::new()));
        }

        let ParameterNode::Branch(children) = node else {
            return Err(Error::configuration(format!("'{path}' has a leaf as parent")));
        };
        if children.contains_key(*last) {
            return Err(Error::configuration(format!("'{path}' is already bound")));
        }
        children.insert((*last).to_string(), ParameterNode::Leaf(leaf));
        Ok(())
    }

    fn node(&self, path: &str) -> Option<&ParameterNode<S>> {
        let mut node = &self.root;
        for part in segments(path) {
            match node {
                ParameterNode::Branch(children) => node = children.get(part)?,
                ParameterNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    /// Read a leaf, or a whole branch as a nested object.
    pub fn get(&self, state: &S, path: &str) -> Result<Value> {
        self.node(path)
            .map(|node| render(node, state))
            .ok_or_else(|| Error::PathNotFound(normalize(path)))
    }

    /// Write one leaf. Branches cannot be written.
    pub fn set(&self, state: &mut S, path: &str, value: &Value) -> Result<SetOutcome> {
        let Some(ParameterNode::Leaf(leaf)) = self.node(path) else {
            return Err(Error::PathNotFound(normalize(path)));
        };
        match leaf.set {
            Setter::Field(set) => {
                set(state, value).map_err(|reason| Error::InvalidValue {
                    path: normalize(path),
                    reason,
                })?;
                Ok(SetOutcome::Stored)
            }
            Setter::Command(verb) => Ok(SetOutcome::Command(verb)),
        }
    }

    /// Apply a nested object leaf by leaf under `base`.
    ///
    /// Unknown paths and unconvertible values are logged and skipped, and
    /// command leaves are never triggered. Returns the number of fields
    /// stored.
    pub fn merge_recursive(&self, state: &mut S, base: &str, value: &Value) -> usize {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(name, child)| self.merge_recursive(state, &join(base, name), child))
                .sum(),
            _ => match self.set(state, base, value) {
                Ok(SetOutcome::Stored) => {
                    debug!("[TREE] {} <- {}", base, value);
                    1
                }
                Ok(SetOutcome::Command(verb)) => {
                    debug!("[TREE] not triggering '{}' from merged state", verb);
                    0
                }
                Err(Error::PathNotFound(path)) => {
                    debug!("[TREE] '{}' is not in the parameter tree, ignored", path);
                    0
                }
                Err(e) => {
                    warn!("[TREE] {}", e);
                    0
                }
            },
        }
    }

    /// Every leaf path, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_paths(&self.root, "", &mut out);
        out
    }
}

fn render<S>(node: &ParameterNode<S>, state: &S) -> Value {
    match node {
        ParameterNode::Leaf(leaf) => leaf.get.map(|get| get(state)).unwrap_or(Value::Null),
        ParameterNode::Branch(children) => Value::Object(
            children
                .iter()
                .map(|(name, child)| (name.clone(), render(child, state)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

fn collect_paths<S>(node: &ParameterNode<S>, base: &str, out: &mut Vec<String>) {
    match node {
        ParameterNode::Leaf(_) => out.push(base.to_string()),
        ParameterNode::Branch(children) => {
            for (name, child) in children {
                collect_paths(child, &join(base, name), out);
            }
        }
    }
}
