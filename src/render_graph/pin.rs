//! Pins, references between nodes and resolved links

use std::collections::HashMap;
use std::fmt;

use crate::render_graph::node::NodeId;

/// Name keyed map that remembers insertion order.
///
/// The first inserted key is the default output pin of a node.
#[derive(Debug, Clone)]
pub struct PinMap<T> {
    keys: Vec<String>,
    values: HashMap<String, T>,
}

impl<T> Default for PinMap<T> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            values: HashMap::new(),
        }
    }
}

impl<T> PinMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pin. Replacing keeps the original position.
    pub fn insert(&mut self, name: &str, value: T) -> Option<T> {
        let previous = self.values.insert(name.to_string(), value);
        if previous.is_none() {
            self.keys.push(name.to_string());
        }
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        let removed = self.values.remove(name)?;
        self.keys.retain(|key| key != name);
        Some(removed)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.values.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// First inserted pin name
    pub fn first_key(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }

    /// Pin names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Pins in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.keys
            .iter()
            .filter_map(|key| self.values.get(key).map(|value| (key.as_str(), value)))
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Reference to a node, by name or by id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Name(String),
    Id(NodeId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Name(name) => f.write_str(name),
            NodeRef::Id(id) => write!(f, "{id}"),
        }
    }
}

impl From<&str> for NodeRef {
    fn from(name: &str) -> Self {
        NodeRef::Name(name.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(name: String) -> Self {
        NodeRef::Name(name)
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Id(id)
    }
}

/// Unresolved wiring of an input pin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputRef {
    /// The producer's first declared output pin
    Node(NodeRef),
    /// A named output pin of the producer
    Pin { node: NodeRef, pin: String },
}

impl InputRef {
    pub fn node(node: impl Into<NodeRef>) -> Self {
        InputRef::Node(node.into())
    }

    pub fn pin(node: impl Into<NodeRef>, pin: &str) -> Self {
        InputRef::Pin {
            node: node.into(),
            pin: pin.to_string(),
        }
    }

    pub fn producer(&self) -> &NodeRef {
        match self {
            InputRef::Node(node) | InputRef::Pin { node, .. } => node,
        }
    }

    /// Explicit pin name, if any
    pub fn pin_name(&self) -> Option<&str> {
        match self {
            InputRef::Node(_) => None,
            InputRef::Pin { pin, .. } => Some(pin),
        }
    }
}

impl From<&str> for InputRef {
    fn from(name: &str) -> Self {
        InputRef::node(name)
    }
}

impl From<NodeId> for InputRef {
    fn from(id: NodeId) -> Self {
        InputRef::node(id)
    }
}

/// Resolved binding of an input pin to a producer's output pin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub producer: NodeId,
    pub pin: String,
}
