//! Node registry and link resolution

use std::collections::HashMap;

use crate::config::CompositorConfig;
use crate::error::{CompositorError, CompositorResult};
use crate::render_graph::diagnostics::{Diagnostic, ResolveReport, Severity};
use crate::render_graph::node::{Node, NodeId};
use crate::render_graph::pin::{InputRef, Link, NodeRef};

/// The compositor graph
///
/// Owns the nodes in insertion order and resolves their symbolic input
/// references into [`Link`]s. It does not run anything; execution order is
/// chosen by the caller.
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    next_node_id: u32,
    dirty: bool,
    config: CompositorConfig,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(CompositorConfig::default())
    }

    pub fn with_config(config: CompositorConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            next_node_id: 0,
            dirty: false,
            config,
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Append a node. Duplicate names are allowed; the last one shadows the others
    /// during resolution.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        log::debug!("Graph: adding node '{}' as {}", node.name(), id);
        self.nodes.insert(id, node);
        self.order.push(id);
        self.dirty = true;
        id
    }

    /// Remove a node and hand it back. Links pointing at it disappear on the next update.
    pub fn remove_node(&mut self, id: NodeId) -> CompositorResult<Node> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or(CompositorError::NodeNotFound(id))?;
        self.order.retain(|other| *other != id);
        self.dirty = true;

        log::debug!("Graph: removed node '{}' ({})", node.name(), id);
        Ok(node)
    }

    /// First node with this name, in insertion order
    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes().find(|(_, node)| node.name() == name).map(|(id, _)| id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.find_node_by_name(name).and_then(|id| self.nodes.get(&id))
    }

    pub fn node_by_name_mut(&mut self, name: &str) -> Option<&mut Node> {
        let id = self.find_node_by_name(name)?;
        self.nodes.get_mut(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|node| (*id, node)))
    }

    /// Node ids in insertion order, the default execution order
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Set when nodes were added or removed since the last update
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Request a rebuild, e.g. after rewiring inputs of a node
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Resolve every wired input into a link.
    ///
    /// Problems with individual inputs are reported and logged; they never abort
    /// resolution of the remaining inputs.
    pub fn update(&mut self) -> ResolveReport {
        for node in self.nodes.values_mut() {
            node.clear();
        }

        let (pending, mut report) = self.resolve_all();

        for (consumer, input, link) in pending {
            if let Some(node) = self.nodes.get_mut(&consumer) {
                node.link(&input, link.producer, &link.pin);
                report.link_count += 1;
            }
        }

        if self.config.detect_cycles {
            for diagnostic in self.find_cycles() {
                report.push(diagnostic);
            }
        }

        for diagnostic in report.diagnostics() {
            match diagnostic.severity {
                Severity::Warning => log::warn!("{diagnostic}"),
                Severity::Error => log::error!("{diagnostic}"),
            }
        }
        log::debug!(
            "Graph: resolved {} links, {} diagnostics",
            report.link_count(),
            report.diagnostics().len()
        );

        self.dirty = false;
        report
    }

    fn resolve_all(&self) -> (Vec<(NodeId, String, Link)>, ResolveReport) {
        // Later registrations shadow earlier ones
        let mut registry: HashMap<&str, NodeId> = HashMap::new();
        for (id, node) in self.nodes() {
            registry.insert(node.name(), id);
        }

        let mut pending = Vec::new();
        let mut report = ResolveReport::default();

        for (id, node) in self.nodes() {
            for (input, reference) in node.inputs().iter() {
                let Some(reference) = reference else {
                    continue;
                };

                if self.config.report_unused_inputs {
                    if let Some(pass) = node.pass() {
                        if !pass.material().is_uniform_enabled(input) {
                            report.push(Diagnostic::unused_input(node.name(), input));
                        }
                    }
                }

                match self.resolve(&registry, node.name(), input, reference) {
                    Ok(link) => pending.push((id, input.to_string(), link)),
                    Err(diagnostic) => report.push(diagnostic),
                }
            }
        }

        (pending, report)
    }

    fn resolve(
        &self,
        registry: &HashMap<&str, NodeId>,
        consumer: &str,
        input: &str,
        reference: &InputRef,
    ) -> Result<Link, Diagnostic> {
        let producer_ref = reference.producer();
        let unknown = || Diagnostic::unknown_node(consumer, input, &producer_ref.to_string());

        let producer_id = match producer_ref {
            NodeRef::Name(name) => registry.get(name.as_str()).copied(),
            NodeRef::Id(id) => self.contains(*id).then_some(*id),
        }
        .ok_or_else(unknown)?;
        let producer = self.nodes.get(&producer_id).ok_or_else(unknown)?;

        let pin = match reference.pin_name() {
            Some(pin) if producer.outputs().contains(pin) => pin.to_string(),
            Some(pin) => {
                return Err(Diagnostic::unknown_pin(
                    consumer,
                    input,
                    producer.name(),
                    pin,
                ))
            }
            None => producer
                .outputs()
                .first_key()
                .map(str::to_string)
                .ok_or_else(|| Diagnostic::no_output_pins(consumer, input, producer.name()))?,
        };

        Ok(Link {
            producer: producer_id,
            pin,
        })
    }

    /// One diagnostic per link that closes a cycle
    fn find_cycles(&self) -> Vec<Diagnostic> {
        let mut marks = HashMap::new();
        let mut found = Vec::new();
        for id in &self.order {
            self.visit(*id, &mut marks, &mut found);
        }
        found
    }

    fn visit(&self, id: NodeId, marks: &mut HashMap<NodeId, Visit>, found: &mut Vec<Diagnostic>) {
        if marks.contains_key(&id) {
            return;
        }
        let Some(node) = self.nodes.get(&id) else {
            return;
        };

        marks.insert(id, Visit::InProgress);
        for (_, link) in node.links() {
            match marks.get(&link.producer) {
                Some(Visit::InProgress) => {
                    let producer = self
                        .nodes
                        .get(&link.producer)
                        .map(Node::name)
                        .unwrap_or_default();
                    found.push(Diagnostic::cyclic_link(node.name(), producer));
                }
                Some(Visit::Done) => {}
                None => self.visit(link.producer, marks, found),
            }
        }
        marks.insert(id, Visit::Done);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}
