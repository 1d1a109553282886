//! Capability graph derived from the registry.
//!
//! Nodes are formats (by internal id), edges are single handler invocations.
//! Handlers that have not been probed yet contribute their declared edges
//! speculatively; handlers in the `Failed` state contribute nothing.

use crate::format::Format;
use crate::registry::Registry;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// Cost of taking any edge.
pub const HOP_COST: u32 = 1;
/// Extra cost of an edge whose target format is lossy.
pub const LOSSY_PENALTY: u32 = 1;

/// One handler invocation converting `from` into `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionEdge {
    /// Registration index of the handler.
    pub handler_index: usize,
    pub handler_name: String,
    /// Source descriptor as the handler declared it (catalog entry for
    /// wildcard sources).
    pub from: Format,
    /// Target descriptor as the handler declared it.
    pub to: Format,
    pub cost: u32,
    /// Global emission order; follows registration order.
    pub rank: usize,
}

impl ConversionEdge {
    pub fn is_lossy(&self) -> bool {
        !self.to.lossless
    }
}

/// Directed graph of formats and handler-backed conversions.
#[derive(Debug, Clone, Default)]
pub struct CapabilityGraph {
    nodes: IndexMap<String, Format>,
    /// Edge indices per source id, in rank order.
    outgoing: IndexMap<String, Vec<usize>>,
    edges: Vec<ConversionEdge>,
    epoch: u64,
}

impl CapabilityGraph {
    /// Build the graph from the registry's current handler states.
    pub fn build(registry: &Registry) -> Self {
        // Read the epoch first so a failure racing with the build forces
        // another rebuild later.
        let epoch = registry.failure_epoch();
        let catalog = registry.catalog();

        let mut graph = Self {
            nodes: catalog
                .iter()
                .map(|f| (f.internal_id.clone(), f.clone()))
                .collect(),
            outgoing: IndexMap::new(),
            edges: Vec::new(),
            epoch,
        };

        for (index, slot) in registry.handlers().enumerate() {
            if slot.is_failed() {
                tracing::debug!(handler = slot.name(), "excluding failed handler from graph");
                continue;
            }

            let handler = slot.handler();
            let formats = handler.supported_formats();
            let sources: Vec<&Format> = formats.iter().filter(|f| f.can_be_source).collect();
            let targets: Vec<&Format> = formats.iter().filter(|f| f.can_be_target).collect();

            let mut explicit_targets = HashSet::new();
            for from in &sources {
                for to in &targets {
                    if from.same_node(to) {
                        continue;
                    }
                    graph.push_edge(index, slot.name(), (*from).clone(), (*to).clone());
                    explicit_targets.insert(to.internal_id.as_str());
                }
            }

            if handler.supports_any_input() {
                for to in &targets {
                    if explicit_targets.contains(to.internal_id.as_str()) {
                        continue;
                    }
                    for from in catalog.iter() {
                        if from.same_node(to) {
                            continue;
                        }
                        graph.push_edge(index, slot.name(), from.clone(), (*to).clone());
                    }
                }
            }
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            epoch,
            "built capability graph"
        );
        graph
    }

    fn push_edge(&mut self, handler_index: usize, handler_name: &str, from: Format, to: Format) {
        let rank = self.edges.len();
        let cost = HOP_COST + if to.lossless { 0 } else { LOSSY_PENALTY };
        self.outgoing
            .entry(from.internal_id.clone())
            .or_default()
            .push(rank);
        self.edges.push(ConversionEdge {
            handler_index,
            handler_name: handler_name.to_string(),
            from,
            to,
            cost,
            rank,
        });
    }

    /// Failure epoch of the registry when this graph was built.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn node(&self, internal_id: &str) -> Option<&Format> {
        self.nodes.get(internal_id)
    }

    pub fn contains(&self, internal_id: &str) -> bool {
        self.nodes.contains_key(internal_id)
    }

    /// Edges leaving a format, in rank order.
    pub fn outgoing(&self, internal_id: &str) -> impl Iterator<Item = &ConversionEdge> {
        self.outgoing
            .get(internal_id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    pub fn edges(&self) -> &[ConversionEdge] {
        &self.edges
    }

    pub fn edge(&self, rank: usize) -> Option<&ConversionEdge> {
        self.edges.get(rank)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Formats reachable from `internal_id` in one or more hops, in
    /// breadth-first order.
    pub fn reachable_from(&self, internal_id: &str) -> Vec<&str> {
        let mut seen = HashSet::from([internal_id]);
        let mut queue = VecDeque::from([internal_id]);
        let mut reached = Vec::new();

        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(current) {
                let next = edge.to.internal_id.as_str();
                if seen.insert(next) {
                    reached.push(next);
                    queue.push_back(next);
                }
            }
        }
        reached
    }
}
