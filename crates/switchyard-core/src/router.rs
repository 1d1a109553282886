//! Routing: find conversion paths through the capability graph.
//!
//! Given source and target format ids, the router searches for the cheapest
//! sequence of edges connecting them. Edge cost is one per hop plus a penalty
//! for landing in a lossy format. Among equal-cost paths, fewer hops win, then
//! the path that stays lossless longer. Remaining ties are broken by comparing
//! the edges' ranks in order, so the earliest-registered handler wins at the
//! first point where two paths diverge.

use crate::error::RouteError;
use crate::graph::{CapabilityGraph, ConversionEdge};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Default limit on path length.
pub const DEFAULT_MAX_HOPS: usize = 16;

/// A planned conversion path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPath {
    /// Edges in execution order. Empty means no conversion is needed.
    pub edges: Vec<ConversionEdge>,
    /// Total cost.
    pub cost: u32,
}

impl ConversionPath {
    /// The zero-length path.
    pub fn identity() -> Self {
        Self {
            edges: Vec::new(),
            cost: 0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Handler names in execution order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.edges.iter().map(|e| e.handler_name.as_str()).collect()
    }

    /// Format ids visited, including both ends.
    pub fn format_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .edges
            .first()
            .map(|e| e.from.internal_id.as_str())
            .into_iter()
            .collect();
        ids.extend(self.edges.iter().map(|e| e.to.internal_id.as_str()));
        ids
    }

    /// Whether every edge lands in a lossless format.
    pub fn is_lossless(&self) -> bool {
        self.edges.iter().all(|e| !e.is_lossy())
    }
}

/// A node in the search space.
#[derive(Debug, Clone)]
struct SearchNode<'g> {
    /// Format reached.
    format: &'g str,
    /// Cost so far.
    cost: u32,
    /// Whether each edge taken lands in a lossy format.
    lossy: Vec<bool>,
    /// Ranks of the edges taken, in order.
    ranks: Vec<usize>,
}

impl PartialEq for SearchNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.lossy == other.lossy && self.ranks == other.ranks
    }
}

impl Eq for SearchNode<'_> {}

impl PartialOrd for SearchNode<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchNode<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap. `false < true`, so a later first lossy
        // edge sorts lower.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.ranks.len().cmp(&self.ranks.len()))
            .then_with(|| other.lossy.cmp(&self.lossy))
            .then_with(|| other.ranks.cmp(&self.ranks))
    }
}

/// Router for finding conversion paths.
pub struct Router<'g> {
    graph: &'g CapabilityGraph,
    max_hops: usize,
}

impl<'g> Router<'g> {
    /// Create a new router over the given graph.
    pub fn new(graph: &'g CapabilityGraph) -> Self {
        Self {
            graph,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    /// Set maximum path length.
    pub fn max_hops(mut self, hops: usize) -> Self {
        self.max_hops = hops;
        self
    }

    /// Find the lowest-cost path from `from` to `to`.
    pub fn route(&self, from: &str, to: &str) -> Result<ConversionPath, RouteError> {
        if from == to {
            return Ok(ConversionPath::identity());
        }

        for id in [from, to] {
            if !self.graph.contains(id) {
                return Err(RouteError::UnknownFormat(id.to_string()));
            }
        }

        let mut frontier = BinaryHeap::new();
        let mut settled: HashSet<&str> = HashSet::new();

        frontier.push(SearchNode {
            format: from,
            cost: 0,
            lossy: Vec::new(),
            ranks: Vec::new(),
        });

        while let Some(current) = frontier.pop() {
            if !settled.insert(current.format) {
                continue;
            }

            if current.format == to {
                let path = self.materialize(&current.ranks, current.cost);
                tracing::debug!(
                    from,
                    to,
                    cost = path.cost,
                    handlers = ?path.handler_names(),
                    "found route"
                );
                return Ok(path);
            }

            if current.ranks.len() >= self.max_hops {
                continue;
            }

            for edge in self.graph.outgoing(current.format) {
                let next = edge.to.internal_id.as_str();
                if settled.contains(next) {
                    continue;
                }
                let mut lossy = current.lossy.clone();
                lossy.push(edge.is_lossy());
                let mut ranks = current.ranks.clone();
                ranks.push(edge.rank);
                frontier.push(SearchNode {
                    format: next,
                    cost: current.cost + edge.cost,
                    lossy,
                    ranks,
                });
            }
        }

        tracing::debug!(from, to, "no route");
        Err(RouteError::NoRoute {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    fn materialize(&self, ranks: &[usize], cost: u32) -> ConversionPath {
        ConversionPath {
            edges: ranks
                .iter()
                .filter_map(|&rank| self.graph.edge(rank).cloned())
                .collect(),
            cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Category, Format, common};
    use crate::registry::Registry;
    use crate::registry::tests::StubHandler;

    fn fmt(id: &str, lossless: bool) -> Format {
        let base = Format::define(id.to_uppercase(), id, id, "", Category::Other);
        if lossless {
            base.mark_lossless()
        } else {
            base
        }
    }

    fn pair(name: &str, from: Format, to: Format) -> StubHandler {
        StubHandler::new(name, vec![from.allow_from(), to.allow_to()])
    }

    #[test]
    fn test_identity() {
        let mut registry = Registry::new();
        registry
            .register(pair("a", fmt("a", true), fmt("b", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let path = Router::new(&graph).route("a", "a").unwrap();
        assert!(path.is_identity());
        assert_eq!(path.cost, 0);
        assert!(path.format_ids().is_empty());
    }

    #[test]
    fn test_direct_route() {
        let mut registry = Registry::new();
        registry
            .register(pair("a-to-b", fmt("a", true), fmt("b", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let path = Router::new(&graph).route("a", "b").unwrap();
        assert_eq!(path.handler_names(), vec!["a-to-b"]);
        assert_eq!(path.cost, 1);
    }

    #[test]
    fn test_multi_hop_route() {
        let mut registry = Registry::new();
        registry
            .register(pair("a-to-b", fmt("a", true), fmt("b", true)))
            .unwrap();
        registry
            .register(pair("b-to-c", fmt("b", true), fmt("c", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let path = Router::new(&graph).route("a", "c").unwrap();
        assert_eq!(path.handler_names(), vec!["a-to-b", "b-to-c"]);
        assert_eq!(path.format_ids(), vec!["a", "b", "c"]);
        assert_eq!(path.cost, 2);
    }

    #[test]
    fn test_fewer_hops_beat_lossless_detour() {
        // a -> d directly costs 2 (lossy landing); the lossless detour
        // a -> b -> c -> d costs 4.
        let mut registry = Registry::new();
        registry
            .register(pair("a-to-d", fmt("a", true), fmt("d", false)))
            .unwrap();
        registry
            .register(pair("a-to-b", fmt("a", true), fmt("b", true)))
            .unwrap();
        registry
            .register(pair("b-to-c", fmt("b", true), fmt("c", true)))
            .unwrap();
        registry
            .register(pair("c-to-d", fmt("c", true), fmt("d", false)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let path = Router::new(&graph).route("a", "d").unwrap();
        assert_eq!(path.handler_names(), vec!["a-to-d"]);
    }

    #[test]
    fn test_lossless_preferred_at_equal_hops() {
        let mut registry = Registry::new();
        // Lossy branch registered first so registration order alone would pick it.
        registry
            .register(pair("a-to-x", fmt("a", true), fmt("x", false)))
            .unwrap();
        registry
            .register(pair("x-to-c", fmt("x", false), fmt("c", true)))
            .unwrap();
        registry
            .register(pair("a-to-y", fmt("a", true), fmt("y", true)))
            .unwrap();
        registry
            .register(pair("y-to-c", fmt("y", true), fmt("c", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let path = Router::new(&graph).route("a", "c").unwrap();
        assert_eq!(path.handler_names(), vec!["a-to-y", "y-to-c"]);
        assert!(path.is_lossless());
        assert_eq!(path.cost, 2);
    }

    #[test]
    fn test_tie_break_by_registration_order() {
        let mut registry = Registry::new();
        registry
            .register(pair("late-second-hop", fmt("m", true), fmt("c", true)))
            .unwrap();
        registry
            .register(pair("first", fmt("a", true), fmt("m", true)))
            .unwrap();
        registry
            .register(pair("second", fmt("a", true), fmt("n", true)))
            .unwrap();
        registry
            .register(pair("n-to-c", fmt("n", true), fmt("c", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        // Paths diverge at the first hop; "first" was registered before "second".
        let path = Router::new(&graph).route("a", "c").unwrap();
        assert_eq!(path.handler_names(), vec!["first", "late-second-hop"]);
    }

    #[test]
    fn test_deterministic_across_queries() {
        let mut registry = Registry::new();
        for name in ["one", "two", "three"] {
            registry
                .register(StubHandler::new(
                    name,
                    vec![
                        common::png().allow_from().mark_lossless(),
                        common::gif().allow_to().mark_lossless(),
                    ],
                ))
                .unwrap();
        }
        let graph = CapabilityGraph::build(&registry);
        let router = Router::new(&graph);

        let first = router.route("png", "gif").unwrap();
        for _ in 0..20 {
            assert_eq!(router.route("png", "gif").unwrap(), first);
        }
        assert_eq!(first.handler_names(), vec!["one"]);
    }

    #[test]
    fn test_no_route() {
        let mut registry = Registry::new();
        registry
            .register(pair("a-to-b", fmt("a", true), fmt("b", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let err = Router::new(&graph).route("b", "a").unwrap_err();
        assert_eq!(
            err,
            RouteError::NoRoute {
                from: "b".into(),
                to: "a".into()
            }
        );
    }

    #[test]
    fn test_unknown_format() {
        let registry = Registry::new();
        let graph = CapabilityGraph::build(&registry);

        assert_eq!(
            Router::new(&graph).route("png", "gif"),
            Err(RouteError::UnknownFormat("png".into()))
        );
    }

    #[test]
    fn test_identity_needs_no_catalog_entry() {
        let registry = Registry::new();
        let graph = CapabilityGraph::build(&registry);

        let path = Router::new(&graph).route("tiff", "tiff").unwrap();
        assert!(path.is_identity());
    }

    #[test]
    fn test_stays_lossless_longer_at_equal_cost() {
        let mut registry = Registry::new();
        // Both paths are three hops with two lossy landings (cost 5). The
        // early-lossy branch is registered first.
        registry
            .register(pair("e1", fmt("a", true), fmt("x", false)))
            .unwrap();
        registry
            .register(pair("e2", fmt("x", false), fmt("y", true)))
            .unwrap();
        registry
            .register(pair("e3", fmt("y", true), fmt("z", false)))
            .unwrap();
        registry
            .register(pair("l1", fmt("a", true), fmt("p", true)))
            .unwrap();
        registry
            .register(pair("l2", fmt("p", true), fmt("q", false)))
            .unwrap();
        registry
            .register(pair("l3", fmt("q", false), fmt("z", false)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let path = Router::new(&graph).route("a", "z").unwrap();
        assert_eq!(path.handler_names(), vec!["l1", "l2", "l3"]);
        assert_eq!(path.cost, 5);
    }

    #[test]
    fn test_fewer_hops_win_at_equal_cost() {
        let mut registry = Registry::new();
        registry
            .register(pair("a-to-b", fmt("a", true), fmt("b", true)))
            .unwrap();
        registry
            .register(pair("b-to-d", fmt("b", true), fmt("d", true)))
            .unwrap();
        registry
            .register(pair("a-to-d", fmt("a", true), fmt("d", false)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        // Both cost 2: one lossy hop against two lossless ones.
        let path = Router::new(&graph).route("a", "d").unwrap();
        assert_eq!(path.handler_names(), vec!["a-to-d"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut registry = Registry::new();
        registry
            .register(StubHandler::new(
                "ring",
                vec![fmt("a", true).allow_both(), fmt("b", true).allow_both()],
            ))
            .unwrap();
        registry
            .register(pair("lonely", fmt("z", true), fmt("y", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        let router = Router::new(&graph);
        assert_eq!(router.route("a", "b").unwrap().len(), 1);
        assert!(matches!(
            router.route("a", "y"),
            Err(RouteError::NoRoute { .. })
        ));
    }

    #[test]
    fn test_max_hops() {
        let mut registry = Registry::new();
        registry
            .register(pair("a-to-b", fmt("a", true), fmt("b", true)))
            .unwrap();
        registry
            .register(pair("b-to-c", fmt("b", true), fmt("c", true)))
            .unwrap();
        let graph = CapabilityGraph::build(&registry);

        assert!(Router::new(&graph).max_hops(1).route("a", "c").is_err());
        assert!(Router::new(&graph).max_hops(2).route("a", "c").is_ok());
    }
}
