//! In-memory graph store backed by `petgraph`, with full JSON dump persistence.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NoemaError, NoemaResult};

use super::node::{normalize_name, Edge, Node};

/// The durable JSON shape of a graph dump: every node once, every edge once.
///
/// An owned, lock-free value: [`Graph::snapshot`] captures one under the
/// engine lock, and [`save_snapshot`] serializes and writes it afterward,
/// so a graph save never holds the lock across the blocking file write.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphDump {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Serialize `dump` and write it to `path`. Takes an owned snapshot rather
/// than `&Graph` so it can be called with no lock held.
pub fn save_snapshot(dump: &GraphDump, path: impl AsRef<Path>) -> NoemaResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(dump)
        .map_err(|e| NoemaError::persistence_failure(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    debug!(path = %path.display(), nodes = dump.nodes.len(), edges = dump.edges.len(), "graph saved");
    Ok(())
}

/// A typed, directed multigraph of [`Node`]s and [`Edge`]s.
///
/// The graph exclusively owns its nodes and edges; callers outside this module
/// (the activation manager, the cognitive loop) hold only ids and must not
/// mutate this structure directly.
#[derive(Debug, Default)]
pub struct Graph {
    inner: DiGraph<Node, Edge>,
    id_index: HashMap<String, NodeIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Insert a new node. Fails with `DuplicateId` if the id is already present.
    pub fn add_node(&mut self, node: Node) -> NoemaResult<()> {
        if self.id_index.contains_key(&node.id) {
            return Err(NoemaError::duplicate_id(node.id));
        }
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.id_index.insert(id, idx);
        Ok(())
    }

    /// Insert a directed edge. A duplicate `(src, dst, relation)` triple is a
    /// silent no-op, per the source data's semantics.
    pub fn add_edge(
        &mut self,
        src: impl Into<String>,
        dst: impl Into<String>,
        relation: impl Into<String>,
        weight: f64,
    ) -> NoemaResult<()> {
        let src = src.into();
        let dst = dst.into();
        let relation = relation.into();

        let src_idx = *self
            .id_index
            .get(&src)
            .ok_or_else(|| NoemaError::missing_endpoint(src.clone()))?;
        let dst_idx = *self
            .id_index
            .get(&dst)
            .ok_or_else(|| NoemaError::missing_endpoint(dst.clone()))?;

        let duplicate = self
            .inner
            .edges(src_idx)
            .any(|e| e.target() == dst_idx && e.weight().relation == relation);
        if duplicate {
            return Ok(());
        }

        self.inner.add_edge(
            src_idx,
            dst_idx,
            Edge {
                src,
                dst,
                relation,
                weight,
            },
        );
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        let idx = *self.id_index.get(id)?;
        self.inner.node_weight(idx)
    }

    /// Mutable access to a node's attribute bag, for in-place enrichment
    /// (e.g. tagging a concept as wiki-enriched after creation).
    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let idx = *self.id_index.get(id)?;
        self.inner.node_weight_mut(idx)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_index.contains_key(id)
    }

    /// Every node id currently in the graph, in insertion order.
    pub fn all_ids(&self) -> Vec<String> {
        self.inner.node_weights().map(|n| n.id.clone()).collect()
    }

    /// Ids of every node reachable from `id` by one outgoing edge, in insertion order.
    pub fn neighbors(&self, id: &str) -> Vec<String> {
        self.out_edges(id).into_iter().map(|e| e.dst.clone()).collect()
    }

    /// Outgoing edges from `id`, in insertion order.
    ///
    /// `petgraph::graph::DiGraph` prepends each new edge onto the node's
    /// intrusive outgoing-edge list, so `self.inner.edges(idx)` itself yields
    /// edges last-added-first; reverse it to restore insertion order.
    pub fn out_edges(&self, id: &str) -> Vec<&Edge> {
        let Some(&idx) = self.id_index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&Edge> = self.inner.edges(idx).map(|e| e.weight()).collect();
        edges.reverse();
        edges
    }

    /// Weight of the first (in insertion order) edge from `src` to `dst`, or
    /// 0.0 if none exists.
    pub fn get_edge_weight(&self, src: &str, dst: &str) -> f64 {
        self.out_edges(src)
            .into_iter()
            .find(|e| e.dst == dst)
            .map(|e| e.weight)
            .unwrap_or(0.0)
    }

    /// Find a node id by name, after normalization.
    pub fn find_by_name(&self, name: &str) -> Option<String> {
        let target = normalize_name(name);
        self.inner
            .node_weights()
            .find(|n| n.name().map(normalize_name).as_deref() == Some(target.as_str()))
            .map(|n| n.id.clone())
    }

    /// Merge nodes that share a normalized name into a single primary node,
    /// migrating all of their edges. Returns the number of nodes removed.
    ///
    /// The primary within a group is the first node inserted. Idempotent: a
    /// second call with no new duplicates removes nothing.
    pub fn merge_by_name(&mut self) -> usize {
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for node in self.inner.node_weights() {
            if let Some(name) = node.name() {
                groups
                    .entry(normalize_name(name))
                    .or_default()
                    .push(node.id.clone());
            }
        }

        let mut primary_of: HashMap<String, String> = HashMap::new();
        for ids in groups.into_values() {
            if ids.len() > 1 {
                let primary = ids[0].clone();
                for dup in &ids[1..] {
                    primary_of.insert(dup.clone(), primary.clone());
                }
            }
        }

        if primary_of.is_empty() {
            return 0;
        }

        let merged = primary_of.len();
        debug!(merged, "merging duplicate nodes by normalized name");

        let new_nodes: Vec<Node> = self
            .inner
            .node_weights()
            .filter(|n| !primary_of.contains_key(&n.id))
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let mut new_edges = Vec::new();
        for edge in self.inner.edge_references() {
            let e = edge.weight();
            let src = primary_of.get(&e.src).cloned().unwrap_or_else(|| e.src.clone());
            let dst = primary_of.get(&e.dst).cloned().unwrap_or_else(|| e.dst.clone());
            let key = (src.clone(), dst.clone(), e.relation.clone());
            if seen.insert(key) {
                new_edges.push(Edge {
                    src,
                    dst,
                    relation: e.relation.clone(),
                    weight: e.weight,
                });
            }
        }

        self.rebuild(new_nodes, new_edges)
            .expect("rebuilding from a graph's own (already-valid) nodes and edges cannot fail");

        merged
    }

    /// Replace the graph's contents from scratch, re-running `add_node`/`add_edge`
    /// so invariants (duplicate ids, missing endpoints, duplicate edges) are
    /// re-checked rather than assumed.
    fn rebuild(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> NoemaResult<()> {
        self.inner = DiGraph::new();
        self.id_index = HashMap::new();
        for node in nodes {
            self.add_node(node)?;
        }
        for edge in edges {
            self.add_edge(edge.src, edge.dst, edge.relation, edge.weight)?;
        }
        Ok(())
    }

    /// Capture an owned, point-in-time dump of the graph's nodes and edges.
    /// Cheap to call under a lock; the caller serializes and writes it (via
    /// [`save_snapshot`]) after releasing that lock.
    pub fn snapshot(&self) -> GraphDump {
        GraphDump {
            nodes: self.inner.node_weights().cloned().collect(),
            edges: self.inner.edge_references().map(|e| e.weight().clone()).collect(),
        }
    }

    /// Save the full graph to `path` as JSON. Parent directories are created
    /// if missing. Equivalent to `save_snapshot(&self.snapshot(), path)`;
    /// callers holding a shared lock over the graph should snapshot under
    /// the lock and call `save_snapshot` after releasing it instead.
    pub fn save(&self, path: impl AsRef<Path>) -> NoemaResult<()> {
        save_snapshot(&self.snapshot(), path)
    }

    /// Load a graph from `path`. A missing file yields an empty graph and
    /// logs a warning rather than failing, since a fresh engine has no prior
    /// snapshot to load.
    pub fn load(path: impl AsRef<Path>) -> NoemaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "graph dump not found, starting with an empty graph");
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let dump: GraphDump = serde_json::from_str(&content)
            .map_err(|e| NoemaError::persistence_failure(e.to_string()))?;

        let mut graph = Self::new();
        graph.rebuild(dump.nodes, dump.edges)?;
        debug!(path = %path.display(), nodes = graph.len(), "graph loaded");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MemoryType, NodeType};

    fn concept(id: &str, name: &str) -> Node {
        Node::new(id, NodeType::Concept, 0.5, MemoryType::Semantic).with_attribute("name", name)
    }

    #[test]
    fn add_node_rejects_duplicate_id() {
        let mut g = Graph::new();
        g.add_node(concept("a", "Apple")).unwrap();
        let err = g.add_node(concept("a", "Apple")).unwrap_err();
        assert!(matches!(err, NoemaError::DuplicateId { .. }));
    }

    #[test]
    fn add_edge_requires_existing_endpoints() {
        let mut g = Graph::new();
        g.add_node(concept("a", "Apple")).unwrap();
        let err = g.add_edge("a", "missing", "IS_A", 0.7).unwrap_err();
        assert!(matches!(err, NoemaError::MissingEndpoint { .. }));
    }

    #[test]
    fn duplicate_edge_is_a_noop() {
        let mut g = Graph::new();
        g.add_node(concept("a", "Apple")).unwrap();
        g.add_node(concept("b", "Fruit")).unwrap();
        g.add_edge("a", "b", "IS_A", 0.7).unwrap();
        g.add_edge("a", "b", "IS_A", 0.7).unwrap();
        assert_eq!(g.out_edges("a").len(), 1);
    }

    #[test]
    fn out_edges_preserve_insertion_order() {
        let mut g = Graph::new();
        g.add_node(concept("a", "Apple")).unwrap();
        g.add_node(concept("b", "Fruit")).unwrap();
        g.add_node(concept("c", "Food")).unwrap();
        g.add_node(concept("d", "Plant")).unwrap();
        g.add_edge("a", "b", "IS_A", 0.7).unwrap();
        g.add_edge("a", "c", "IS_A", 0.6).unwrap();
        g.add_edge("a", "d", "GROWS_ON", 0.5).unwrap();

        assert_eq!(g.neighbors("a"), vec!["b".to_string(), "c".to_string(), "d".to_string()]);
        let dsts: Vec<&str> = g.out_edges("a").iter().map(|e| e.dst.as_str()).collect();
        assert_eq!(dsts, vec!["b", "c", "d"]);
    }

    #[test]
    fn find_by_name_normalizes() {
        let mut g = Graph::new();
        g.add_node(concept("a", "Cats")).unwrap();
        assert_eq!(g.find_by_name("cat").as_deref(), Some("a"));
        assert_eq!(g.find_by_name("CAT").as_deref(), Some("a"));
    }

    #[test]
    fn merge_by_name_migrates_edges_and_removes_duplicates() {
        let mut g = Graph::new();
        g.add_node(concept("n1", "cat")).unwrap();
        g.add_node(concept("n2", "Cats")).unwrap();
        g.add_node(concept("n3", "CAT")).unwrap();
        g.add_node(concept("x", "Toy")).unwrap();
        g.add_node(concept("y", "Person")).unwrap();
        g.add_edge("n1", "x", "PLAYS_WITH", 0.7).unwrap();
        g.add_edge("y", "n2", "OWNS", 0.7).unwrap();

        let removed = g.merge_by_name();
        assert_eq!(removed, 2);
        assert_eq!(g.len(), 3);
        assert!(g.get_node("n2").is_none());
        assert!(g.get_node("n3").is_none());
        assert_eq!(g.neighbors("n1"), vec!["x".to_string()]);
        assert_eq!(g.out_edges("y")[0].dst, "n1");
    }

    #[test]
    fn merge_by_name_is_idempotent() {
        let mut g = Graph::new();
        g.add_node(concept("n1", "cat")).unwrap();
        g.add_node(concept("n2", "Cats")).unwrap();
        g.merge_by_name();
        assert_eq!(g.merge_by_name(), 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let mut g = Graph::new();
        g.add_node(concept("a", "Apple")).unwrap();
        g.add_node(concept("b", "Fruit")).unwrap();
        g.add_edge("a", "b", "IS_A", 0.7).unwrap();
        g.save(&path).unwrap();

        let loaded = Graph::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get_edge_weight("a", "b"), 0.7);
    }

    #[test]
    fn load_missing_file_yields_empty_graph() {
        let g = Graph::load("/nonexistent/path/graph.json").unwrap();
        assert!(g.is_empty());
        assert!(g.find_by_name("x").is_none());
    }
}
