//! Ingestion pipeline: turns a span of user text into graph mutations and
//! activation injections (§4.3).
//!
//! `inject_text` is the only place outside the action executor permitted to
//! create nodes and edges after initial load. The concurrency contract in
//! §5 is enforced by its caller (`Engine`): the triple-extractor call and the
//! summary-fetcher calls are the only suspension points, and both happen
//! outside the combined graph/activation lock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::activation::ActivationManager;
use crate::error::NoemaResult;
use crate::graph::{generate_node_id, normalize_name, save_snapshot, Graph, GraphDump, MemoryType, Node, NodeType};
use crate::traits::{SummaryFetcher, Triple, TripleExtractor};

/// Activation injected into a fallback-path token node.
const FALLBACK_INJECTION: f64 = 0.8;
/// Activation injected into each endpoint of a freshly ingested triple.
const TRIPLE_INJECTION: f64 = 1.0;
/// Weight assigned to an edge created from an ingested triple.
const TRIPLE_EDGE_WEIGHT: f64 = 0.7;
/// Threshold used to clear stale background energy on new input.
const STALE_CLEAR_THRESHOLD: f64 = 0.1;
/// Number of whitespace-separated tokens consumed on the fallback path.
const FALLBACK_TOKEN_LIMIT: usize = 2;

/// Turns ingested text into triples, grafts them into the graph, and
/// injects activation at the affected nodes.
pub struct IngestionPipeline {
    triple_extractor: Arc<dyn TripleExtractor>,
    summary_fetcher: Arc<dyn SummaryFetcher>,
}

impl IngestionPipeline {
    pub fn new(triple_extractor: Arc<dyn TripleExtractor>, summary_fetcher: Arc<dyn SummaryFetcher>) -> Self {
        Self {
            triple_extractor,
            summary_fetcher,
        }
    }

    /// The pre-I/O half of ingestion: clear stale background energy and
    /// flip the mode to focused. Caller holds the lock for this step only.
    pub fn prepare(&self, am: &mut ActivationManager) {
        am.clear_below(STALE_CLEAR_THRESHOLD);
        am.set_mode(1.0);
    }

    /// Call out to the triple extractor. Performed with no lock held.
    pub async fn extract(&self, text: &str) -> Vec<Triple> {
        match self.triple_extractor.extract(text).await {
            Ok(triples) => triples,
            Err(e) => {
                warn!(error = %e, "triple extraction failed, falling back to token concepts");
                Vec::new()
            }
        }
    }

    /// Fetch a knowledge summary for `keyword`, swallowing adapter failures
    /// since enrichment is opportunistic and never on the critical path.
    async fn enrich(&self, keyword: &str) -> Option<String> {
        match self.summary_fetcher.fetch(keyword).await {
            Ok(summary) if !summary.is_empty() => Some(summary),
            Ok(_) => None,
            Err(e) => {
                warn!(keyword = %keyword, error = %e, "summary enrichment failed");
                None
            }
        }
    }

    /// Apply the fallback path: tokenize `text`, look up or create a concept
    /// node per token (up to two), inject activation, spread twice.
    pub async fn apply_fallback(&self, graph: &mut Graph, am: &mut ActivationManager, text: &str) {
        let tokens: Vec<&str> = text.split_whitespace().take(FALLBACK_TOKEN_LIMIT).collect();
        for token in tokens {
            let name = normalize_name(token);
            let node_id = match graph.find_by_name(&name) {
                Some(id) => id,
                None => {
                    let id = self.create_concept(graph, &name, "unknown_input").await;
                    debug!(node = %id, name = %name, "fallback path created concept node");
                    id
                }
            };
            am.inject(graph, &node_id, FALLBACK_INJECTION, "unknown_input");
        }
        am.spread(graph);
        am.spread(graph);
    }

    /// Apply the normal path: graft every extracted triple into the graph
    /// and inject activation at both endpoints, then spread twice.
    pub async fn apply_triples(&self, graph: &mut Graph, am: &mut ActivationManager, triples: &[Triple]) {
        let mut by_name: HashMap<String, String> = graph
            .all_ids()
            .into_iter()
            .filter_map(|id| {
                let name = graph.get_node(&id)?.name()?.to_lowercase();
                Some((name, id))
            })
            .collect();

        for (head, relation, tail) in triples {
            let head_id = self.resolve_or_create(graph, &mut by_name, head, "llm_triple").await;
            let tail_id = self.resolve_or_create(graph, &mut by_name, tail, "llm_triple").await;

            if let Err(e) = graph.add_edge(head_id.clone(), tail_id.clone(), relation.to_uppercase(), TRIPLE_EDGE_WEIGHT) {
                warn!(error = %e, head = %head_id, tail = %tail_id, "unexpected edge insertion failure during ingestion");
            }

            am.inject(graph, &head_id, TRIPLE_INJECTION, "input");
            am.inject(graph, &tail_id, TRIPLE_INJECTION, "input");
        }

        am.spread(graph);
        am.spread(graph);
    }

    async fn resolve_or_create(
        &self,
        graph: &mut Graph,
        by_name: &mut HashMap<String, String>,
        raw_name: &str,
        source: &str,
    ) -> String {
        let normalized = normalize_name(raw_name);
        let key = normalized.to_lowercase();
        if let Some(id) = by_name.get(&key) {
            return id.clone();
        }
        let id = self.create_concept(graph, &normalized, source).await;
        by_name.insert(key, id.clone());
        id
    }

    async fn create_concept(&self, graph: &mut Graph, name: &str, source: &str) -> String {
        let id = generate_node_id(name, NodeType::Concept);
        let now = chrono::Utc::now().timestamp();
        let node = Node::new(id.clone(), NodeType::Concept, 0.5, MemoryType::Semantic)
            .with_attribute("name", name)
            .with_attribute("created_at", now)
            .with_attribute("last_accessed", now)
            .with_attribute("source", source);

        if let Err(e) = graph.add_node(node) {
            warn!(error = %e, name = %name, "unexpected duplicate id generating concept node");
            return id;
        }

        if let Some(summary) = self.enrich(name).await {
            if let Some(n) = graph_node_mut(graph, &id) {
                n.attributes.insert("enriched_from_wiki".to_string(), true.into());
                n.attributes
                    .insert("wiki_summary_length".to_string(), (summary.len() as i64).into());
            }
        }

        id
    }

    /// Write a previously captured graph snapshot to `path`. Best effort: a
    /// failure is logged, never propagated as fatal, since in-memory state is
    /// authoritative. Takes an owned [`GraphDump`] rather than `&Graph` so the
    /// caller can snapshot under the engine lock and call this after
    /// releasing it, keeping the blocking file write off the critical section.
    pub fn persist(&self, snapshot: &GraphDump, path: impl AsRef<Path>) {
        if let Err(e) = save_snapshot(snapshot, path.as_ref()) {
            warn!(error = %e, path = %path.as_ref().display(), "failed to persist graph snapshot");
        }
    }
}

fn graph_node_mut<'a>(graph: &'a mut Graph, id: &str) -> Option<&'a mut Node> {
    graph.get_node_mut(id)
}

/// Whether `text` contains any non-whitespace content.
pub fn is_meaningful(text: &str) -> bool {
    !text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivationConfig;
    use crate::traits::{NoopSummaryFetcher, NoopTripleExtractor};

    fn pipeline() -> IngestionPipeline {
        IngestionPipeline::new(Arc::new(NoopTripleExtractor), Arc::new(NoopSummaryFetcher))
    }

    #[test]
    fn blank_text_is_not_meaningful() {
        assert!(!is_meaningful("   \t\n"));
        assert!(is_meaningful("apple"));
    }

    #[tokio::test]
    async fn fallback_path_creates_concept_nodes_and_injects() {
        let mut graph = Graph::new();
        let mut am = ActivationManager::new(ActivationConfig::default());
        let p = pipeline();

        p.apply_fallback(&mut graph, &mut am, "apple banana").await;

        assert_eq!(graph.len(), 2);
        assert!(graph.find_by_name("apple").is_some());
        assert!(graph.find_by_name("banana").is_some());
        assert!(am.get_activation(&graph.find_by_name("apple").unwrap()) > 0.0);
    }

    #[tokio::test]
    async fn triple_path_creates_two_nodes_and_one_edge() {
        let mut graph = Graph::new();
        let mut am = ActivationManager::new(ActivationConfig::default());
        let p = pipeline();

        let triples = vec![("Apple".to_string(), "IS_A".to_string(), "Fruit".to_string())];
        p.apply_triples(&mut graph, &mut am, &triples).await;

        assert_eq!(graph.len(), 2);
        let apple = graph.find_by_name("Apple").unwrap();
        let fruit = graph.find_by_name("Fruit").unwrap();
        assert_eq!(graph.neighbors(&apple), vec![fruit.clone()]);
        assert!(am.get_activation(&apple) > 0.0);
        assert!(am.get_activation(&fruit) > 0.0);
    }

    #[tokio::test]
    async fn duplicate_triple_ingestion_keeps_one_edge() {
        let mut graph = Graph::new();
        let mut am = ActivationManager::new(ActivationConfig::default());
        let p = pipeline();

        let triples = vec![("Apple".to_string(), "IS_A".to_string(), "Fruit".to_string())];
        p.apply_triples(&mut graph, &mut am, &triples).await;
        p.apply_triples(&mut graph, &mut am, &triples).await;

        let apple = graph.find_by_name("Apple").unwrap();
        assert_eq!(graph.out_edges(&apple).len(), 1);
        assert!(am.get_activation(&apple) <= 2.0);
    }
}
