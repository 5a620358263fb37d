//! `ActionHandler` that enriches the graph from a Wikipedia summary and an
//! LLM triple pass, triggered by an `Action` node whose `code` is
//! `"wiki_enricher.py"`.
//!
//! Both of this handler's network calls (the summary fetch and the triple
//! extraction over that summary) happen in `fetch`, which the executor calls
//! with no engine lock held; `apply` only touches the in-memory graph and
//! never suspends, so it is safe to call back under the lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use noema_core::action::{ActionHandler, ActionPayload};
use noema_core::error::NoemaResult;
use noema_core::graph::{generate_node_id, normalize_name, Graph, MemoryType, Node, NodeType};
use noema_core::traits::{SummaryFetcher, Triple, TripleExtractor};
use noema_core::ActivationManager;

/// The registry key this handler is conventionally installed under, matching
/// the script-path-shaped `code` value an `Action` node carries.
pub const HANDLER_CODE: &str = "wiki_enricher.py";

/// Weight assigned to edges created from enrichment triples. Lower than the
/// ingestion pipeline's direct-input weight, since this content arrived via
/// an automated two-hop lookup rather than a direct user statement.
const ENRICHMENT_EDGE_WEIGHT: f64 = 0.6;

pub struct WikiEnrichHandler {
    triple_extractor: Arc<dyn TripleExtractor>,
    summary_fetcher: Arc<dyn SummaryFetcher>,
}

impl WikiEnrichHandler {
    pub fn new(triple_extractor: Arc<dyn TripleExtractor>, summary_fetcher: Arc<dyn SummaryFetcher>) -> Self {
        Self {
            triple_extractor,
            summary_fetcher,
        }
    }

    /// The last purely-alphabetic whitespace token in `text`, used as the
    /// lookup keyword. Mirrors the simple "last word" heuristic this handler
    /// was ported from.
    fn extract_keyword(text: &str) -> Option<&str> {
        text.split_whitespace()
            .filter(|w| !w.is_empty() && w.chars().all(|c| c.is_alphabetic()))
            .last()
    }
}

#[async_trait]
impl ActionHandler for WikiEnrichHandler {
    async fn fetch(&self, text: &str) -> NoemaResult<ActionPayload> {
        let Some(keyword) = Self::extract_keyword(text) else {
            warn!("wiki_enricher: no valid keyword found in input, skipping");
            return Ok(Value::Null);
        };

        info!(keyword = %keyword, "wiki_enricher: fetching summary");
        let summary = self.summary_fetcher.fetch(keyword).await?;
        if summary.is_empty() {
            warn!(keyword = %keyword, "wiki_enricher: no wikipedia summary found");
            return Ok(Value::Null);
        }

        let triples = self.triple_extractor.extract(&summary).await?;
        if triples.is_empty() {
            warn!(keyword = %keyword, "wiki_enricher: no triples extracted from summary");
            return Ok(Value::Null);
        }

        Ok(json!({ "keyword": keyword, "triples": triples }))
    }

    fn apply(&self, graph: &mut Graph, _am: &mut ActivationManager, payload: ActionPayload) -> NoemaResult<()> {
        if payload.is_null() {
            return Ok(());
        }
        let keyword = payload.get("keyword").and_then(Value::as_str).unwrap_or("?").to_string();
        let triples = decode_triples(&payload);

        let mut by_name: HashMap<String, String> = graph
            .all_ids()
            .into_iter()
            .filter_map(|id| {
                let name = graph.get_node(&id)?.name()?.to_lowercase();
                Some((name, id))
            })
            .collect();

        let mut added_nodes = 0;
        let mut added_edges = 0;
        let now = chrono::Utc::now().timestamp();

        for (head, relation, tail) in &triples {
            let head_id = resolve_or_create(graph, &mut by_name, head, now, &mut added_nodes);
            let tail_id = resolve_or_create(graph, &mut by_name, tail, now, &mut added_nodes);

            match graph.add_edge(head_id, tail_id, relation.to_uppercase(), ENRICHMENT_EDGE_WEIGHT) {
                Ok(()) => added_edges += 1,
                Err(e) => warn!(error = %e, "wiki_enricher: skipped edge"),
            }
        }

        info!(keyword = %keyword, added_nodes, added_edges, "wiki_enricher: enrichment complete");
        Ok(())
    }
}

/// Recover the `(head, relation, tail)` triples stashed in a `fetch` payload.
/// Malformed entries are dropped rather than failing the whole batch.
fn decode_triples(payload: &Value) -> Vec<Triple> {
    payload
        .get("triples")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| {
                    let parts = t.as_array()?;
                    if parts.len() != 3 {
                        return None;
                    }
                    Some((
                        parts[0].as_str()?.to_string(),
                        parts[1].as_str()?.to_string(),
                        parts[2].as_str()?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_or_create(
    graph: &mut Graph,
    by_name: &mut HashMap<String, String>,
    raw_name: &str,
    created_at: i64,
    added: &mut usize,
) -> String {
    let normalized = normalize_name(raw_name);
    let key = normalized.to_lowercase();
    if let Some(id) = by_name.get(&key) {
        return id.clone();
    }

    let id = generate_node_id(&normalized, NodeType::Concept);
    let node = Node::new(id.clone(), NodeType::Concept, 0.5, MemoryType::Semantic)
        .with_attribute("name", normalized.clone())
        .with_attribute("created_at", created_at)
        .with_attribute("last_accessed", created_at)
        .with_attribute("source", "wiki_enricher");

    if graph.add_node(node).is_ok() {
        *added += 1;
    }
    by_name.insert(key, id.clone());
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_core::config::ActivationConfig;
    use noema_core::error::NoemaResult as Result;

    struct StubSummary(&'static str);
    #[async_trait]
    impl SummaryFetcher for StubSummary {
        async fn fetch(&self, _keyword: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct StubExtractor(Vec<Triple>);
    #[async_trait]
    impl TripleExtractor for StubExtractor {
        async fn extract(&self, _text: &str) -> Result<Vec<Triple>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn extracts_last_alphabetic_word() {
        assert_eq!(WikiEnrichHandler::extract_keyword("tell me about apples"), Some("apples"));
        assert_eq!(WikiEnrichHandler::extract_keyword("apples 123"), Some("apples"));
        assert_eq!(WikiEnrichHandler::extract_keyword("123 456"), None);
    }

    #[tokio::test]
    async fn fetch_then_apply_enriches_graph_from_summary_triples() {
        let handler = WikiEnrichHandler::new(
            Arc::new(StubExtractor(vec![(
                "Apple".to_string(),
                "IS_A".to_string(),
                "Fruit".to_string(),
            )])),
            Arc::new(StubSummary("Apple is a fruit grown worldwide.")),
        );

        let payload = handler.fetch("tell me about apple").await.unwrap();
        assert!(!payload.is_null());

        let mut graph = Graph::new();
        let mut am = ActivationManager::new(ActivationConfig::default());
        handler.apply(&mut graph, &mut am, payload).unwrap();

        assert_eq!(graph.len(), 2);
        assert!(graph.find_by_name("Apple").is_some());
        assert!(graph.find_by_name("Fruit").is_some());
    }

    #[tokio::test]
    async fn fetch_is_null_when_no_keyword() {
        let handler = WikiEnrichHandler::new(Arc::new(StubExtractor(vec![])), Arc::new(StubSummary("")));
        let payload = handler.fetch("123 456").await.unwrap();
        assert!(payload.is_null());

        let mut graph = Graph::new();
        let mut am = ActivationManager::new(ActivationConfig::default());
        handler.apply(&mut graph, &mut am, payload).unwrap();
        assert!(graph.is_empty());
    }
}
