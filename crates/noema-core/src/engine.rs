//! Composition root: wires the graph store, activation manager, ingestion
//! pipeline, action executor, and cognitive loop into one running engine,
//! enforcing the concurrency contract in §5.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::action::ActionExecutor;
use crate::cognitive::{CognitiveLoop, EngineState, StatusRecord};
use crate::config::EngineConfig;
use crate::error::NoemaResult;
use crate::graph::Graph;
use crate::ingestion::{is_meaningful, IngestionPipeline};
use crate::traits::{SummaryFetcher, TripleExtractor};

/// Capacity of the bounded status queue published by the cognitive loop.
const STATUS_QUEUE_CAPACITY: usize = 32;

/// The running cognitive engine: owns the locked (graph, activation) state
/// and the collaborators that mutate it.
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
    config: EngineConfig,
    ingestion: IngestionPipeline,
    cognitive_loop: Arc<CognitiveLoop>,
}

impl Engine {
    /// Load (or create) the graph at `config.graph_path` and wire every
    /// collaborator. `action_executor` should already have every handler
    /// the deployment needs registered.
    pub fn new(
        config: EngineConfig,
        triple_extractor: Arc<dyn TripleExtractor>,
        summary_fetcher: Arc<dyn SummaryFetcher>,
        action_executor: ActionExecutor,
    ) -> NoemaResult<(Self, mpsc::Receiver<StatusRecord>)> {
        let graph = Graph::load(&config.graph_path)?;
        let state = Arc::new(Mutex::new(EngineState::new(graph, config.activation.clone())));

        let (cognitive_loop, status_rx) = CognitiveLoop::new(
            state.clone(),
            Arc::new(action_executor),
            config.tick_interval(),
            STATUS_QUEUE_CAPACITY,
        );

        let engine = Self {
            state,
            ingestion: IngestionPipeline::new(triple_extractor, summary_fetcher),
            cognitive_loop: Arc::new(cognitive_loop),
            config,
        };

        Ok((engine, status_rx))
    }

    /// Start the periodic tick. Idempotent: calling it twice while already
    /// running is a no-op.
    pub async fn start(&self) -> NoemaResult<()> {
        self.cognitive_loop.clone().spawn().await?;
        info!("engine started");
        Ok(())
    }

    /// Cooperative shutdown: stop the scheduler so no further tick starts.
    /// A tick already in flight completes on its own.
    pub async fn shutdown(&self) -> NoemaResult<()> {
        self.cognitive_loop.shutdown().await?;
        info!("engine stopped");
        Ok(())
    }

    /// The full ingestion pipeline (§4.3 / §5): acquire the lock only for
    /// the pre- and post-I/O mutation steps, performing the extractor call
    /// with no lock held, then persist the snapshot outside the lock too.
    pub async fn inject_text(&self, text: &str) -> NoemaResult<StatusRecord> {
        if !is_meaningful(text) {
            debug!("ignoring blank input");
            let guard = self.state.lock().await;
            return Ok(StatusRecord {
                mode: guard.am.mode(),
                top_node_id: guard.am.get_top(),
                top_activation: 0.0,
                drift_description: None,
            });
        }

        {
            let mut guard = self.state.lock().await;
            self.ingestion.prepare(&mut guard.am);
        }

        let triples = self.ingestion.extract(text).await;

        let status = {
            let mut guard = self.state.lock().await;
            let EngineState { graph, am, last_text } = &mut *guard;
            *last_text = text.to_string();

            if triples.is_empty() {
                self.ingestion.apply_fallback(graph, am, text).await;
            } else {
                self.ingestion.apply_triples(graph, am, &triples).await;
            }

            StatusRecord {
                mode: am.mode(),
                top_node_id: am.get_top(),
                top_activation: am.get_top().map(|id| am.get_activation(&id)).unwrap_or(0.0),
                drift_description: None,
            }
        };

        let snapshot = {
            let guard = self.state.lock().await;
            guard.graph.snapshot()
        };
        self.ingestion.persist(&snapshot, &self.config.graph_path);

        self.cognitive_loop.republish_now(status.clone()).await;
        Ok(status)
    }

    /// Direct access to the locked state, for callers (the editor utility,
    /// tests) that need a one-off read or mutation outside the ingestion
    /// and tick pathways.
    pub fn state(&self) -> Arc<Mutex<EngineState>> {
        self.state.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActionConfig;
    use crate::traits::{NoopSummaryFetcher, NoopTripleExtractor, Triple};
    use async_trait::async_trait;

    struct StubExtractor(Vec<Triple>);

    #[async_trait]
    impl TripleExtractor for StubExtractor {
        async fn extract(&self, _text: &str) -> NoemaResult<Vec<Triple>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn ingestion_with_stub_extractor_creates_triple_graph() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.graph_path = dir.path().join("graph.json");

        let extractor = Arc::new(StubExtractor(vec![(
            "Apple".to_string(),
            "IS_A".to_string(),
            "Fruit".to_string(),
        )]));
        let (engine, _rx) = Engine::new(
            config,
            extractor,
            Arc::new(NoopSummaryFetcher),
            ActionExecutor::new(ActionConfig::default()),
        )
        .unwrap();

        let status = engine.inject_text("apple").await.unwrap();
        assert_eq!(status.mode, 1.0);

        let guard = engine.state().lock().await;
        assert_eq!(guard.graph.len(), 2);
        let apple = guard.graph.find_by_name("Apple").unwrap();
        let fruit = guard.graph.find_by_name("Fruit").unwrap();
        assert!(guard.am.get_activation(&apple) > 0.0);
        assert!(guard.am.get_activation(&fruit) > 0.0);
    }

    #[tokio::test]
    async fn ingestion_with_no_triples_falls_back_to_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.graph_path = dir.path().join("graph.json");

        let (engine, _rx) = Engine::new(
            config,
            Arc::new(NoopTripleExtractor),
            Arc::new(NoopSummaryFetcher),
            ActionExecutor::new(ActionConfig::default()),
        )
        .unwrap();

        engine.inject_text("apple banana").await.unwrap();

        let guard = engine.state().lock().await;
        assert_eq!(guard.graph.len(), 2);
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.graph_path = dir.path().join("graph.json");

        let (engine, _rx) = Engine::new(
            config,
            Arc::new(NoopTripleExtractor),
            Arc::new(NoopSummaryFetcher),
            ActionExecutor::new(ActionConfig::default()),
        )
        .unwrap();

        engine.inject_text("   ").await.unwrap();
        let guard = engine.state().lock().await;
        assert!(guard.graph.is_empty());
    }
}
