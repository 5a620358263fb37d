//! The cognitive loop (§4.5): a fixed-period background tick that drives
//! the activation manager and, in the focused regime, the action executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

use crate::action::ActionExecutor;
use crate::activation::ActivationManager;
use crate::config::ActivationConfig;
use crate::error::{NoemaError, NoemaResult};
use crate::graph::Graph;

/// Mode value at or below which drift is attempted; above it, actions run instead.
const FOCUSED_MODE_THRESHOLD: f64 = 0.4;
/// Per-tick relaxation of `mode` back toward the diffuse regime.
const MODE_RELAXATION_PER_TICK: f64 = -0.02;

/// Combined graph + activation state a tick (or an ingestion commit)
/// acquires as a single coarse-grained critical section, per §5.
pub struct EngineState {
    pub graph: Graph,
    pub am: ActivationManager,
    /// The most recently ingested text, made available to actions fired
    /// from a background tick rather than directly from `inject_text`.
    pub last_text: String,
}

impl EngineState {
    pub fn new(graph: Graph, activation_config: ActivationConfig) -> Self {
        Self {
            graph,
            am: ActivationManager::new(activation_config),
            last_text: String::new(),
        }
    }
}

/// A status snapshot published after every tick and after every ingestion
/// commit, for consumption by a presentation layer (CLI, GUI, ...).
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub mode: f64,
    pub top_node_id: Option<String>,
    pub top_activation: f64,
    pub drift_description: Option<String>,
}

/// Drives `EngineState` at a fixed period: spread, decay, mode relaxation,
/// optional drift, and (in the focused regime) action dispatch.
pub struct CognitiveLoop {
    state: Arc<Mutex<EngineState>>,
    action_executor: Arc<ActionExecutor>,
    tick_interval: std::time::Duration,
    running: Arc<AtomicBool>,
    scheduler: Mutex<Option<JobScheduler>>,
    status_tx: mpsc::Sender<StatusRecord>,
}

impl CognitiveLoop {
    /// Build a loop and its status channel. The channel is bounded; a slow
    /// or absent consumer causes `publish` to drop the oldest-pending send
    /// rather than block the tick. The periodic job itself is built lazily
    /// in [`spawn`](Self::spawn), since building it requires an async
    /// `JobScheduler::new()`.
    pub fn new(
        state: Arc<Mutex<EngineState>>,
        action_executor: Arc<ActionExecutor>,
        tick_interval: std::time::Duration,
        status_capacity: usize,
    ) -> (Self, mpsc::Receiver<StatusRecord>) {
        let (status_tx, status_rx) = mpsc::channel(status_capacity);
        (
            Self {
                state,
                action_executor,
                tick_interval,
                running: Arc::new(AtomicBool::new(false)),
                scheduler: Mutex::new(None),
                status_tx,
            },
            status_rx,
        )
    }

    /// Run exactly one tick: `spread -> decay -> mode relaxation -> [drift] -> [actions]`,
    /// in that fixed order.
    ///
    /// `spread`, `decay`, the mode relaxation, and `drift` all run under one
    /// unbroken lock acquisition — §5's exclusion region covers a whole tick,
    /// and none of those steps suspend on I/O, so there is no reason to
    /// release the lock between them. Only the action-dispatch step drops
    /// out to its own acquire/I-O/acquire cycle, because handlers may
    /// perform real network I/O (§5 permits only the triple extractor and
    /// summary fetcher to suspend, and only with no lock held); that cycle
    /// is owned by [`ActionExecutor::execute_pending`], the same shape
    /// `Engine::inject_text` uses around the triple extractor.
    pub async fn tick_once(&self) -> StatusRecord {
        let (mode, drift_description, top_node_id, top_activation) = {
            let mut guard = self.state.lock().await;
            let EngineState { graph, am, .. } = &mut *guard;
            am.spread(graph);
            am.decay();
            am.set_mode(MODE_RELAXATION_PER_TICK);
            let mode = am.mode();

            let drift_description = if mode < FOCUSED_MODE_THRESHOLD { am.drift(graph) } else { None };

            let top_node_id = am.get_top();
            let top_activation = top_node_id.as_ref().map(|id| am.get_activation(id)).unwrap_or(0.0);
            (mode, drift_description, top_node_id, top_activation)
        };

        if mode > FOCUSED_MODE_THRESHOLD {
            let current_text = self.state.lock().await.last_text.clone();
            let fired = self.action_executor.execute_pending(&self.state, &current_text).await;
            if !fired.is_empty() {
                info!(fired = ?fired, "actions fired this tick");
            }

            let guard = self.state.lock().await;
            return StatusRecord {
                mode: guard.am.mode(),
                top_node_id: guard.am.get_top(),
                top_activation: guard.am.get_top().map(|id| guard.am.get_activation(&id)).unwrap_or(0.0),
                drift_description: None,
            };
        }

        StatusRecord {
            mode,
            top_node_id,
            top_activation,
            drift_description,
        }
    }

    /// Publish a status record to the bounded queue, best-effort.
    async fn publish(&self, status: StatusRecord) {
        if self.status_tx.send(status).await.is_err() {
            debug!("status queue has no receiver, dropping status record");
        }
    }

    /// Publish a status record without waiting for a tick, e.g. right after
    /// an ingestion commit.
    pub async fn republish_now(&self, status: StatusRecord) {
        self.publish(status).await;
    }

    /// Start the periodic tick job. Idempotent: calling it while already
    /// running is a no-op. Builds a `tokio-cron-scheduler` job that runs
    /// [`tick_once`](Self::tick_once) on a fixed period, the same mechanism
    /// the teacher's `ConsolidationScheduler`/`IntentionScheduler` use for
    /// their own periodic background work.
    pub async fn spawn(self: Arc<Self>) -> NoemaResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| NoemaError::Configuration(format!("cognitive loop scheduler init failed: {e}")))?;

        let this = self.clone();
        let job = Job::new_repeated_async(self.tick_interval, move |_uuid, _lock| {
            let this = this.clone();
            Box::pin(async move {
                if !this.running.load(Ordering::SeqCst) {
                    return;
                }
                let status = this.tick_once().await;
                this.publish(status).await;
            })
        })
        .map_err(|e| NoemaError::Configuration(format!("cognitive loop job build failed: {e}")))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| NoemaError::Configuration(format!("cognitive loop job registration failed: {e}")))?;

        scheduler
            .start()
            .await
            .map_err(|e| NoemaError::Configuration(format!("cognitive loop scheduler start failed: {e}")))?;

        self.running.store(true, Ordering::SeqCst);
        *self.scheduler.lock().await = Some(scheduler);
        info!(period_ms = self.tick_interval.as_millis(), "cognitive loop started");
        Ok(())
    }

    /// Request cooperative shutdown: stop the scheduler so no further tick
    /// starts. A tick already in flight when this is called completes on
    /// its own; `tick_once`'s internal `running` check only gates the
    /// *next* scheduled firing.
    pub async fn shutdown(&self) -> NoemaResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| NoemaError::Configuration(format!("cognitive loop scheduler shutdown failed: {e}")))?;
            info!("cognitive loop stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::NoopActionHandler;
    use crate::config::{ActionConfig, ActivationConfig};
    use crate::graph::{MemoryType, Node, NodeType};

    fn two_node_graph() -> Graph {
        let mut g = Graph::new();
        g.add_node(Node::new("a", NodeType::Concept, 0.5, MemoryType::Semantic).with_attribute("name", "A"))
            .unwrap();
        g.add_node(Node::new("b", NodeType::Concept, 0.5, MemoryType::Semantic).with_attribute("name", "B"))
            .unwrap();
        g.add_edge("a", "b", "RELATED_TO", 1.0).unwrap();
        g
    }

    #[tokio::test]
    async fn tick_spreads_decays_and_relaxes_mode() {
        let state = Arc::new(Mutex::new(EngineState::new(two_node_graph(), ActivationConfig::default())));
        {
            let mut guard = state.lock().await;
            let EngineState { graph, am, .. } = &mut *guard;
            am.inject(graph, "a", 1.0, "input");
            am.set_mode(1.0);
        }
        let executor = Arc::new(ActionExecutor::new(ActionConfig::default()));
        let (loop_, _rx) = CognitiveLoop::new(state.clone(), executor, std::time::Duration::from_millis(10), 16);

        let status = loop_.tick_once().await;
        assert!(status.mode < 1.0, "mode should relax toward diffuse after a tick");
    }

    #[tokio::test]
    async fn focused_tick_dispatches_eligible_actions() {
        let mut g = two_node_graph();
        g.add_node(
            Node::new("act", NodeType::Action, 0.5, MemoryType::Semantic)
                .with_attribute("name", "Fire")
                .with_attribute("code", "noop.py"),
        )
        .unwrap();
        g.add_edge("b", "act", "TRIGGERS", 1.0).unwrap();

        let state = Arc::new(Mutex::new(EngineState::new(g, ActivationConfig::default())));
        {
            let mut guard = state.lock().await;
            let EngineState { graph, am, .. } = &mut *guard;
            am.set_mode(1.0);
            am.inject(graph, "act", 1.0, "input");
        }
        let executor = Arc::new(
            ActionExecutor::new(ActionConfig::default()).with_handler("noop.py", Arc::new(NoopActionHandler)),
        );
        let (loop_, _rx) = CognitiveLoop::new(state.clone(), executor, std::time::Duration::from_millis(10), 16);

        loop_.tick_once().await;
        let guard = state.lock().await;
        assert_eq!(guard.am.get_activation("act"), 0.05);
    }
}
