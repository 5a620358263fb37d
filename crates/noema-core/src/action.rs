//! Action dispatch: selecting eligible `Action` nodes and invoking their payload.
//!
//! The original system let a node's `code` attribute be either a path to an
//! external script or an inline fragment `exec`'d against a handful of
//! globals. Neither is something a Rust process should embed unsandboxed, so
//! this build ships the no-inline variant sanctioned as a conforming
//! implementation: `code` either names a registered in-process handler
//! (script-path-shaped) or it is an unrecognized payload and gets skipped.
//!
//! A handler's work is split into two phases so the engine lock is never
//! held across its I/O (§5 permits only the triple extractor and summary
//! fetcher to suspend, and only with no lock held): `fetch` performs whatever
//! network calls the handler needs and returns an opaque payload, then
//! `apply` — called with the lock re-acquired — mutates the graph/activation
//! state from that payload without suspending.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cognitive::EngineState;
use crate::config::ActionConfig;
use crate::error::{NoemaError, NoemaResult};
use crate::graph::{Graph, NodeType};
use crate::ActivationManager;

/// Script suffixes the heuristic recognizes as "this code names a handler",
/// not an inline fragment.
const HANDLER_SUFFIXES: &[&str] = &[".py", ".sh", ".js", ".lua"];

/// Opaque result of a handler's I/O phase, consumed by [`ActionHandler::apply`].
pub type ActionPayload = Value;

/// Payload invoked when an `Action` node's activation crosses the firing
/// threshold. Mirrors the three positional arguments `(graph, am, text)` an
/// external script would have received, but split across two calls so the
/// I/O-bearing half never runs with the engine lock held.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform this handler's I/O, if any, with no lock held. Returns the
    /// payload `apply` will later use to mutate state; `Value::Null` means
    /// "nothing to apply".
    async fn fetch(&self, text: &str) -> NoemaResult<ActionPayload>;

    /// Apply mutations derived from `payload` to the graph and activation
    /// state. Called with the engine lock held, so this must not suspend.
    fn apply(&self, graph: &mut Graph, am: &mut ActivationManager, payload: ActionPayload) -> NoemaResult<()>;
}

/// A handler that does nothing; useful for tests and as a placeholder
/// registration for actions that only exist to mark activation flow.
#[derive(Debug, Default)]
pub struct NoopActionHandler;

#[async_trait]
impl ActionHandler for NoopActionHandler {
    async fn fetch(&self, _text: &str) -> NoemaResult<ActionPayload> {
        Ok(Value::Null)
    }

    fn apply(&self, _graph: &mut Graph, _am: &mut ActivationManager, _payload: ActionPayload) -> NoemaResult<()> {
        Ok(())
    }
}

/// True if `code` is shaped like a script reference rather than an inline
/// fragment: single line, no statement separator, no leading path separator,
/// and ends in a recognized suffix.
fn looks_like_handler_name(code: &str) -> bool {
    let single_line = !code.contains('\n');
    let no_statement_separator = !code.contains(';');
    let no_leading_path_separator = !code.starts_with('/') && !code.starts_with('\\');
    single_line
        && no_statement_separator
        && no_leading_path_separator
        && HANDLER_SUFFIXES.iter().any(|suffix| code.ends_with(suffix))
}

/// Selects `Action` nodes whose activation has crossed the firing threshold
/// and dispatches their `code` payload to a registered handler.
pub struct ActionExecutor {
    config: ActionConfig,
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionExecutor {
    pub fn new(config: ActionConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under the exact `code` string an `Action` node
    /// would carry, e.g. `"wiki_enricher.py"`.
    pub fn register_handler(&mut self, code: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(code.into(), handler);
    }

    pub fn with_handler(mut self, code: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.register_handler(code, handler);
        self
    }

    /// All `Action` nodes whose activation is at or above the firing threshold.
    fn eligible_actions(&self, graph: &Graph, am: &ActivationManager) -> Vec<String> {
        am.eligible(self.config.fire_threshold)
            .into_iter()
            .filter(|id| matches!(graph.get_node(id).map(|n| &n.node_type), Some(NodeType::Action)))
            .collect()
    }

    /// Resolve eligible actions' `code` attribute down to a registered
    /// handler, logging and dropping anything unfit to dispatch. Synchronous
    /// and cheap; meant to be called with the lock held.
    fn collect_dispatchable(&self, graph: &Graph, am: &ActivationManager) -> Vec<(String, Arc<dyn ActionHandler>)> {
        let mut dispatchable = Vec::new();
        for node_id in self.eligible_actions(graph, am) {
            let code = graph
                .get_node(&node_id)
                .and_then(|n| n.attributes.get("code"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();

            if code.is_empty() {
                warn!(node = %node_id, "action node has no executable code, skipping");
                continue;
            }

            if !looks_like_handler_name(&code) {
                warn!(node = %node_id, code = %code, "action code is not a recognized handler reference, skipping");
                continue;
            }

            let Some(handler) = self.handlers.get(&code).cloned() else {
                warn!(node = %node_id, code = %code, handler_dir = %self.config.handler_dir.display(), "no handler registered for action code, skipping");
                continue;
            };

            dispatchable.push((node_id, handler));
        }
        dispatchable
    }

    /// Dispatch every eligible action's payload, isolating failures per
    /// action, and pin each fired action's activation below the threshold.
    /// Returns the ids that were actually invoked (as opposed to skipped).
    ///
    /// The engine lock is acquired three times rather than held across the
    /// whole call: once to read eligible actions, released for the handlers'
    /// `fetch` I/O, then re-acquired to apply their mutations and pin
    /// activations. This is the same acquire/I-O/acquire shape
    /// `Engine::inject_text` uses for the triple extractor.
    pub async fn execute_pending(&self, state: &Mutex<EngineState>, current_text: &str) -> Vec<String> {
        let dispatchable = {
            let guard = state.lock().await;
            self.collect_dispatchable(&guard.graph, &guard.am)
        };
        if dispatchable.is_empty() {
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(dispatchable.len());
        for (node_id, handler) in dispatchable {
            debug!(node = %node_id, "dispatching action handler");
            let payload = handler.fetch(current_text).await;
            outcomes.push((node_id, handler, payload));
        }

        let mut guard = state.lock().await;
        let mut fired = Vec::new();
        for (node_id, handler, payload) in outcomes {
            match payload {
                Ok(payload) => {
                    if let Err(e) = handler.apply(&mut guard.graph, &mut guard.am, payload) {
                        let err = NoemaError::action_payload_failure(format!("{node_id}: {e}"));
                        tracing::error!(error = %err, "action handler apply failed");
                    }
                }
                Err(e) => {
                    let err = NoemaError::action_payload_failure(format!("{node_id}: {e}"));
                    tracing::error!(error = %err, "action handler fetch failed");
                }
            }

            guard.am.pin(&node_id, self.config.post_fire_activation);
            fired.push(node_id);
        }

        fired
    }
}
