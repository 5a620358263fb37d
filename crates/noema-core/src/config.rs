//! Configuration for the graph store, activation dynamics, and cognitive loop.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{NoemaError, NoemaResult};

/// Top-level configuration for a running engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the full JSON graph dump.
    pub graph_path: PathBuf,
    /// Activation dynamics tuning.
    pub activation: ActivationConfig,
    /// Action dispatch tuning.
    pub action: ActionConfig,
    /// Period between cognitive loop ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Triple extractor adapter configuration.
    pub triple_extractor: TripleExtractorConfig,
    /// Summary fetcher adapter configuration.
    pub summary_fetcher: SummaryFetcherConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".noema"))
            .unwrap_or_else(|| PathBuf::from(".noema"));

        Self {
            graph_path: data_dir.join("knowledge_graph.json"),
            activation: ActivationConfig::default(),
            action: ActionConfig::default(),
            tick_interval_ms: 1_000,
            triple_extractor: TripleExtractorConfig::default(),
            summary_fetcher: SummaryFetcherConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML, chosen by extension).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> NoemaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| NoemaError::Configuration(e.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| NoemaError::Configuration(e.to_string()))
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| NoemaError::Configuration(e.to_string()))
            }
            _ => Err(NoemaError::Configuration(
                "unsupported config file format; use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Overlay configuration from environment variables.
    ///
    /// Reads:
    /// - `NOEMA_GRAPH_PATH`
    /// - `NOEMA_TICK_INTERVAL_MS`
    /// - `NOEMA_ACTION_THRESHOLD`
    /// - `NOEMA_OLLAMA_BASE_URL` / `NOEMA_OLLAMA_MODEL`
    /// - `NOEMA_WIKIPEDIA_BASE_URL`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("NOEMA_GRAPH_PATH") {
            config.graph_path = PathBuf::from(path);
        }
        if let Ok(ms) = std::env::var("NOEMA_TICK_INTERVAL_MS") {
            if let Ok(ms) = ms.parse() {
                config.tick_interval_ms = ms;
            }
        }
        if let Ok(threshold) = std::env::var("NOEMA_ACTION_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                config.action.fire_threshold = threshold;
            }
        }
        if let Ok(url) = std::env::var("NOEMA_OLLAMA_BASE_URL") {
            config.triple_extractor.base_url = url;
        }
        if let Ok(model) = std::env::var("NOEMA_OLLAMA_MODEL") {
            config.triple_extractor.model = model;
        }
        if let Ok(url) = std::env::var("NOEMA_WIKIPEDIA_BASE_URL") {
            config.summary_fetcher.base_url = url;
        }

        config
    }

    /// Build configuration using the builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn graph_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.graph_path = path.into();
        self
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.tick_interval_ms = ms;
        self
    }

    pub fn activation(mut self, activation: ActivationConfig) -> Self {
        self.config.activation = activation;
        self
    }

    pub fn action(mut self, action: ActionConfig) -> Self {
        self.config.action = action;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

/// Tuning knobs for the activation dynamics engine.
///
/// The defaults match the diffuse/focused regime presets: decay and spread are
/// interpolated between these bounds by the current `mode` value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    pub decay_rate_diffuse: f64,
    pub decay_rate_focused: f64,
    pub spread_factor_diffuse: f64,
    pub spread_factor_focused: f64,
    /// Minimum flow forwarded by a single spread edge; smaller flows are discarded.
    pub spread_flow_epsilon: f64,
    /// Hard ceiling on any single node's activation after a spread step.
    pub activation_cap: f64,
    /// Threshold below which `clear_below` removes an activation entry.
    pub stale_clear_threshold: f64,
    /// Mode value at or below which drift is eligible to run.
    pub drift_mode_ceiling: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            decay_rate_diffuse: 0.10,
            decay_rate_focused: 0.20,
            spread_factor_diffuse: 0.80,
            spread_factor_focused: 0.40,
            spread_flow_epsilon: 0.01,
            activation_cap: 2.0,
            stale_clear_threshold: 0.1,
            drift_mode_ceiling: 0.4,
        }
    }
}

/// Tuning knobs for the action executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Minimum activation required for an action node to be eligible to fire.
    pub fire_threshold: f64,
    /// Activation an action is pinned to immediately after firing.
    pub post_fire_activation: f64,
    /// Directory a script-path-shaped `code` value is documented as relative
    /// to. The no-inline build never shells out to it; it is retained so log
    /// lines and the handler registry read the same way a script dispatch
    /// would have.
    pub handler_dir: PathBuf,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            fire_threshold: 0.1,
            post_fire_activation: 0.05,
            handler_dir: PathBuf::from("handlers"),
        }
    }
}

/// Configuration for the triple-extraction adapter (defaults target a local Ollama server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripleExtractorConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for TripleExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            timeout_secs: 200,
            temperature: 0.3,
        }
    }
}

/// Configuration for the knowledge-summary adapter (defaults target Wikipedia's REST API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryFetcherConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SummaryFetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://en.wikipedia.org/api/rest_v1/page/summary".to_string(),
            timeout_secs: 10,
            user_agent: "noema-cognitive-engine/0.1 (contact: oss@noema.dev)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_activation_config_matches_regime_bounds() {
        let cfg = ActivationConfig::default();
        assert_eq!(cfg.decay_rate_diffuse, 0.10);
        assert_eq!(cfg.decay_rate_focused, 0.20);
        assert_eq!(cfg.spread_factor_diffuse, 0.80);
        assert_eq!(cfg.spread_factor_focused, 0.40);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = EngineConfig::builder()
            .tick_interval_ms(250)
            .graph_path("/tmp/graph.json")
            .build();
        assert_eq!(cfg.tick_interval_ms, 250);
        assert_eq!(cfg.graph_path, PathBuf::from("/tmp/graph.json"));
    }
}
