//! Core cognitive engine: typed knowledge graph, activation dynamics, the
//! ingestion pipeline, action dispatch, and the background cognitive loop.
//!
//! This crate has no network or filesystem adapters of its own beyond graph
//! persistence; `noema-adapters` supplies the real [`traits::TripleExtractor`]
//! and [`traits::SummaryFetcher`] implementations, and `noema-cli` wires
//! everything into a runnable process.

pub mod action;
pub mod activation;
pub mod cognitive;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ingestion;
pub mod traits;

pub use action::{ActionExecutor, ActionHandler, ActionPayload, NoopActionHandler};
pub use activation::ActivationManager;
pub use cognitive::{CognitiveLoop, EngineState, StatusRecord};
pub use config::{
    ActionConfig, ActivationConfig, EngineConfig, EngineConfigBuilder, SummaryFetcherConfig,
    TripleExtractorConfig,
};
pub use engine::Engine;
pub use error::{ErrorCode, NoemaError, NoemaResult};
pub use graph::{generate_node_id, normalize_name, Edge, Graph, MemoryType, Node, NodeType};
pub use ingestion::IngestionPipeline;
pub use traits::{NoopSummaryFetcher, NoopTripleExtractor, SummaryFetcher, Triple, TripleExtractor};
