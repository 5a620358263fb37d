//! HTTP-backed adapters for `noema-core`'s `TripleExtractor` and
//! `SummaryFetcher` contracts, plus the Wikipedia-enrichment action handler
//! built on top of them.

pub mod ollama;
pub mod wiki_enrich;
pub mod wikipedia;

pub use ollama::OllamaTripleExtractor;
pub use wiki_enrich::{WikiEnrichHandler, HANDLER_CODE as WIKI_ENRICH_HANDLER_CODE};
pub use wikipedia::WikipediaSummaryFetcher;
