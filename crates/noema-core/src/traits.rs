//! Contracts for the external collaborators the ingestion pipeline calls out to.
//!
//! Implementations live in `noema-adapters`; this crate only defines the
//! contract plus a no-op fallback of each, so a correctly functioning
//! (degraded) engine never requires a real network adapter.

use async_trait::async_trait;

use crate::error::NoemaResult;

/// A single `(head, relation, tail)` triple extracted from text.
pub type Triple = (String, String, String);

/// Converts a span of free text into semantic triples.
#[async_trait]
pub trait TripleExtractor: Send + Sync {
    /// Extract triples from `text`. Implementations must tolerate malformed
    /// or non-JSON model output and return an empty list rather than
    /// propagate a parse error, except for genuine transport failures.
    async fn extract(&self, text: &str) -> NoemaResult<Vec<Triple>>;
}

/// Fetches a short knowledge summary for a keyword, used to opportunistically
/// enrich newly created concept nodes.
#[async_trait]
pub trait SummaryFetcher: Send + Sync {
    /// Fetch a summary for `keyword`. Returns an empty string if unavailable;
    /// never on the ingestion critical path.
    async fn fetch(&self, keyword: &str) -> NoemaResult<String>;
}

/// A `TripleExtractor` that always returns no triples, so ingestion always
/// takes the fallback (token-concept) path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTripleExtractor;

#[async_trait]
impl TripleExtractor for NoopTripleExtractor {
    async fn extract(&self, _text: &str) -> NoemaResult<Vec<Triple>> {
        Ok(Vec::new())
    }
}

/// A `SummaryFetcher` that never enriches anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSummaryFetcher;

#[async_trait]
impl SummaryFetcher for NoopSummaryFetcher {
    async fn fetch(&self, _keyword: &str) -> NoemaResult<String> {
        Ok(String::new())
    }
}
