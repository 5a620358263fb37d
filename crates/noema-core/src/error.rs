//! Error types for noema-core operations.

use thiserror::Error;

/// Result type alias for noema operations.
pub type NoemaResult<T> = Result<T, NoemaError>;

/// Main error type for graph, activation, ingestion and action-dispatch operations.
#[derive(Error, Debug)]
pub enum NoemaError {
    /// Attempted to insert a node whose id already exists.
    #[error("duplicate node id: {id}")]
    DuplicateId { id: String, code: ErrorCode },

    /// An edge referenced a node id that does not exist.
    #[error("missing edge endpoint: {id}")]
    MissingEndpoint { id: String, code: ErrorCode },

    /// A node was constructed with a type outside the whitelist.
    #[error("invalid node type: {type_name}")]
    InvalidNodeType { type_name: String, code: ErrorCode },

    /// An external adapter (triple extractor, summary fetcher) could not be reached.
    #[error("external adapter unavailable: {message}")]
    ExternalUnavailable {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external adapter responded, but the response could not be parsed.
    #[error("malformed adapter response: {message}")]
    MalformedAdapterResponse { message: String, code: ErrorCode },

    /// An action node's payload failed during dispatch.
    #[error("action payload failed: {message}")]
    ActionPayloadFailure { message: String, code: ErrorCode },

    /// The graph snapshot could not be read or written.
    #[error("persistence failure: {message}")]
    PersistenceFailure {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error, usually from the graph dump file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    GraphDuplicateId,
    GraphMissingEndpoint,
    GraphInvalidNodeType,
    AdapterUnavailable,
    AdapterMalformedResponse,
    ActionFailure,
    PersistenceFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::GraphDuplicateId => "GRAPH_001",
            ErrorCode::GraphMissingEndpoint => "GRAPH_002",
            ErrorCode::GraphInvalidNodeType => "GRAPH_003",
            ErrorCode::AdapterUnavailable => "ADAPTER_001",
            ErrorCode::AdapterMalformedResponse => "ADAPTER_002",
            ErrorCode::ActionFailure => "ACTION_001",
            ErrorCode::PersistenceFailure => "PERSIST_001",
        }
    }
}

impl NoemaError {
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId {
            id: id.into(),
            code: ErrorCode::GraphDuplicateId,
        }
    }

    pub fn missing_endpoint(id: impl Into<String>) -> Self {
        Self::MissingEndpoint {
            id: id.into(),
            code: ErrorCode::GraphMissingEndpoint,
        }
    }

    pub fn invalid_node_type(type_name: impl Into<String>) -> Self {
        Self::InvalidNodeType {
            type_name: type_name.into(),
            code: ErrorCode::GraphInvalidNodeType,
        }
    }

    pub fn external_unavailable(message: impl Into<String>) -> Self {
        Self::ExternalUnavailable {
            message: message.into(),
            code: ErrorCode::AdapterUnavailable,
            source: None,
        }
    }

    pub fn malformed_adapter_response(message: impl Into<String>) -> Self {
        Self::MalformedAdapterResponse {
            message: message.into(),
            code: ErrorCode::AdapterMalformedResponse,
        }
    }

    pub fn action_payload_failure(message: impl Into<String>) -> Self {
        Self::ActionPayloadFailure {
            message: message.into(),
            code: ErrorCode::ActionFailure,
        }
    }

    pub fn persistence_failure(message: impl Into<String>) -> Self {
        Self::PersistenceFailure {
            message: message.into(),
            code: ErrorCode::PersistenceFailure,
            source: None,
        }
    }

    /// Get the stable error code, where one applies.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::DuplicateId { code, .. } => Some(*code),
            Self::MissingEndpoint { code, .. } => Some(*code),
            Self::InvalidNodeType { code, .. } => Some(*code),
            Self::ExternalUnavailable { code, .. } => Some(*code),
            Self::MalformedAdapterResponse { code, .. } => Some(*code),
            Self::ActionPayloadFailure { code, .. } => Some(*code),
            Self::PersistenceFailure { code, .. } => Some(*code),
            Self::Configuration(_) | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_carries_code() {
        let err = NoemaError::duplicate_id("Concept_Cat_abcdef12");
        assert_eq!(err.code(), Some(ErrorCode::GraphDuplicateId));
        assert!(err.to_string().contains("Concept_Cat_abcdef12"));
    }

    #[test]
    fn error_code_as_str() {
        assert_eq!(ErrorCode::GraphDuplicateId.as_str(), "GRAPH_001");
        assert_eq!(ErrorCode::ActionFailure.as_str(), "ACTION_001");
    }
}
