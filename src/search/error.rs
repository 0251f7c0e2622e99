//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Index provisioning failed
    #[error("Index initialization failed: {0}")]
    IndexInitFailed(String),

    /// Document or index not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend rejected or could not run a query
    #[error("Search execution failed: {0}")]
    SearchFailed(String),

    /// The request cannot be turned into a valid query
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A query shape the backend cannot evaluate
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Document indexing failed
    #[error("Document indexing failed: {0}")]
    IndexingFailed(String),

    /// Error reported by the cluster itself
    #[error("Backend returned {status}: {error_type}: {reason}")]
    Backend {
        status: u16,
        error_type: String,
        reason: String,
    },

    /// Connection refused, TLS and similar
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend did not answer in time
    #[error("Backend timed out: {0}")]
    Timeout(String),

    /// Response body did not have the expected shape
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout(err.to_string())
        } else {
            SearchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::MalformedResponse(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::NotFound(msg) => AppError::NotFound(msg),
            SearchError::InvalidRequest(msg) => AppError::Validation(msg),
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::Timeout(msg) => AppError::Timeout(msg),
            _ => AppError::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_not_found_maps_to_404() {
        let err: AppError = SearchError::NotFound("100-1".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_backend_error_maps_to_storage() {
        let err: AppError = SearchError::Backend {
            status: 503,
            error_type: "cluster_block_exception".to_string(),
            reason: "blocked".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("cluster_block_exception"));
    }
}
