use std::time::Duration;

/// Failures of a language-model call. Every variant ends the turn; nothing
/// is retried.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("provider overloaded")]
    ProviderOverloaded,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            529 => Self::ProviderOverloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

/// Errors surfaced by a search backend.
///
/// `PartitionNotFound` is kept apart from every other failure: it is the only
/// condition the session reports to the user by name instead of falling back.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SearchError {
    #[error("partition not found: {index}")]
    PartitionNotFound { index: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("search timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("search backend error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("failed to decode search response: {0}")]
    Decode(String),
}

impl SearchError {
    pub fn is_partition_not_found(&self) -> bool {
        matches!(self, Self::PartitionNotFound { .. })
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::PartitionNotFound { .. } => "partition_not_found",
            Self::InvalidQuery(_) => "invalid_query",
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network_error",
            Self::Server { .. } => "server_error",
            Self::Decode(_) => "decode_error",
        }
    }

    /// Classify a non-success HTTP response from the backend.
    ///
    /// A 404 only counts as a missing partition when the body says so; other
    /// 404s (a bad path, a proxy) are ordinary server errors.
    pub fn from_status(status: u16, index: &str, body: String) -> Self {
        match status {
            404 if body.contains("index_not_found_exception") => Self::PartitionNotFound {
                index: index.to_string(),
            },
            400 => Self::InvalidQuery(body),
            _ => Self::Server { status, body },
        }
    }
}
