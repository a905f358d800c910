//! Error types for the request pipeline

use crate::matcher::MatchError;
use hyper::StatusCode;
use thiserror::Error;

/// Everything that can fail while handling a single proxied request.
///
/// Every variant is handled at request scope and converted into an HTTP
/// error response for that client; none is fatal to the process and
/// nothing is retried.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("unsupported protocol scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("malformed request target: {0}")]
    MalformedTarget(String),

    #[error("rule matching failed: {0}")]
    RuleMatch(#[from] MatchError),

    #[error("failed to construct upstream transport: {0}")]
    TransportConstruction(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ProxyError {
    /// The status code reported to the client for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UnsupportedScheme(_) => StatusCode::BAD_REQUEST,
            ProxyError::MalformedTarget(_)
            | ProxyError::RuleMatch(_)
            | ProxyError::TransportConstruction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
