//! Engine Errors
//!
//! Every failure the engine can surface to its caller. Variants map onto the
//! four failure families an operator needs to tell apart:
//!
//! - [`EngineError::Config`]: the profile itself is wrong (never retried)
//! - [`EngineError::UpstreamHttp`] / [`EngineError::JobFailed`]: the provider
//!   answered, but with an error
//! - [`EngineError::UpstreamTimeout`]: the provider did not answer in time
//! - [`EngineError::Extraction`]: the provider answered successfully, but the
//!   profile's paths no longer match the response shape

use thiserror::Error;

/// Maximum number of body bytes quoted in an error message
const MAX_BODY_IN_MESSAGE: usize = 2048;

/// Errors raised by profile execution and routing
#[derive(Debug, Error)]
pub enum EngineError {
    /// Administrator mistake in a profile or rule
    #[error("profile configuration error: {0}")]
    Config(String),

    /// Non-2xx response from an HTTP step
    #[error("{step} request to {url} failed with HTTP {status}: {body}")]
    UpstreamHttp {
        /// Workflow step that issued the request
        step: String,
        /// HTTP status code
        status: u16,
        /// Request URL (query string stripped)
        url: String,
        /// Decoded error body, truncated
        body: String,
    },

    /// Transport timeout or poll-loop exhaustion
    #[error("{step} timed out: {detail}")]
    UpstreamTimeout {
        /// Workflow step that timed out
        step: String,
        /// What ran out (request deadline or poll attempts)
        detail: String,
    },

    /// The provider reported a terminal failure state for an async job
    #[error("job {job_id} ended in state '{status}': {body}")]
    JobFailed {
        /// Provider job identifier
        job_id: String,
        /// Terminal status as reported
        status: String,
        /// Last poll response body, truncated
        body: String,
    },

    /// Required field absent from an otherwise successful response
    #[error("{step}: nothing found at path '{path}' ({detail})")]
    Extraction {
        /// Workflow step whose response was inspected
        step: String,
        /// Path expression that failed to resolve
        path: String,
        /// Short description or response excerpt
        detail: String,
    },

    /// The caller cancelled the invocation
    #[error("invocation cancelled")]
    Cancelled,

    /// Connection-level failure (DNS, TLS, reset)
    #[error("{step} request failed: {message}")]
    Network {
        /// Workflow step that issued the request
        step: String,
        /// Underlying client error
        message: String,
    },

    /// Credential resolution failed
    #[error("auth resolution failed: {0}")]
    Auth(String),
}

impl EngineError {
    /// Build a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Build an upstream HTTP error, truncating the body for display
    pub fn upstream_http(step: &str, status: u16, url: &str, body: &str) -> Self {
        Self::UpstreamHttp {
            step: step.to_string(),
            status,
            url: url.to_string(),
            body: truncate_body(body),
        }
    }

    /// Build an extraction error
    pub fn extraction(step: &str, path: &str, detail: impl Into<String>) -> Self {
        Self::Extraction {
            step: step.to_string(),
            path: path.to_string(),
            detail: truncate_body(&detail.into()),
        }
    }

    /// Whether a caller-level retry has a chance of succeeding
    ///
    /// Timeouts, connection failures, rate limits and 5xx responses are
    /// transient. Configuration and extraction errors, 4xx responses, and
    /// provider-reported job failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamTimeout { .. } | Self::Network { .. } => true,
            Self::UpstreamHttp { status, .. } => *status == 429 || *status >= 500,
            Self::Config(_)
            | Self::JobFailed { .. }
            | Self::Extraction { .. }
            | Self::Cancelled
            | Self::Auth(_) => false,
        }
    }

    /// HTTP status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UpstreamHttp { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;

/// Cut a response body down to something that fits in a log line
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_IN_MESSAGE {
        return body.to_string();
    }
    let mut end = MAX_BODY_IN_MESSAGE;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes total)", &body[..end], body.len())
}
