//! Transport Executor
//!
//! Turns a declarative [`TransportSpec`] plus runtime variables into one HTTP
//! call and a normalized [`TransportOutcome`].
//!
//! # Call Assembly
//!
//! ```text
//! spec.body ──deep_merge── overrides.body_template ──inject──> body
//! spec.headers + overrides.headers ──────────────────inject──> headers
//! base_url / path ───────────────────inject──join_url─────────> url
//! spec.query ──inject── then overrides.query ────────────────> query string
//! ```
//!
//! Non-2xx responses come back as `ok: false` outcomes rather than errors so
//! the workflow layer can report exactly which step failed.

mod client;
mod executor;
mod url;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::EngineError;

pub use client::{HttpClient, HttpClientError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use executor::{PreparedCall, TransportExecutor, MIN_TIMEOUT_MS};
pub use url::{is_absolute, join_url, redact_url};

// ============================================================================
// Transport Specification
// ============================================================================

/// Transport families a profile may declare
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// JSON over HTTP
    #[default]
    HttpJson,
}

/// HTTP verb, parsed case-insensitively
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    #[default]
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
}

impl HttpMethod {
    /// Canonical upper-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }

    /// GET and HEAD never carry a body
    #[must_use]
    pub fn allows_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            other => Err(EngineError::config(format!("unsupported HTTP method '{other}'"))),
        }
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Declarative description of one HTTP call
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSpec {
    /// Transport family
    pub kind: TransportKind,
    /// HTTP verb
    pub method: HttpMethod,
    /// Path (or absolute URL), may contain placeholders
    pub path: String,
    /// Base URL override for this profile
    pub base_url: Option<String>,
    /// Templated headers
    pub headers: BTreeMap<String, String>,
    /// Templated query parameters
    pub query: BTreeMap<String, Value>,
    /// JSON body template (`null` = no body)
    pub body: Value,
    /// Request deadline in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Caller-supplied adjustments applied on top of a [`TransportSpec`]
#[derive(Clone, Debug, Default)]
pub struct CallOverrides {
    /// Replaces every other base URL source
    pub base_url: Option<String>,
    /// Deep-merged over the declared body; wins on conflicts
    pub body_template: Option<Value>,
    /// Applied after the declared query
    pub query: BTreeMap<String, Value>,
    /// Merged over the declared headers
    pub headers: BTreeMap<String, String>,
    /// Replaces the declared timeout
    pub timeout_ms: Option<u64>,
}

// ============================================================================
// Outcome
// ============================================================================

/// How to treat the response body
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutcomeMode {
    /// Decode as JSON
    #[default]
    Json,
    /// Keep raw bytes
    Binary,
}

/// Response body after decoding
#[derive(Clone, Debug, PartialEq)]
pub enum OutcomeBody {
    /// Decoded JSON (empty object if the body was not JSON)
    Json(Value),
    /// Raw bytes (binary mode, 2xx only)
    Binary(Vec<u8>),
}

/// Normalized result of one HTTP call
#[derive(Clone, Debug)]
pub struct TransportOutcome {
    /// Whether the status was 2xx
    pub ok: bool,
    /// HTTP status code
    pub status: u16,
    /// Request URL with the query string removed
    pub url: String,
    /// Response `Content-Type`
    pub content_type: Option<String>,
    /// Decoded body
    pub body: OutcomeBody,
    /// Original text when JSON decoding failed
    pub undecoded: Option<String>,
}

impl TransportOutcome {
    /// Decoded JSON, if this is a JSON outcome
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            OutcomeBody::Json(v) => Some(v),
            OutcomeBody::Binary(_) => None,
        }
    }

    /// Raw bytes, if this is a binary outcome
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            OutcomeBody::Binary(b) => Some(b),
            OutcomeBody::Json(_) => None,
        }
    }

    /// Best-effort text rendering for error messages
    #[must_use]
    pub fn body_text(&self) -> String {
        if let Some(raw) = &self.undecoded {
            return raw.clone();
        }
        match &self.body {
            OutcomeBody::Json(v) => v.to_string(),
            OutcomeBody::Binary(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Convert a non-ok outcome into the matching error
    #[must_use]
    pub fn into_http_error(self, step: &str) -> EngineError {
        EngineError::upstream_http(step, self.status, &self.url, &self.body_text())
    }

    /// Pass ok outcomes through, turn the rest into errors
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UpstreamHttp`] for non-2xx outcomes.
    pub fn require_ok(self, step: &str) -> Result<Self, EngineError> {
        if self.ok {
            Ok(self)
        } else {
            Err(self.into_http_error(step))
        }
    }
}
