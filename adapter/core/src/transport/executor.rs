//! Transport executor implementation

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::{HttpClient, HttpClientError, HttpRequest};
use super::url::{is_absolute, join_url, redact_url};
use super::{
    CallOverrides, HttpMethod, OutcomeBody, OutcomeMode, TransportKind, TransportOutcome,
    TransportSpec,
};
use crate::error::{EngineError, EngineResult};
use crate::template::{deep_merge, inject, inject_str, Vars};

/// Floor applied to every request deadline
pub const MIN_TIMEOUT_MS: u64 = 1_000;

/// Variable consulted for the base URL when a profile declares none
const ENDPOINT_VAR: &str = "endpoint_url";

/// A call with every template resolved, ready to send
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedCall {
    /// HTTP verb
    pub method: HttpMethod,
    /// Final URL including query string
    pub url: String,
    /// Final headers
    pub headers: Vec<(String, String)>,
    /// Final body (`None` for GET/HEAD or no body)
    pub body: Option<Value>,
    /// Deadline after flooring
    pub timeout: Duration,
}

/// Executes [`TransportSpec`]s over an [`HttpClient`]
#[derive(Clone)]
pub struct TransportExecutor {
    client: Arc<dyn HttpClient>,
    default_timeout_ms: u64,
    default_base_url: Option<String>,
}

impl TransportExecutor {
    /// Create an executor with a 60 s default deadline
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            default_timeout_ms: 60_000,
            default_base_url: None,
        }
    }

    /// Deadline used when neither the transport nor the caller sets one
    #[must_use]
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Base URL used when nothing else provides one
    #[must_use]
    pub fn with_default_base_url(mut self, base_url: Option<String>) -> Self {
        self.default_base_url = base_url.filter(|b| !b.trim().is_empty());
        self
    }

    /// Resolve every template in `spec` without touching the network
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when no base URL is available for a
    /// relative path or the assembled URL does not parse.
    pub fn prepare(
        &self,
        spec: &TransportSpec,
        vars: &Vars,
        overrides: &CallOverrides,
    ) -> EngineResult<PreparedCall> {
        match spec.kind {
            TransportKind::HttpJson => {}
        }

        let url = self.resolve_url(spec, vars, overrides)?;

        let body_template = match &overrides.body_template {
            Some(external) => deep_merge(&spec.body, external),
            None => spec.body.clone(),
        };
        let body = if spec.method.allows_body() && !body_template.is_null() {
            Some(inject(&body_template, vars))
        } else {
            None
        };

        let mut declared: BTreeMap<String, String> = spec.headers.clone();
        for (name, value) in &overrides.headers {
            declared.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            declared.insert(name.clone(), value.clone());
        }
        let mut headers: Vec<(String, String)> = declared
            .iter()
            .map(|(name, value)| (name.clone(), inject_str(value, vars).trim().to_string()))
            .filter(|(_, value)| !value.is_empty())
            .collect();
        if body.is_some()
            && !headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let timeout_ms = overrides
            .timeout_ms
            .or(spec.timeout_ms)
            .unwrap_or(self.default_timeout_ms)
            .max(MIN_TIMEOUT_MS);

        Ok(PreparedCall {
            method: spec.method,
            url,
            headers,
            body,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Prepare and execute one call
    ///
    /// # Errors
    ///
    /// Config errors from [`Self::prepare`], [`EngineError::UpstreamTimeout`]
    /// when the deadline passes, [`EngineError::Network`] for connection
    /// failures and [`EngineError::Cancelled`] when `cancel` fires. Non-2xx
    /// statuses are not errors here.
    pub async fn call(
        &self,
        step: &str,
        spec: &TransportSpec,
        vars: &Vars,
        overrides: &CallOverrides,
        mode: OutcomeMode,
        cancel: &CancellationToken,
    ) -> EngineResult<TransportOutcome> {
        let prepared = self.prepare(spec, vars, overrides)?;
        self.execute(step, prepared, mode, cancel).await
    }

    /// Send an already prepared call
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn execute(
        &self,
        step: &str,
        prepared: PreparedCall,
        mode: OutcomeMode,
        cancel: &CancellationToken,
    ) -> EngineResult<TransportOutcome> {
        let display_url = redact_url(&prepared.url);
        let body = match &prepared.body {
            Some(value) => Some(serde_json::to_vec(value).map_err(|e| {
                EngineError::config(format!("{step} body is not serializable: {e}"))
            })?),
            None => None,
        };
        let request = HttpRequest {
            method: prepared.method,
            url: prepared.url,
            headers: prepared.headers,
            body,
            timeout: prepared.timeout,
        };

        debug!(step, method = %request.method, url = %display_url, "Sending provider request");
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(EngineError::Cancelled),
            result = tokio::time::timeout(prepared.timeout, self.client.send(request)) => result,
        };

        let response = match result {
            Err(_) | Ok(Err(HttpClientError::Timeout)) => {
                return Err(EngineError::UpstreamTimeout {
                    step: step.to_string(),
                    detail: format!(
                        "no response from {display_url} within {} ms",
                        prepared.timeout.as_millis()
                    ),
                });
            }
            Ok(Err(HttpClientError::Connection(message))) => {
                return Err(EngineError::Network {
                    step: step.to_string(),
                    message,
                });
            }
            Ok(Ok(response)) => response,
        };

        let ok = (200..300).contains(&response.status);
        debug!(
            step,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = response.body.len(),
            "Provider responded"
        );

        let (body, undecoded) = if ok && mode == OutcomeMode::Binary {
            (OutcomeBody::Binary(response.body), None)
        } else {
            let (json, undecoded) = decode_json(step, &response.body);
            (OutcomeBody::Json(json), undecoded)
        };

        Ok(TransportOutcome {
            ok,
            status: response.status,
            url: display_url,
            content_type: response.content_type,
            body,
            undecoded,
        })
    }

    fn resolve_url(
        &self,
        spec: &TransportSpec,
        vars: &Vars,
        overrides: &CallOverrides,
    ) -> EngineResult<String> {
        let path = inject_str(&spec.path, vars);

        let joined = if is_absolute(&path) {
            path.trim().to_string()
        } else {
            let endpoint = vars
                .get(ENDPOINT_VAR)
                .and_then(Value::as_str)
                .map(str::to_string);
            let base = [
                overrides.base_url.clone(),
                spec.base_url.clone(),
                endpoint,
                self.default_base_url.clone(),
            ]
            .into_iter()
            .flatten()
            .map(|b| inject_str(&b, vars))
            .find(|b| !b.trim().is_empty())
            .ok_or_else(|| {
                EngineError::config(format!("no base_url available for relative path '{path}'"))
            })?;
            join_url(&base, &path)
        };

        let mut url = reqwest::Url::parse(&joined)
            .map_err(|e| EngineError::config(format!("invalid URL '{}': {e}", redact_url(&joined))))?;

        let mut query: Vec<(String, String)> = Vec::new();
        for (name, value) in &spec.query {
            set_query(&mut query, name, &inject(value, vars));
        }
        for (name, value) in &overrides.query {
            set_query(&mut query, name, &inject(value, vars));
        }
        if !query.is_empty() {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(existing, _)| {
                    !query
                        .iter()
                        .any(|(name, _)| name.as_str() == existing.as_ref())
                })
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept.iter().chain(query.iter()));
        }

        Ok(url.to_string())
    }
}

/// Insert or replace one query parameter; empty values remove it
fn set_query(query: &mut Vec<(String, String)>, name: &str, value: &Value) {
    query.retain(|(existing, _)| existing != name);
    let rendered = match value {
        Value::Null => return,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if !rendered.is_empty() {
        query.push((name.to_string(), rendered));
    }
}

fn decode_json(step: &str, body: &[u8]) -> (Value, Option<String>) {
    if body.iter().all(u8::is_ascii_whitespace) {
        return (Value::Object(serde_json::Map::new()), None);
    }
    match serde_json::from_slice(body) {
        Ok(json) => (json, None),
        Err(e) => {
            warn!(step, error = %e, "Provider response is not JSON");
            (
                Value::Object(serde_json::Map::new()),
                Some(String::from_utf8_lossy(body).into_owned()),
            )
        }
    }
}
