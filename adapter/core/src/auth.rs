//! Credential resolution
//!
//! The engine never stores provider credentials. An [`AuthResolver`] turns a
//! profile's `auth_ref` into an [`AuthResolution`] right before the call, and
//! the resolution is flattened into template variables (`api_key`,
//! `access_token`, `endpoint_url`, plus any provider config vars).
//!
//! Short-lived OAuth tokens go through a [`TokenCache`], an explicit service.
//! Every engine owns one sized by the configured refresh margin and hands it
//! to resolvers through `Engine::token_cache`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::template::Vars;

/// Resolved credentials for one invocation
#[derive(Clone, Default, PartialEq)]
pub struct AuthResolution {
    /// Static API key (may be empty for token-only providers)
    pub api_key: String,
    /// OAuth access token, when the provider uses one
    pub access_token: Option<String>,
    /// Account-specific endpoint
    pub endpoint_url: Option<String>,
    /// Extra provider settings exposed as variables
    pub config_vars: BTreeMap<String, Value>,
}

impl AuthResolution {
    /// Resolution carrying only an API key
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: key.into(),
            ..Default::default()
        }
    }

    /// Template variables contributed by these credentials
    #[must_use]
    pub fn to_vars(&self) -> Vars {
        let mut vars: Vars = self
            .config_vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.insert("api_key", self.api_key.as_str());
        if let Some(token) = &self.access_token {
            vars.insert("access_token", token.as_str());
        }
        if let Some(endpoint) = &self.endpoint_url {
            vars.insert("endpoint_url", endpoint.as_str());
        }
        vars
    }
}

impl fmt::Debug for AuthResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResolution")
            .field("api_key", &redacted(&self.api_key))
            .field("access_token", &self.access_token.as_deref().map(redacted))
            .field("endpoint_url", &self.endpoint_url)
            .field("config_vars", &self.config_vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn redacted(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        "(redacted)".to_string()
    } else {
        let prefix: String = secret.chars().take(4).collect();
        format!("{prefix}…(redacted)")
    }
}

/// Turns a provider and credential reference into credentials
#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// Resolve credentials for `provider`
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::EngineError::Auth`] when credentials
    /// are missing or cannot be refreshed.
    async fn resolve(&self, provider: &str, auth_ref: Option<&str>) -> EngineResult<AuthResolution>;
}

/// Resolver that always hands out the same credentials
#[derive(Clone, Debug, Default)]
pub struct StaticAuth(pub AuthResolution);

#[async_trait]
impl AuthResolver for StaticAuth {
    async fn resolve(&self, _provider: &str, _auth_ref: Option<&str>) -> EngineResult<AuthResolution> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// Token Cache
// ============================================================================

/// Longest accepted refresh margin (one day)
const MAX_MARGIN_SECS: u64 = 86_400;

/// Token with its expiry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedToken {
    /// Bearer token
    pub token: String,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
}

/// Concurrent access-token cache keyed by credential
///
/// Tokens are handed out until `refresh_margin` before expiry. Concurrent
/// callers for the same key share one refresh.
pub struct TokenCache {
    entries: DashMap<String, CachedToken>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    refresh_margin: Duration,
}

impl TokenCache {
    /// Create a cache refreshing `refresh_margin_secs` before expiry
    #[must_use]
    pub fn new(refresh_margin_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            refresh_locks: DashMap::new(),
            refresh_margin: Duration::seconds(i64::try_from(refresh_margin_secs.min(MAX_MARGIN_SECS)).unwrap_or(0)),
        }
    }

    /// Create a cache using the configured refresh margin
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.token_refresh_margin_secs)
    }

    /// Fresh token for `key`, if cached
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        (entry.expires_at - self.refresh_margin > Utc::now()).then(|| entry.token.clone())
    }

    /// Store a token
    pub fn insert(&self, key: impl Into<String>, token: CachedToken) {
        self.entries.insert(key.into(), token);
    }

    /// Cached token, or the result of `refresh` (which is then cached)
    ///
    /// # Errors
    ///
    /// Propagates the refresh error; nothing is cached in that case.
    pub async fn get_or_refresh<F, Fut>(&self, key: &str, refresh: F) -> EngineResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<CachedToken>>,
    {
        if let Some(token) = self.get(key) {
            return Ok(token);
        }

        let lock = self
            .refresh_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // another caller may have refreshed while we waited
        if let Some(token) = self.get(key) {
            return Ok(token);
        }

        debug!(key, "Refreshing access token");
        let refreshed = refresh().await;
        if let Ok(fresh) = &refreshed {
            self.entries.insert(key.to_string(), fresh.clone());
        }
        // waiters still holding this lock re-check the cache once it is released
        self.refresh_locks
            .remove_if(key, |_, held| Arc::ptr_eq(held, &lock));
        Ok(refreshed?.token)
    }

    /// Drop one cached token
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every cached token
    pub fn clear(&self) {
        self.entries.clear();
        self.refresh_locks.clear();
    }

    /// Number of cached tokens, fresh or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(60)
    }
}
