//! Engine facade
//!
//! [`Engine`] ties the pieces together: it owns the HTTP seam and engine
//! configuration, and exposes the two operations callers need,
//! [`Engine::execute_profile`] and [`Engine::select_model`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::{AuthResolver, TokenCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::profile::{Profile, Purpose};
use crate::response::NormalizedContent;
use crate::routing::{self, ModelAvailability, RequestContext, RouteSelection, RoutingRule};
use crate::template::Vars;
use crate::transport::{CallOverrides, HttpClient, ReqwestHttpClient, TransportExecutor};
use crate::workflow::Orchestrator;

/// Per-invocation options
#[derive(Clone, Debug, Default)]
pub struct ExecuteOptions {
    /// Caller adjustments (base URL, body template, query, headers, timeout)
    pub overrides: CallOverrides,
    /// Aborts the invocation, including any poll sleep
    pub cancel: CancellationToken,
}

impl ExecuteOptions {
    /// Options with no overrides and a fresh cancellation token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: CallOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Builder-style cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Declarative provider adapter engine
///
/// Holds no per-invocation state; share one instance behind an `Arc` (or
/// clone it) across concurrent invocations.
#[derive(Clone)]
pub struct Engine {
    orchestrator: Orchestrator,
    token_cache: Arc<TokenCache>,
    config: Arc<EngineConfig>,
}

impl Engine {
    /// Build an engine with a reqwest-backed HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the HTTP client cannot be built.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let client = ReqwestHttpClient::from_settings(&config.http)
            .map_err(|e| EngineError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_http_client(Arc::new(client), config))
    }

    /// Build an engine over any [`HttpClient`]
    #[must_use]
    pub fn with_http_client(client: Arc<dyn HttpClient>, config: EngineConfig) -> Self {
        let executor = TransportExecutor::new(client)
            .with_default_timeout_ms(config.http.default_timeout_ms)
            .with_default_base_url(config.http.default_base_url.clone());
        Self {
            orchestrator: Orchestrator::new(executor),
            token_cache: Arc::new(TokenCache::from_config(&config)),
            config: Arc::new(config),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Access-token cache sized by `token_refresh_margin_secs`, shared with
    /// resolvers that mint short-lived tokens
    #[must_use]
    pub fn token_cache(&self) -> Arc<TokenCache> {
        Arc::clone(&self.token_cache)
    }

    /// Run a profile to completion and normalize its result
    ///
    /// `vars` supplies every `{{name}}` placeholder; the profile's `model`
    /// is available as `{{model}}` unless `vars` already sets it.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for disabled or invalid profiles, otherwise
    /// whatever the failing step reports. Never returns partial content.
    pub async fn execute_profile(
        &self,
        profile: &Profile,
        vars: &Vars,
        options: &ExecuteOptions,
    ) -> EngineResult<NormalizedContent> {
        if !profile.enabled {
            return Err(EngineError::config(format!("profile '{}' is disabled", profile.id)));
        }
        profile.validate()?;

        let mut vars = vars.clone();
        if let Some(model) = profile.model.as_deref() {
            vars.fill_from(&Vars::new().with("model", model));
        }

        let invocation = Uuid::new_v4();
        let span = info_span!(
            "invocation",
            %invocation,
            profile = %profile.id,
            provider = %profile.provider,
            purpose = %profile.purpose
        );

        async {
            let result = self
                .orchestrator
                .run(profile, &vars, &options.overrides, &options.cancel)
                .await;
            match &result {
                Ok(content) => info!(summary = %content.summary(), "Profile executed"),
                Err(EngineError::Cancelled) => info!("Profile execution cancelled"),
                Err(e) => warn!(error = %e, retryable = e.is_retryable(), "Profile execution failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Resolve credentials for the profile, then execute it
    ///
    /// Credential variables never replace variables the caller set.
    ///
    /// # Errors
    ///
    /// Auth errors from `resolver`, then see [`Self::execute_profile`].
    pub async fn execute_with_auth(
        &self,
        profile: &Profile,
        vars: &Vars,
        resolver: &dyn AuthResolver,
        options: &ExecuteOptions,
    ) -> EngineResult<NormalizedContent> {
        let auth = tokio::select! {
            biased;
            () = options.cancel.cancelled() => return Err(EngineError::Cancelled),
            auth = resolver.resolve(&profile.provider, profile.auth_ref.as_deref()) => auth?,
        };
        let mut merged = vars.clone();
        merged.fill_from(&auth.to_vars());
        self.execute_profile(profile, &merged, options).await
    }

    /// Pick a model from routing rules
    pub async fn select_model<A>(
        &self,
        rules: &[RoutingRule],
        ctx: &RequestContext,
        availability: &A,
    ) -> Option<RouteSelection>
    where
        A: ModelAvailability + ?Sized,
    {
        routing::select_model(rules, ctx, availability).await
    }

    /// Pick a model from routing rules, falling back to the configured
    /// default for `purpose` when no rule yields an available model
    pub async fn select_model_or_default<A>(
        &self,
        rules: &[RoutingRule],
        ctx: &RequestContext,
        availability: &A,
        purpose: Purpose,
    ) -> Option<String>
    where
        A: ModelAvailability + ?Sized,
    {
        match self.select_model(rules, ctx, availability).await {
            Some(selection) => Some(selection.model_id),
            None => self.config.default_model(purpose).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthResolution, StaticAuth};
    use crate::routing::AllAvailable;
    use crate::transport::{HttpClientError, HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Echoes the request back as JSON
    #[derive(Default)]
    struct Echo {
        last: Mutex<Option<HttpRequest>>,
    }

    #[async_trait]
    impl HttpClient for Echo {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
            let body: serde_json::Value = request
                .body
                .as_deref()
                .and_then(|b| serde_json::from_slice(b).ok())
                .unwrap_or_default();
            *self.last.lock().unwrap() = Some(request);
            Ok(HttpResponse {
                status: 200,
                content_type: Some("application/json".into()),
                body: serde_json::to_vec(&json!({"echo": body})).unwrap(),
            })
        }
    }

    fn chat_profile() -> Profile {
        Profile::from_value(json!({
            "id": "chat",
            "provider": "acme",
            "model": "acme-large",
            "purpose": "chat",
            "transport": {
                "path": "/v1/chat",
                "headers": {"Authorization": "Bearer {{api_key}}"},
                "body": {"model": "{{model}}", "prompt": "{{prompt}}"}
            },
            "response": {"mode": "text", "extract": {"text_path": "echo.prompt"}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_execute_with_auth_supplies_credentials() {
        let echo = Arc::new(Echo::default());
        let engine = Engine::with_http_client(echo.clone(), EngineConfig::default());
        let auth = StaticAuth(AuthResolution {
            endpoint_url: Some("https://acct.acme.test".into()),
            ..AuthResolution::api_key("sk-test-123")
        });

        let content = engine
            .execute_with_auth(
                &chat_profile(),
                &Vars::new().with("prompt", "hello"),
                &auth,
                &ExecuteOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(content.text(), Some("hello"));

        let sent = echo.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.url, "https://acct.acme.test/v1/chat");
        assert!(sent
            .headers
            .contains(&("Authorization".to_string(), "Bearer sk-test-123".to_string())));
        let body: serde_json::Value = serde_json::from_slice(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["model"], json!("acme-large"));
    }

    /// Mints tokens through the engine's cache
    struct Minting {
        cache: Arc<TokenCache>,
        minted: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl AuthResolver for Minting {
        async fn resolve(&self, provider: &str, _auth_ref: Option<&str>) -> EngineResult<AuthResolution> {
            let token = self
                .cache
                .get_or_refresh(provider, || async {
                    let n = self.minted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(crate::auth::CachedToken {
                        token: format!("tok-{n}"),
                        expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                    })
                })
                .await?;
            Ok(AuthResolution {
                access_token: Some(token),
                ..AuthResolution::default()
            })
        }
    }

    #[tokio::test]
    async fn test_resolver_reuses_engine_token_cache() {
        let echo = Arc::new(Echo::default());
        let engine = Engine::with_http_client(echo.clone(), EngineConfig::default());
        let resolver = Minting {
            cache: engine.token_cache(),
            minted: std::sync::atomic::AtomicUsize::new(0),
        };
        let mut profile = chat_profile();
        profile.transport.base_url = Some("https://api.acme.test".into());
        profile
            .transport
            .headers
            .insert("Authorization".into(), "Bearer {{access_token}}".into());

        for _ in 0..2 {
            engine
                .execute_with_auth(&profile, &Vars::new().with("prompt", "x"), &resolver, &ExecuteOptions::new())
                .await
                .unwrap();
        }

        assert_eq!(resolver.minted.load(std::sync::atomic::Ordering::SeqCst), 1);
        let sent = echo.last.lock().unwrap().clone().unwrap();
        assert!(sent
            .headers
            .contains(&("Authorization".to_string(), "Bearer tok-0".to_string())));
    }

    #[tokio::test]
    async fn test_disabled_profile_rejected() {
        let engine = Engine::with_http_client(Arc::new(Echo::default()), EngineConfig::default());
        let mut profile = chat_profile();
        profile.enabled = false;
        let err = engine
            .execute_profile(&profile, &Vars::new(), &ExecuteOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[tokio::test]
    async fn test_configured_default_base_url_used() {
        let echo = Arc::new(Echo::default());
        let mut config = EngineConfig::default();
        config.http.default_base_url = Some("https://gateway.test".into());
        let engine = Engine::with_http_client(echo.clone(), config);

        engine
            .execute_profile(&chat_profile(), &Vars::new().with("prompt", "x"), &ExecuteOptions::new())
            .await
            .unwrap();
        assert_eq!(echo.last.lock().unwrap().as_ref().unwrap().url, "https://gateway.test/v1/chat");
    }

    #[tokio::test]
    async fn test_default_model_when_no_rule_matches() {
        let mut config = EngineConfig::default();
        config.default_models.insert(Purpose::Chat, "house-model".into());
        let engine = Engine::with_http_client(Arc::new(Echo::default()), config);

        let rules = vec![RoutingRule::new("img", crate::routing::RuleScope::Global, None, 1, None, "m1")
            .unwrap()];
        let ctx = RequestContext::new().with_feature("image");
        assert_eq!(engine.select_model(&rules, &ctx, &AllAvailable).await, None);
        assert_eq!(
            engine
                .select_model_or_default(&rules, &ctx, &AllAvailable, Purpose::Chat)
                .await
                .as_deref(),
            Some("house-model")
        );
    }
}
