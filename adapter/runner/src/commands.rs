//! Subcommand implementations

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use adapter_core::{
    AllAvailable, AuthResolution, CallOverrides, CancellationToken, Engine, EngineConfig,
    ExecuteOptions, Profile, Purpose, RequestContext, RoutingRule, StaticAuth, Vars,
};

/// Arguments of the `run` subcommand
#[derive(Debug, Default)]
pub struct RunArgs {
    pub profile: PathBuf,
    pub vars: Vec<String>,
    pub vars_file: Option<PathBuf>,
    pub body_template: Option<PathBuf>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
    pub endpoint_url: Option<String>,
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn read_json(path: &Path) -> Result<Value> {
    let text = read_text(path).await?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

async fn load_profile(path: &Path) -> Result<Profile> {
    let text = read_text(path).await?;
    Profile::from_json(&text).with_context(|| format!("Invalid profile {}", path.display()))
}

/// Parse `key=value`; the value stays a string and is sniffed on injection
pub fn parse_var(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("empty variable name in '{raw}'");
    }
    Ok((key.to_string(), value.to_string()))
}

/// clap value parser for [`Purpose`]
pub fn parse_purpose(raw: &str) -> Result<Purpose, String> {
    Purpose::ALL
        .into_iter()
        .find(|p| p.as_str().eq_ignore_ascii_case(raw.trim()))
        .ok_or_else(|| format!("unknown purpose '{raw}'"))
}

/// Build the variable set: vars file first, then `--var` flags
pub async fn collect_vars(vars_file: Option<&Path>, flags: &[String]) -> Result<Vars> {
    let mut vars = match vars_file {
        Some(path) => {
            let value = read_json(path).await?;
            if !value.is_object() {
                bail!("{} must contain a JSON object", path.display());
            }
            serde_json::from_value::<Vars>(value)?
        }
        None => Vars::new(),
    };
    for raw in flags {
        let (key, value) = parse_var(raw)?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling invocation");
            token.cancel();
        }
    });
}

/// `run`: execute a profile
pub async fn run(config: EngineConfig, args: RunArgs) -> Result<String> {
    let profile = load_profile(&args.profile).await?;
    let vars = collect_vars(args.vars_file.as_deref(), &args.vars).await?;
    let body_template = match args.body_template.as_deref() {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };

    let overrides = CallOverrides {
        base_url: args.base_url,
        body_template,
        timeout_ms: args.timeout_secs.map(|s| s.saturating_mul(1_000)),
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    let options = ExecuteOptions::new().with_overrides(overrides).with_cancel(cancel);

    let auth = StaticAuth(AuthResolution {
        api_key: args.api_key.unwrap_or_default(),
        endpoint_url: args.endpoint_url,
        ..Default::default()
    });

    let engine = Engine::new(config).context("Failed to build engine")?;
    info!(profile = %profile.id, "Executing profile");
    let content = engine
        .execute_with_auth(&profile, &vars, &auth, &options)
        .await
        .with_context(|| format!("Profile '{}' failed", profile.id))?;

    Ok(serde_json::to_string_pretty(&content)?)
}

/// `route`: select a model
pub async fn route(
    config: EngineConfig,
    rules_path: &Path,
    context_path: &Path,
    available: Option<Vec<String>>,
    purpose: Purpose,
) -> Result<String> {
    let rules = RoutingRule::list_from_json(&read_text(rules_path).await?)
        .with_context(|| format!("Invalid routing rules {}", rules_path.display()))?;
    let ctx: RequestContext = serde_json::from_value(read_json(context_path).await?)
        .with_context(|| format!("Invalid request context {}", context_path.display()))?;

    let engine = Engine::new(config).context("Failed to build engine")?;
    let selection = match available {
        Some(models) => {
            let models: HashSet<String> = models.into_iter().map(|m| m.trim().to_string()).collect();
            engine.select_model(&rules, &ctx, &models).await
        }
        None => engine.select_model(&rules, &ctx, &AllAvailable).await,
    };

    let output = match selection {
        Some(selection) => serde_json::to_value(&selection)?,
        None => {
            let model = engine
                .config()
                .default_model(purpose)
                .ok_or_else(|| anyhow!("No rule matched and no default model is configured for {purpose}"))?;
            json!({"model_id": model, "rule_id": null, "used_fallback": false, "default": true})
        }
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// `validate`: load a profile and summarize it
pub async fn validate(path: &Path) -> Result<String> {
    let profile = load_profile(path).await?;
    let summary = json!({
        "id": profile.id,
        "provider": profile.provider,
        "model": profile.model,
        "purpose": profile.purpose,
        "enabled": profile.enabled,
        "workflow": profile.workflow,
        "valid": true,
    });
    Ok(serde_json::to_string_pretty(&summary)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_json(value: &Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(value.to_string().as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("size=1024x1024").unwrap(), ("size".into(), "1024x1024".into()));
        assert_eq!(parse_var("q=a=b").unwrap(), ("q".into(), "a=b".into()));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[tokio::test]
    async fn test_collect_vars_flags_win() {
        let file = temp_json(&json!({"prompt": "from file", "n": 2, "messages": [{"role": "user"}]}));
        let vars = collect_vars(Some(file.path()), &["prompt=from flag".to_string()])
            .await
            .unwrap();
        assert_eq!(vars.get("prompt"), Some(&json!("from flag")));
        assert_eq!(vars.get("n"), Some(&json!(2)));
        assert_eq!(vars.get("messages"), Some(&json!([{"role": "user"}])));
    }

    #[tokio::test]
    async fn test_vars_file_must_be_object() {
        let file = temp_json(&json!(["a"]));
        assert!(collect_vars(Some(file.path()), &[]).await.is_err());
    }

    #[test]
    fn test_parse_purpose() {
        assert_eq!(parse_purpose("Image").unwrap(), Purpose::Image);
        assert!(parse_purpose("hologram").is_err());
    }

    #[tokio::test]
    async fn test_validate_reports_bad_profile() {
        let good = temp_json(&json!({
            "id": "p", "provider": "acme", "purpose": "chat",
            "transport": {"path": "/chat"}
        }));
        let out = validate(good.path()).await.unwrap();
        assert!(out.contains("\"valid\": true"));

        let bad = temp_json(&json!({"id": "p", "provider": "acme", "purpose": "chat", "response": {"mode": "image_urls"}}));
        assert!(validate(bad.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_route_falls_back_to_configured_default() {
        let rules = temp_json(&json!([
            {"id": "big", "priority": 10, "conditions": {"max_tokens": {"$gt": 4000}}, "target_model": "long-ctx"}
        ]));
        let small = temp_json(&json!({"feature": "chat", "max_tokens": 100}));
        let large = temp_json(&json!({"feature": "chat", "max_tokens": 8000}));

        let mut config = EngineConfig::default();
        config.default_models.insert(Purpose::Chat, "house".into());

        let out = route(config.clone(), rules.path(), large.path(), None, Purpose::Chat).await.unwrap();
        assert!(out.contains("long-ctx"));

        let out = route(config.clone(), rules.path(), small.path(), None, Purpose::Chat).await.unwrap();
        assert!(out.contains("house"));

        let out = route(config, rules.path(), large.path(), Some(vec!["other".into()]), Purpose::Image).await;
        assert!(out.is_err());
    }
}
