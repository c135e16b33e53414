//! Model Routing
//!
//! Picks a target model for a request from administrator-defined rules.
//!
//! # Selection Flow
//!
//! ```text
//! 1. Order rules: priority desc, then created_at desc
//! 2. Skip disabled rules and rules whose conditions don't all hold
//! 3. Matching rule: target available?   -> target
//!                   fallback available? -> fallback
//!                   otherwise           -> keep scanning
//! 4. Nothing usable -> None (caller uses its configured default)
//! ```
//!
//! Conditions compare request-context fields with exact values or one of
//! `$lt`, `$lte`, `$gt`, `$gte`. Condition values of any other shape are
//! kept for round-tripping but never constrain a match.

mod matcher;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

pub use matcher::{condition_holds, rules_for_scope, select_model, sort_rules};

/// Condition key every new rule gets when none are given
pub const DEFAULT_FEATURE: &str = "chat";

// ============================================================================
// Rules
// ============================================================================

/// Who a rule applies to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleScope {
    /// Everyone
    #[default]
    Global,
    /// One tenant, named by `scope_id`
    Tenant,
    /// One role, named by `scope_id`
    Role,
}

impl RuleScope {
    /// Stored name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "GLOBAL",
            Self::Tenant => "TENANT",
            Self::Role => "ROLE",
        }
    }
}

/// Comparison operator in a condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
}

impl CompareOp {
    /// Stored key, `$`-prefixed
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "$lt" => Some(Self::Lt),
            "$lte" => Some(Self::Lte),
            "$gt" => Some(Self::Gt),
            "$gte" => Some(Self::Gte),
            _ => None,
        }
    }

    /// Apply to two numbers
    #[must_use]
    pub fn apply(self, actual: f64, bound: f64) -> bool {
        match self {
            Self::Lt => actual < bound,
            Self::Lte => actual <= bound,
            Self::Gt => actual > bound,
            Self::Gte => actual >= bound,
        }
    }
}

/// One rule condition
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Numeric comparisons, all of which must hold
    Compare(Vec<(CompareOp, Value)>),
    /// String, number or boolean equality
    Exact(Value),
    /// Any other shape; never constrains a match
    Ignored(Value),
}

impl Condition {
    /// Classify a stored condition value
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Self::Exact(value),
            Value::Object(map) if !map.is_empty() => {
                let ops: Option<Vec<(CompareOp, Value)>> = map
                    .iter()
                    .map(|(k, v)| CompareOp::from_key(k).map(|op| (op, v.clone())))
                    .collect();
                match ops {
                    Some(ops) => Self::Compare(ops),
                    None => Self::Ignored(Value::Object(map)),
                }
            }
            other => Self::Ignored(other),
        }
    }

    /// Stored representation
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Compare(ops) => Value::Object(
                ops.iter()
                    .map(|(op, v)| (op.key().to_string(), v.clone()))
                    .collect::<Map<String, Value>>(),
            ),
            Self::Exact(v) | Self::Ignored(v) => v.clone(),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

fn default_conditions() -> BTreeMap<String, Condition> {
    BTreeMap::from([(
        "feature".to_string(),
        Condition::Exact(Value::String(DEFAULT_FEATURE.to_string())),
    )])
}

fn enabled_by_default() -> bool {
    true
}

/// Administrator-defined routing rule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Unique identifier
    pub id: String,
    /// Audience
    #[serde(default)]
    pub scope: RuleScope,
    /// Tenant or role the scope refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    /// Higher wins
    #[serde(default)]
    pub priority: i64,
    /// All must hold for the rule to match
    #[serde(default = "default_conditions")]
    pub conditions: BTreeMap<String, Condition>,
    /// Preferred model
    pub target_model: String,
    /// Used when the target is unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
    /// Breaks priority ties, newer first
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    /// Disabled rules never match
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl RoutingRule {
    /// Create a rule; `conditions` defaults to `{feature: "chat"}`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the rule fails [`Self::validate`].
    pub fn new(
        id: impl Into<String>,
        scope: RuleScope,
        scope_id: Option<String>,
        priority: i64,
        conditions: Option<BTreeMap<String, Condition>>,
        target_model: impl Into<String>,
    ) -> EngineResult<Self> {
        let rule = Self {
            id: id.into(),
            scope,
            scope_id,
            priority,
            conditions: conditions.unwrap_or_else(default_conditions),
            target_model: target_model.into(),
            fallback_model: None,
            created_at: Utc::now(),
            enabled: true,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Builder-style fallback model
    #[must_use]
    pub fn with_fallback(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    /// Parse and validate one rule from JSON text
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for malformed JSON or an invalid rule.
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let rule: Self = serde_json::from_str(text)
            .map_err(|e| EngineError::config(format!("invalid routing rule: {e}")))?;
        rule.validate()?;
        Ok(rule)
    }

    /// Parse and validate a list of rules from JSON text
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for malformed JSON or an invalid rule.
    pub fn list_from_json(text: &str) -> EngineResult<Vec<Self>> {
        let rules: Vec<Self> = serde_json::from_str(text)
            .map_err(|e| EngineError::config(format!("invalid routing rules: {e}")))?;
        for rule in &rules {
            rule.validate()?;
        }
        Ok(rules)
    }

    /// Structural checks
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an empty id or target, or a ROLE
    /// rule without a role id.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::config("routing rule id is empty"));
        }
        if self.target_model.trim().is_empty() {
            return Err(EngineError::config(format!("routing rule '{}' has no target_model", self.id)));
        }
        let scoped = matches!(self.scope, RuleScope::Tenant | RuleScope::Role);
        if scoped && self.scope_id.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(EngineError::config(format!(
                "routing rule '{}' has {} scope but no scope_id",
                self.id,
                self.scope.as_str()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Request Context
// ============================================================================

/// Request attributes rule conditions are evaluated against
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Feature making the request (`chat`, `image`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Requested model family
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    /// User language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Requested output size; kept as sent so comparisons can coerce
    /// numeric strings and fractions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Value>,
    /// Anything else a rule may test
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RequestContext {
    /// Empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style feature
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Builder-style model type
    #[must_use]
    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    /// Builder-style language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Builder-style token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: impl Into<Value>) -> Self {
        self.max_tokens = Some(max_tokens.into());
        self
    }

    /// Builder-style extra attribute
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Attribute by name
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "feature" => self.feature.clone().map(Value::String),
            "model_type" => self.model_type.clone().map(Value::String),
            "language" => self.language.clone().map(Value::String),
            "max_tokens" => self.max_tokens.clone(),
            other => self.extra.get(other).cloned(),
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Outcome of a successful selection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSelection {
    /// Model to use
    pub model_id: String,
    /// Rule that produced it
    pub rule_id: String,
    /// Whether the rule's fallback was used
    pub used_fallback: bool,
}

/// Answers whether a model can currently serve requests
#[async_trait]
pub trait ModelAvailability: Send + Sync {
    /// Whether `model_id` is usable right now
    async fn is_available(&self, model_id: &str) -> bool;
}

/// Treats every model as available
#[derive(Clone, Copy, Debug, Default)]
pub struct AllAvailable;

#[async_trait]
impl ModelAvailability for AllAvailable {
    async fn is_available(&self, _model_id: &str) -> bool {
        true
    }
}

#[async_trait]
impl ModelAvailability for HashSet<String> {
    async fn is_available(&self, model_id: &str) -> bool {
        self.contains(model_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_condition_classification() {
        assert_eq!(Condition::from_value(json!("chat")), Condition::Exact(json!("chat")));
        assert_eq!(
            Condition::from_value(json!({"$lte": 1000})),
            Condition::Compare(vec![(CompareOp::Lte, json!(1000))])
        );
        assert!(matches!(Condition::from_value(json!({"$in": ["a"]})), Condition::Ignored(_)));
        assert!(matches!(Condition::from_value(json!(["a", "b"])), Condition::Ignored(_)));
        assert!(matches!(Condition::from_value(json!(null)), Condition::Ignored(_)));
    }

    #[test]
    fn test_rule_defaults_to_chat_feature() {
        let rule: RoutingRule = serde_json::from_value(json!({"id": "r1", "target_model": "m1"})).unwrap();
        assert_eq!(rule.conditions, default_conditions());
        assert_eq!(rule.scope, RuleScope::Global);
        assert!(rule.enabled);

        let built = RoutingRule::new("r2", RuleScope::Global, None, 1, None, "m2").unwrap();
        assert_eq!(built.conditions["feature"], Condition::Exact(json!("chat")));

        let explicit: RoutingRule =
            serde_json::from_value(json!({"id": "r3", "target_model": "m", "conditions": {}})).unwrap();
        assert!(explicit.conditions.is_empty());
    }

    #[test]
    fn test_role_scope_requires_id() {
        let err = RoutingRule::new("r", RuleScope::Role, None, 0, None, "m").unwrap_err();
        assert!(err.to_string().contains("ROLE"));
        assert!(RoutingRule::new("r", RuleScope::Role, Some("admin".into()), 0, None, "m").is_ok());

        let err = RoutingRule::list_from_json(r#"[{"id":"r","scope":"ROLE","target_model":"m"}]"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_context_lookup_and_flatten() {
        let ctx: RequestContext =
            serde_json::from_value(json!({"feature": "chat", "max_tokens": 500, "tier": "pro"})).unwrap();
        assert_eq!(ctx.get("feature"), Some(json!("chat")));
        assert_eq!(ctx.get("max_tokens"), Some(json!(500)));
        assert_eq!(ctx.get("tier"), Some(json!("pro")));
        assert_eq!(ctx.get("language"), None);
    }

    #[test]
    fn test_context_accepts_loose_max_tokens() {
        for raw in [json!("500"), json!(1.5), json!(-1)] {
            let ctx: RequestContext = serde_json::from_value(json!({"max_tokens": raw.clone()})).unwrap();
            assert_eq!(ctx.get("max_tokens"), Some(raw));
        }
    }

    #[test]
    fn test_tenant_scope_requires_id() {
        let err = RoutingRule::new("t", RuleScope::Tenant, None, 0, None, "m").unwrap_err();
        assert!(err.to_string().contains("TENANT"));
        assert!(RoutingRule::new("t", RuleScope::Tenant, Some("acme".into()), 0, None, "m").is_ok());
    }

    #[test]
    fn test_condition_round_trip_keeps_ignored_values() {
        let rule: RoutingRule = serde_json::from_value(json!({
            "id": "r", "target_model": "m",
            "conditions": {"tags": ["x"], "max_tokens": {"$gt": 10}}
        }))
        .unwrap();
        let stored = serde_json::to_value(&rule).unwrap();
        assert_eq!(stored["conditions"], json!({"max_tokens": {"$gt": 10}, "tags": ["x"]}));
    }
}
