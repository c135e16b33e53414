//! Rule matching and model selection

use std::cmp::Ordering;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Condition, ModelAvailability, RequestContext, RouteSelection, RoutingRule, RuleScope};

fn evaluation_order(a: &RoutingRule, b: &RoutingRule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Order rules by priority (desc), then creation time (desc)
pub fn sort_rules(rules: &mut [RoutingRule]) {
    rules.sort_by(|a, b| evaluation_order(a, b));
}

/// Enabled rules visible to a tenant and set of roles, in evaluation order
///
/// TENANT and ROLE rules apply only when their `scope_id` names the tenant
/// or one of the roles; one without a `scope_id` applies to nobody.
#[must_use]
pub fn rules_for_scope<'a>(
    rules: &'a [RoutingRule],
    tenant_id: Option<&str>,
    roles: &[String],
) -> Vec<&'a RoutingRule> {
    let mut visible: Vec<&RoutingRule> = rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter(|rule| match rule.scope {
            RuleScope::Global => true,
            RuleScope::Tenant => rule.scope_id.is_some() && rule.scope_id.as_deref() == tenant_id,
            RuleScope::Role => rule
                .scope_id
                .as_deref()
                .is_some_and(|role| roles.iter().any(|r| r == role)),
        })
        .collect();
    visible.sort_by(|a, b| evaluation_order(a, b));
    visible
}

/// Whether one condition holds for a context value
#[must_use]
pub fn condition_holds(condition: &Condition, actual: Option<&Value>) -> bool {
    match condition {
        Condition::Ignored(_) => true,
        Condition::Exact(Value::String(expected)) => match actual {
            Some(Value::String(s)) => s == expected,
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string() == *expected,
            _ => false,
        },
        Condition::Exact(Value::Bool(expected)) => match actual {
            Some(Value::Bool(b)) => b == expected,
            Some(Value::String(s)) => s.trim().parse::<bool>().ok() == Some(*expected),
            _ => false,
        },
        Condition::Exact(expected) => match (as_number(Some(expected)), as_number(actual)) {
            (Some(e), Some(a)) => (e - a).abs() < f64::EPSILON,
            _ => false,
        },
        Condition::Compare(ops) => {
            let Some(actual) = as_number(actual) else {
                return false;
            };
            ops.iter().all(|(op, bound)| {
                as_number(Some(bound)).is_some_and(|bound| op.apply(actual, bound))
            })
        }
    }
}

fn rule_matches(rule: &RoutingRule, ctx: &RequestContext) -> bool {
    rule.enabled
        && rule
            .conditions
            .iter()
            .all(|(key, condition)| condition_holds(condition, ctx.get(key).as_ref()))
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        _ => None,
    }
}

/// Pick a model for `ctx`
///
/// Rules are evaluated by priority (desc) then creation time (desc). The
/// first matching rule whose target, or failing that whose fallback, is
/// available wins. A match with neither available does not stop the scan.
pub async fn select_model<A>(
    rules: &[RoutingRule],
    ctx: &RequestContext,
    availability: &A,
) -> Option<RouteSelection>
where
    A: ModelAvailability + ?Sized,
{
    let mut ordered: Vec<&RoutingRule> = rules.iter().collect();
    ordered.sort_by(|a, b| evaluation_order(a, b));

    for rule in ordered {
        if !rule_matches(rule, ctx) {
            continue;
        }

        if availability.is_available(&rule.target_model).await {
            debug!(rule = %rule.id, model = %rule.target_model, "Routing rule matched");
            return Some(RouteSelection {
                model_id: rule.target_model.clone(),
                rule_id: rule.id.clone(),
                used_fallback: false,
            });
        }

        if let Some(fallback) = rule.fallback_model.as_deref().filter(|f| !f.is_empty()) {
            if availability.is_available(fallback).await {
                warn!(rule = %rule.id, target = %rule.target_model, model = %fallback, "Target model unavailable, using fallback");
                return Some(RouteSelection {
                    model_id: fallback.to_string(),
                    rule_id: rule.id.clone(),
                    used_fallback: true,
                });
            }
        }

        debug!(rule = %rule.id, "Routing rule matched but no model is available");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{AllAvailable, CompareOp};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashSet;

    fn rule(id: &str, priority: i64, conditions: Value, target: &str, fallback: Option<&str>) -> RoutingRule {
        serde_json::from_value(json!({
            "id": id,
            "priority": priority,
            "conditions": conditions,
            "target_model": target,
            "fallback_model": fallback,
        }))
        .unwrap()
    }

    fn available(models: &[&str]) -> HashSet<String> {
        models.iter().map(|m| (*m).to_string()).collect()
    }

    fn chat() -> RequestContext {
        RequestContext::new().with_feature("chat")
    }

    #[tokio::test]
    async fn test_higher_priority_wins() {
        let rules = vec![
            rule("low", 5, json!({"feature": "chat"}), "m2", None),
            rule("high", 10, json!({"feature": "chat"}), "m1", None),
        ];
        let picked = select_model(&rules, &chat(), &AllAvailable).await.unwrap();
        assert_eq!(
            picked,
            RouteSelection {
                model_id: "m1".into(),
                rule_id: "high".into(),
                used_fallback: false
            }
        );
    }

    #[tokio::test]
    async fn test_newer_rule_breaks_priority_tie() {
        let mut old = rule("old", 1, json!({}), "m-old", None);
        old.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut new = rule("new", 1, json!({}), "m-new", None);
        new.created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let picked = select_model(&[old.clone(), new.clone()], &chat(), &AllAvailable).await.unwrap();
        assert_eq!(picked.rule_id, "new");

        let mut rules = vec![old, new];
        sort_rules(&mut rules);
        assert_eq!(rules[0].id, "new");
    }

    #[tokio::test]
    async fn test_fallback_when_target_unavailable() {
        let rules = vec![rule("r", 10, json!({"feature": "chat"}), "m1", Some("m-fb"))];
        let picked = select_model(&rules, &chat(), &available(&["m-fb"])).await.unwrap();
        assert_eq!(picked.model_id, "m-fb");
        assert!(picked.used_fallback);
    }

    #[tokio::test]
    async fn test_unavailable_match_continues_scan() {
        let rules = vec![
            rule("first", 10, json!({"feature": "chat"}), "m1", Some("m-fb")),
            rule("second", 5, json!({"feature": "chat"}), "m2", None),
        ];
        let picked = select_model(&rules, &chat(), &available(&["m2"])).await.unwrap();
        assert_eq!(picked.rule_id, "second");

        assert_eq!(select_model(&rules, &chat(), &available(&[])).await, None);
    }

    #[tokio::test]
    async fn test_numeric_comparison() {
        let rules = vec![rule("small", 1, json!({"max_tokens": {"$lte": 1000}}), "m1", None)];
        let small = RequestContext::new().with_max_tokens(500);
        let large = RequestContext::new().with_max_tokens(1500);
        assert!(select_model(&rules, &small, &AllAvailable).await.is_some());
        assert!(select_model(&rules, &large, &AllAvailable).await.is_none());
        assert!(select_model(&rules, &RequestContext::new(), &AllAvailable).await.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_condition_types_ignored() {
        let rules = vec![rule(
            "r",
            1,
            json!({"feature": "chat", "tags": ["a", "b"], "meta": {"$regex": ".*"}, "nothing": null}),
            "m1",
            None,
        )];
        assert!(select_model(&rules, &chat(), &AllAvailable).await.is_some());
    }

    #[tokio::test]
    async fn test_disabled_and_mismatched_rules_skipped() {
        let mut disabled = rule("off", 100, json!({}), "m-off", None);
        disabled.enabled = false;
        let rules = vec![
            disabled,
            rule("image", 50, json!({"feature": "image"}), "m-img", None),
            rule("chat", 1, json!({"feature": "chat"}), "m-chat", None),
        ];
        let picked = select_model(&rules, &chat(), &AllAvailable).await.unwrap();
        assert_eq!(picked.model_id, "m-chat");
    }

    #[test]
    fn test_condition_coercion() {
        let lt = Condition::Compare(vec![(CompareOp::Lt, json!("10"))]);
        assert!(condition_holds(&lt, Some(&json!("9.5"))));
        assert!(!condition_holds(&lt, Some(&json!("ten"))));
        assert!(!condition_holds(&lt, None));

        let range = Condition::Compare(vec![(CompareOp::Gte, json!(100)), (CompareOp::Lt, json!(200))]);
        assert!(condition_holds(&range, Some(&json!(150))));
        assert!(!condition_holds(&range, Some(&json!(200))));

        assert!(condition_holds(&Condition::Exact(json!(5)), Some(&json!("5"))));
        assert!(condition_holds(&Condition::Exact(json!(true)), Some(&json!(true))));
        assert!(!condition_holds(&Condition::Exact(json!(true)), Some(&json!("no"))));
        assert!(condition_holds(&Condition::Exact(json!("en")), Some(&json!("en"))));
        assert!(!condition_holds(&Condition::Exact(json!("en")), Some(&json!("fr"))));
    }

    #[test]
    fn test_rules_for_scope() {
        let global = rule("g", 1, json!({}), "m", None);
        let mut tenant = rule("t", 2, json!({}), "m", None);
        tenant.scope = RuleScope::Tenant;
        tenant.scope_id = Some("acme".into());
        let mut role = rule("r", 3, json!({}), "m", None);
        role.scope = RuleScope::Role;
        role.scope_id = Some("admin".into());
        let rules = vec![global, tenant, role];

        let ids = |v: Vec<&RoutingRule>| v.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(rules_for_scope(&rules, Some("acme"), &["admin".to_string()])), vec!["r", "t", "g"]);
        assert_eq!(ids(rules_for_scope(&rules, Some("other"), &[])), vec!["g"]);
        assert_eq!(ids(rules_for_scope(&rules, None, &["admin".to_string()])), vec!["r", "g"]);
    }

    #[test]
    fn test_rules_for_scope_skips_disabled_and_unscoped() {
        let mut disabled = rule("off", 9, json!({}), "m", None);
        disabled.enabled = false;
        let mut unscoped = rule("t", 5, json!({}), "m", None);
        unscoped.scope = RuleScope::Tenant;
        let global = rule("g", 1, json!({}), "m", None);
        let rules = vec![disabled, unscoped, global];

        let visible = rules_for_scope(&rules, Some("acme"), &[]);
        assert_eq!(visible.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["g"]);
    }

    #[tokio::test]
    async fn test_string_token_budget_is_compared_numerically() {
        let rules = vec![rule("small", 1, json!({"max_tokens": {"$lte": 1000}}), "m1", None)];
        let ctx: RequestContext = serde_json::from_value(json!({"max_tokens": "500"})).unwrap();
        let picked = select_model(&rules, &ctx, &AllAvailable).await.unwrap();
        assert_eq!(picked.model_id, "m1");

        let ctx = RequestContext::new().with_max_tokens("1500.5");
        assert_eq!(select_model(&rules, &ctx, &AllAvailable).await, None);
    }
}
