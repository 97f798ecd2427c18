use crate::{
    auth::{
        AllowAll, Check, CheckContext, CheckRegistry, ClaimEquals, Decision, DenyAll, Principal,
        Redact, Redaction, RequireRole, RuleSet,
    },
    value::Value,
};
use std::sync::Arc;

fn cx<'a>(principal: &'a Principal) -> CheckContext<'a> {
    CheckContext {
        principal,
        model: "Article",
        field: Some("title"),
        instance: None,
    }
}

#[test]
fn empty_rule_set_allows() {
    let principal = Principal::new("u1");
    assert_eq!(RuleSet::new().evaluate(&cx(&principal)), Decision::Allow);
}

#[test]
fn first_deny_short_circuits() {
    struct Exploding;
    impl Check for Exploding {
        fn evaluate(&self, _cx: &CheckContext<'_>) -> Decision {
            panic!("check after a Deny must not run");
        }
    }

    let rules = RuleSet::new().with(DenyAll).with(Exploding);
    let principal = Principal::new("u1");
    assert_eq!(rules.evaluate(&cx(&principal)), Decision::Deny);
}

#[test]
fn filter_downgrades_even_when_later_checks_allow() {
    let rules = RuleSet::new().with(Redact(Redaction::Mask)).with(AllowAll);
    let principal = Principal::new("u1");
    assert_eq!(
        rules.evaluate(&cx(&principal)),
        Decision::Filter(Redaction::Mask)
    );
}

#[test]
fn require_role_consults_the_principal() {
    let rules = RuleSet::new().with(RequireRole("editor".into()));

    let outsider = Principal::new("u1");
    assert_eq!(rules.evaluate(&cx(&outsider)), Decision::Deny);

    let editor = Principal::new("u2").with_role("editor");
    assert_eq!(rules.evaluate(&cx(&editor)), Decision::Allow);
}

#[test]
fn claim_equality_matches_numerically() {
    let rules = RuleSet::new().with(ClaimEquals {
        claim: "tier".into(),
        value: Value::Uint(3),
    });

    let principal = Principal::new("u1").with_claim("tier", Value::Int(3));
    assert_eq!(rules.evaluate(&cx(&principal)), Decision::Allow);
}

#[test]
fn check_registry_rejects_duplicates_and_resolves_builtins() {
    let mut registry = CheckRegistry::new();
    assert!(registry.resolve("allow_all").is_ok());
    assert!(registry.resolve("deny_all").is_ok());
    assert!(registry.resolve("nope").is_err());
    assert!(registry.register("allow_all", Arc::new(AllowAll)).is_err());
}
