//! Evaluation ordering, short-circuit, and config wiring tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use turing::config::{ConfigError, EngineConfig};
use turing::decision::{codes, Decision};
use turing::policy::context::REQUESTED;
use turing::policy::{run_rules, ActionContext, PolicyEvaluator, PolicyRule};
use turing::principal::Principal;

/// Rule that records how often it was evaluated.
struct SpyRule {
    decision: Decision,
    calls: Arc<AtomicUsize>,
}

impl SpyRule {
    fn new(decision: Decision) -> (Arc<dyn PolicyRule>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let rule = Arc::new(Self {
            decision,
            calls: Arc::clone(&calls),
        });
        (rule, calls)
    }
}

impl PolicyRule for SpyRule {
    fn name(&self) -> &str {
        "spy"
    }

    fn evaluate(&self, _principal: &Principal, _ctx: &ActionContext) -> Decision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decision.clone()
    }
}

fn member() -> Principal {
    Principal::new("member-1", ["member".to_owned()], [])
}

// ---------- ordering and short-circuit ----------

#[test]
fn rules_after_a_denial_never_run() {
    let (passing, passing_calls) = SpyRule::new(Decision::allow());
    let (denying, denying_calls) = SpyRule::new(Decision::deny("stop", "STOP"));
    let (unreached, unreached_calls) = SpyRule::new(Decision::allow());

    let decision = run_rules(
        &member(),
        &ActionContext::new("x"),
        &[passing, denying, unreached],
    );

    assert_eq!(decision.code(), Some("STOP"));
    assert_eq!(passing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(denying_calls.load(Ordering::SeqCst), 1);
    assert_eq!(unreached_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn first_denial_wins_over_later_denials() {
    let (first, _) = SpyRule::new(Decision::deny("first objection", "FIRST"));
    let (second, _) = SpyRule::new(Decision::deny("second objection", "SECOND"));

    let decision = run_rules(&member(), &ActionContext::new("x"), &[first, second]);

    assert_eq!(decision.reason(), Some("first objection"));
    assert_eq!(decision.code(), Some("FIRST"));
}

#[test]
fn all_passing_rules_yield_a_plain_allow() {
    let (first, _) = SpyRule::new(Decision::allow());
    let (second, _) = SpyRule::new(Decision::allow());

    let decision = run_rules(&member(), &ActionContext::new("x"), &[first, second]);

    assert!(decision.is_allowed());
    assert_eq!(decision.reason(), None);
    assert_eq!(decision.code(), None);
    assert_eq!(decision.details(), None);
}

#[test]
fn same_inputs_always_produce_the_same_decision() {
    let config = EngineConfig::from_toml(
        r#"
[[actions]]
name = "cost.approve"
required_roles = ["manager"]

[actions.threshold]
limit = 1000.0
override_roles = ["finance_admin"]
"#,
    )
    .expect("should parse");
    let evaluator = PolicyEvaluator::from_config(&config).expect("should build");

    let manager = Principal::new("m-1", ["manager".to_owned()], []);
    let ctx = ActionContext::new("cost.approve").attr(REQUESTED, 1500.0);

    let first = evaluator.evaluate(&manager, &ctx);
    for _ in 0..100 {
        assert_eq!(evaluator.evaluate(&manager, &ctx), first);
    }
}

// ---------- action registry ----------

#[test]
fn unknown_action_is_denied_by_default() {
    let evaluator = PolicyEvaluator::new();

    let decision = evaluator.evaluate(&member(), &ActionContext::new("unregistered.action"));

    assert!(decision.is_denied());
    assert_eq!(decision.code(), Some(codes::UNKNOWN_ACTION));
}

#[test]
fn config_wires_role_then_threshold() {
    let config = EngineConfig::from_toml(
        r#"
[[actions]]
name = "cost.approve"
required_roles = ["manager", "finance_admin"]

[actions.threshold]
limit = 1000.0
override_roles = ["finance_admin"]
"#,
    )
    .expect("should parse");
    let evaluator = PolicyEvaluator::from_config(&config).expect("should build");

    let manager = Principal::new("m-1", ["manager".to_owned()], []);
    let fin = Principal::new("f-1", ["finance_admin".to_owned()], []);
    let big = ActionContext::new("cost.approve").attr(REQUESTED, 1500.0);
    let small = ActionContext::new("cost.approve").attr(REQUESTED, 900.0);

    // The member fails the role gate before the threshold is consulted.
    let denied = evaluator.evaluate(&member(), &big);
    assert_eq!(denied.code(), Some(codes::ROLE_NOT_PERMITTED));

    // The manager passes the role gate and fails the threshold.
    let denied = evaluator.evaluate(&manager, &big);
    assert_eq!(denied.code(), Some(codes::THRESHOLD_EXCEEDED));

    assert!(evaluator.evaluate(&manager, &small).is_allowed());
    assert!(evaluator.evaluate(&fin, &big).is_allowed());
}

#[test]
fn duplicate_action_blocks_fail_to_build() {
    // First block carries the role gate, the second only a threshold.
    let config = EngineConfig::from_toml(
        r#"
[[actions]]
name = "cost.approve"
required_roles = ["manager"]

[[actions]]
name = "cost.approve"

[actions.threshold]
limit = 1000.0
"#,
    )
    .expect("should parse");

    assert_eq!(
        PolicyEvaluator::from_config(&config).err(),
        Some(ConfigError::DuplicateAction {
            name: "cost.approve".to_owned()
        })
    );
}

#[test]
fn replacing_an_action_chain_takes_effect() {
    let (deny_rule, _) = SpyRule::new(Decision::deny("no", "NO"));
    let (allow_rule, _) = SpyRule::new(Decision::allow());

    let evaluator = PolicyEvaluator::new()
        .with_action("x", vec![deny_rule])
        .with_action("x", vec![allow_rule]);

    assert!(evaluator
        .evaluate(&member(), &ActionContext::new("x"))
        .is_allowed());
}
