//! Workflow transition scenarios and terminal locking.

use serde_json::json;

use turing::config::EngineConfig;
use turing::decision::codes;
use turing::policy::context::{CURRENT_STATE, TARGET_STATE};
use turing::principal::Principal;
use turing::workflow::StateMachine;

fn member() -> Principal {
    Principal::new("member-1", ["member".to_owned()], [])
}

fn admin() -> Principal {
    Principal::new("admin-1", ["admin".to_owned()], [])
}

// ---------- task lifecycle scenarios ----------

#[test]
fn normal_task_lifecycle_is_allowed() {
    let machine = StateMachine::task_statuses();
    let chain = [
        ("BACKLOG", "IN_PROGRESS"),
        ("IN_PROGRESS", "BLOCKED"),
        ("BLOCKED", "IN_PROGRESS"),
        ("IN_PROGRESS", "DONE"),
    ];

    for (current, target) in chain {
        let decision = machine
            .transition(&member(), current, target)
            .expect("known states should not error");
        assert!(decision.is_allowed(), "{current} -> {target} should allow");
    }
}

#[test]
fn done_task_rejects_every_followup() {
    let machine = StateMachine::task_statuses();

    for target in ["BACKLOG", "IN_PROGRESS", "BLOCKED", "DONE", "CANCELED"] {
        let decision = machine
            .transition(&admin(), "DONE", target)
            .expect("known states should not error");

        assert!(decision.is_denied(), "DONE -> {target} must deny");
        assert_eq!(decision.reason(), Some("entity is in a terminal state"));
        assert_eq!(decision.code(), Some(codes::TERMINAL_STATE_LOCKED));
    }
}

#[test]
fn canceled_task_rejects_reopening() {
    let machine = StateMachine::task_statuses();

    let decision = machine
        .transition(&admin(), "CANCELED", "BACKLOG")
        .expect("known states should not error");

    assert_eq!(decision.code(), Some(codes::TERMINAL_STATE_LOCKED));
    let details = decision.details().expect("details should name the states");
    assert_eq!(details.get(CURRENT_STATE), Some(&json!("CANCELED")));
    assert_eq!(details.get(TARGET_STATE), Some(&json!("BACKLOG")));
}

#[test]
fn terminal_self_transition_is_still_denied() {
    let machine = StateMachine::task_statuses();

    for terminal in ["DONE", "CANCELED"] {
        let decision = machine
            .transition(&admin(), terminal, terminal)
            .expect("known states should not error");
        assert_eq!(decision.code(), Some(codes::TERMINAL_STATE_LOCKED));
    }
}

#[test]
fn non_terminal_self_transition_is_a_noop_allow() {
    let machine = StateMachine::task_statuses();

    let decision = machine
        .transition(&member(), "BLOCKED", "BLOCKED")
        .expect("known states should not error");

    assert!(decision.is_allowed());
}

// ---------- unknown states ----------

#[test]
fn unknown_states_are_errors_not_denials() {
    let machine = StateMachine::task_statuses();

    let err = machine
        .transition(&admin(), "LIMBO", "DONE")
        .expect_err("unknown current state should error");
    assert_eq!(err.state(), "LIMBO");

    let err = machine
        .transition(&admin(), "BACKLOG", "done")
        .expect_err("state matching is case-sensitive");
    assert_eq!(err.state(), "done");
}

// ---------- role-gated transitions from config ----------

#[test]
fn configured_gates_restrict_matching_transitions() {
    let config = EngineConfig::from_toml(
        r#"
[workflow]
states = ["BACKLOG", "IN_PROGRESS", "BLOCKED", "DONE", "CANCELED"]
terminal = ["DONE", "CANCELED"]

[[workflow.gates]]
to = "CANCELED"
roles = ["admin"]

[[workflow.gates]]
from = "BLOCKED"
to = "DONE"
roles = ["admin", "lead"]
"#,
    )
    .expect("should parse");

    let machine = config.workflow.machine().expect("machine should build");
    let gates = config.workflow.gate_rules().expect("gates should build");

    // Canceling needs the admin role regardless of source state.
    let denied = machine
        .transition_with_rules(&member(), "IN_PROGRESS", "CANCELED", &gates)
        .expect("known states");
    assert_eq!(denied.code(), Some(codes::ROLE_NOT_PERMITTED));

    let allowed = machine
        .transition_with_rules(&admin(), "IN_PROGRESS", "CANCELED", &gates)
        .expect("known states");
    assert!(allowed.is_allowed());

    // Closing directly out of BLOCKED is gated separately.
    let lead = Principal::new("lead-1", ["lead".to_owned()], []);
    let denied = machine
        .transition_with_rules(&member(), "BLOCKED", "DONE", &gates)
        .expect("known states");
    assert_eq!(denied.code(), Some(codes::ROLE_NOT_PERMITTED));
    assert!(machine
        .transition_with_rules(&lead, "BLOCKED", "DONE", &gates)
        .expect("known states")
        .is_allowed());

    // Ungated transitions stay open to everyone.
    assert!(machine
        .transition_with_rules(&member(), "BACKLOG", "IN_PROGRESS", &gates)
        .expect("known states")
        .is_allowed());

    // The terminal lock cannot be role-gated away.
    let locked = machine
        .transition_with_rules(&admin(), "CANCELED", "BACKLOG", &gates)
        .expect("known states");
    assert_eq!(locked.code(), Some(codes::TERMINAL_STATE_LOCKED));
}

// ---------- structural queries ----------

#[test]
fn can_transition_reports_the_structural_rule() {
    let machine = StateMachine::task_statuses();

    assert!(machine
        .can_transition("BACKLOG", "DONE")
        .expect("known states"));
    assert!(!machine
        .can_transition("DONE", "BACKLOG")
        .expect("known states"));
    assert!(!machine
        .can_transition("CANCELED", "CANCELED")
        .expect("known states"));
    assert!(machine.can_transition("ARCHIVED", "DONE").is_err());
}

#[test]
fn custom_machine_round_trips_through_config() {
    let config = EngineConfig::from_toml(
        r#"
[workflow]
states = ["DRAFT", "PUBLISHED", "RETIRED"]
terminal = ["RETIRED"]
"#,
    )
    .expect("should parse");

    let machine = config.workflow.machine().expect("machine should build");

    assert_eq!(machine.values(), ["DRAFT", "PUBLISHED", "RETIRED"]);
    assert!(machine.is_terminal("RETIRED"));
    assert!(!machine.is_terminal("DRAFT"));
    assert!(machine
        .transition(&member(), "DRAFT", "PUBLISHED")
        .expect("known states")
        .is_allowed());
    assert_eq!(
        machine
            .transition(&admin(), "RETIRED", "DRAFT")
            .expect("known states")
            .code(),
        Some(codes::TERMINAL_STATE_LOCKED)
    );
}
