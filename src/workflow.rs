//! Workflow state machine with terminal-state locking.
//!
//! The machine owns a closed set of state identifiers and knows which of
//! them are terminal. Once an entity reaches a terminal state no transition
//! out of it is allowed, including a transition back to the same state.
//! Role-gated transitions are expressed as ordinary policy rules supplied
//! to [`StateMachine::transition_with_rules`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Map};
use tracing::debug;

use crate::config::ConfigError;
use crate::decision::{codes, Decision};
use crate::policy::context::{ActionContext, CURRENT_STATE, TARGET_STATE};
use crate::policy::evaluator::run_rules;
use crate::policy::rule::PolicyRule;
use crate::principal::Principal;

/// Reason attached to every terminal-state denial.
const TERMINAL_REASON: &str = "entity is in a terminal state";

/// A state identifier outside the machine's closed set.
///
/// Referencing an unknown state is a programmer error, not a policy
/// outcome, which is why transition checks return this as `Err` instead
/// of folding it into a denial.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown workflow state {state:?}; known states: {known}")]
pub struct InvalidStateError {
    state: String,
    known: String,
}

impl InvalidStateError {
    /// The state identifier that was not recognized.
    pub fn state(&self) -> &str {
        &self.state
    }
}

/// Closed set of workflow states with a terminal subset.
///
/// State identifiers are compared exactly as given: the machine never
/// trims or case-folds them, unlike role and permission identifiers.
/// The machine holds no entity state; callers persist the current state
/// and serialize concurrent updates themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    states: Vec<String>,
    terminal: BTreeSet<String>,
}

impl StateMachine {
    /// Create a machine from explicit state and terminal sets.
    ///
    /// Declaration order of `states` is preserved and reported by
    /// [`values`](Self::values).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyStateSet`] for an empty state list,
    /// [`ConfigError::DuplicateState`] when a state is declared twice, and
    /// [`ConfigError::UnknownTerminalState`] when a terminal entry names a
    /// state outside the set.
    pub fn new(
        states: impl IntoIterator<Item = String>,
        terminal: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        let states: Vec<String> = states.into_iter().collect();
        if states.is_empty() {
            return Err(ConfigError::EmptyStateSet);
        }

        let mut seen = BTreeSet::new();
        for state in &states {
            if !seen.insert(state.clone()) {
                return Err(ConfigError::DuplicateState {
                    state: state.clone(),
                });
            }
        }

        let terminal: BTreeSet<String> = terminal.into_iter().collect();
        for state in &terminal {
            if !seen.contains(state) {
                return Err(ConfigError::UnknownTerminalState {
                    state: state.clone(),
                });
            }
        }

        Ok(Self { states, terminal })
    }

    /// The built-in task status machine.
    ///
    /// States `BACKLOG`, `IN_PROGRESS`, `BLOCKED`, `DONE`, `CANCELED`,
    /// with `DONE` and `CANCELED` terminal.
    pub fn task_statuses() -> Self {
        Self {
            states: ["BACKLOG", "IN_PROGRESS", "BLOCKED", "DONE", "CANCELED"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            terminal: ["DONE", "CANCELED"].into_iter().map(str::to_owned).collect(),
        }
    }

    /// All state identifiers in declaration order.
    pub fn values(&self) -> &[String] {
        &self.states
    }

    /// True when the identifier names a state in this machine.
    pub fn is_valid(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }

    /// True when the identifier names a terminal state of this machine.
    ///
    /// Unknown identifiers are simply not terminal; only transition checks
    /// treat them as errors.
    pub fn is_terminal(&self, state: &str) -> bool {
        self.terminal.contains(state)
    }

    /// Whether the machine itself permits moving from `current` to `target`.
    ///
    /// This is the structural check only: terminal states admit no outgoing
    /// transition (not even to themselves), every other pair is permitted.
    /// Role gates are applied separately by
    /// [`transition_with_rules`](Self::transition_with_rules).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] when either identifier is outside the
    /// machine's state set.
    pub fn can_transition(&self, current: &str, target: &str) -> Result<bool, InvalidStateError> {
        self.require_valid(current)?;
        self.require_valid(target)?;
        Ok(!self.is_terminal(current))
    }

    /// Decide a transition with no additional policy rules.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] when either identifier is outside the
    /// machine's state set.
    pub fn transition(
        &self,
        principal: &Principal,
        current: &str,
        target: &str,
    ) -> Result<Decision, InvalidStateError> {
        self.transition_with_rules(principal, current, target, &[])
    }

    /// Decide a transition, applying policy rules to real state changes.
    ///
    /// The terminal guard runs first and cannot be overridden by any rule.
    /// A self-transition out of a non-terminal state is a no-op and is
    /// allowed without consulting the rules. Everything else runs through
    /// the rule chain in order, first denial winning.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] when either identifier is outside the
    /// machine's state set.
    pub fn transition_with_rules(
        &self,
        principal: &Principal,
        current: &str,
        target: &str,
        rules: &[Arc<dyn PolicyRule>],
    ) -> Result<Decision, InvalidStateError> {
        self.require_valid(current)?;
        self.require_valid(target)?;

        if self.is_terminal(current) {
            debug!(current, target, "transition denied: state is terminal");
            let mut details = Map::new();
            details.insert(CURRENT_STATE.to_owned(), json!(current));
            details.insert(TARGET_STATE.to_owned(), json!(target));
            return Ok(Decision::deny_with_details(
                TERMINAL_REASON,
                codes::TERMINAL_STATE_LOCKED,
                details,
            ));
        }

        if current == target {
            return Ok(Decision::allow());
        }

        let ctx = ActionContext::transition(current, target);
        Ok(run_rules(principal, &ctx, rules))
    }

    fn require_valid(&self, state: &str) -> Result<(), InvalidStateError> {
        if self.is_valid(state) {
            Ok(())
        } else {
            Err(InvalidStateError {
                state: state.to_owned(),
                known: self.states.join(", "),
            })
        }
    }
}
