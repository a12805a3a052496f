//! Policy rule contract and the built-in rules.
//!
//! A rule is one named check: a pure function of (principal, context)
//! producing a [`Decision`]. New checks are added by implementing
//! [`PolicyRule`]; the evaluator never changes. Built-in rules validate
//! their configuration at construction time, so a misconfigured gate fails
//! before it can serve a single request.

use std::collections::BTreeSet;

use serde_json::{json, Map};

use crate::config::ConfigError;
use crate::decision::{codes, Decision};
use crate::policy::context::{ActionContext, CURRENT_STATE, REQUESTED, TARGET_STATE};
use crate::principal::{normalize_identifier, Principal};

/// A single evaluable authorization check.
///
/// Implementations must be pure functions of their inputs, with no hidden
/// global state and no side effects, so that rule order is the only thing
/// that determines an evaluation outcome and every rule is independently
/// testable.
pub trait PolicyRule: Send + Sync {
    /// Stable name used in diagnostics and audit records.
    fn name(&self) -> &str;

    /// Evaluate the check for one principal and action context.
    fn evaluate(&self, principal: &Principal, ctx: &ActionContext) -> Decision;
}

/// Collect and normalize a role/permission collection for rule config.
fn normalized_set(identifiers: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    identifiers
        .into_iter()
        .filter_map(|id| normalize_identifier(&id))
        .collect()
}

/// Render a canonical identifier set for denial reasons.
fn joined(set: &BTreeSet<String>) -> String {
    set.iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Role gate ───────────────────────────────────────────────────

/// Denies with [`codes::ROLE_NOT_PERMITTED`] unless the principal's role
/// set intersects the required set (any-of semantics).
#[derive(Debug, Clone)]
pub struct RoleGate {
    required: BTreeSet<String>,
}

impl RoleGate {
    /// Create a role gate requiring any of the given roles.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyRoleSet`] when no usable role identifier
    /// remains after normalization: a gate nobody can pass is a
    /// configuration bug, not a policy.
    pub fn new(required: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let required = normalized_set(required);
        if required.is_empty() {
            return Err(ConfigError::EmptyRoleSet);
        }
        Ok(Self { required })
    }
}

impl PolicyRule for RoleGate {
    fn name(&self) -> &str {
        "role_gate"
    }

    fn evaluate(&self, principal: &Principal, _ctx: &ActionContext) -> Decision {
        if principal.has_any_role(&self.required) {
            Decision::allow()
        } else {
            Decision::deny(
                format!("action requires one of roles: {}", joined(&self.required)),
                codes::ROLE_NOT_PERMITTED,
            )
        }
    }
}

// ── Threshold rule ──────────────────────────────────────────────

/// Denies with [`codes::THRESHOLD_EXCEEDED`] when the context's numeric
/// `requested` amount exceeds the configured limit, unless the principal
/// holds one of the override roles.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    limit: f64,
    override_roles: BTreeSet<String>,
}

impl ThresholdRule {
    /// Create a threshold rule with the given limit and override roles.
    ///
    /// The override set may be empty (no role bypasses the check).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidThreshold`] when the limit is negative
    /// or not finite.
    pub fn new(
        limit: f64,
        override_roles: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        if !limit.is_finite() || limit < 0.0 {
            return Err(ConfigError::InvalidThreshold { limit });
        }
        Ok(Self {
            limit,
            override_roles: normalized_set(override_roles),
        })
    }
}

impl PolicyRule for ThresholdRule {
    fn name(&self) -> &str {
        "threshold"
    }

    fn evaluate(&self, principal: &Principal, ctx: &ActionContext) -> Decision {
        // Override roles bypass the amount check entirely.
        if principal.has_any_role(&self.override_roles) {
            return Decision::allow();
        }

        let Some(requested) = ctx.amount(REQUESTED) else {
            // Malformed context degrades to denial, never to a panic.
            return Decision::deny(
                format!("action requires a numeric {REQUESTED:?} amount in context"),
                codes::MISSING_AMOUNT,
            );
        };

        if requested > self.limit {
            let mut details = Map::new();
            details.insert("limit".to_owned(), json!(self.limit));
            details.insert("requested".to_owned(), json!(requested));
            return Decision::deny_with_details(
                format!(
                    "requested amount {requested} exceeds approval limit {}",
                    self.limit
                ),
                codes::THRESHOLD_EXCEEDED,
                details,
            );
        }

        Decision::allow()
    }
}

// ── Permission gate ─────────────────────────────────────────────

/// Denies with [`codes::PERMISSION_NOT_HELD`] unless the principal holds
/// every required permission (all-of semantics, unlike the role gate).
#[derive(Debug, Clone)]
pub struct PermissionGate {
    required: BTreeSet<String>,
}

impl PermissionGate {
    /// Create a permission gate requiring all of the given permissions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPermissionSet`] when no usable
    /// permission identifier remains after normalization.
    pub fn new(required: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let required = normalized_set(required);
        if required.is_empty() {
            return Err(ConfigError::EmptyPermissionSet);
        }
        Ok(Self { required })
    }
}

impl PolicyRule for PermissionGate {
    fn name(&self) -> &str {
        "permission_gate"
    }

    fn evaluate(&self, principal: &Principal, _ctx: &ActionContext) -> Decision {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|p| !principal.permissions().contains(*p))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Decision::allow()
        } else {
            let mut details = Map::new();
            details.insert("missing".to_owned(), json!(missing));
            Decision::deny_with_details(
                format!("action requires permissions: {}", missing.join(", ")),
                codes::PERMISSION_NOT_HELD,
                details,
            )
        }
    }
}

// ── Transition role gate ────────────────────────────────────────

/// Role-gates matching workflow transitions; non-matching transitions pass.
///
/// Intended for the rule list supplied to a workflow transition check:
/// it reads the `current_state`/`target_state` context attributes. `None`
/// for `from`/`to` matches any state, so a gate with both unset role-gates
/// every transition.
#[derive(Debug, Clone)]
pub struct TransitionRoleGate {
    from: Option<String>,
    to: Option<String>,
    required: BTreeSet<String>,
}

impl TransitionRoleGate {
    /// Create a transition gate for the given state pattern.
    ///
    /// State identifiers are matched case-sensitively, exactly as the
    /// workflow machine defines them; only the role set is normalized.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyRoleSet`] when no usable role identifier
    /// remains after normalization.
    pub fn new(
        from: Option<String>,
        to: Option<String>,
        required: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        let required = normalized_set(required);
        if required.is_empty() {
            return Err(ConfigError::EmptyRoleSet);
        }
        Ok(Self { from, to, required })
    }

    /// True when this gate applies to the transition in the context.
    fn matches(&self, ctx: &ActionContext) -> bool {
        let from_matches = match &self.from {
            Some(from) => ctx.text(CURRENT_STATE) == Some(from.as_str()),
            None => true,
        };
        let to_matches = match &self.to {
            Some(to) => ctx.text(TARGET_STATE) == Some(to.as_str()),
            None => true,
        };
        from_matches && to_matches
    }
}

impl PolicyRule for TransitionRoleGate {
    fn name(&self) -> &str {
        "transition_role_gate"
    }

    fn evaluate(&self, principal: &Principal, ctx: &ActionContext) -> Decision {
        if !self.matches(ctx) {
            return Decision::allow();
        }
        if principal.has_any_role(&self.required) {
            Decision::allow()
        } else {
            Decision::deny(
                format!(
                    "transition requires one of roles: {}",
                    joined(&self.required)
                ),
                codes::ROLE_NOT_PERMITTED,
            )
        }
    }
}
