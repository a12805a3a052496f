//! Immutable allow/deny decision values.
//!
//! Every policy check and workflow transition resolves to a [`Decision`].
//! Denial is a value, not an error: callers branch on [`Decision::is_denied`]
//! and map the `reason`/`code`/`details` fields onto their own response
//! shape (e.g. a 403 body). A decision is never mutated after construction,
//! which keeps the evaluation trail auditable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical machine-readable denial codes.
///
/// Codes are stable strings: they end up in API responses and audit
/// records, so renaming one is a breaking change.
pub mod codes {
    /// The principal's role set does not intersect the required role set.
    pub const ROLE_NOT_PERMITTED: &str = "ROLE_NOT_PERMITTED";
    /// A requested amount exceeds the configured limit.
    pub const THRESHOLD_EXCEEDED: &str = "THRESHOLD_EXCEEDED";
    /// The entity is in a terminal workflow state; no transitions remain.
    pub const TERMINAL_STATE_LOCKED: &str = "TERMINAL_STATE_LOCKED";
    /// The principal lacks one or more required permissions.
    pub const PERMISSION_NOT_HELD: &str = "PERMISSION_NOT_HELD";
    /// A threshold-gated action was evaluated without a numeric amount.
    pub const MISSING_AMOUNT: &str = "MISSING_AMOUNT";
    /// No rules are registered for the requested action.
    pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
}

/// Outcome of a policy evaluation or workflow transition check.
///
/// Built through exactly two constructors: [`Decision::allow`] carries no
/// extra fields, [`Decision::deny`] (or [`Decision::deny_with_details`])
/// carries a human-readable reason, a machine-readable code, and optional
/// structured details. The fields are private; there is no way to "fix up"
/// a decision after the fact. Deserialization enforces the same shape: a
/// payload mixing `allowed: true` with denial fields, or a denial missing
/// its reason or code, is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDecision")]
pub struct Decision {
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Map<String, Value>>,
}

impl Decision {
    /// The action is permitted. Carries no reason, code, or details.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            code: None,
            details: None,
        }
    }

    /// The action is denied with a human-readable reason and a stable
    /// machine-readable code (see [`codes`]).
    pub fn deny(reason: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            code: Some(code.into()),
            details: None,
        }
    }

    /// Like [`Decision::deny`], with structured details for the caller
    /// (e.g. `{limit, requested}` on a threshold denial).
    pub fn deny_with_details(
        reason: impl Into<String>,
        code: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            code: Some(code.into()),
            details: Some(details),
        }
    }

    /// True when the action is permitted.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// True when the action is denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Human-readable denial reason. Always `None` on an allow.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Machine-readable denial code. Always `None` on an allow.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Structured denial details. Always `None` on an allow.
    pub fn details(&self) -> Option<&Map<String, Value>> {
        self.details.as_ref()
    }
}

/// Unvalidated wire shape accepted when deserializing a [`Decision`].
#[derive(Deserialize)]
struct RawDecision {
    allowed: bool,
    reason: Option<String>,
    code: Option<String>,
    details: Option<Map<String, Value>>,
}

impl TryFrom<RawDecision> for Decision {
    type Error = String;

    fn try_from(raw: RawDecision) -> Result<Self, Self::Error> {
        if raw.allowed {
            if raw.reason.is_some() || raw.code.is_some() || raw.details.is_some() {
                return Err("allowed decision must not carry reason, code, or details".to_owned());
            }
        } else if raw.reason.is_none() || raw.code.is_none() {
            return Err("denied decision requires both a reason and a code".to_owned());
        }
        Ok(Self {
            allowed: raw.allowed,
            reason: raw.reason,
            code: raw.code,
            details: raw.details,
        })
    }
}
