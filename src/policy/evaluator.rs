//! Ordered, fail-fast policy evaluation.
//!
//! [`run_rules`] walks a rule slice in registration order and returns the
//! first denial verbatim; only a run with no denial produces an allow.
//! [`PolicyEvaluator`] keys rule lists by action name and denies unknown
//! actions outright, so an unregistered action can never slip through.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{ConfigError, EngineConfig};
use crate::decision::{codes, Decision};
use crate::policy::context::ActionContext;
use crate::policy::rule::PolicyRule;
use crate::principal::Principal;

/// Evaluate rules in order, returning the first denial unchanged.
///
/// Rules after the first denial are never invoked. An empty slice allows:
/// absence of objections is an allow, which is why evaluators must register
/// at least one rule for any action worth protecting.
pub fn run_rules(
    principal: &Principal,
    ctx: &ActionContext,
    rules: &[Arc<dyn PolicyRule>],
) -> Decision {
    for rule in rules {
        let decision = rule.evaluate(principal, ctx);
        if decision.is_denied() {
            debug!(
                rule = rule.name(),
                action = ctx.action(),
                principal = principal.id(),
                code = decision.code().unwrap_or(""),
                "policy denied"
            );
            return decision;
        }
        trace!(rule = rule.name(), action = ctx.action(), "rule passed");
    }
    Decision::allow()
}

/// Registry of per-action rule chains with deny-by-default semantics.
pub struct PolicyEvaluator {
    actions: HashMap<String, Vec<Arc<dyn PolicyRule>>>,
}

impl PolicyEvaluator {
    /// Create an evaluator with no registered actions.
    ///
    /// Until actions are registered, every evaluation denies with
    /// [`codes::UNKNOWN_ACTION`].
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register a rule chain for an action, replacing any previous chain.
    ///
    /// Rule order is preserved: it is the evaluation order.
    pub fn with_action(
        mut self,
        action: impl Into<String>,
        rules: Vec<Arc<dyn PolicyRule>>,
    ) -> Self {
        self.actions.insert(action.into(), rules);
        self
    }

    /// Build an evaluator from declarative configuration.
    ///
    /// Unlike the [`with_action`](Self::with_action) builder, configuration
    /// may not declare the same action twice.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateAction`] when two entries share a
    /// name, or the first [`ConfigError`] produced while materializing the
    /// configured gates into rules.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut evaluator = Self::new();
        for action in &config.actions {
            if evaluator.actions.contains_key(&action.name) {
                return Err(ConfigError::DuplicateAction {
                    name: action.name.clone(),
                });
            }
            evaluator = evaluator.with_action(action.name.clone(), action.rules()?);
        }
        Ok(evaluator)
    }

    /// True when a rule chain is registered for the action.
    pub fn knows_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Evaluate the context's action against its registered rule chain.
    ///
    /// Unknown actions deny with [`codes::UNKNOWN_ACTION`]; registered
    /// actions run their chain through [`run_rules`].
    pub fn evaluate(&self, principal: &Principal, ctx: &ActionContext) -> Decision {
        let Some(rules) = self.actions.get(ctx.action()) else {
            debug!(
                action = ctx.action(),
                principal = principal.id(),
                "no rules registered for action"
            );
            return Decision::deny(
                format!("no policy registered for action {:?}", ctx.action()),
                codes::UNKNOWN_ACTION,
            );
        };
        run_rules(principal, ctx, rules)
    }
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<(&str, usize)> = self
            .actions
            .iter()
            .map(|(name, rules)| (name.as_str(), rules.len()))
            .collect();
        actions.sort_unstable();
        f.debug_struct("PolicyEvaluator")
            .field("actions", &actions)
            .finish()
    }
}
