//! Action context handed to policy rules.
//!
//! A context names the action being attempted plus a small attribute bag
//! (requested amounts, workflow states, whatever the calling controller
//! knows). Rules read attributes through typed accessors and treat missing
//! or wrongly-typed values as absent rather than panicking.

use serde_json::{Map, Value};

/// Attribute key: numeric amount checked by threshold rules.
pub const REQUESTED: &str = "requested";
/// Attribute key: current workflow state on a transition check.
pub const CURRENT_STATE: &str = "current_state";
/// Attribute key: target workflow state on a transition check.
pub const TARGET_STATE: &str = "target_state";

/// Action identifier used for workflow transition evaluations.
pub const TRANSITION_ACTION: &str = "workflow.transition";

/// Everything a rule may consult about the attempted action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    action: String,
    attrs: Map<String, Value>,
}

impl ActionContext {
    /// Create a context for the named action with no attributes.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            attrs: Map::new(),
        }
    }

    /// Create the context for a workflow transition check.
    pub fn transition(current: &str, target: &str) -> Self {
        Self::new(TRANSITION_ACTION)
            .attr(CURRENT_STATE, current)
            .attr(TARGET_STATE, target)
    }

    /// Attach an attribute (builder style).
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// The action being attempted.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Raw attribute lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Numeric attribute, accepting any JSON number representation.
    pub fn amount(&self, key: &str) -> Option<f64> {
        self.attrs.get(key).and_then(Value::as_f64)
    }

    /// String attribute.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}
