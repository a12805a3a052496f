//! Rule-based policy evaluation: the single-method rule contract, the
//! built-in rules (role gate, threshold, permission gate, transition gate),
//! and the ordered fail-fast evaluator with its per-action registry.

pub mod context;
pub mod evaluator;
pub mod rule;

pub use context::ActionContext;
pub use evaluator::{run_rules, PolicyEvaluator};
pub use rule::{PermissionGate, PolicyRule, RoleGate, ThresholdRule, TransitionRoleGate};
