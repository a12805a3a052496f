//! Turing: a deterministic policy decision core.
//!
//! Normalizes loose principal data, evaluates ordered rule chains with
//! first-denial short-circuit, and guards workflow transitions behind
//! terminal-state locks. Every outcome is an explainable [`Decision`]
//! value; no authorization result is ever expressed as a panic.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod decision;
pub mod policy;
pub mod principal;
pub mod workflow;

pub use audit::{AuditLog, DecisionRecord};
pub use decision::Decision;
pub use policy::{
    ActionContext, PermissionGate, PolicyEvaluator, PolicyRule, RoleGate, ThresholdRule,
    TransitionRoleGate,
};
pub use principal::{Principal, PrincipalResolver};
pub use workflow::{InvalidStateError, StateMachine};
