//! Configuration loading and management.
//!
//! Loads engine configuration from `./turing.toml` (or `$TURING_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::policy::rule::{PermissionGate, PolicyRule, RoleGate, ThresholdRule, TransitionRoleGate};
use crate::principal::PrincipalResolver;
use crate::workflow::StateMachine;

/// Invalid engine configuration detected while materializing rules,
/// resolvers, and state machines.
///
/// These surface at construction time, before any decision is made: a
/// misconfigured engine refuses to start rather than silently allowing
/// or denying everything.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A workflow was declared with no states at all.
    #[error("workflow requires at least one state")]
    EmptyStateSet,
    /// The same state identifier was declared twice.
    #[error("duplicate workflow state {state:?}")]
    DuplicateState {
        /// The repeated state identifier.
        state: String,
    },
    /// A terminal entry names a state outside the declared set.
    #[error("terminal state {state:?} is not in the state set")]
    UnknownTerminalState {
        /// The unrecognized state identifier.
        state: String,
    },
    /// A transition gate references a state outside the declared set.
    #[error("transition gate references unknown state {state:?}")]
    UnknownGateState {
        /// The unrecognized state identifier.
        state: String,
    },
    /// A role-based rule was configured with no usable roles.
    #[error("rule requires at least one role")]
    EmptyRoleSet,
    /// A permission gate was configured with no usable permissions.
    #[error("rule requires at least one permission")]
    EmptyPermissionSet,
    /// A threshold limit outside the representable range.
    #[error("threshold limit must be a non-negative finite number, got {limit}")]
    InvalidThreshold {
        /// The rejected limit value.
        limit: f64,
    },
    /// An action entry with a blank name.
    #[error("action requires a non-empty name")]
    EmptyAction,
    /// Two action entries share the same name.
    #[error("duplicate action {name:?}")]
    DuplicateAction {
        /// The repeated action name.
        name: String,
    },
}

// ── Top-level config ────────────────────────────────────────────

/// Top-level engine configuration loaded from TOML.
///
/// Path: `./turing.toml` or `$TURING_CONFIG_PATH`.
/// Env vars override file values; file values override defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Access control settings (`[access]`).
    pub access: AccessConfig,
    /// Declarative per-action rule chains (`[[actions]]`); names must
    /// be unique.
    pub actions: Vec<ActionConfig>,
    /// Workflow state machine shape (`[workflow]`).
    pub workflow: WorkflowConfig,
}

impl EngineConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$TURING_CONFIG_PATH` or `./turing.toml`.
    /// If the file does not exist, returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: EngineConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(EngineConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve config file path.
    ///
    /// Checks `$TURING_CONFIG_PATH` first, then `./turing.toml` in the
    /// working directory.
    fn config_path() -> PathBuf {
        Self::config_path_with(|key| std::env::var(key).ok())
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        match env("TURING_CONFIG_PATH") {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from("turing.toml"),
        }
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var`
    /// in tests).
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("TURING_ADMIN_ROLES") {
            let roles: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            if roles.is_empty() {
                tracing::warn!(
                    var = "TURING_ADMIN_ROLES",
                    value = %v,
                    "ignoring empty env override"
                );
            } else {
                self.access.admin_roles = roles;
            }
        }
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error when the string is not valid config TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Read and parse a TOML file at an explicit path.
    ///
    /// Unlike [`load`](Self::load), a missing file is an error here: the
    /// caller asked for that specific file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
    }
}

// ── Access config ───────────────────────────────────────────────

/// Access control settings (`[access]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Roles granted access through the admin gate.
    pub admin_roles: Vec<String>,
}

impl AccessConfig {
    /// Build the principal resolver for these settings.
    pub fn resolver(&self) -> PrincipalResolver {
        PrincipalResolver::new(self.admin_roles.iter().cloned())
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_roles: vec!["admin".to_owned(), "super_admin".to_owned()],
        }
    }
}

// ── Action config ───────────────────────────────────────────────

/// One named action and its rule chain (`[[actions]]`).
///
/// Rules materialize in a fixed order: role gate, permission gate,
/// threshold. Earlier rules short-circuit later ones, so the cheap
/// role check always runs before the amount check.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Action identifier, matched exactly against evaluated contexts.
    pub name: String,
    /// Roles of which the principal needs any (empty = no role gate).
    pub required_roles: Vec<String>,
    /// Permissions the principal needs all of (empty = no gate).
    pub required_permissions: Vec<String>,
    /// Optional numeric threshold on the requested amount.
    pub threshold: Option<ThresholdConfig>,
}

impl ActionConfig {
    /// Materialize the configured gates into policy rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyAction`] for a blank name, or the error
    /// from the first gate that fails to build.
    pub fn rules(&self) -> Result<Vec<Arc<dyn PolicyRule>>, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyAction);
        }

        let mut rules: Vec<Arc<dyn PolicyRule>> = Vec::new();
        if !self.required_roles.is_empty() {
            rules.push(Arc::new(RoleGate::new(self.required_roles.iter().cloned())?));
        }
        if !self.required_permissions.is_empty() {
            rules.push(Arc::new(PermissionGate::new(
                self.required_permissions.iter().cloned(),
            )?));
        }
        if let Some(threshold) = &self.threshold {
            rules.push(Arc::new(ThresholdRule::new(
                threshold.limit,
                threshold.override_roles.iter().cloned(),
            )?));
        }
        Ok(rules)
    }
}

/// Threshold settings for an action (`[actions.threshold]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// Maximum requested amount allowed without an override role.
    pub limit: f64,
    /// Roles that bypass the limit entirely.
    #[serde(default)]
    pub override_roles: Vec<String>,
}

// ── Workflow config ─────────────────────────────────────────────

/// Workflow state machine shape (`[workflow]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Complete state set, in declaration order.
    pub states: Vec<String>,
    /// Subset of `states` that admit no outgoing transition.
    pub terminal: Vec<String>,
    /// Role gates applied to matching transitions (`[[workflow.gates]]`).
    pub gates: Vec<GateConfig>,
}

impl WorkflowConfig {
    /// Build the state machine for these settings.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from state set validation.
    pub fn machine(&self) -> Result<StateMachine, ConfigError> {
        StateMachine::new(self.states.iter().cloned(), self.terminal.iter().cloned())
    }

    /// Materialize the configured transition gates into policy rules.
    ///
    /// Gate state references are validated against the declared state set
    /// so a typo in a gate fails at load time, not silently at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownGateState`] for a gate naming a state
    /// outside the set, or [`ConfigError::EmptyRoleSet`] for a gate with
    /// no usable roles.
    pub fn gate_rules(&self) -> Result<Vec<Arc<dyn PolicyRule>>, ConfigError> {
        let mut rules: Vec<Arc<dyn PolicyRule>> = Vec::with_capacity(self.gates.len());
        for gate in &self.gates {
            for state in [&gate.from, &gate.to].into_iter().flatten() {
                if !self.states.iter().any(|s| s == state) {
                    return Err(ConfigError::UnknownGateState {
                        state: state.clone(),
                    });
                }
            }
            rules.push(Arc::new(TransitionRoleGate::new(
                gate.from.clone(),
                gate.to.clone(),
                gate.roles.iter().cloned(),
            )?));
        }
        Ok(rules)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            states: ["BACKLOG", "IN_PROGRESS", "BLOCKED", "DONE", "CANCELED"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            terminal: vec!["DONE".to_owned(), "CANCELED".to_owned()],
            gates: Vec::new(),
        }
    }
}

/// One transition role gate (`[[workflow.gates]]`).
///
/// `from`/`to` are matched exactly against transition states; omitting
/// either matches any state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Source state pattern (`None` matches any).
    pub from: Option<String>,
    /// Target state pattern (`None` matches any).
    pub to: Option<String>,
    /// Roles of which the acting principal needs any.
    pub roles: Vec<String>,
}

// ── Tests ───────────────────────────────────────────────────────
