//! Decision audit trail.
//!
//! Captures evaluated decisions as structured records and appends them as
//! JSON lines to an append-only sink. A record carries the full decision
//! payload, so a denial can be explained later without re-running the
//! rules that produced it.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::decision::Decision;
use crate::policy::context::ActionContext;
use crate::principal::Principal;

/// A single evaluated decision, ready for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// Evaluation time.
    pub timestamp: DateTime<Utc>,
    /// Acting principal identifier (empty for unresolvable input).
    pub principal_id: String,
    /// Normalized roles the principal held at evaluation time.
    pub roles: Vec<String>,
    /// The action that was evaluated.
    pub action: String,
    /// Final outcome.
    pub allowed: bool,
    /// Machine-readable denial code, when denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable denial reason, when denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Structured denial details, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl DecisionRecord {
    /// Build a record for one evaluation outcome.
    pub fn new(principal: &Principal, ctx: &ActionContext, decision: &Decision) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            principal_id: principal.id().to_owned(),
            roles: principal.roles().iter().cloned().collect(),
            action: ctx.action().to_owned(),
            allowed: decision.is_allowed(),
            code: decision.code().map(str::to_owned),
            reason: decision.reason().map(str::to_owned),
            details: decision.details().cloned(),
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns the underlying serialization error, which for this record
    /// shape only occurs when details contain non-serializable values.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Audit log writing decision records as JSON lines to an append-only sink.
pub struct AuditLog {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl AuditLog {
    /// Create an audit log that appends to the given file path.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened for append.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// Create an audit log from an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Record one evaluation outcome, returning the written record.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be serialized or written.
    pub fn log_decision(
        &self,
        principal: &Principal,
        ctx: &ActionContext,
        decision: &Decision,
    ) -> anyhow::Result<DecisionRecord> {
        let record = DecisionRecord::new(principal, ctx, decision);
        self.append(&record)?;
        Ok(record)
    }

    /// Write a single record as one JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be serialized or written.
    pub fn append(&self, record: &DecisionRecord) -> anyhow::Result<()> {
        let line = record.to_json_line()?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("audit lock poisoned: {e}"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}
