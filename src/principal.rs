//! Principal resolution: canonical identity for policy evaluation.
//!
//! Upstream identity layers hand over loosely-typed user records whose
//! `roles`/`permissions` fields may be absent, plain identifier arrays, or
//! arrays of objects carrying a `name` field. [`PrincipalResolver::resolve`]
//! normalizes all of that into a [`Principal`] with canonical lowercase
//! identifier sets, and it never fails: malformed entries are dropped so
//! that deny-by-default checks stay defined even for partially-loaded users.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

/// Administrative role identifiers granted the admin capability by default.
const DEFAULT_ADMIN_ROLES: [&str; 2] = ["admin", "super_admin"];

/// Normalize a raw role/permission identifier to its canonical form.
///
/// Trims surrounding whitespace and lowercases ASCII. Returns `None` for
/// entries that are empty after trimming, so they drop out of the set.
pub(crate) fn normalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}

/// Extract the identifier from one raw role/permission entry.
///
/// An entry is either a plain identifier (`"admin"`) or an object carrying
/// a `name` field (`{"name": "admin"}`). Anything else yields `None`.
fn entry_name(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(name) => Some(name.as_str()),
        Value::Object(fields) => fields.get("name").and_then(Value::as_str),
        _ => None,
    }
}

/// Collect a normalized identifier set from a raw record field.
///
/// Non-array values (including `null` and a missing field) produce an
/// empty set rather than an error.
fn extract_identifiers(raw: &Value, field: &str) -> BTreeSet<String> {
    match raw.get(field) {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(entry_name)
            .filter_map(normalize_identifier)
            .collect(),
        _ => BTreeSet::new(),
    }
}

/// Normalized identity performing an action.
///
/// Role and permission sets are unique, order-irrelevant, and always in
/// canonical lowercase form; every construction path normalizes, so
/// comparisons inside rules are plain equality. Capability flags such as
/// admin access are derived from set membership on demand (see
/// [`PrincipalResolver::can_access_admin`]), never stored on the principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: String,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
}

impl Principal {
    /// Build a principal from already-collected identifiers.
    ///
    /// Inputs are normalized (trimmed, lowercased, empties dropped), so the
    /// canonical-form invariant holds no matter where the data came from.
    pub fn new(
        id: impl Into<String>,
        roles: impl IntoIterator<Item = String>,
        permissions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            id: id.into(),
            roles: roles
                .into_iter()
                .filter_map(|r| normalize_identifier(&r))
                .collect(),
            permissions: permissions
                .into_iter()
                .filter_map(|p| normalize_identifier(&p))
                .collect(),
        }
    }

    /// Stable identifier from the upstream identity layer.
    ///
    /// Empty when the raw record had no usable `id`: resolution degrades
    /// rather than failing.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical role identifier set.
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Canonical permission identifier set.
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// True when the principal holds the given role (canonical match).
    pub fn has_role(&self, role: &str) -> bool {
        match normalize_identifier(role) {
            Some(canonical) => self.roles.contains(&canonical),
            None => false,
        }
    }

    /// True when the role set intersects the given set.
    pub fn has_any_role(&self, roles: &BTreeSet<String>) -> bool {
        self.roles.intersection(roles).next().is_some()
    }

    /// True when the principal holds the given permission (canonical match).
    pub fn has_permission(&self, permission: &str) -> bool {
        match normalize_identifier(permission) {
            Some(canonical) => self.permissions.contains(&canonical),
            None => false,
        }
    }

    /// True when the principal holds every permission in the given set.
    pub fn has_all_permissions(&self, permissions: &BTreeSet<String>) -> bool {
        permissions.is_subset(&self.permissions)
    }
}

/// Turns raw user records into [`Principal`] values and answers derived
/// capability questions against a fixed administrative role set.
#[derive(Debug, Clone)]
pub struct PrincipalResolver {
    admin_roles: BTreeSet<String>,
}

impl PrincipalResolver {
    /// Create a resolver with the given administrative role set.
    ///
    /// The set is normalized, so configured casing variants (`"Admin"`)
    /// match resolved principals.
    pub fn new(admin_roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            admin_roles: admin_roles
                .into_iter()
                .filter_map(|r| normalize_identifier(&r))
                .collect(),
        }
    }

    /// Create a resolver with the default administrative set
    /// (`admin`, `super_admin`).
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_ADMIN_ROLES.iter().map(|r| (*r).to_owned()))
    }

    /// Normalize a raw user record into a [`Principal`].
    ///
    /// Never fails: a malformed or partially-loaded record degrades to
    /// empty role/permission sets (and an empty `id`), keeping downstream
    /// checks deny-by-default instead of raising.
    pub fn resolve(&self, raw: &Value) -> Principal {
        let id = match raw.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };

        Principal {
            id,
            roles: extract_identifiers(raw, "roles"),
            permissions: extract_identifiers(raw, "permissions"),
        }
    }

    /// True iff the principal's role set intersects the administrative set.
    ///
    /// This membership test is the single source of truth for admin access;
    /// there is no stored flag to drift out of sync.
    pub fn can_access_admin(&self, principal: &Principal) -> bool {
        principal.has_any_role(&self.admin_roles)
    }

    /// The configured administrative role set (canonical form).
    pub fn admin_roles(&self) -> &BTreeSet<String> {
        &self.admin_roles
    }
}

impl Default for PrincipalResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}
