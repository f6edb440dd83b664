// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only records handed to the engine by provider adapters
//!
//! The engine never persists anything itself.  Role grants and sharing
//! entries are rows in some external store; providers map them into the
//! types below.  The engine treats them as facts: in particular, a
//! [`SharingEntry`]'s `enabled` flag and time window are expected to have
//! been applied by the provider already, and the engine does not re-check
//! them.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Field slot used for grants that apply to the whole object rather than one
/// of its fields
pub const FIELD_GLOBAL: &str = "_global";

/// Subject-type slot used for grants that apply system-wide rather than to
/// one subject type
pub const SUBJECT_SYSTEM: &str = "(system)";

/// Scope of a role grant, used to filter grant queries
///
/// A grant recorded for an organization-scoped role only applies within that
/// organization, and a grant recorded by the sharing subsystem only applies
/// through it.  Providers store the scope alongside each fact.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    Role,
    OrganizationRole,
    Sharing,
}

impl GrantScope {
    /// All scopes, in the order providers are expected to enumerate them
    pub const ALL: [GrantScope; 3] =
        [GrantScope::Role, GrantScope::OrganizationRole, GrantScope::Sharing];
}

/// A persisted fact that a role holds an operation on a subject type, one of
/// its fields, or globally
///
/// `subject_type` and `field` of `None` denote global/system scope: the role
/// holds the operation everywhere, not on one configured type.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoleGrant {
    pub role_name: String,
    pub subject_type: Option<String>,
    pub field: Option<String>,
    pub operation: String,
}

impl RoleGrant {
    pub fn new(role_name: &str, operation: &str) -> RoleGrant {
        RoleGrant {
            role_name: role_name.to_owned(),
            subject_type: None,
            field: None,
            operation: operation.to_owned(),
        }
    }

    pub fn on_type(mut self, subject_type: &str) -> RoleGrant {
        self.subject_type = Some(subject_type.to_owned());
        self
    }

    pub fn on_field(mut self, field: &str) -> RoleGrant {
        self.field = Some(field.to_owned());
        self
    }
}

/// An instance-scoped, time-windowed grant of operations and/or roles to one
/// identity for one subject
///
/// Providers must only return entries that are enabled and whose time window
/// covers the moment of the query.  The engine trusts that filtering and
/// carries the window fields for observability only.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SharingEntry {
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: String,
    pub identity_type: String,
    pub identity_name: String,
    pub enabled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub operations: BTreeSet<String>,
    pub role_names: BTreeSet<String>,
}

/// A role record bearing its permissions, as returned by the sharing
/// provider when expanding role-carrying sharing entries
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SharedRole {
    pub name: String,
    pub grants: Vec<RoleGrant>,
}

#[cfg(test)]
mod test {
    use super::GrantScope;
    use super::RoleGrant;

    #[test]
    fn test_role_grant_builders() {
        let grant = RoleGrant::new("ROLE_USER", "view");
        assert_eq!(grant.subject_type, None);
        assert_eq!(grant.field, None);

        let grant = RoleGrant::new("ROLE_USER", "view")
            .on_type("Item")
            .on_field("price");
        assert_eq!(grant.subject_type.as_deref(), Some("Item"));
        assert_eq!(grant.field.as_deref(), Some("price"));
    }

    #[test]
    fn test_grant_scope_serde() {
        let scopes: Vec<String> = GrantScope::ALL
            .iter()
            .map(|s| serde_json::to_string(s).unwrap())
            .collect();
        assert_eq!(
            scopes,
            vec!["\"role\"", "\"organization_role\"", "\"sharing\""]
        );
    }
}
