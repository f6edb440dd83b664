// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collaborator interfaces implemented by persistence and framework
//! adapters
//!
//! The engine is an in-process decision function; everything it needs from
//! the outside world comes through the traits below.  Implementations are
//! expected to block (the engine defines no suspension points) and to be
//! cheap to call repeatedly, since the engine memoizes aggressively but
//! invalidation is caller-driven.

use crate::authn::Organization;
use crate::authn::OrganizationUser;
use crate::authn::SecurityIdentity;
use crate::authz::PermissionConfig;
use crate::authz::SharingIdentityConfig;
use crate::authz::SharingSubjectConfig;
use crate::subject::Subject;
use std::collections::BTreeSet;
use uuid::Uuid;
use warden_common::Error;
use warden_common::record::GrantScope;
use warden_common::record::RoleGrant;
use warden_common::record::SharedRole;
use warden_common::record::SharingEntry;

/// Source of the per-subject-type permission configurations
///
/// Called once, lazily, on the engine's first configuration lookup; the
/// result is memoized for the engine's lifetime.
pub trait PermissionConfigSource: Send + Sync {
    fn load_configurations(&self) -> Result<Vec<PermissionConfig>, Error>;
}

/// Source of the sharing subject and identity configurations
///
/// Same lazy-once contract as [`PermissionConfigSource`].
pub trait SharingConfigSource: Send + Sync {
    fn load_subject_configurations(
        &self,
    ) -> Result<Vec<SharingSubjectConfig>, Error>;

    fn load_identity_configurations(
        &self,
    ) -> Result<Vec<SharingIdentityConfig>, Error>;
}

/// Store of persisted role-grant facts
pub trait RoleGrantStore: Send + Sync {
    /// Returns every grant held by any of the named roles, in one batched
    /// query
    fn grants_by_role_names(
        &self,
        names: &[String],
    ) -> Result<Vec<RoleGrant>, Error>;

    /// Returns every grant recorded against the given subject (and field,
    /// when one is given), for any role, filtered to the given scopes
    fn grants_by_subject(
        &self,
        subject: &Subject,
        field: Option<&str>,
        scopes: &[GrantScope],
    ) -> Result<Vec<RoleGrant>, Error>;

    /// Returns the synthetic configuration-permission records: the global
    /// system-level defaults backing configuration-declared operations that
    /// no explicit grant covers
    fn config_grants(&self, scopes: &[GrantScope])
        -> Result<Vec<RoleGrant>, Error>;

    /// Returns the master subject type for a configuration whose master
    /// association cannot be resolved through a backing object
    fn master_class_for(
        &self,
        config: &PermissionConfig,
    ) -> Result<Option<String>, Error>;
}

/// Store of resource-instance sharing records
pub trait SharingStore: Send + Sync {
    /// Returns the named roles together with the grants they carry, in one
    /// batched query
    fn roles_by_name(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<Vec<SharedRole>, Error>;

    /// Returns the sharing entries recorded for the given subjects,
    /// optionally restricted to the given identity types
    ///
    /// The store must only return entries that are enabled and whose time
    /// window covers the moment of the query; the engine trusts that
    /// filtering and never re-checks timestamps.
    fn sharing_entries(
        &self,
        subjects: &[Subject],
        identity_types: Option<&BTreeSet<String>>,
    ) -> Result<Vec<SharingEntry>, Error>;

    fn rename_identity(
        &self,
        identity_type: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), Error>;

    fn delete_identity(
        &self,
        identity_type: &str,
        name: &str,
    ) -> Result<(), Error>;

    fn delete_by_ids(&self, ids: &[Uuid]) -> Result<(), Error>;
}

/// Transitive closure over the role hierarchy
pub trait RoleHierarchy: Send + Sync {
    /// Expands the given role names to the full set they imply
    ///
    /// The result must include the inputs themselves.
    fn expand(&self, roles: &[String]) -> BTreeSet<String>;
}

/// Optional organizational context for multi-tenant hosts
pub trait OrganizationContext: Send + Sync {
    fn current_organization(&self) -> Option<Organization>;

    fn current_organization_user(&self) -> Option<OrganizationUser>;
}

/// Yields the current principal's resolved identity set
///
/// The sharing engine matches sharing entries against the same identity set
/// the permission engine decides with; hosts typically implement this by
/// capturing an [`crate::authn::IdentityResolver`] result per request.
pub trait IdentitySource: Send + Sync {
    fn current_identities(&self) -> Vec<SecurityIdentity>;
}
