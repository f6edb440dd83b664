// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authentication facilities
//!
//! This module is decision-oriented rather than protocol-oriented: it does
//! not verify credentials.  Whatever authenticated the principal (an HTTP
//! layer, a session store, a background job runner) hands the engine a
//! [`Context`] describing who is acting and how much we trust the
//! authentication, and [`resolver::IdentityResolver`] turns that into the
//! authoritative set of [`SecurityIdentity`] values used as keys into
//! permission grants.
//!
//! Identities are deliberately cheap, immutable facts.  The same struct
//! represents a user, a role, a group, an organization or a system
//! pseudo-role; the decision algorithm branches exhaustively on
//! [`IdentityKind`], which is why this is a closed enum and not a trait.

pub mod resolver;

pub use resolver::IdentityContributor;
pub use resolver::IdentityObserver;
pub use resolver::IdentityResolver;

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde::Serialize;

/// Identity type carried by the built-in pseudo-roles
pub const SYSTEM_IDENTITY_TYPE: &str = "system";

/// Name prefix reserved for the trust-tier pseudo-roles
pub const AUTH_LEVEL_PREFIX: &str = "AUTH_LEVEL_";

/// Name prefix reserved for the public-access pseudo-role
pub const PUBLIC_PREFIX: &str = "PUBLIC_";

/// Pseudo-role held by principals that authenticated during this session
pub const AUTH_LEVEL_FULL: &str = "AUTH_LEVEL_FULL";

/// Pseudo-role held by principals authenticated at least via a
/// remember-me-style token
pub const AUTH_LEVEL_REMEMBERED: &str = "AUTH_LEVEL_REMEMBERED";

/// Pseudo-role held by any authenticated principal
pub const AUTH_LEVEL_ANY: &str = "AUTH_LEVEL_ANY";

/// Pseudo-role held by everybody, authenticated or not
pub const PUBLIC_ACCESS: &str = "PUBLIC_ACCESS";

pub static IDENTITY_FULLY_AUTHENTICATED: Lazy<SecurityIdentity> =
    Lazy::new(|| SecurityIdentity::role(SYSTEM_IDENTITY_TYPE, AUTH_LEVEL_FULL));

pub static IDENTITY_REMEMBERED: Lazy<SecurityIdentity> = Lazy::new(|| {
    SecurityIdentity::role(SYSTEM_IDENTITY_TYPE, AUTH_LEVEL_REMEMBERED)
});

pub static IDENTITY_AUTHENTICATED: Lazy<SecurityIdentity> =
    Lazy::new(|| SecurityIdentity::role(SYSTEM_IDENTITY_TYPE, AUTH_LEVEL_ANY));

pub static IDENTITY_PUBLIC_ACCESS: Lazy<SecurityIdentity> =
    Lazy::new(|| SecurityIdentity::role(SYSTEM_IDENTITY_TYPE, PUBLIC_ACCESS));

/// Kind of principal fact a [`SecurityIdentity`] represents
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    User,
    Role,
    Group,
    Organization,
    System,
}

/// A typed, named principal fact used as a key into permission grants
///
/// Two identities are equal iff they have the same kind, type and name.
/// Identities are immutable once constructed and never persisted by the
/// engine.
#[derive(
    Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct SecurityIdentity {
    kind: IdentityKind,
    type_name: String,
    name: String,
}

impl SecurityIdentity {
    fn new(kind: IdentityKind, type_name: &str, name: &str) -> SecurityIdentity {
        SecurityIdentity {
            kind,
            type_name: type_name.to_owned(),
            name: name.to_owned(),
        }
    }

    pub fn user(type_name: &str, name: &str) -> SecurityIdentity {
        SecurityIdentity::new(IdentityKind::User, type_name, name)
    }

    pub fn role(type_name: &str, name: &str) -> SecurityIdentity {
        SecurityIdentity::new(IdentityKind::Role, type_name, name)
    }

    pub fn group(type_name: &str, name: &str) -> SecurityIdentity {
        SecurityIdentity::new(IdentityKind::Group, type_name, name)
    }

    pub fn organization(type_name: &str, name: &str) -> SecurityIdentity {
        SecurityIdentity::new(IdentityKind::Organization, type_name, name)
    }

    pub fn system(name: &str) -> SecurityIdentity {
        SecurityIdentity::new(IdentityKind::System, SYSTEM_IDENTITY_TYPE, name)
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the role name this identity contributes to role-grant lookups
    ///
    /// Only Role-kind identities project a role name, and the reserved
    /// pseudo-roles (trust tiers, public access) are excluded: they remain
    /// full members of the identity set for sharing-entry matching, but
    /// they never key a role-grant query or the grant-map cache.
    pub fn role_name(&self) -> Option<&str> {
        match self.kind {
            IdentityKind::Role
                if !self.name.starts_with(AUTH_LEVEL_PREFIX)
                    && !self.name.starts_with(PUBLIC_PREFIX) =>
            {
                Some(&self.name)
            }
            _ => None,
        }
    }
}

/// Projects the role names out of an identity set, preserving order
pub fn role_names(identities: &[SecurityIdentity]) -> Vec<String> {
    identities
        .iter()
        .filter_map(|identity| identity.role_name().map(str::to_owned))
        .collect()
}

/// Cache key identifying one distinct identity combination
///
/// Two identity sets that project the same role names in the same order
/// share a grant map, since the pseudo-roles excluded from the projection
/// can never appear in a role-grant fact.
pub fn cache_key(identities: &[SecurityIdentity]) -> String {
    role_names(identities).join(",")
}

/// How strongly the current principal's authentication is trusted
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// The principal was recognized from a long-lived token rather than
    /// fresh credentials
    Remembered,
    /// The principal authenticated during this session
    Full,
}

/// A reference to a group the actor belongs to
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupRef {
    pub type_name: String,
    pub name: String,
}

impl GroupRef {
    pub fn new(type_name: &str, name: &str) -> GroupRef {
        GroupRef { type_name: type_name.to_owned(), name: name.to_owned() }
    }
}

/// The authenticated actor performing the current operation
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Actor {
    pub type_name: String,
    pub name: String,
    pub roles: Vec<String>,
    pub groups: Vec<GroupRef>,
}

impl Actor {
    pub fn new(type_name: &str, name: &str) -> Actor {
        Actor {
            type_name: type_name.to_owned(),
            name: name.to_owned(),
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Actor {
        self.roles = roles.iter().map(|r| (*r).to_owned()).collect();
        self
    }

    pub fn with_groups(mut self, groups: Vec<GroupRef>) -> Actor {
        self.groups = groups;
        self
    }
}

/// Details attached to a successful authentication
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Details {
    pub actor: Actor,
}

/// Describes whether the principal is authenticated
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    Unauthenticated,
    Authenticated(Details, TrustLevel),
}

/// Describes how the principal performing the current operation is
/// authenticated
///
/// This is transport-agnostic.  Subsystems can create contexts for purposes
/// unrelated to a request (background jobs, bootstrap paths) using the
/// constructors below.
#[derive(Clone, Debug)]
pub struct Context {
    kind: Kind,
}

impl Context {
    /// Returns an unauthenticated context
    ///
    /// Resolution still produces an identity set for it: the public-access
    /// pseudo-role and whatever the contributor hooks add.
    pub fn unauthenticated() -> Context {
        Context { kind: Kind::Unauthenticated }
    }

    /// Returns a context for an actor authenticated at the given trust level
    pub fn authenticated(actor: Actor, trust: TrustLevel) -> Context {
        Context { kind: Kind::Authenticated(Details { actor }, trust) }
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Returns the authenticated actor, if any
    pub fn actor(&self) -> Option<&Actor> {
        match &self.kind {
            Kind::Authenticated(Details { actor }, _) => Some(actor),
            Kind::Unauthenticated => None,
        }
    }

    /// Returns the trust level of the authentication, if any
    pub fn trust_level(&self) -> Option<TrustLevel> {
        match &self.kind {
            Kind::Authenticated(_, trust) => Some(*trust),
            Kind::Unauthenticated => None,
        }
    }
}

/// The organization the current operation runs under, as reported by the
/// organizational-context collaborator
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Organization {
    pub type_name: String,
    pub name: String,
    /// Roles the organization itself declares, used as a fallback when no
    /// organization user exists
    pub roles: Vec<String>,
    /// Whether the organization represents a single user rather than a
    /// shared tenant
    pub user_organization: bool,
}

/// The current principal's membership record in the current organization
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OrganizationUser {
    pub roles: Vec<String>,
    pub groups: Vec<GroupRef>,
}
