// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authorization facilities
//!
//! ## Overview
//!
//! A decision combines three permission sources:
//!
//! 1. **Role grants**: persisted facts that a role holds an operation on a
//!    subject type, one of its fields, or globally.  Before deciding, the
//!    [`PermissionManager`] loads _all_ grants held by the principal's
//!    roles in one batched query and memoizes the resulting [`GrantSet`]
//!    per distinct identity combination.  Prefetching the whole map costs
//!    one round trip and makes every subsequent membership test a pure
//!    in-memory lookup; fetching per-operation would multiply queries,
//!    since a single call checks a conjunction of operations and several
//!    related scopes.
//!
//! 2. **Per-type configuration**: the [`PermissionConfig`] registered for a
//!    subject type declares which operations exist, maps caller-facing
//!    aliases to real operation names, and may delegate field-level checks
//!    to a related "master" subject.  A subject with no configuration at
//!    all is not protected by this engine and passes unconditionally.
//!
//! 3. **Sharing**: instance-scoped grants of operations and/or roles to one
//!    identity for one subject, gated by a per-type visibility policy.  The
//!    [`SharingManager`] preloads these in two batched phases (direct
//!    grants, then role-carried grants) and answers the fallback question
//!    when the role-grant map denies.
//!
//! The identity set a decision runs with is built by
//! [`crate::authn::IdentityResolver`]; the protected resource is normalized
//! into a [`crate::subject::Subject`] plus an optional field name.
//!
//! ## Caching and invalidation
//!
//! All caches are private, per-engine mutable state: the grant-map memo and
//! the system-operations memo in the [`PermissionManager`], and the
//! per-subject grant and pending-role maps in the [`SharingManager`].
//! Nothing expires on its own.  A mutation adapter that changes role,
//! permission or sharing data must call
//! [`PermissionManager::clear`]/[`PermissionManager::reset_preload_permissions`]
//! itself.

mod config;
mod grants;
mod permissions;
mod sharing;
mod sharing_config;

pub use config::PermissionConfig;
pub use config::PermissionConfigSet;
pub use config::PermissionFieldConfig;
pub use grants::GrantMapHook;
pub use grants::GrantSet;
pub use permissions::DecisionOverride;
pub use permissions::PermissionManager;
pub use permissions::RolePermission;
pub use sharing::SharingManager;
pub use sharing_config::SharingConfigSet;
pub use sharing_config::SharingIdentityConfig;
pub use sharing_config::SharingSubjectConfig;
pub use sharing_config::Visibility;
