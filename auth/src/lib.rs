// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Warden authorization engine
//!
//! Given a principal's set of identities and a protected resource (optionally
//! a specific field of it), warden decides whether a requested operation is
//! permitted.  Three permission sources are combined: declarative role
//! grants, per-subject-type configuration (including delegation to a
//! "master" related entity), and resource-instance-level ad-hoc grants
//! ("sharing") with optional time windows.
//!
//! The crate is an in-process decision function with a pluggable
//! data-provider boundary, not a policy server: persistence, cache
//! invalidation plumbing and configuration file loading live in adapter
//! crates that implement the traits in [`storage`].
//!
//! The flow for one decision:
//!
//! 1. [`authn::IdentityResolver`] builds the authoritative, ordered set of
//!    [`authn::SecurityIdentity`] values representing the principal.
//! 2. [`authz::PermissionManager::is_granted`] resolves the subject and
//!    field, applies master delegation and alias mapping, and checks each
//!    requested operation against the memoized role-grant map.
//! 3. On a miss, [`authz::SharingManager`] answers from the preloaded
//!    instance-level grants.
//!
//! See the [`authz`] module documentation for how the grant model fits
//! together.

pub mod authn;
pub mod authz;
pub mod storage;
pub mod subject;
