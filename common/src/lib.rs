// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Warden shared types
//!
//! This crate implements common facilities used by the warden authorization
//! engine.  The engine itself lives in `warden-auth`; this crate holds the
//! pieces the engine and its persistence adapters need to agree on: the
//! [`error::Error`] type that every fallible engine operation returns, and
//! the read-only record types ([`record::RoleGrant`],
//! [`record::SharingEntry`], ...) that providers hand back from whatever
//! store they wrap.  An adapter crate can be written against these types
//! without depending on the engine at all.

pub mod error;
pub mod record;

pub use error::Error;
