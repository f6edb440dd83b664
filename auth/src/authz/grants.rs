// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-memory grant map
//!
//! A [`GrantSet`] is the normalized, quickly searchable form of a batch of
//! role-grant facts: a set of `(subject type, field, operation)` triples,
//! with the global slots filled in for facts that carry no subject type or
//! field.  Both the role-grant memo of the permission manager and the
//! per-subject caches of the sharing manager use this shape, so a grant
//! loaded through either path answers the same membership test.

use std::collections::BTreeSet;
use warden_common::record::FIELD_GLOBAL;
use warden_common::record::RoleGrant;
use warden_common::record::SUBJECT_SYSTEM;

/// A set of granted operations, keyed by subject type and field
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GrantSet {
    grants: BTreeSet<(String, String, String)>,
}

impl GrantSet {
    pub fn new() -> GrantSet {
        GrantSet { grants: BTreeSet::new() }
    }

    pub fn insert(&mut self, subject_type: &str, field: &str, operation: &str) {
        self.grants.insert((
            subject_type.to_owned(),
            field.to_owned(),
            operation.to_owned(),
        ));
    }

    /// Inserts a persisted fact, mapping absent subject type and field to
    /// the global slots
    pub fn insert_grant(&mut self, grant: &RoleGrant) {
        self.insert(
            grant.subject_type.as_deref().unwrap_or(SUBJECT_SYSTEM),
            grant.field.as_deref().unwrap_or(FIELD_GLOBAL),
            &grant.operation,
        );
    }

    pub fn has_grant(
        &self,
        subject_type: &str,
        field: &str,
        operation: &str,
    ) -> bool {
        self.grants.contains(&(
            subject_type.to_owned(),
            field.to_owned(),
            operation.to_owned(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }
}

/// Hook pair bracketing the construction of a memoized grant map
///
/// Hooks run synchronously in registration order and may arbitrarily
/// rewrite the map: `before_load` runs on the empty map before the
/// provider is consulted, `after_load` on the fully loaded one.  This is
/// how externally injected global overrides reach the decision path
/// without a provider round trip of their own.
pub trait GrantMapHook: Send + Sync {
    fn before_load(&self, _key: &str, _grants: &mut GrantSet) {}

    fn after_load(&self, _key: &str, _grants: &mut GrantSet) {}
}

#[cfg(test)]
mod test {
    use super::GrantSet;
    use warden_common::record::FIELD_GLOBAL;
    use warden_common::record::RoleGrant;
    use warden_common::record::SUBJECT_SYSTEM;

    #[test]
    fn test_scope_slot_mapping() {
        let mut grants = GrantSet::new();
        grants.insert_grant(&RoleGrant::new("ROLE_USER", "view"));
        grants.insert_grant(
            &RoleGrant::new("ROLE_USER", "edit").on_type("Item"),
        );
        grants.insert_grant(
            &RoleGrant::new("ROLE_USER", "view")
                .on_type("Item")
                .on_field("price"),
        );

        assert!(grants.has_grant(SUBJECT_SYSTEM, FIELD_GLOBAL, "view"));
        assert!(grants.has_grant("Item", FIELD_GLOBAL, "edit"));
        assert!(grants.has_grant("Item", "price", "view"));
        assert!(!grants.has_grant("Item", FIELD_GLOBAL, "view"));
        assert_eq!(grants.len(), 3);
    }
}
