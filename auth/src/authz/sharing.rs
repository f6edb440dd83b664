// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resource-instance-level grant resolution ("sharing")
//!
//! Sharing entries are instance-scoped, time-windowed grants of operations
//! and/or roles to one identity for one subject.  Answering `is_granted`
//! from them is a pure cache lookup; the cost lives in the two preload
//! phases, which are batched on purpose.  Direct grants and role-carried
//! grants require different queries (one keyed by subject, one keyed by
//! role name), and decoupling the phases avoids N+1 round trips when a
//! caller enumerates many subjects whose entries carry overlapping roles.
//!
//! Time-window and enabled filtering belong to the provider: the store
//! must only return live entries, and nothing here re-checks timestamps.

use crate::authn::SecurityIdentity;
use crate::authz::grants::GrantSet;
use crate::authz::sharing_config::SharingConfigSet;
use crate::authz::sharing_config::SharingIdentityConfig;
use crate::authz::sharing_config::SharingSubjectConfig;
use crate::authz::sharing_config::Visibility;
use crate::storage::IdentitySource;
use crate::storage::SharingConfigSource;
use crate::storage::SharingStore;
use crate::subject::Subject;
use crate::subject::SubjectSpec;
use once_cell::sync::OnceCell;
use slog::Logger;
use slog::debug;
use slog::o;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;
use warden_common::Error;
use warden_common::record::FIELD_GLOBAL;
use warden_common::record::SUBJECT_SYSTEM;
use warden_common::record::SharedRole;

type SubjectKey = (String, String);

/// Answers instance-scoped grant queries from preloaded sharing entries
pub struct SharingManager {
    log: Logger,
    config_source: Arc<dyn SharingConfigSource>,
    configs: OnceCell<Mutex<SharingConfigSet>>,
    store: Arc<dyn SharingStore>,
    identities: Arc<dyn IdentitySource>,
    /// Operations granted per subject, populated by `preload_permissions`
    subject_grants: Mutex<BTreeMap<SubjectKey, GrantSet>>,
    /// Role names collected per subject and not yet expanded into grants
    pending_roles: Mutex<BTreeMap<SubjectKey, BTreeSet<String>>>,
}

impl SharingManager {
    pub fn new(
        log: &Logger,
        config_source: Arc<dyn SharingConfigSource>,
        store: Arc<dyn SharingStore>,
        identities: Arc<dyn IdentitySource>,
    ) -> SharingManager {
        SharingManager {
            log: log.new(o!("component" => "SharingManager")),
            config_source,
            configs: OnceCell::new(),
            store,
            identities,
            subject_grants: Mutex::new(BTreeMap::new()),
            pending_roles: Mutex::new(BTreeMap::new()),
        }
    }

    fn configs(&self) -> Result<&Mutex<SharingConfigSet>, Error> {
        self.configs.get_or_try_init(|| {
            let mut set = SharingConfigSet::new();
            for config in self
                .config_source
                .load_subject_configurations()
                .map_err(|e| {
                    e.internal_context("loading sharing subject configurations")
                })?
            {
                set.add_subject_config(config);
            }
            for config in self
                .config_source
                .load_identity_configurations()
                .map_err(|e| {
                    e.internal_context(
                        "loading sharing identity configurations",
                    )
                })?
            {
                set.add_identity_config(config)?;
            }
            Ok(Mutex::new(set))
        })
    }

    /// Registers (or replaces) the sharing policy for a subject type
    pub fn add_subject_config(
        &self,
        config: SharingSubjectConfig,
    ) -> Result<(), Error> {
        self.configs()?.lock().unwrap().add_subject_config(config);
        Ok(())
    }

    /// Registers the sharing policy for an identity type
    pub fn add_identity_config(
        &self,
        config: SharingIdentityConfig,
    ) -> Result<(), Error> {
        self.configs()?.lock().unwrap().add_identity_config(config)
    }

    /// Whether the preloaded sharing grants permit the operation on the
    /// subject
    ///
    /// Field-scoped requests never consult sharing: field-level ACL is out
    /// of scope for resource sharing.  Class-level and subject-less
    /// requests have no instance to look up.  A subject that was never
    /// preloaded answers `false`.  This never fails; it is purely a cache
    /// lookup.
    pub fn is_granted(
        &self,
        operation: &str,
        subject: Option<&Subject>,
        field: Option<&str>,
    ) -> bool {
        if field.is_some() {
            return false;
        }
        let Some(subject) = subject else {
            return false;
        };
        if subject.is_class() {
            return false;
        }
        let cache = self.subject_grants.lock().unwrap();
        match cache.get(&subject.key()) {
            Some(grants) => {
                grants.has_grant(subject.type_name(), FIELD_GLOBAL, operation)
                    || grants.has_grant(SUBJECT_SYSTEM, FIELD_GLOBAL, operation)
            }
            None => false,
        }
    }

    /// Preloads the direct sharing grants for the given objects in one
    /// batched provider call
    ///
    /// Only instance subjects of types registered for sharing with a
    /// visibility other than `None` are fetched, and only entries naming
    /// an identity the current principal actually holds count.  Role names
    /// carried by the entries are collected for
    /// [`SharingManager::preload_role_permissions`] (skipped entirely when
    /// no identity type is roleable).
    pub fn preload_permissions(
        &self,
        objects: &[SubjectSpec],
    ) -> Result<(), Error> {
        let (any_roleable, identity_configs, candidates) = {
            let configs = self.configs()?.lock().unwrap();
            if configs.permissible_identity_types().is_empty() {
                return Ok(());
            }
            let cache = self.subject_grants.lock().unwrap();
            let mut candidates = Vec::new();
            for spec in objects {
                let Ok((Some(subject), None)) = spec.resolve() else {
                    continue;
                };
                if subject.is_class() {
                    continue;
                }
                let Some(subject_config) = configs.subject(subject.type_name())
                else {
                    continue;
                };
                if subject_config.visibility == Visibility::None {
                    continue;
                }
                if cache.contains_key(&subject.key()) {
                    continue;
                }
                candidates.push(subject);
            }
            (
                configs.any_roleable(),
                configs.identity_configs().clone(),
                candidates,
            )
        };
        if candidates.is_empty() {
            return Ok(());
        }

        let identities = self.identities.current_identities();
        let identity_filter: BTreeSet<String> = identities
            .iter()
            .filter(|identity| {
                identity_configs.contains_key(identity.type_name())
            })
            .map(|identity| identity.type_name().to_owned())
            .collect();

        debug!(self.log, "preloading sharing entries";
            "subjects" => candidates.len(),
            "identity_types" => identity_filter.len(),
        );
        let entries = self
            .store
            .sharing_entries(&candidates, Some(&identity_filter))
            .map_err(|e| e.internal_context("loading sharing entries"))?;

        let mut cache = self.subject_grants.lock().unwrap();
        let mut pending = self.pending_roles.lock().unwrap();
        // Every candidate gets an entry so a later lookup can tell
        // "preloaded, nothing granted" from "never preloaded".
        for subject in &candidates {
            cache.entry(subject.key()).or_default();
        }
        for entry in entries {
            let key = (entry.subject_type.clone(), entry.subject_id.clone());
            let Some(grants) = cache.get_mut(&key) else {
                continue;
            };
            if !holds_identity(&identities, &entry.identity_type, &entry.identity_name)
            {
                continue;
            }
            let Some(identity_config) =
                identity_configs.get(&entry.identity_type)
            else {
                continue;
            };
            if identity_config.permissible {
                for operation in &entry.operations {
                    grants.insert(&entry.subject_type, FIELD_GLOBAL, operation);
                }
            }
            if any_roleable
                && identity_config.roleable
                && !entry.role_names.is_empty()
            {
                pending
                    .entry(key)
                    .or_default()
                    .extend(entry.role_names.iter().cloned());
            }
        }
        Ok(())
    }

    /// Expands the role names collected by
    /// [`SharingManager::preload_permissions`] into per-subject grants, in
    /// one batched provider call
    pub fn preload_role_permissions(
        &self,
        objects: &[SubjectSpec],
    ) -> Result<(), Error> {
        let mut by_subject: BTreeMap<SubjectKey, BTreeSet<String>> =
            BTreeMap::new();
        {
            let mut pending = self.pending_roles.lock().unwrap();
            for spec in objects {
                let Ok((Some(subject), None)) = spec.resolve() else {
                    continue;
                };
                if let Some(names) = pending.remove(&subject.key()) {
                    if !names.is_empty() {
                        by_subject.insert(subject.key(), names);
                    }
                }
            }
        }
        if by_subject.is_empty() {
            return Ok(());
        }

        let all_names: BTreeSet<String> =
            by_subject.values().flatten().cloned().collect();
        debug!(self.log, "expanding shared roles";
            "subjects" => by_subject.len(),
            "roles" => all_names.len(),
        );
        let roles = self
            .store
            .roles_by_name(&all_names)
            .map_err(|e| e.internal_context("loading shared roles"))?;
        let roles_by_name: BTreeMap<&str, &SharedRole> =
            roles.iter().map(|role| (role.name.as_str(), role)).collect();

        let mut cache = self.subject_grants.lock().unwrap();
        for (key, names) in by_subject {
            let grants = cache.entry(key).or_default();
            for name in &names {
                let Some(role) = roles_by_name.get(name.as_str()) else {
                    continue;
                };
                for grant in &role.grants {
                    grants.insert_grant(grant);
                }
            }
        }
        Ok(())
    }

    /// Drops the cached state for the given objects
    pub fn reset_preload_permissions(&self, objects: &[SubjectSpec]) {
        let mut cache = self.subject_grants.lock().unwrap();
        let mut pending = self.pending_roles.lock().unwrap();
        for spec in objects {
            let Ok((Some(subject), None)) = spec.resolve() else {
                continue;
            };
            cache.remove(&subject.key());
            pending.remove(&subject.key());
        }
    }

    /// Drops all cached state
    pub fn clear(&self) {
        self.subject_grants.lock().unwrap().clear();
        self.pending_roles.lock().unwrap().clear();
    }

    /// Renames an identity across all of its sharing entries
    ///
    /// Administrative pass-through to the provider; not part of the
    /// decision path.
    pub fn rename_identity(
        &self,
        identity_type: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), Error> {
        self.store
            .rename_identity(identity_type, old_name, new_name)
            .map_err(|e| e.internal_context("renaming sharing identity"))
    }

    /// Deletes all sharing entries naming the identity
    pub fn delete_identity(
        &self,
        identity_type: &str,
        name: &str,
    ) -> Result<(), Error> {
        self.store
            .delete_identity(identity_type, name)
            .map_err(|e| e.internal_context("deleting sharing identity"))
    }

    /// Deletes sharing entries by record id
    pub fn delete_by_ids(&self, ids: &[Uuid]) -> Result<(), Error> {
        self.store
            .delete_by_ids(ids)
            .map_err(|e| e.internal_context("deleting sharing entries"))
    }
}

fn holds_identity(
    identities: &[SecurityIdentity],
    identity_type: &str,
    name: &str,
) -> bool {
    identities.iter().any(|identity| {
        identity.type_name() == identity_type && identity.name() == name
    })
}

#[cfg(test)]
mod test {
    use super::SharingManager;
    use crate::authn::SecurityIdentity;
    use crate::storage::IdentitySource;
    use crate::storage::SharingConfigSource;
    use crate::storage::SharingStore;
    use crate::subject::Subject;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use uuid::Uuid;
    use warden_common::Error;
    use warden_common::record::SharedRole;
    use warden_common::record::SharingEntry;

    struct EmptyConfigSource;
    impl SharingConfigSource for EmptyConfigSource {
        fn load_subject_configurations(
            &self,
        ) -> Result<Vec<crate::authz::SharingSubjectConfig>, Error> {
            Ok(vec![])
        }
        fn load_identity_configurations(
            &self,
        ) -> Result<Vec<crate::authz::SharingIdentityConfig>, Error> {
            Ok(vec![])
        }
    }

    struct PanickingStore;
    impl SharingStore for PanickingStore {
        fn roles_by_name(
            &self,
            _: &BTreeSet<String>,
        ) -> Result<Vec<SharedRole>, Error> {
            panic!("store must not be consulted");
        }
        fn sharing_entries(
            &self,
            _: &[Subject],
            _: Option<&BTreeSet<String>>,
        ) -> Result<Vec<SharingEntry>, Error> {
            panic!("store must not be consulted");
        }
        fn rename_identity(&self, _: &str, _: &str, _: &str) -> Result<(), Error> {
            Ok(())
        }
        fn delete_identity(&self, _: &str, _: &str) -> Result<(), Error> {
            Ok(())
        }
        fn delete_by_ids(&self, _: &[Uuid]) -> Result<(), Error> {
            Ok(())
        }
    }

    struct NoIdentities;
    impl IdentitySource for NoIdentities {
        fn current_identities(&self) -> Vec<SecurityIdentity> {
            vec![]
        }
    }

    fn manager() -> SharingManager {
        SharingManager::new(
            &slog::Logger::root(slog::Discard, slog::o!()),
            Arc::new(EmptyConfigSource),
            Arc::new(PanickingStore),
            Arc::new(NoIdentities),
        )
    }

    #[test]
    fn test_field_scoped_requests_never_consult_sharing() {
        let manager = manager();
        let subject = Subject::class("Item");
        assert!(!manager.is_granted("view", Some(&subject), Some("price")));
    }

    #[test]
    fn test_class_and_missing_subjects_are_denied() {
        let manager = manager();
        assert!(!manager.is_granted("view", None, None));
        assert!(!manager.is_granted("view", Some(&Subject::class("Item")), None));
    }

    #[test]
    fn test_preload_without_permissible_identities_is_a_no_op() {
        // No identity configuration is permissible, so preloading must
        // return without touching the store (which would panic).
        let manager = manager();
        let spec = crate::subject::SubjectSpec::Class(String::from("Item"));
        manager.preload_permissions(&[spec]).unwrap();
    }
}
