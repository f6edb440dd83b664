// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The central permission decision function
//!
//! [`PermissionManager::is_granted`] takes the principal's resolved
//! identity set, one or more requested operations and a subject, and
//! answers whether every operation is permitted.  The sequence for one
//! call:
//!
//! 1. normalize the subject argument into `(subject, field)`;
//! 2. apply master delegation when a field-level check is configured to
//!    redirect to a related owning subject;
//! 3. pass subjects with no configuration at all (they are not protected
//!    by this engine);
//! 4. map aliases to real operation names;
//! 5. load (or reuse) the memoized grant map for this identity
//!    combination;
//! 6. per operation: consult the override hooks, then the grant map, then
//!    the sharing manager; all operations must individually pass.
//!
//! Failure handling at this boundary is asymmetric on purpose: a
//! malformed subject denies (`Ok(false)`) rather than erroring, because an
//! authorization check must never throw for bad input, while provider and
//! configuration failures do surface as errors.  The administrative
//! enumeration path ([`PermissionManager::role_permissions`]) propagates
//! everything, including data inconsistencies the boolean path would
//! hide.

use crate::authn;
use crate::authn::SecurityIdentity;
use crate::authz::config::PermissionConfig;
use crate::authz::config::PermissionConfigSet;
use crate::authz::grants::GrantMapHook;
use crate::authz::grants::GrantSet;
use crate::authz::sharing::SharingManager;
use crate::storage::PermissionConfigSource;
use crate::storage::RoleGrantStore;
use crate::subject::Subject;
use crate::subject::SubjectSpec;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde::Serialize;
use slog::Logger;
use slog::debug;
use slog::o;
use slog::trace;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use warden_common::Error;
use warden_common::record::FIELD_GLOBAL;
use warden_common::record::GrantScope;
use warden_common::record::SUBJECT_SYSTEM;

/// Override hook consulted before the grant map
///
/// The first hook returning `Some` decides the operation outright; hooks
/// returning `None` abstain.  Hooks run synchronously in registration
/// order.
pub trait DecisionOverride: Send + Sync {
    fn decide(
        &self,
        identities: &[SecurityIdentity],
        operation: &str,
        subject: Option<&Subject>,
        field: Option<&str>,
    ) -> Option<bool>;
}

/// One operation of a role-permission enumeration
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RolePermission {
    pub operation: String,
    /// Whether the enumerated role currently holds the operation on the
    /// subject scope or the system scope
    pub granted: bool,
    /// Whether the operation exists only through the configuration's
    /// synthetic system-level default, with no grant recorded on the
    /// subject itself
    pub config_derived: bool,
}

/// The permission decision engine
pub struct PermissionManager {
    log: Logger,
    config_source: Arc<dyn PermissionConfigSource>,
    configs: OnceCell<Mutex<PermissionConfigSet>>,
    store: Arc<dyn RoleGrantStore>,
    sharing: Option<Arc<SharingManager>>,
    /// Memoized grant map per distinct identity combination
    grant_maps: Mutex<BTreeMap<String, Arc<GrantSet>>>,
    /// Memoized system-level operations per `(subject type, field)`
    system_ops: Mutex<BTreeMap<(String, String), BTreeSet<String>>>,
    grant_hooks: Vec<Arc<dyn GrantMapHook>>,
    overrides: Vec<Arc<dyn DecisionOverride>>,
}

impl PermissionManager {
    pub fn new(
        log: &Logger,
        config_source: Arc<dyn PermissionConfigSource>,
        store: Arc<dyn RoleGrantStore>,
    ) -> PermissionManager {
        PermissionManager {
            log: log.new(o!("component" => "PermissionManager")),
            config_source,
            configs: OnceCell::new(),
            store,
            sharing: None,
            grant_maps: Mutex::new(BTreeMap::new()),
            system_ops: Mutex::new(BTreeMap::new()),
            grant_hooks: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn with_sharing(mut self, sharing: Arc<SharingManager>) -> PermissionManager {
        self.sharing = Some(sharing);
        self
    }

    pub fn register_grant_hook(&mut self, hook: Arc<dyn GrantMapHook>) {
        self.grant_hooks.push(hook);
    }

    pub fn register_override(&mut self, hook: Arc<dyn DecisionOverride>) {
        self.overrides.push(hook);
    }

    fn configs(&self) -> Result<&Mutex<PermissionConfigSet>, Error> {
        self.configs.get_or_try_init(|| {
            let configs =
                self.config_source.load_configurations().map_err(|e| {
                    e.internal_context("loading permission configurations")
                })?;
            Ok(Mutex::new(PermissionConfigSet::from_configs(configs)?))
        })
    }

    /// Returns the configuration for the given type, failing when none is
    /// registered
    pub fn config(&self, type_name: &str) -> Result<Arc<PermissionConfig>, Error> {
        self.configs()?.lock().unwrap().config(type_name)
    }

    /// Registers a configuration, merging it into any existing one for the
    /// same type
    pub fn add_config(&self, config: PermissionConfig) -> Result<(), Error> {
        self.configs()?.lock().unwrap().add_config(config)
    }

    fn find_config(
        &self,
        type_name: &str,
    ) -> Result<Option<Arc<PermissionConfig>>, Error> {
        Ok(self.configs()?.lock().unwrap().find(type_name))
    }

    /// Whether the subject's (possibly field-qualified) type has a
    /// registered permission configuration
    ///
    /// Never fails; a subject that cannot even be constructed is not
    /// managed.
    pub fn is_managed<S: Into<SubjectSpec>>(&self, subject: S) -> bool {
        let (subject, field) = match subject.into().resolve() {
            Ok(resolved) => resolved,
            Err(_) => return false,
        };
        let Some(subject) = subject else {
            return false;
        };
        let config = match self.find_config(subject.type_name()) {
            Ok(config) => config,
            Err(error) => {
                debug!(self.log, "failed to load permission configurations";
                    "error" => %error,
                );
                return false;
            }
        };
        match (config, field) {
            (Some(config), Some(field)) => config.has_field(&field),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Whether every requested operation is permitted on the subject for
    /// the given identity set
    ///
    /// An empty operation list is vacuously true.  A malformed subject
    /// denies rather than failing; provider and configuration failures
    /// surface as errors.
    pub fn is_granted<S: Into<SubjectSpec>>(
        &self,
        identities: &[SecurityIdentity],
        operations: &[&str],
        subject: S,
    ) -> Result<bool, Error> {
        match self.decide(identities, operations, &subject.into()) {
            Err(Error::InvalidSubject { message }) => {
                debug!(self.log, "denying request with invalid subject";
                    "message" => message,
                );
                Ok(false)
            }
            other => other,
        }
    }

    /// Sugar for [`PermissionManager::is_granted`] against one field of
    /// the subject
    pub fn is_field_granted<S: Into<SubjectSpec>>(
        &self,
        identities: &[SecurityIdentity],
        operations: &[&str],
        subject: S,
        field: &str,
    ) -> Result<bool, Error> {
        self.is_granted(
            identities,
            operations,
            SubjectSpec::Field(Box::new(subject.into()), field.to_owned()),
        )
    }

    fn decide(
        &self,
        identities: &[SecurityIdentity],
        operations: &[&str],
        spec: &SubjectSpec,
    ) -> Result<bool, Error> {
        if operations.is_empty() {
            return Ok(true);
        }
        let (mut subject, mut field) = spec.resolve()?;
        let mut operations: Vec<String> =
            operations.iter().map(|op| (*op).to_owned()).collect();

        // Master delegation: a field-level check on a type that declares a
        // master association continues as an object-level check against
        // the related master subject, with the operations remapped.
        if let (Some(checked), Some(_)) = (&subject, &field) {
            if let Some(config) = self.find_config(checked.type_name())? {
                if let Some(path) = config.master() {
                    let master = self.resolve_master(checked, &config, path)?;
                    operations = operations
                        .iter()
                        .map(|op| config.master_operation(op).to_owned())
                        .collect();
                    trace!(self.log, "delegating to master subject";
                        "subject" => ?checked,
                        "master" => ?master,
                    );
                    subject = Some(master);
                    field = None;
                }
            }
        }

        let config = match &subject {
            Some(subject) => self.find_config(subject.type_name())?,
            None => None,
        };

        // A subject outside the configured permission model is not
        // protected by this engine.
        if subject.is_some() && config.is_none() {
            debug!(self.log, "granting request for unmanaged subject";
                "subject" => ?subject,
            );
            return Ok(true);
        }

        if let Some(config) = &config {
            operations = operations
                .iter()
                .map(|op| config.resolve_operation(field.as_deref(), op))
                .collect();
        }

        let grants = self.grant_map(identities)?;
        for operation in &operations {
            let granted = match self.decide_override(
                identities,
                operation,
                subject.as_ref(),
                field.as_deref(),
            ) {
                Some(explicit) => explicit,
                None => {
                    let direct = match &subject {
                        Some(subject) => grants.has_grant(
                            subject.type_name(),
                            field.as_deref().unwrap_or(FIELD_GLOBAL),
                            operation,
                        ),
                        None => grants.has_grant(
                            SUBJECT_SYSTEM,
                            FIELD_GLOBAL,
                            operation,
                        ),
                    };
                    direct
                        || self.sharing.as_ref().is_some_and(|sharing| {
                            sharing.is_granted(
                                operation,
                                subject.as_ref(),
                                field.as_deref(),
                            )
                        })
                }
            };
            if !granted {
                debug!(self.log, "authorize result";
                    "operation" => operation.clone(),
                    "subject" => ?subject,
                    "result" => "denied",
                );
                return Ok(false);
            }
        }
        debug!(self.log, "authorize result";
            "operations" => ?operations,
            "subject" => ?subject,
            "result" => "granted",
        );
        Ok(true)
    }

    fn decide_override(
        &self,
        identities: &[SecurityIdentity],
        operation: &str,
        subject: Option<&Subject>,
        field: Option<&str>,
    ) -> Option<bool> {
        self.overrides
            .iter()
            .find_map(|hook| hook.decide(identities, operation, subject, field))
    }

    fn resolve_master(
        &self,
        subject: &Subject,
        config: &PermissionConfig,
        path: &str,
    ) -> Result<Subject, Error> {
        if let Some(object) = subject.object() {
            if let Some(master) = object.related(path) {
                return Subject::from_resource(&master);
            }
        }
        match self.store.master_class_for(config).map_err(|e| {
            e.internal_context("resolving master association")
        })? {
            Some(class) => Ok(Subject::class(class)),
            None => Err(Error::MasterUnresolvable {
                type_name: subject.type_name().to_owned(),
                path: path.to_owned(),
            }),
        }
    }

    /// Returns the memoized grant map for the identity combination,
    /// building it on first use
    ///
    /// Building costs one batched provider round trip, bracketed by the
    /// registered grant-map hooks; the result is kept until
    /// [`PermissionManager::clear`].
    fn grant_map(
        &self,
        identities: &[SecurityIdentity],
    ) -> Result<Arc<GrantSet>, Error> {
        let key = authn::cache_key(identities);
        {
            let cache = self.grant_maps.lock().unwrap();
            if let Some(grants) = cache.get(&key) {
                return Ok(Arc::clone(grants));
            }
        }

        let names = authn::role_names(identities);
        let mut grants = GrantSet::new();
        for hook in &self.grant_hooks {
            hook.before_load(&key, &mut grants);
        }
        trace!(self.log, "loading role grants"; "roles" => ?names);
        let facts = self
            .store
            .grants_by_role_names(&names)
            .map_err(|e| e.internal_context("loading role grants"))?;
        for fact in &facts {
            grants.insert_grant(fact);
        }
        for hook in &self.grant_hooks {
            hook.after_load(&key, &mut grants);
        }

        let grants = Arc::new(grants);
        let mut cache = self.grant_maps.lock().unwrap();
        Ok(Arc::clone(cache.entry(key).or_insert(grants)))
    }

    fn system_operations(
        &self,
        type_name: &str,
        field: Option<&str>,
    ) -> Result<BTreeSet<String>, Error> {
        let key =
            (type_name.to_owned(), field.unwrap_or(FIELD_GLOBAL).to_owned());
        {
            let cache = self.system_ops.lock().unwrap();
            if let Some(operations) = cache.get(&key) {
                return Ok(operations.clone());
            }
        }
        let facts = self
            .store
            .config_grants(&GrantScope::ALL)
            .map_err(|e| e.internal_context("loading config permissions"))?;
        let operations: BTreeSet<String> = facts
            .iter()
            .filter(|grant| grant.subject_type.is_none())
            .map(|grant| grant.operation.clone())
            .collect();
        let mut cache = self.system_ops.lock().unwrap();
        Ok(cache.entry(key).or_insert(operations).clone())
    }

    /// Enumerates every operation the subject's configuration declares,
    /// annotated with whether the given role currently holds it
    ///
    /// This is the administrative path: unlike the boolean decisions, it
    /// propagates every failure.  In particular, a configuration-declared
    /// operation with neither a recorded grant on the subject nor a
    /// synthetic configuration permission signals a configuration/data
    /// inconsistency and fails with [`Error::PermissionNotFound`].
    pub fn role_permissions<S: Into<SubjectSpec>>(
        &self,
        role: &str,
        subject: S,
    ) -> Result<Vec<RolePermission>, Error> {
        let (subject, field) = subject.into().resolve()?;
        let subject = subject.ok_or_else(|| {
            Error::invalid_subject(
                "role permission enumeration requires a subject",
            )
        })?;
        let config = self.config(subject.type_name())?;
        let declared =
            config.declared_operations(field.as_deref()).ok_or_else(|| {
                Error::ConfigNotFound {
                    type_name: format!(
                        "{}.{}",
                        subject.type_name(),
                        field.as_deref().unwrap_or_default()
                    ),
                }
            })?;

        let role_facts = self
            .store
            .grants_by_role_names(&[role.to_owned()])
            .map_err(|e| e.internal_context("loading role grants"))?;
        let listing = self
            .store
            .grants_by_subject(&subject, field.as_deref(), &GrantScope::ALL)
            .map_err(|e| e.internal_context("loading subject grants"))?;
        let system_operations =
            self.system_operations(subject.type_name(), field.as_deref())?;

        let mut permissions = Vec::with_capacity(declared.len());
        for operation in declared {
            let on_subject = role_facts.iter().any(|grant| {
                grant.operation == *operation
                    && grant.subject_type.as_deref()
                        == Some(subject.type_name())
                    && grant.field.as_deref() == field.as_deref()
            });
            let on_system = role_facts.iter().any(|grant| {
                grant.operation == *operation && grant.subject_type.is_none()
            });
            let config_derived =
                !listing.iter().any(|grant| grant.operation == *operation);
            if config_derived && !system_operations.contains(operation) {
                return Err(Error::PermissionNotFound {
                    operation: operation.clone(),
                    type_name: subject.type_name().to_owned(),
                });
            }
            permissions.push(RolePermission {
                operation: operation.clone(),
                granted: on_subject || on_system,
                config_derived,
            });
        }
        Ok(permissions)
    }

    /// Batch-populates the sharing caches for the given objects
    pub fn preload_permissions(
        &self,
        objects: &[SubjectSpec],
    ) -> Result<(), Error> {
        if let Some(sharing) = &self.sharing {
            sharing.preload_permissions(objects)?;
            sharing.preload_role_permissions(objects)?;
        }
        Ok(())
    }

    /// Drops the sharing caches for the given objects
    pub fn reset_preload_permissions(&self, objects: &[SubjectSpec]) {
        if let Some(sharing) = &self.sharing {
            sharing.reset_preload_permissions(objects);
        }
    }

    /// Drops every cache this engine holds
    pub fn clear(&self) {
        self.grant_maps.lock().unwrap().clear();
        self.system_ops.lock().unwrap().clear();
        if let Some(sharing) = &self.sharing {
            sharing.clear();
        }
    }
}
