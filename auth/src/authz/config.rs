// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-subject-type permission configuration
//!
//! Pure data plus merge logic; no I/O.  Configurations are deserializable
//! so that file-loading adapters can produce them, are built once at engine
//! initialization and are read-only afterward aside from explicit
//! [`PermissionConfigSet::add_config`] calls.
//!
//! The `build_fields`/`build_default_fields` flags are tri-state on
//! purpose: merge precedence must distinguish "not specified" from
//! "explicitly false", so they are `Option<bool>` rather than booleans
//! with a default.

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use warden_common::Error;

/// Permission configuration for one field of a subject type
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PermissionFieldConfig {
    pub field: String,
    #[serde(default)]
    pub operations: BTreeSet<String>,
    #[serde(default)]
    pub alias_map: BTreeMap<String, String>,
    #[serde(default)]
    pub editable: Option<bool>,
}

impl PermissionFieldConfig {
    pub fn new(field: &str) -> PermissionFieldConfig {
        PermissionFieldConfig {
            field: field.to_owned(),
            operations: BTreeSet::new(),
            alias_map: BTreeMap::new(),
            editable: None,
        }
    }

    /// Whether the field may be edited
    ///
    /// When unset, a field with no operations of its own is considered
    /// editable (nothing restricts it), and a field that declares
    /// operations is not.
    pub fn is_editable(&self) -> bool {
        self.editable.unwrap_or_else(|| self.operations.is_empty())
    }

    fn merge(&mut self, other: PermissionFieldConfig) {
        self.operations.extend(other.operations);
        self.alias_map.extend(other.alias_map);
        if other.editable.is_some() {
            self.editable = other.editable;
        }
    }
}

/// Permission configuration for one subject type
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PermissionConfig {
    pub type_name: String,
    #[serde(default)]
    pub operations: BTreeSet<String>,
    #[serde(default)]
    pub alias_map: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, PermissionFieldConfig>,
    /// Association path to the related "master" subject that field-level
    /// checks are delegated to
    #[serde(default)]
    pub master: Option<String>,
    /// Maps a requested operation to the operation checked against the
    /// master subject; operations not present pass through unchanged
    #[serde(default)]
    pub master_field_map: BTreeMap<String, String>,
    #[serde(default)]
    pub build_fields: Option<bool>,
    #[serde(default)]
    pub build_default_fields: Option<bool>,
}

impl PermissionConfig {
    pub fn new(type_name: &str) -> PermissionConfig {
        PermissionConfig {
            type_name: type_name.to_owned(),
            operations: BTreeSet::new(),
            alias_map: BTreeMap::new(),
            fields: BTreeMap::new(),
            master: None,
            master_field_map: BTreeMap::new(),
            build_fields: None,
            build_default_fields: None,
        }
    }

    /// Merges another configuration for the same type into this one
    ///
    /// Set-valued parts take the union, map-valued parts are right-biased
    /// (the incoming configuration wins on conflicts), and tri-state flags
    /// keep the existing value unless the incoming configuration specifies
    /// one.
    pub fn merge(&mut self, other: PermissionConfig) -> Result<(), Error> {
        if self.type_name != other.type_name {
            return Err(Error::internal_error(&format!(
                "cannot merge permission configurations \
                 of different types: \"{}\" and \"{}\"",
                self.type_name, other.type_name
            )));
        }
        self.operations.extend(other.operations);
        self.alias_map.extend(other.alias_map);
        for (name, field) in other.fields {
            match self.fields.get_mut(&name) {
                Some(existing) => existing.merge(field),
                None => {
                    self.fields.insert(name, field);
                }
            }
        }
        if other.master.is_some() {
            self.master = other.master;
        }
        self.master_field_map.extend(other.master_field_map);
        if other.build_fields.is_some() {
            self.build_fields = other.build_fields;
        }
        if other.build_default_fields.is_some() {
            self.build_default_fields = other.build_default_fields;
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&PermissionFieldConfig> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn master(&self) -> Option<&str> {
        self.master.as_deref()
    }

    /// Resolves a possibly aliased operation name to its real name
    ///
    /// When a field is given and configured, its alias map applies;
    /// otherwise the type-level map does.  Unmapped names pass through
    /// unchanged.
    pub fn resolve_operation(&self, field: Option<&str>, operation: &str) -> String {
        let alias_map = match field.and_then(|f| self.fields.get(f)) {
            Some(field_config) => &field_config.alias_map,
            None => &self.alias_map,
        };
        alias_map
            .get(operation)
            .cloned()
            .unwrap_or_else(|| operation.to_owned())
    }

    /// Maps a requested operation to the operation checked against the
    /// master subject
    pub fn master_operation<'a>(&'a self, operation: &'a str) -> &'a str {
        self.master_field_map
            .get(operation)
            .map(String::as_str)
            .unwrap_or(operation)
    }

    /// The operations declared for the type, or for one of its fields
    pub fn declared_operations(
        &self,
        field: Option<&str>,
    ) -> Option<&BTreeSet<String>> {
        match field {
            Some(name) => self.fields.get(name).map(|f| &f.operations),
            None => Some(&self.operations),
        }
    }

    pub fn build_fields(&self) -> bool {
        self.build_fields.unwrap_or(false)
    }

    pub fn build_default_fields(&self) -> bool {
        self.build_default_fields.unwrap_or(false)
    }
}

/// The registered permission configurations, keyed by subject type
#[derive(Clone, Debug, Default)]
pub struct PermissionConfigSet {
    configs: BTreeMap<String, Arc<PermissionConfig>>,
}

impl PermissionConfigSet {
    pub fn new() -> PermissionConfigSet {
        PermissionConfigSet { configs: BTreeMap::new() }
    }

    pub fn from_configs(
        configs: Vec<PermissionConfig>,
    ) -> Result<PermissionConfigSet, Error> {
        let mut set = PermissionConfigSet::new();
        for config in configs {
            set.add_config(config)?;
        }
        Ok(set)
    }

    /// Registers a configuration, merging it into any existing one for the
    /// same type
    pub fn add_config(&mut self, config: PermissionConfig) -> Result<(), Error> {
        match self.configs.get_mut(&config.type_name) {
            Some(existing) => {
                let mut merged = (**existing).clone();
                merged.merge(config)?;
                *existing = Arc::new(merged);
            }
            None => {
                self.configs
                    .insert(config.type_name.clone(), Arc::new(config));
            }
        }
        Ok(())
    }

    /// Returns the configuration for the given type, failing when none is
    /// registered
    pub fn config(&self, type_name: &str) -> Result<Arc<PermissionConfig>, Error> {
        self.find(type_name).ok_or_else(|| Error::ConfigNotFound {
            type_name: type_name.to_owned(),
        })
    }

    pub fn find(&self, type_name: &str) -> Option<Arc<PermissionConfig>> {
        self.configs.get(type_name).map(Arc::clone)
    }
}

#[cfg(test)]
mod test {
    use super::PermissionConfig;
    use super::PermissionConfigSet;
    use super::PermissionFieldConfig;
    use assert_matches::assert_matches;
    use warden_common::Error;

    #[test]
    fn test_merge_unions_and_right_bias() {
        let mut config = PermissionConfig::new("Item");
        config.operations.insert(String::from("view"));
        config
            .alias_map
            .insert(String::from("create"), String::from("view"));

        let mut other = PermissionConfig::new("Item");
        other.operations.insert(String::from("edit"));
        other
            .alias_map
            .insert(String::from("create"), String::from("invite"));

        config.merge(other).unwrap();
        assert!(config.operations.contains("view"));
        assert!(config.operations.contains("edit"));
        // The incoming configuration wins on alias conflicts.
        assert_eq!(config.alias_map.get("create").unwrap(), "invite");
    }

    #[test]
    fn test_merge_rejects_different_types() {
        let mut config = PermissionConfig::new("Item");
        assert_matches!(
            config.merge(PermissionConfig::new("Order")),
            Err(Error::InternalError { .. })
        );
    }

    #[test]
    fn test_merge_tri_state_precedence() {
        let mut config = PermissionConfig::new("Item");
        config.build_fields = Some(true);

        // An unset incoming flag keeps the existing value.
        let other = PermissionConfig::new("Item");
        config.merge(other).unwrap();
        assert_eq!(config.build_fields, Some(true));

        // An explicitly false incoming flag overrides, which is exactly
        // what a plain boolean default could not express.
        let mut other = PermissionConfig::new("Item");
        other.build_fields = Some(false);
        config.merge(other).unwrap();
        assert_eq!(config.build_fields, Some(false));
        assert!(!config.build_fields());

        // Never-set flags read as false.
        assert!(!config.build_default_fields());
    }

    #[test]
    fn test_field_merge() {
        let mut field = PermissionFieldConfig::new("price");
        field.operations.insert(String::from("view"));

        let mut config = PermissionConfig::new("Item");
        config.fields.insert(String::from("price"), field);

        let mut incoming_field = PermissionFieldConfig::new("price");
        incoming_field.operations.insert(String::from("edit"));
        incoming_field.editable = Some(false);
        let mut other = PermissionConfig::new("Item");
        other.fields.insert(String::from("price"), incoming_field);

        config.merge(other).unwrap();
        let merged = config.field("price").unwrap();
        assert_eq!(merged.operations.len(), 2);
        assert!(!merged.is_editable());
    }

    #[test]
    fn test_is_editable_default() {
        let mut field = PermissionFieldConfig::new("price");
        assert!(field.is_editable());

        field.operations.insert(String::from("edit"));
        assert!(!field.is_editable());

        field.editable = Some(true);
        assert!(field.is_editable());
    }

    #[test]
    fn test_resolve_operation() {
        let mut config = PermissionConfig::new("Item");
        config
            .alias_map
            .insert(String::from("create"), String::from("invite"));
        let mut field = PermissionFieldConfig::new("price");
        field
            .alias_map
            .insert(String::from("view"), String::from("view_price"));
        config.fields.insert(String::from("price"), field);

        assert_eq!(config.resolve_operation(None, "create"), "invite");
        assert_eq!(config.resolve_operation(None, "view"), "view");
        // A configured field uses its own alias map exclusively.
        assert_eq!(
            config.resolve_operation(Some("price"), "view"),
            "view_price"
        );
        assert_eq!(config.resolve_operation(Some("price"), "create"), "create");
        // An unconfigured field falls back to the type-level map.
        assert_eq!(config.resolve_operation(Some("name"), "create"), "invite");
    }

    #[test]
    fn test_master_operation() {
        let mut config = PermissionConfig::new("Item");
        config
            .master_field_map
            .insert(String::from("view"), String::from("read"));
        assert_eq!(config.master_operation("view"), "read");
        assert_eq!(config.master_operation("delete"), "delete");
    }

    #[test]
    fn test_config_set_lookup_and_merge() {
        let mut set = PermissionConfigSet::new();
        let mut config = PermissionConfig::new("Item");
        config.operations.insert(String::from("view"));
        set.add_config(config).unwrap();

        let mut more = PermissionConfig::new("Item");
        more.operations.insert(String::from("edit"));
        set.add_config(more).unwrap();

        let merged = set.config("Item").unwrap();
        assert_eq!(merged.operations.len(), 2);

        assert_matches!(
            set.config("Order"),
            Err(Error::ConfigNotFound { type_name }) if type_name == "Order"
        );
        assert!(set.find("Order").is_none());
    }
}
