// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sharing configuration
//!
//! Two small per-type tables gate the sharing engine: which subject types
//! participate in sharing at all (and how visibly), and which identity
//! types a sharing entry may name (and what such an entry may carry).
//! Alias uniqueness across all identity configurations is checked at add
//! time so a misconfigured deployment fails at startup, not at decision
//! time.

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use warden_common::Error;

/// Per-subject-type policy gating whether sharing entries apply at all
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Sharing entries for this type are ignored entirely
    None,
    Public,
    Private,
}

/// Sharing policy for one subject type
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SharingSubjectConfig {
    pub type_name: String,
    pub visibility: Visibility,
}

impl SharingSubjectConfig {
    pub fn new(type_name: &str, visibility: Visibility) -> SharingSubjectConfig {
        SharingSubjectConfig { type_name: type_name.to_owned(), visibility }
    }
}

/// Sharing policy for one identity type
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SharingIdentityConfig {
    pub type_name: String,
    /// Short name unique across all identity configurations, used by
    /// adapters to refer to the identity type in stored records and UIs
    pub alias: String,
    /// Whether sharing entries naming this identity type may carry roles
    pub roleable: bool,
    /// Whether sharing entries naming this identity type may carry
    /// directly granted operations
    pub permissible: bool,
}

impl SharingIdentityConfig {
    pub fn new(
        type_name: &str,
        alias: &str,
        roleable: bool,
        permissible: bool,
    ) -> SharingIdentityConfig {
        SharingIdentityConfig {
            type_name: type_name.to_owned(),
            alias: alias.to_owned(),
            roleable,
            permissible,
        }
    }
}

/// The registered sharing configurations
#[derive(Clone, Debug, Default)]
pub struct SharingConfigSet {
    subjects: BTreeMap<String, SharingSubjectConfig>,
    identities: BTreeMap<String, SharingIdentityConfig>,
    aliases: BTreeSet<String>,
}

impl SharingConfigSet {
    pub fn new() -> SharingConfigSet {
        SharingConfigSet::default()
    }

    /// Registers (or replaces) the sharing policy for a subject type
    pub fn add_subject_config(&mut self, config: SharingSubjectConfig) {
        self.subjects.insert(config.type_name.clone(), config);
    }

    /// Registers the sharing policy for an identity type
    ///
    /// Fails fast when the alias is already taken by another identity
    /// configuration.
    pub fn add_identity_config(
        &mut self,
        config: SharingIdentityConfig,
    ) -> Result<(), Error> {
        if !self.aliases.insert(config.alias.clone()) {
            return Err(Error::AlreadyExistingAlias {
                alias: config.alias,
            });
        }
        self.identities.insert(config.type_name.clone(), config);
        Ok(())
    }

    pub fn subject(&self, type_name: &str) -> Option<&SharingSubjectConfig> {
        self.subjects.get(type_name)
    }

    pub fn identity(&self, type_name: &str) -> Option<&SharingIdentityConfig> {
        self.identities.get(type_name)
    }

    /// The identity types whose sharing entries may carry operations
    pub fn permissible_identity_types(&self) -> BTreeSet<String> {
        self.identities
            .values()
            .filter(|config| config.permissible)
            .map(|config| config.type_name.clone())
            .collect()
    }

    /// Whether any identity type may carry roles
    ///
    /// When this is false the role-collection phase of preloading is
    /// skipped entirely.
    pub fn any_roleable(&self) -> bool {
        self.identities.values().any(|config| config.roleable)
    }

    pub(crate) fn identity_configs(
        &self,
    ) -> &BTreeMap<String, SharingIdentityConfig> {
        &self.identities
    }
}

#[cfg(test)]
mod test {
    use super::SharingConfigSet;
    use super::SharingIdentityConfig;
    use super::SharingSubjectConfig;
    use super::Visibility;
    use assert_matches::assert_matches;
    use warden_common::Error;

    #[test]
    fn test_alias_uniqueness() {
        let mut set = SharingConfigSet::new();
        set.add_identity_config(SharingIdentityConfig::new(
            "AppUser", "user", false, true,
        ))
        .unwrap();

        // Same alias on a different identity type: configuration error.
        assert_matches!(
            set.add_identity_config(SharingIdentityConfig::new(
                "ApiKey", "user", false, true,
            )),
            Err(Error::AlreadyExistingAlias { alias }) if alias == "user"
        );

        // The failed add must not have registered the identity type.
        assert!(set.identity("ApiKey").is_none());
    }

    #[test]
    fn test_roleable_and_permissible_projections() {
        let mut set = SharingConfigSet::new();
        set.add_identity_config(SharingIdentityConfig::new(
            "AppUser", "user", false, true,
        ))
        .unwrap();
        assert!(!set.any_roleable());
        assert_eq!(
            set.permissible_identity_types().into_iter().collect::<Vec<_>>(),
            vec!["AppUser"]
        );

        set.add_identity_config(SharingIdentityConfig::new(
            "AppRole", "role", true, false,
        ))
        .unwrap();
        assert!(set.any_roleable());
        // Roleable-only types are not permissible.
        assert!(!set.permissible_identity_types().contains("AppRole"));
    }

    #[test]
    fn test_subject_config_replace() {
        let mut set = SharingConfigSet::new();
        set.add_subject_config(SharingSubjectConfig::new(
            "Item",
            Visibility::None,
        ));
        set.add_subject_config(SharingSubjectConfig::new(
            "Item",
            Visibility::Private,
        ));
        assert_eq!(
            set.subject("Item").unwrap().visibility,
            Visibility::Private
        );
    }

    #[test]
    fn test_visibility_serde() {
        let visibility: Visibility =
            serde_json::from_str("\"private\"").unwrap();
        assert_eq!(visibility, Visibility::Private);
        assert_eq!(
            serde_json::to_string(&Visibility::None).unwrap(),
            "\"none\""
        );
    }
}
