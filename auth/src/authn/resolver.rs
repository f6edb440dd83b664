// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identity resolution
//!
//! One decision context gets exactly one authoritative identity set, built
//! here from the authentication context, the role hierarchy and the
//! optional organizational context.  The set is ordered and deduplicated
//! (first occurrence wins); extension hooks run synchronously at fixed
//! stages of the pipeline, in registration order.
//!
//! The stages are:
//!
//! 1. pre-stage observers (read-only)
//! 2. the current principal's own identity
//! 3. hierarchy-expanded role identities from the actor's declared roles
//! 4. the actor's group identities
//! 5. organization-scoped identities (organization, org groups, org roles)
//! 6. add-stage contributors, which may replace the whole accumulated set
//! 7. engine-registered special identities
//! 8. the trust-tier cascade and the public-access identity
//! 9. post-stage observers (read-only)
//!
//! Hook mutation contracts are enforced by the trait signatures, not by
//! convention: an [`IdentityObserver`] only ever sees a shared slice, while
//! an [`IdentityContributor`] consumes and returns the set.

use crate::authn::Context;
use crate::authn::IDENTITY_AUTHENTICATED;
use crate::authn::IDENTITY_FULLY_AUTHENTICATED;
use crate::authn::IDENTITY_PUBLIC_ACCESS;
use crate::authn::IDENTITY_REMEMBERED;
use crate::authn::SecurityIdentity;
use crate::authn::TrustLevel;
use crate::storage::OrganizationContext;
use crate::storage::RoleHierarchy;
use slog::Logger;
use slog::o;
use slog::trace;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Separator between an organization-scoped identifier and the organization
/// name, disambiguating per-organization grants from global ones
pub const ORG_SCOPE_SEPARATOR: &str = "__";

/// Suffixes an organization-scoped role or group name with its organization
pub fn org_scoped(name: &str, organization: &str) -> String {
    format!("{}{}{}", name, ORG_SCOPE_SEPARATOR, organization)
}

/// Read-only hook observing the in-flight identity set at the pre and post
/// stages of resolution
pub trait IdentityObserver: Send + Sync {
    fn observe(&self, authn: &Context, identities: &[SecurityIdentity]);
}

/// Add-stage hook contributing identities from unrelated subsystems
/// (e.g. API-key identities)
///
/// Contributors receive the accumulated set and return the set resolution
/// continues with, so a contributor may append, filter or replace wholesale.
pub trait IdentityContributor: Send + Sync {
    fn contribute(
        &self,
        authn: &Context,
        identities: Vec<SecurityIdentity>,
    ) -> Vec<SecurityIdentity>;
}

/// Builds the ordered, deduplicated identity set representing a principal
/// for one decision context
pub struct IdentityResolver {
    log: Logger,
    /// Identity type assigned to role identities minted from bare role names
    role_type: String,
    hierarchy: Arc<dyn RoleHierarchy>,
    organization: Option<Arc<dyn OrganizationContext>>,
    special: Vec<SecurityIdentity>,
    pre_observers: Vec<Arc<dyn IdentityObserver>>,
    contributors: Vec<Arc<dyn IdentityContributor>>,
    post_observers: Vec<Arc<dyn IdentityObserver>>,
}

impl IdentityResolver {
    pub fn new(
        log: &Logger,
        role_type: &str,
        hierarchy: Arc<dyn RoleHierarchy>,
    ) -> IdentityResolver {
        IdentityResolver {
            log: log.new(o!("component" => "IdentityResolver")),
            role_type: role_type.to_owned(),
            hierarchy,
            organization: None,
            special: Vec::new(),
            pre_observers: Vec::new(),
            contributors: Vec::new(),
            post_observers: Vec::new(),
        }
    }

    pub fn with_organization_context(
        mut self,
        organization: Arc<dyn OrganizationContext>,
    ) -> IdentityResolver {
        self.organization = Some(organization);
        self
    }

    /// Registers an identity added to every resolved set (stage 7)
    pub fn register_special_identity(&mut self, identity: SecurityIdentity) {
        self.special.push(identity);
    }

    pub fn register_pre_observer(&mut self, hook: Arc<dyn IdentityObserver>) {
        self.pre_observers.push(hook);
    }

    pub fn register_contributor(&mut self, hook: Arc<dyn IdentityContributor>) {
        self.contributors.push(hook);
    }

    pub fn register_post_observer(&mut self, hook: Arc<dyn IdentityObserver>) {
        self.post_observers.push(hook);
    }

    /// Resolves the authoritative identity set for the given authentication
    /// context
    ///
    /// Resolution never fails: an unauthenticated principal simply skips the
    /// actor-derived stages and ends up with the public-access identity plus
    /// whatever the hooks contributed.
    pub fn resolve(&self, authn: &Context) -> Vec<SecurityIdentity> {
        let mut identities = Vec::new();
        let mut seen = BTreeSet::new();

        for hook in &self.pre_observers {
            hook.observe(authn, &identities);
        }

        if let Some(actor) = authn.actor() {
            push_unique(
                &mut identities,
                &mut seen,
                SecurityIdentity::user(&actor.type_name, &actor.name),
            );

            for role in self.hierarchy.expand(&actor.roles) {
                push_unique(
                    &mut identities,
                    &mut seen,
                    SecurityIdentity::role(&self.role_type, &role),
                );
            }

            for group in &actor.groups {
                push_unique(
                    &mut identities,
                    &mut seen,
                    SecurityIdentity::group(&group.type_name, &group.name),
                );
            }
        }

        self.resolve_organization(&mut identities, &mut seen);

        for hook in &self.contributors {
            identities = hook.contribute(authn, identities);
        }
        // Contributors may have replaced the set entirely.
        seen = identities.iter().cloned().collect();

        for identity in &self.special {
            push_unique(&mut identities, &mut seen, identity.clone());
        }

        match authn.trust_level() {
            Some(TrustLevel::Full) => {
                push_unique(
                    &mut identities,
                    &mut seen,
                    IDENTITY_FULLY_AUTHENTICATED.clone(),
                );
                push_unique(
                    &mut identities,
                    &mut seen,
                    IDENTITY_REMEMBERED.clone(),
                );
                push_unique(
                    &mut identities,
                    &mut seen,
                    IDENTITY_AUTHENTICATED.clone(),
                );
            }
            Some(TrustLevel::Remembered) => {
                push_unique(
                    &mut identities,
                    &mut seen,
                    IDENTITY_REMEMBERED.clone(),
                );
                push_unique(
                    &mut identities,
                    &mut seen,
                    IDENTITY_AUTHENTICATED.clone(),
                );
            }
            None => (),
        }
        push_unique(&mut identities, &mut seen, IDENTITY_PUBLIC_ACCESS.clone());

        for hook in &self.post_observers {
            hook.observe(authn, &identities);
        }

        trace!(self.log, "resolved identities";
            "count" => identities.len(),
        );
        identities
    }

    fn resolve_organization(
        &self,
        identities: &mut Vec<SecurityIdentity>,
        seen: &mut BTreeSet<SecurityIdentity>,
    ) {
        let Some(orgctx) = &self.organization else {
            return;
        };
        let Some(org) = orgctx.current_organization() else {
            return;
        };

        push_unique(
            identities,
            seen,
            SecurityIdentity::organization(&org.type_name, &org.name),
        );

        if let Some(org_user) = orgctx.current_organization_user() {
            for group in &org_user.groups {
                push_unique(
                    identities,
                    seen,
                    SecurityIdentity::group(
                        &group.type_name,
                        &org_scoped(&group.name, &org.name),
                    ),
                );
            }
            for role in self.hierarchy.expand(&org_user.roles) {
                push_unique(
                    identities,
                    seen,
                    SecurityIdentity::role(
                        &self.role_type,
                        &org_scoped(&role, &org.name),
                    ),
                );
            }
        } else if !org.user_organization && !org.roles.is_empty() {
            // No membership record, but the organization itself declares
            // roles.  A user organization never confers its own roles.
            for role in self.hierarchy.expand(&org.roles) {
                push_unique(
                    identities,
                    seen,
                    SecurityIdentity::role(
                        &self.role_type,
                        &org_scoped(&role, &org.name),
                    ),
                );
            }
        }
    }
}

fn push_unique(
    identities: &mut Vec<SecurityIdentity>,
    seen: &mut BTreeSet<SecurityIdentity>,
    identity: SecurityIdentity,
) {
    if seen.insert(identity.clone()) {
        identities.push(identity);
    }
}

#[cfg(test)]
mod test {
    use super::IdentityContributor;
    use super::IdentityObserver;
    use super::IdentityResolver;
    use super::org_scoped;
    use crate::authn::Actor;
    use crate::authn::Context;
    use crate::authn::GroupRef;
    use crate::authn::IDENTITY_AUTHENTICATED;
    use crate::authn::IDENTITY_FULLY_AUTHENTICATED;
    use crate::authn::IDENTITY_PUBLIC_ACCESS;
    use crate::authn::IDENTITY_REMEMBERED;
    use crate::authn::Organization;
    use crate::authn::OrganizationUser;
    use crate::authn::SecurityIdentity;
    use crate::authn::TrustLevel;
    use crate::storage::OrganizationContext;
    use crate::storage::RoleHierarchy;
    use slog::Logger;
    use slog::o;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    /// Expands `ROLE_ADMIN` to include `ROLE_USER`; identity otherwise
    struct TestHierarchy;
    impl RoleHierarchy for TestHierarchy {
        fn expand(&self, roles: &[String]) -> BTreeSet<String> {
            let mut expanded: BTreeSet<String> =
                roles.iter().cloned().collect();
            if expanded.contains("ROLE_ADMIN") {
                expanded.insert(String::from("ROLE_USER"));
            }
            expanded
        }
    }

    struct TestOrgContext {
        organization: Option<Organization>,
        user: Option<OrganizationUser>,
    }
    impl OrganizationContext for TestOrgContext {
        fn current_organization(&self) -> Option<Organization> {
            self.organization.clone()
        }
        fn current_organization_user(&self) -> Option<OrganizationUser> {
            self.user.clone()
        }
    }

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(&test_logger(), "AppRole", Arc::new(TestHierarchy))
    }

    fn full_context() -> Context {
        Context::authenticated(
            Actor::new("AppUser", "alice")
                .with_roles(&["ROLE_ADMIN"])
                .with_groups(vec![GroupRef::new("AppGroup", "staff")]),
            TrustLevel::Full,
        )
    }

    #[test]
    fn test_resolve_orders_and_dedups() {
        let identities = resolver().resolve(&full_context());

        assert_eq!(identities[0], SecurityIdentity::user("AppUser", "alice"));
        assert!(identities
            .contains(&SecurityIdentity::role("AppRole", "ROLE_ADMIN")));
        assert!(identities
            .contains(&SecurityIdentity::role("AppRole", "ROLE_USER")));
        assert!(identities
            .contains(&SecurityIdentity::group("AppGroup", "staff")));

        // No duplicates.
        let unique: BTreeSet<_> = identities.iter().cloned().collect();
        assert_eq!(unique.len(), identities.len());
    }

    #[test]
    fn test_trust_tier_cascade() {
        let identities = resolver().resolve(&full_context());
        assert!(identities.contains(&IDENTITY_FULLY_AUTHENTICATED));
        assert!(identities.contains(&IDENTITY_REMEMBERED));
        assert!(identities.contains(&IDENTITY_AUTHENTICATED));
        assert_eq!(identities.last(), Some(&*IDENTITY_PUBLIC_ACCESS));

        let remembered = Context::authenticated(
            Actor::new("AppUser", "alice"),
            TrustLevel::Remembered,
        );
        let identities = resolver().resolve(&remembered);
        assert!(!identities.contains(&IDENTITY_FULLY_AUTHENTICATED));
        assert!(identities.contains(&IDENTITY_REMEMBERED));
        assert!(identities.contains(&IDENTITY_AUTHENTICATED));
    }

    #[test]
    fn test_unauthenticated_gets_public_access_only() {
        let identities = resolver().resolve(&Context::unauthenticated());
        assert_eq!(identities, vec![IDENTITY_PUBLIC_ACCESS.clone()]);
    }

    #[test]
    fn test_public_access_present_exactly_once() {
        // A contributor that injects the public-access identity early must
        // not produce a duplicate when the final stage appends it.
        struct InjectPublic;
        impl IdentityContributor for InjectPublic {
            fn contribute(
                &self,
                _: &Context,
                mut identities: Vec<SecurityIdentity>,
            ) -> Vec<SecurityIdentity> {
                identities.push(IDENTITY_PUBLIC_ACCESS.clone());
                identities
            }
        }

        let mut resolver = resolver();
        resolver.register_contributor(Arc::new(InjectPublic));
        let identities = resolver.resolve(&full_context());
        let count = identities
            .iter()
            .filter(|i| **i == *IDENTITY_PUBLIC_ACCESS)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_organization_scoped_identities() {
        let orgctx = TestOrgContext {
            organization: Some(Organization {
                type_name: String::from("AppOrganization"),
                name: String::from("acme"),
                roles: vec![],
                user_organization: false,
            }),
            user: Some(OrganizationUser {
                roles: vec![String::from("ROLE_MANAGER")],
                groups: vec![GroupRef::new("AppGroup", "sales")],
            }),
        };
        let resolver =
            resolver().with_organization_context(Arc::new(orgctx));
        let identities = resolver.resolve(&full_context());

        assert!(identities.contains(&SecurityIdentity::organization(
            "AppOrganization",
            "acme"
        )));
        assert!(identities.contains(&SecurityIdentity::role(
            "AppRole",
            &org_scoped("ROLE_MANAGER", "acme")
        )));
        assert!(identities.contains(&SecurityIdentity::group(
            "AppGroup",
            &org_scoped("sales", "acme")
        )));
        // Organization-scoped roles must not leak unscoped.
        assert!(!identities
            .contains(&SecurityIdentity::role("AppRole", "ROLE_MANAGER")));
    }

    #[test]
    fn test_organization_role_fallback() {
        let organization = Organization {
            type_name: String::from("AppOrganization"),
            name: String::from("acme"),
            roles: vec![String::from("ROLE_ORG")],
            user_organization: false,
        };

        // No organization user: the organization's own roles apply.
        let with_org = resolver().with_organization_context(Arc::new(
            TestOrgContext { organization: Some(organization.clone()), user: None },
        ));
        let identities = with_org.resolve(&full_context());
        assert!(identities.contains(&SecurityIdentity::role(
            "AppRole",
            &org_scoped("ROLE_ORG", "acme")
        )));

        // A user organization never confers its own roles.
        let with_user_org = resolver().with_organization_context(Arc::new(
            TestOrgContext {
                organization: Some(Organization {
                    user_organization: true,
                    ..organization
                }),
                user: None,
            },
        ));
        let identities = with_user_org.resolve(&full_context());
        assert!(!identities.contains(&SecurityIdentity::role(
            "AppRole",
            &org_scoped("ROLE_ORG", "acme")
        )));
    }

    #[test]
    fn test_contributor_may_replace_set() {
        struct ReplaceAll;
        impl IdentityContributor for ReplaceAll {
            fn contribute(
                &self,
                _: &Context,
                _: Vec<SecurityIdentity>,
            ) -> Vec<SecurityIdentity> {
                vec![SecurityIdentity::system("api-key")]
            }
        }

        let mut resolver = resolver();
        resolver.register_contributor(Arc::new(ReplaceAll));
        let identities = resolver.resolve(&full_context());

        // The replacement dropped the actor-derived identities; the stages
        // after the contributor still ran.
        assert!(!identities
            .contains(&SecurityIdentity::user("AppUser", "alice")));
        assert_eq!(identities[0], SecurityIdentity::system("api-key"));
        assert!(identities.contains(&IDENTITY_PUBLIC_ACCESS));
    }

    #[test]
    fn test_special_identities_and_observers() {
        struct Recorder {
            counts: Mutex<Vec<usize>>,
        }
        impl IdentityObserver for Recorder {
            fn observe(&self, _: &Context, identities: &[SecurityIdentity]) {
                self.counts.lock().unwrap().push(identities.len());
            }
        }

        let recorder = Arc::new(Recorder { counts: Mutex::new(Vec::new()) });
        let mut resolver = resolver();
        resolver.register_special_identity(SecurityIdentity::system("backup"));
        resolver.register_pre_observer(recorder.clone());
        resolver.register_post_observer(recorder.clone());

        let identities = resolver.resolve(&full_context());
        assert!(identities.contains(&SecurityIdentity::system("backup")));

        let counts = recorder.counts.lock().unwrap();
        // Pre-stage saw the empty set, post-stage the complete one.
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0], 0);
        assert_eq!(counts[1], identities.len());
    }
}
