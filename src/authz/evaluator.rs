use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::context::EvaluationContext;
use super::providers::{GroupProvider, ProfileProvider};
use super::registry::RoleRegistry;
use super::resolver::SubjectResolver;
use super::store::MappingStore;
use super::subject::{PermissionName, SecuredTarget, Subject, SubjectClass};
use super::AuthzConfig;
use crate::errors::AppError;

/// Whether object listings include objects the subject owns even when no
/// mapping grants the permission. `MappedOnly` mirrors the owner override
/// living exclusively in the boolean check; `IncludeOwned` makes listings
/// agree with `has_permission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedVisibility {
    MappedOnly,
    IncludeOwned,
}

/// Composes resolver, mapping store, and role registry into the two caller
/// surfaces: a boolean check with owner short-circuit, and the reverse index
/// over object ids.
pub struct PermissionEvaluator {
    store: Arc<dyn MappingStore>,
    registry: Arc<dyn RoleRegistry>,
    resolver: SubjectResolver,
}

impl PermissionEvaluator {
    pub fn new(
        store: Arc<dyn MappingStore>,
        registry: Arc<dyn RoleRegistry>,
        profiles: Arc<dyn ProfileProvider>,
        groups: Option<Arc<dyn GroupProvider>>,
        config: AuthzConfig,
    ) -> Self {
        Self {
            store,
            registry,
            resolver: SubjectResolver::new(profiles, groups, config),
        }
    }

    /// Securable registration for an object; `None` means the object type /
    /// id is not protected here and evaluation will see no permissions.
    pub async fn lookup_target(
        &self,
        object_type: &str,
        object_id: Uuid,
    ) -> Result<Option<SecuredTarget>, AppError> {
        self.store.secured_target(object_type, object_id).await
    }

    /// May `subject` perform `permission` on `target`?
    ///
    /// The owner passes before any cache or mapping lookup. Everyone else is
    /// a membership test against the effective permission set.
    pub async fn has_permission(
        &self,
        ctx: &mut EvaluationContext,
        subject: &Subject,
        permission: &PermissionName,
        target: &SecuredTarget,
    ) -> Result<bool, AppError> {
        if let (Subject::User(user_id), Some(owner)) = (subject, target.owner) {
            if *user_id == owner {
                tracing::debug!(
                    user_id = %user_id,
                    object_type = %target.object_type,
                    object_id = %target.object_id,
                    "owner override"
                );
                return Ok(true);
            }
        }

        let effective = self.effective_permissions(ctx, subject, target).await?;
        let allowed = effective.contains(permission);
        tracing::debug!(
            permission = %permission,
            object_type = %target.object_type,
            object_id = %target.object_id,
            allowed,
            "permission evaluated"
        );
        Ok(allowed)
    }

    /// Union of permissions reachable from every mapping applicable to
    /// (subject, target), memoized in `ctx`. An empty set is the normal
    /// "no grants" outcome, not an error.
    pub async fn effective_permissions(
        &self,
        ctx: &mut EvaluationContext,
        subject: &Subject,
        target: &SecuredTarget,
    ) -> Result<HashSet<PermissionName>, AppError> {
        if let Some(hit) = ctx.cached(subject, target) {
            return Ok(hit.clone());
        }

        let mut role_ids: HashSet<Uuid> = HashSet::new();

        match subject {
            Subject::Group(group_id) => {
                // A group principal matches the anonymous floor plus its own
                // group-scoped mappings.
                let classes = [SubjectClass::Anonymous];
                role_ids.extend(self.store.generic_role_grants(target, &classes).await?);
                role_ids.extend(self.store.group_role_grants(target, *group_id).await?);
            }
            Subject::Anonymous | Subject::User(_) => {
                let classes: Vec<SubjectClass> = self
                    .resolver
                    .applicable_classes(subject, ctx.now)
                    .await?
                    .into_iter()
                    .collect();
                role_ids.extend(self.store.generic_role_grants(target, &classes).await?);

                if let Subject::User(user_id) = subject {
                    role_ids.extend(self.store.user_role_grants(target, *user_id).await?);

                    for group_id in self.resolver.groups_for(subject).await? {
                        role_ids.extend(self.store.group_role_grants(target, group_id).await?);
                    }
                }
            }
        }

        let mut permissions = HashSet::new();
        for role_id in role_ids {
            permissions.extend(self.registry.permissions_of(role_id).await?);
        }

        ctx.remember(subject, target, permissions.clone());
        Ok(permissions)
    }

    /// Object ids of `object_type` that `subject` can reach at `permission`.
    ///
    /// Fails with `UnknownPermission` when the permission string matches no
    /// registered permission. Union semantics keep re-queried classes
    /// idempotent.
    pub async fn objects_with_permission(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &str,
        owned: OwnedVisibility,
        now: DateTime<Utc>,
    ) -> Result<HashSet<Uuid>, AppError> {
        let permission = self.registry.resolve(permission).await?;

        let mut ids: HashSet<Uuid> = HashSet::new();
        let mut classes = vec![SubjectClass::Anonymous];

        match subject {
            Subject::Anonymous => {}
            Subject::User(user_id) => {
                classes = self
                    .resolver
                    .applicable_classes(subject, now)
                    .await?
                    .into_iter()
                    .collect();

                ids.extend(self.store.user_objects_with(object_type, *user_id, &permission).await?);

                for group_id in self.resolver.groups_for(subject).await? {
                    ids.extend(self.store.group_objects_with(object_type, group_id, &permission).await?);
                }

                if owned == OwnedVisibility::IncludeOwned {
                    ids.extend(self.store.owned_objects(object_type, *user_id).await?);
                }
            }
            Subject::Group(group_id) => {
                ids.extend(self.store.group_objects_with(object_type, *group_id, &permission).await?);
            }
        }

        ids.extend(self.store.generic_objects_with(object_type, &classes, &permission).await?);

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::providers::OrgProfile;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        // (object_type, object_id, class, role_id)
        generic: Vec<(String, Uuid, SubjectClass, Uuid)>,
        // (object_type, object_id, user_id, role_id)
        user: Vec<(String, Uuid, Uuid, Uuid)>,
        // (object_type, object_id, group_id, role_id)
        group: Vec<(String, Uuid, Uuid, Uuid)>,
        // (object_type, object_id, owner_id)
        owned: Vec<(String, Uuid, Uuid)>,
        grant_queries: AtomicUsize,
    }

    impl MemoryStore {
        fn grant_query_count(&self) -> usize {
            self.grant_queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MappingStore for MemoryStore {
        async fn generic_role_grants(
            &self,
            target: &SecuredTarget,
            classes: &[SubjectClass],
        ) -> Result<Vec<Uuid>, AppError> {
            self.grant_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .generic
                .iter()
                .filter(|(t, id, class, _)| {
                    *t == target.object_type && *id == target.object_id && classes.contains(class)
                })
                .map(|(_, _, _, role)| *role)
                .collect())
        }

        async fn user_role_grants(&self, target: &SecuredTarget, user: Uuid) -> Result<Vec<Uuid>, AppError> {
            self.grant_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .user
                .iter()
                .filter(|(t, id, u, _)| *t == target.object_type && *id == target.object_id && *u == user)
                .map(|(_, _, _, role)| *role)
                .collect())
        }

        async fn group_role_grants(&self, target: &SecuredTarget, group: Uuid) -> Result<Vec<Uuid>, AppError> {
            self.grant_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .group
                .iter()
                .filter(|(t, id, g, _)| *t == target.object_type && *id == target.object_id && *g == group)
                .map(|(_, _, _, role)| *role)
                .collect())
        }

        async fn generic_objects_with(
            &self,
            object_type: &str,
            classes: &[SubjectClass],
            permission: &PermissionName,
        ) -> Result<HashSet<Uuid>, AppError> {
            Ok(self
                .generic
                .iter()
                .filter(|(t, _, class, role)| {
                    t == object_type && classes.contains(class) && ROLE_GRANTS.with(|g| g.borrow().get(role).is_some_and(|p| p.contains(permission)))
                })
                .map(|(_, id, _, _)| *id)
                .collect())
        }

        async fn user_objects_with(
            &self,
            object_type: &str,
            user: Uuid,
            permission: &PermissionName,
        ) -> Result<HashSet<Uuid>, AppError> {
            Ok(self
                .user
                .iter()
                .filter(|(t, _, u, role)| {
                    t == object_type && *u == user && ROLE_GRANTS.with(|g| g.borrow().get(role).is_some_and(|p| p.contains(permission)))
                })
                .map(|(_, id, _, _)| *id)
                .collect())
        }

        async fn group_objects_with(
            &self,
            object_type: &str,
            group: Uuid,
            permission: &PermissionName,
        ) -> Result<HashSet<Uuid>, AppError> {
            Ok(self
                .group
                .iter()
                .filter(|(t, _, g, role)| {
                    t == object_type && *g == group && ROLE_GRANTS.with(|g2| g2.borrow().get(role).is_some_and(|p| p.contains(permission)))
                })
                .map(|(_, id, _, _)| *id)
                .collect())
        }

        async fn owned_objects(&self, object_type: &str, user: Uuid) -> Result<HashSet<Uuid>, AppError> {
            Ok(self
                .owned
                .iter()
                .filter(|(t, _, owner)| t == object_type && *owner == user)
                .map(|(_, id, _)| *id)
                .collect())
        }

        async fn secured_target(
            &self,
            object_type: &str,
            object_id: Uuid,
        ) -> Result<Option<SecuredTarget>, AppError> {
            Ok(self
                .owned
                .iter()
                .find(|(t, id, _)| t == object_type && *id == object_id)
                .map(|(t, id, owner)| SecuredTarget::new(t.clone(), *id, Some(*owner))))
        }
    }

    struct MemoryRegistry {
        registered: HashSet<PermissionName>,
        roles: HashMap<Uuid, HashSet<PermissionName>>,
    }

    #[async_trait]
    impl RoleRegistry for MemoryRegistry {
        async fn permissions_of(&self, role_id: Uuid) -> Result<HashSet<PermissionName>, AppError> {
            Ok(self.roles.get(&role_id).cloned().unwrap_or_default())
        }

        async fn resolve(&self, name: &str) -> Result<PermissionName, AppError> {
            let parsed = PermissionName::parse(name)?;
            if self.registered.contains(&parsed) {
                Ok(parsed)
            } else {
                Err(AppError::unknown_permission(name))
            }
        }
    }

    struct MemoryProfiles(HashMap<Uuid, OrgProfile>);

    #[async_trait]
    impl ProfileProvider for MemoryProfiles {
        async fn profile_of(&self, user: Uuid) -> Result<Option<OrgProfile>, AppError> {
            Ok(self.0.get(&user).cloned())
        }
    }

    struct MemoryGroups(HashMap<Uuid, Vec<Uuid>>);

    #[async_trait]
    impl GroupProvider for MemoryGroups {
        async fn groups_for(&self, user: Uuid) -> Result<Vec<Uuid>, AppError> {
            Ok(self.0.get(&user).cloned().unwrap_or_default())
        }
    }

    // objects_with fakes need the role->permission expansion the SQL store
    // performs via joins; mirrored here through a thread-local shared with
    // MemoryRegistry setup.
    thread_local! {
        static ROLE_GRANTS: std::cell::RefCell<HashMap<Uuid, HashSet<PermissionName>>> =
            std::cell::RefCell::new(HashMap::new());
    }

    fn view() -> PermissionName {
        PermissionName::new("base", "view_resourcebase")
    }

    fn change() -> PermissionName {
        PermissionName::new("base", "change_resourcebase")
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        evaluator: PermissionEvaluator,
    }

    fn fixture(
        store: MemoryStore,
        roles: HashMap<Uuid, HashSet<PermissionName>>,
        profiles: HashMap<Uuid, OrgProfile>,
        groups: Option<HashMap<Uuid, Vec<Uuid>>>,
        org_enabled: bool,
    ) -> Fixture {
        ROLE_GRANTS.with(|g| *g.borrow_mut() = roles.clone());

        let store = Arc::new(store);
        let registry = MemoryRegistry {
            registered: [view(), change()].into_iter().collect(),
            roles,
        };

        let evaluator = PermissionEvaluator::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(MemoryProfiles(profiles)),
            groups.map(|g| Arc::new(MemoryGroups(g)) as Arc<dyn GroupProvider>),
            AuthzConfig {
                org_membership_enabled: org_enabled,
            },
        );

        Fixture { store, evaluator }
    }

    fn viewer_role() -> (Uuid, HashMap<Uuid, HashSet<PermissionName>>) {
        let role = Uuid::new_v4();
        let roles = HashMap::from([(role, [view()].into_iter().collect())]);
        (role, roles)
    }

    #[tokio::test]
    async fn owner_passes_every_check_without_mappings() {
        let owner = Uuid::new_v4();
        let object = SecuredTarget::new("map", Uuid::new_v4(), Some(owner));
        let f = fixture(MemoryStore::default(), HashMap::new(), HashMap::new(), None, false);

        let mut ctx = EvaluationContext::new();
        let allowed = f
            .evaluator
            .has_permission(&mut ctx, &Subject::User(owner), &PermissionName::new("base", "delete_resourcebase"), &object)
            .await
            .unwrap();

        assert!(allowed);
        // The override never consults the store.
        assert_eq!(f.store.grant_query_count(), 0);
    }

    #[tokio::test]
    async fn anonymous_viewer_mapping_grants_view_only() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::Anonymous, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);

        let mut ctx = EvaluationContext::new();
        assert!(f
            .evaluator
            .has_permission(&mut ctx, &Subject::Anonymous, &view(), &object)
            .await
            .unwrap());
        assert!(!f
            .evaluator
            .has_permission(&mut ctx, &Subject::Anonymous, &change(), &object)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn anonymous_floor_applies_to_logged_in_users() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::Anonymous, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);

        let mut ctx = EvaluationContext::new();
        assert!(f
            .evaluator
            .has_permission(&mut ctx, &Subject::User(Uuid::new_v4()), &view(), &object)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn authenticated_mappings_never_reach_anonymous() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::Authenticated, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);

        let mut ctx = EvaluationContext::new();
        assert!(!f
            .evaluator
            .has_permission(&mut ctx, &Subject::Anonymous, &view(), &object)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn has_permission_is_membership_in_effective_set() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let user = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            user: vec![("map".into(), object_id, user, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);
        let subject = Subject::User(user);

        let mut ctx = EvaluationContext::new();
        let effective = f
            .evaluator
            .effective_permissions(&mut ctx, &subject, &object)
            .await
            .unwrap();

        for perm in [view(), change()] {
            let allowed = f
                .evaluator
                .has_permission(&mut ctx, &subject, &perm, &object)
                .await
                .unwrap();
            assert_eq!(allowed, effective.contains(&perm));
        }
    }

    #[tokio::test]
    async fn second_evaluation_hits_the_cache() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::Anonymous, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);

        let mut ctx = EvaluationContext::new();
        let first = f
            .evaluator
            .effective_permissions(&mut ctx, &Subject::Anonymous, &object)
            .await
            .unwrap();
        let queries_after_first = f.store.grant_query_count();

        let second = f
            .evaluator
            .effective_permissions(&mut ctx, &Subject::Anonymous, &object)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.grant_query_count(), queries_after_first);

        // A fresh context re-queries: nothing is shared across requests.
        let mut fresh = EvaluationContext::new();
        let _ = f
            .evaluator
            .effective_permissions(&mut fresh, &Subject::Anonymous, &object)
            .await
            .unwrap();
        assert!(f.store.grant_query_count() > queries_after_first);
    }

    #[tokio::test]
    async fn expired_org_membership_drops_customgroup_grants() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let user = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::CustomGroup, role)],
            ..Default::default()
        };

        let expired = HashMap::from([(
            user,
            OrgProfile {
                is_org_member: true,
                member_expiration: Some(NaiveDate::parse_from_str("2020-01-01", "%Y-%m-%d").unwrap()),
            },
        )]);
        let f = fixture(store, roles, expired, None, true);

        let mut ctx = EvaluationContext::new();
        assert!(!f
            .evaluator
            .has_permission(&mut ctx, &Subject::User(user), &view(), &object)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn active_org_membership_applies_customgroup_grants() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let user = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::CustomGroup, role)],
            ..Default::default()
        };

        let active = HashMap::from([(
            user,
            OrgProfile {
                is_org_member: true,
                member_expiration: Some(NaiveDate::parse_from_str("2099-01-01", "%Y-%m-%d").unwrap()),
            },
        )]);
        let f = fixture(store, roles, active, None, true);

        let mut ctx = EvaluationContext::new();
        assert!(f
            .evaluator
            .has_permission(&mut ctx, &Subject::User(user), &view(), &object)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn group_mappings_union_into_user_permissions() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            group: vec![("map".into(), object_id, group, role)],
            ..Default::default()
        };
        let memberships = HashMap::from([(user, vec![group])]);
        let f = fixture(store, roles, HashMap::new(), Some(memberships), false);

        let mut ctx = EvaluationContext::new();
        assert!(f
            .evaluator
            .has_permission(&mut ctx, &Subject::User(user), &view(), &object)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn absent_groups_subsystem_ignores_group_mappings() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            group: vec![("map".into(), object_id, group, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);

        let mut ctx = EvaluationContext::new();
        assert!(!f
            .evaluator
            .has_permission(&mut ctx, &Subject::User(user), &view(), &object)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn role_without_grants_yields_no_access() {
        let object_id = Uuid::new_v4();
        let object = SecuredTarget::new("map", object_id, None);
        let empty_role = Uuid::new_v4();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::Anonymous, empty_role)],
            ..Default::default()
        };
        let roles = HashMap::from([(empty_role, HashSet::new())]);
        let f = fixture(store, roles, HashMap::new(), None, false);

        let mut ctx = EvaluationContext::new();
        let effective = f
            .evaluator
            .effective_permissions(&mut ctx, &Subject::Anonymous, &object)
            .await
            .unwrap();
        assert!(effective.is_empty());
    }

    #[tokio::test]
    async fn unknown_permission_string_is_an_error() {
        let f = fixture(MemoryStore::default(), HashMap::new(), HashMap::new(), None, false);

        let err = f
            .evaluator
            .objects_with_permission(
                &Subject::Anonymous,
                "bogus.permission",
                "map",
                OwnedVisibility::MappedOnly,
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnknownPermission(_)));
    }

    #[tokio::test]
    async fn listing_agrees_with_boolean_check_for_mapped_objects() {
        let mapped_id = Uuid::new_v4();
        let unmapped_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            user: vec![("map".into(), mapped_id, user, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);
        let subject = Subject::User(user);

        let ids = f
            .evaluator
            .objects_with_permission(&subject, "base.view_resourcebase", "map", OwnedVisibility::MappedOnly, Utc::now())
            .await
            .unwrap();
        assert!(ids.contains(&mapped_id));
        assert!(!ids.contains(&unmapped_id));

        let mut ctx = EvaluationContext::new();
        let mapped = SecuredTarget::new("map", mapped_id, None);
        let unmapped = SecuredTarget::new("map", unmapped_id, None);
        assert!(f.evaluator.has_permission(&mut ctx, &subject, &view(), &mapped).await.unwrap());
        assert!(!f.evaluator.has_permission(&mut ctx, &subject, &view(), &unmapped).await.unwrap());
    }

    #[tokio::test]
    async fn owned_visibility_controls_unmapped_owned_objects() {
        let owned_id = Uuid::new_v4();
        let owner = Uuid::new_v4();

        let store = MemoryStore {
            owned: vec![("map".into(), owned_id, owner)],
            ..Default::default()
        };
        let f = fixture(store, HashMap::new(), HashMap::new(), None, false);
        let subject = Subject::User(owner);

        // note: the permission must still resolve, so register view() via
        // fixture and query it.
        let mapped_only = f
            .evaluator
            .objects_with_permission(&subject, "base.view_resourcebase", "map", OwnedVisibility::MappedOnly, Utc::now())
            .await
            .unwrap();
        assert!(!mapped_only.contains(&owned_id));

        let with_owned = f
            .evaluator
            .objects_with_permission(&subject, "base.view_resourcebase", "map", OwnedVisibility::IncludeOwned, Utc::now())
            .await
            .unwrap();
        assert!(with_owned.contains(&owned_id));

        // The boolean check always honors ownership, so IncludeOwned is the
        // variant consistent with it.
        let mut ctx = EvaluationContext::new();
        let object = SecuredTarget::new("map", owned_id, Some(owner));
        assert!(f.evaluator.has_permission(&mut ctx, &subject, &view(), &object).await.unwrap());
    }

    #[tokio::test]
    async fn group_subject_lists_its_group_scoped_objects() {
        let object_id = Uuid::new_v4();
        let group = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            group: vec![("map".into(), object_id, group, role)],
            ..Default::default()
        };
        let f = fixture(store, roles, HashMap::new(), None, false);

        let ids = f
            .evaluator
            .objects_with_permission(&Subject::Group(group), "base.view_resourcebase", "map", OwnedVisibility::MappedOnly, Utc::now())
            .await
            .unwrap();

        assert_eq!(ids, HashSet::from([object_id]));
    }

    #[tokio::test]
    async fn customgroup_listing_requires_active_membership() {
        let object_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let (role, roles) = viewer_role();

        let store = MemoryStore {
            generic: vec![("map".into(), object_id, SubjectClass::CustomGroup, role)],
            ..Default::default()
        };
        let active = HashMap::from([(
            user,
            OrgProfile {
                is_org_member: true,
                member_expiration: Some(NaiveDate::parse_from_str("2099-01-01", "%Y-%m-%d").unwrap()),
            },
        )]);
        let f = fixture(store, roles, active, None, true);

        let ids = f
            .evaluator
            .objects_with_permission(&Subject::User(user), "base.view_resourcebase", "map", OwnedVisibility::MappedOnly, Utc::now())
            .await
            .unwrap();
        assert!(ids.contains(&object_id));

        // Anonymous never sees customgroup-scoped grants.
        let anon = f
            .evaluator
            .objects_with_permission(&Subject::Anonymous, "base.view_resourcebase", "map", OwnedVisibility::MappedOnly, Utc::now())
            .await
            .unwrap();
        assert!(anon.is_empty());
    }
}
