use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::subject::{PermissionName, SecuredTarget, Subject};

/// Per-request evaluation state: the timestamp every membership-expiry
/// comparison uses, and the effective-permission memo.
///
/// Callers create one context at the start of a logical request and drop it
/// at the end. The cache is keyed by (subject, object type, object id) and is
/// never shared across requests, so a mapping mutation is visible to the next
/// request without any invalidation protocol.
pub struct EvaluationContext {
    pub now: DateTime<Utc>,
    cache: HashMap<(Subject, String, Uuid), HashSet<PermissionName>>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Pin the evaluation timestamp, e.g. in tests exercising membership
    /// expiry.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            cache: HashMap::new(),
        }
    }

    pub(crate) fn cached(&self, subject: &Subject, target: &SecuredTarget) -> Option<&HashSet<PermissionName>> {
        self.cache
            .get(&(subject.clone(), target.object_type.clone(), target.object_id))
    }

    pub(crate) fn remember(
        &mut self,
        subject: &Subject,
        target: &SecuredTarget,
        permissions: HashSet<PermissionName>,
    ) {
        self.cache.insert(
            (subject.clone(), target.object_type.clone(), target.object_id),
            permissions,
        );
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> usize {
        self.cache.len()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> SecuredTarget {
        SecuredTarget::new("map", Uuid::new_v4(), None)
    }

    #[test]
    fn remember_then_hit() {
        let mut ctx = EvaluationContext::new();
        let subject = Subject::User(Uuid::new_v4());
        let obj = target();

        assert!(ctx.cached(&subject, &obj).is_none());

        let perms: HashSet<_> = [PermissionName::new("base", "view_resourcebase")].into_iter().collect();
        ctx.remember(&subject, &obj, perms.clone());

        assert_eq!(ctx.cached(&subject, &obj), Some(&perms));
    }

    #[test]
    fn entries_are_per_subject() {
        let mut ctx = EvaluationContext::new();
        let obj = target();
        let alice = Subject::User(Uuid::new_v4());
        let bob = Subject::User(Uuid::new_v4());

        ctx.remember(&alice, &obj, HashSet::new());

        assert!(ctx.cached(&bob, &obj).is_none());
        assert_eq!(ctx.entries(), 1);
    }
}
