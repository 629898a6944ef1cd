use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::providers::{GroupProvider, ProfileProvider};
use super::subject::{Subject, SubjectClass};
use super::AuthzConfig;
use crate::errors::AppError;

/// Maps a concrete principal to the generic subject classes its mappings can
/// match, and to its group memberships.
pub struct SubjectResolver {
    profiles: Arc<dyn ProfileProvider>,
    groups: Option<Arc<dyn GroupProvider>>,
    config: AuthzConfig,
}

impl SubjectResolver {
    pub fn new(
        profiles: Arc<dyn ProfileProvider>,
        groups: Option<Arc<dyn GroupProvider>>,
        config: AuthzConfig,
    ) -> Self {
        Self {
            profiles,
            groups,
            config,
        }
    }

    /// The generic classes applicable to `subject` at `now`.
    ///
    /// Anonymous is always present: anonymous grants are a floor, not an
    /// exclusive class. Anonymous and group subjects return before any
    /// profile lookup; they have no profile to read.
    pub async fn applicable_classes(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<HashSet<SubjectClass>, AppError> {
        let mut classes = HashSet::from([SubjectClass::Anonymous]);

        let user_id = match subject {
            Subject::Anonymous | Subject::Group(_) => return Ok(classes),
            Subject::User(id) => *id,
        };

        classes.insert(SubjectClass::Authenticated);

        if self.config.org_membership_enabled {
            if let Some(profile) = self.profiles.profile_of(user_id).await? {
                if profile.is_active(now.date_naive()) {
                    classes.insert(SubjectClass::CustomGroup);
                } else {
                    tracing::debug!(user_id = %user_id, "org membership inactive or expired");
                }
            }
        }

        Ok(classes)
    }

    /// Concrete group memberships, empty when the groups subsystem is absent
    /// or the subject is not a user.
    pub async fn groups_for(&self, subject: &Subject) -> Result<Vec<Uuid>, AppError> {
        match (subject, &self.groups) {
            (Subject::User(id), Some(groups)) => groups.groups_for(*id).await,
            _ => Ok(Vec::new()),
        }
    }
}
