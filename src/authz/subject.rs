use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// The acting principal being authorized. Closed set: callers construct one
/// of these explicitly, and the resolver matches exhaustively instead of
/// sniffing types at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// A visitor with no session.
    Anonymous,
    /// A logged-in user.
    User(Uuid),
    /// A group acting collectively, e.g. when listing what a whole group can
    /// reach.
    Group(Uuid),
}

impl Subject {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Subject::Anonymous)
    }
}

/// Generic subject classes a mapping can target. Anonymous grants are a
/// floor that applies to every subject; the other two are added by the
/// resolver for logged-in users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectClass {
    Anonymous,
    Authenticated,
    CustomGroup,
}

impl SubjectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectClass::Anonymous => "anonymous",
            SubjectClass::Authenticated => "authenticated",
            SubjectClass::CustomGroup => "customgroup",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "anonymous" => Ok(SubjectClass::Anonymous),
            "authenticated" => Ok(SubjectClass::Authenticated),
            "customgroup" => Ok(SubjectClass::CustomGroup),
            other => Err(AppError::bad_request(format!("invalid subject class: {other}"))),
        }
    }
}

impl fmt::Display for SubjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A permission identifier, `namespace.codename` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionName {
    pub namespace: String,
    pub codename: String,
}

impl PermissionName {
    pub fn new(namespace: impl Into<String>, codename: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            codename: codename.into(),
        }
    }

    /// Split `"namespace.codename"` at the first dot. A string without a dot
    /// cannot name any registered permission.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.split_once('.') {
            Some((namespace, codename)) if !namespace.is_empty() && !codename.is_empty() => {
                Ok(Self::new(namespace, codename))
            }
            _ => Err(AppError::unknown_permission(raw)),
        }
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.codename)
    }
}

/// Reference to a protected entity. `owner`, when present, passes every
/// permission check without consulting mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuredTarget {
    pub object_type: String,
    pub object_id: Uuid,
    pub owner: Option<Uuid>,
}

impl SecuredTarget {
    pub fn new(object_type: impl Into<String>, object_id: Uuid, owner: Option<Uuid>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id,
            owner,
        }
    }
}
