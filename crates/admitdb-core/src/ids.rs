//! Identifiers
//!
//! Newtypes for the ids that link orders, users and plans, plus the
//! `UserRef` variant that replaces the `"guest"` string sentinel.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire value used for orders placed without an authenticated user
pub const GUEST_SENTINEL: &str = "guest";

/// Store-assigned order identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Auth-assigned user identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog SKU identifier (e.g. "cheatsheet")
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Plan ids are compared lowercase
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who an order belongs to.
///
/// Serialized as the plain user id, or `"guest"` for unauthenticated
/// purchases, so stored documents and gateway metadata keep their shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserRef {
    Authenticated(UserId),
    Guest,
}

impl UserRef {
    /// Absent, empty and `"guest"` all mean a guest purchase
    pub fn from_optional(raw: Option<&str>) -> Self {
        raw.map_or(Self::Guest, |s| Self::from(s.to_string()))
    }

    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Authenticated(id) => Some(id),
            Self::Guest => None,
        }
    }

    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Authenticated(id) => id.as_str(),
            Self::Guest => GUEST_SENTINEL,
        }
    }
}

impl From<String> for UserRef {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(GUEST_SENTINEL) {
            Self::Guest
        } else {
            Self::Authenticated(UserId::from_string(trimmed))
        }
    }
}

impl From<UserRef> for String {
    fn from(user: UserRef) -> Self {
        user.as_str().to_string()
    }
}

impl std::fmt::Display for UserRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
