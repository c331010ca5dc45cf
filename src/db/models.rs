//! Database models shared by the repositories.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Identity columns that must be unique across all users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    Fullname,
}

impl UniqueField {
    /// Column name in the `users` table.
    pub fn column(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::Fullname => "fullname",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Single-use token purposes. At most one live token per (user, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Verify,
    Reset,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Reset => "reset",
        }
    }
}

/// Lifecycle state derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    /// Created, email not verified yet.
    Pending,
    /// Verified.
    Active,
    /// Terminal.
    Archived,
}

/// A contact entry kept on the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub username: String,
    pub fullname: String,
}

/// A user account. Credentials are never loaded into this type.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(skip)]
    pub id: i64,
    pub username: String,
    pub fullname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    pub is_system: bool,
    pub is_admin: bool,
    pub is_archived: bool,
    pub can_write_notifications: bool,
    pub created_at: i64,
    pub verified_at: Option<i64>,
    pub contacts: Vec<Contact>,
    pub favorite_topics: BTreeSet<String>,
    pub favorite_tags: BTreeSet<String>,
    pub topics_notifications_disabled: BTreeSet<String>,
    pub groups: BTreeSet<String>,
}

impl User {
    pub fn state(&self) -> UserState {
        if self.is_archived {
            UserState::Archived
        } else if self.verified_at.is_some() {
            UserState::Active
        } else {
            UserState::Pending
        }
    }

    pub fn has_contact(&self, username: &str) -> bool {
        self.contacts.iter().any(|c| c.username == username)
    }
}

/// A topic and its access control lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Topic {
    #[serde(skip)]
    pub id: i64,
    pub path: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub read_users: BTreeSet<String>,
    pub write_users: BTreeSet<String>,
    pub read_groups: BTreeSet<String>,
    pub write_groups: BTreeSet<String>,
}

/// Current liveness of one user on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presence {
    pub username: String,
    pub fullname: String,
    pub topic: String,
    pub status: String,
    pub date_presence: i64,
}

/// Presence query. Every populated field narrows the result; list fields
/// match any of their values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceFilter {
    pub topics: Vec<String>,
    pub usernames: Vec<String>,
    pub status: Option<String>,
    /// Inclusive lower bound on `date_presence` (unix seconds).
    pub date_min: Option<i64>,
    /// Inclusive upper bound on `date_presence` (unix seconds).
    pub date_max: Option<i64>,
    pub skip: i64,
    pub limit: i64,
}

impl Default for PresenceFilter {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            usernames: Vec::new(),
            status: None,
            date_min: None,
            date_max: None,
            skip: 0,
            limit: 100,
        }
    }
}

impl PresenceFilter {
    /// Filter matching exactly one topic.
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            topics: vec![topic.into()],
            ..Default::default()
        }
    }
}

/// User listing criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCriteria {
    pub username: Option<String>,
    pub fullname: Option<String>,
    pub date_min_creation: Option<i64>,
    pub date_max_creation: Option<i64>,
    pub with_groups: bool,
    pub skip: i64,
    pub limit: i64,
}

impl Default for UserCriteria {
    fn default() -> Self {
        Self {
            username: None,
            fullname: None,
            date_min_creation: None,
            date_max_creation: None,
            with_groups: false,
            skip: 0,
            limit: 100,
        }
    }
}
