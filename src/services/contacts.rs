//! Per-user contacts, favorites and notification flags.
//!
//! Adds are idempotent and report whether anything changed. Removals are
//! tolerant: removing an absent entry succeeds, and no access is re-checked.

use super::presence::normalize_topic;
use super::{TopicAccessGuard, load_actor, load_topic, load_user, observe};
use crate::db::{Contact, Database, Presence, PresenceFilter, User};
use crate::error::{ServiceError, ServiceResult};
use serde::Serialize;
use tracing::debug;

/// Contacts of a user together with their recent presences.
#[derive(Debug, Clone, Serialize)]
pub struct ContactsPresences {
    pub contacts: Vec<Contact>,
    pub count_presences: i64,
    pub presences: Vec<Presence>,
}

/// Registry of per-user collections.
#[derive(Clone)]
pub struct ContactAndFavoritesRegistry {
    db: Database,
    guard: TopicAccessGuard,
}

impl ContactAndFavoritesRegistry {
    pub fn new(db: Database, guard: TopicAccessGuard) -> Self {
        Self { db, guard }
    }

    /// Add an existing user to `username`'s contacts.
    pub async fn add_contact(&self, username: &str, contact: &str) -> ServiceResult<bool> {
        observe("add_contact", username, Some(contact), async {
            let user = load_actor(&self.db, username).await?;
            let target = load_user(&self.db, contact.trim()).await?;
            let added = self
                .db
                .users()
                .add_contact(user.id, &target.username, &target.fullname)
                .await?;
            debug!(username, contact = %target.username, added, "Contact added");
            Ok(added)
        })
        .await
    }

    pub async fn remove_contact(&self, username: &str, contact: &str) -> ServiceResult<bool> {
        observe("remove_contact", username, Some(contact), async {
            let user = load_actor(&self.db, username).await?;
            Ok(self.db.users().remove_contact(user.id, contact.trim()).await?)
        })
        .await
    }

    /// Favorite a topic the user can read.
    pub async fn add_favorite_topic(&self, username: &str, raw_topic: &str) -> ServiceResult<bool> {
        let path = normalize_topic(raw_topic);
        observe("add_favorite_topic", username, Some(&path), async {
            let user = self.readable(username, &path).await?;
            Ok(self.db.users().add_favorite_topic(user.id, &path).await?)
        })
        .await
    }

    pub async fn remove_favorite_topic(&self, username: &str, raw_topic: &str) -> ServiceResult<bool> {
        let path = normalize_topic(raw_topic);
        observe("remove_favorite_topic", username, Some(&path), async {
            let user = load_actor(&self.db, username).await?;
            Ok(self.db.users().remove_favorite_topic(user.id, &path).await?)
        })
        .await
    }

    pub async fn add_favorite_tag(&self, username: &str, tag: &str) -> ServiceResult<bool> {
        observe("add_favorite_tag", username, Some(tag), async {
            let tag = require_tag(tag)?;
            let user = load_actor(&self.db, username).await?;
            Ok(self.db.users().add_favorite_tag(user.id, tag).await?)
        })
        .await
    }

    pub async fn remove_favorite_tag(&self, username: &str, tag: &str) -> ServiceResult<bool> {
        observe("remove_favorite_tag", username, Some(tag), async {
            let tag = require_tag(tag)?;
            let user = load_actor(&self.db, username).await?;
            Ok(self.db.users().remove_favorite_tag(user.id, tag).await?)
        })
        .await
    }

    /// Resume broadcast notifications for a topic the user can read.
    pub async fn enable_notifications_topic(
        &self,
        username: &str,
        raw_topic: &str,
    ) -> ServiceResult<bool> {
        let path = normalize_topic(raw_topic);
        observe("enable_notifications_topic", username, Some(&path), async {
            let user = self.readable(username, &path).await?;
            Ok(self.db.users().enable_notifications(user.id, &path).await?)
        })
        .await
    }

    /// Suppress broadcast notifications for a topic.
    pub async fn disable_notifications_topic(
        &self,
        username: &str,
        raw_topic: &str,
    ) -> ServiceResult<bool> {
        let path = normalize_topic(raw_topic);
        observe("disable_notifications_topic", username, Some(&path), async {
            if path.is_empty() {
                return Err(ServiceError::Validation("topic is required".into()));
            }
            let user = load_actor(&self.db, username).await?;
            Ok(self.db.users().disable_notifications(user.id, &path).await?)
        })
        .await
    }

    /// Contacts of `username` and their presences of the last `since_seconds`.
    pub async fn contacts_presences(
        &self,
        username: &str,
        since_seconds: i64,
    ) -> ServiceResult<ContactsPresences> {
        observe("contacts_presences", username, None, async {
            if since_seconds < 0 {
                return Err(ServiceError::Validation(format!(
                    "invalid presence window: {since_seconds}"
                )));
            }

            let user = load_user(&self.db, username).await?;
            if user.contacts.is_empty() {
                return Ok(ContactsPresences {
                    contacts: Vec::new(),
                    count_presences: 0,
                    presences: Vec::new(),
                });
            }

            let filter = PresenceFilter {
                usernames: user.contacts.iter().map(|c| c.username.clone()).collect(),
                date_min: Some(chrono::Utc::now().timestamp() - since_seconds),
                ..Default::default()
            };
            let (count_presences, presences) = self.db.presences().list(&filter).await?;

            Ok(ContactsPresences {
                contacts: user.contacts,
                count_presences,
                presences,
            })
        })
        .await
    }

    /// Resolve an active user holding read access on an existing topic.
    async fn readable(&self, username: &str, path: &str) -> ServiceResult<User> {
        let user = load_actor(&self.db, username).await?;
        let topic = load_topic(&self.db, path).await?;
        if !self.guard.has_read_access(&topic, &user) {
            return Err(ServiceError::Forbidden(format!(
                "no read access to topic {path}"
            )));
        }
        Ok(user)
    }
}

fn require_tag(tag: &str) -> ServiceResult<&str> {
    let tag = tag.trim();
    if tag.is_empty() {
        Err(ServiceError::Validation("tag is required".into()))
    } else {
        Ok(tag)
    }
}
