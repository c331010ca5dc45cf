//! Presence writes and visibility.
//!
//! [`build_query`] turns a topic path into a presence filter. A DM topic
//! `/Private/<me>/DM/<peer>` also matches its mirror `/Private/<peer>/DM/<me>`,
//! so each side of a conversation sees the presence the other side wrote
//! under its own tree.

use super::effect::{Effect, EffectQueue, Event, EventKind};
use super::{TopicAccessGuard, load_actor, load_topic, observe};
use crate::db::{Database, Presence, PresenceFilter};
use crate::error::{ServiceError, ServiceResult};
use tracing::debug;

/// Window used by [`PresenceService::create_and_get`].
pub const RECENT_WINDOW_SECS: i64 = 15;

/// Page size used by [`PresenceService::create_and_get`].
pub const RECENT_LIMIT: i64 = 1000;

/// Prepend the leading separator routed parameters lose.
pub fn normalize_topic(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{raw}")
    }
}

/// Build the presence filter for `raw_topic` as seen by `requesting`.
///
/// A path under `/Private/<requesting>/DM` must have exactly five segments;
/// anything else is rejected rather than narrowed to a partial result.
pub fn build_query(raw_topic: &str, requesting: &str) -> ServiceResult<PresenceFilter> {
    let topic = normalize_topic(raw_topic);
    if topic.is_empty() {
        return Err(ServiceError::Validation("topic is required".into()));
    }

    let dm_root = format!("/Private/{requesting}/DM");
    if topic != dm_root && !topic.starts_with(&format!("{dm_root}/")) {
        return Ok(PresenceFilter::for_topic(topic));
    }

    let segments: Vec<&str> = topic.split('/').collect();
    let peer = match segments.as_slice() {
        ["", "Private", _, "DM", peer] if !peer.is_empty() => *peer,
        _ => {
            return Err(ServiceError::Validation(format!(
                "invalid direct message topic {topic}"
            )));
        }
    };

    let mirror = format!("/Private/{peer}/DM/{requesting}");
    Ok(PresenceFilter {
        topics: vec![topic, mirror],
        ..Default::default()
    })
}

/// Optional narrowing applied on top of [`build_query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceCriteria {
    pub status: Option<String>,
    /// Usernames to keep; empty keeps everyone.
    pub usernames: Vec<String>,
    pub date_min_presence: Option<i64>,
    pub date_max_presence: Option<i64>,
    pub skip: i64,
    pub limit: i64,
}

impl Default for PresenceCriteria {
    fn default() -> Self {
        Self {
            status: None,
            usernames: Vec::new(),
            date_min_presence: None,
            date_max_presence: None,
            skip: 0,
            limit: 100,
        }
    }
}

impl PresenceCriteria {
    fn apply(self, mut filter: PresenceFilter) -> PresenceFilter {
        filter.status = self.status.filter(|s| !s.trim().is_empty());
        filter.usernames = self.usernames;
        filter.date_min = self.date_min_presence;
        filter.date_max = self.date_max_presence;
        filter.skip = self.skip;
        filter.limit = self.limit;
        filter
    }
}

/// Presence operations gated by topic access.
#[derive(Clone)]
pub struct PresenceService {
    db: Database,
    guard: TopicAccessGuard,
    effects: EffectQueue,
}

impl PresenceService {
    pub fn new(db: Database, guard: TopicAccessGuard, effects: EffectQueue) -> Self {
        Self { db, guard, effects }
    }

    /// Record `username`'s presence on a topic it can read.
    pub async fn create(
        &self,
        username: &str,
        raw_topic: &str,
        status: &str,
    ) -> ServiceResult<Presence> {
        let path = normalize_topic(raw_topic);
        observe(
            "create_presence",
            username,
            Some(&path),
            self.create_inner(username, &path, status),
        )
        .await
    }

    async fn create_inner(
        &self,
        username: &str,
        path: &str,
        status: &str,
    ) -> ServiceResult<Presence> {
        let status = status.trim();
        if status.is_empty() {
            return Err(ServiceError::Validation("invalid status for presence".into()));
        }

        let user = load_actor(&self.db, username).await?;
        let topic = load_topic(&self.db, path).await?;
        if !self.guard.has_read_access(&topic, &user) {
            return Err(ServiceError::Forbidden(format!(
                "no read access to topic {path}"
            )));
        }

        let presence = self.db.presences().upsert(&user, &topic.path, status).await?;
        debug!(username = %user.username, topic = %topic.path, status, "Presence recorded");
        self.effects
            .submit(Effect::Publish(Event::new(EventKind::PresenceCreated, &presence)));
        Ok(presence)
    }

    /// List presences visible on a topic `username` can read.
    pub async fn list(
        &self,
        username: &str,
        raw_topic: &str,
        criteria: PresenceCriteria,
    ) -> ServiceResult<(i64, Vec<Presence>)> {
        let path = normalize_topic(raw_topic);
        observe(
            "list_presences",
            username,
            Some(&path),
            self.list_inner(username, &path, criteria),
        )
        .await
    }

    async fn list_inner(
        &self,
        username: &str,
        path: &str,
        criteria: PresenceCriteria,
    ) -> ServiceResult<(i64, Vec<Presence>)> {
        let filter = build_query(path, username)?;
        let user = load_actor(&self.db, username).await?;
        let topic = load_topic(&self.db, path).await?;
        if !self.guard.has_read_access(&topic, &user) {
            return Err(ServiceError::Forbidden(format!(
                "no read access to topic {path}"
            )));
        }

        let filter = criteria.apply(filter);
        Ok(self.db.presences().list(&filter).await?)
    }

    /// Record a presence, then return everyone seen on the topic recently.
    pub async fn create_and_get(
        &self,
        username: &str,
        raw_topic: &str,
        status: &str,
    ) -> ServiceResult<(i64, Vec<Presence>)> {
        self.create(username, raw_topic, status).await?;
        let criteria = PresenceCriteria {
            date_min_presence: Some(chrono::Utc::now().timestamp() - RECENT_WINDOW_SECS),
            limit: RECENT_LIMIT,
            ..Default::default()
        };
        self.list(username, raw_topic, criteria).await
    }
}
