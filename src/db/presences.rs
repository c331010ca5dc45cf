//! Presence repository.

use super::models::{Presence, PresenceFilter, User};
use super::{DbError, placeholders};
use sqlx::SqlitePool;

/// Repository for presence operations.
pub struct PresenceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PresenceRepository<'a> {
    /// Create a new presence repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or refresh the presence of `user` on `topic`.
    ///
    /// The (user, topic) UNIQUE constraint keeps exactly one current row; a
    /// later write replaces status and timestamp.
    pub async fn upsert(&self, user: &User, topic: &str, status: &str) -> Result<Presence, DbError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO presences (user_id, username, fullname, topic, status, date_presence)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, topic) DO UPDATE
            SET status = excluded.status,
                date_presence = excluded.date_presence,
                username = excluded.username,
                fullname = excluded.fullname
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.fullname)
        .bind(topic)
        .bind(status)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(Presence {
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            topic: topic.to_string(),
            status: status.to_string(),
            date_presence: now,
        })
    }

    /// List presences matching `filter`, most recent first. Returns the total
    /// number of matches (ignoring skip/limit) and the requested page.
    pub async fn list(&self, filter: &PresenceFilter) -> Result<(i64, Vec<Presence>), DbError> {
        let mut clauses: Vec<String> = Vec::new();

        if !filter.topics.is_empty() {
            clauses.push(format!("topic IN ({})", placeholders(filter.topics.len())));
        }
        if !filter.usernames.is_empty() {
            clauses.push(format!(
                "username IN ({})",
                placeholders(filter.usernames.len())
            ));
        }
        if filter.status.is_some() {
            clauses.push("status = ?".to_string());
        }
        if filter.date_min.is_some() {
            clauses.push("date_presence >= ?".to_string());
        }
        if filter.date_max.is_some() {
            clauses.push("date_presence <= ?".to_string());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM presences {where_clause}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for topic in &filter.topics {
            count_q = count_q.bind(topic);
        }
        for username in &filter.usernames {
            count_q = count_q.bind(username);
        }
        if let Some(status) = &filter.status {
            count_q = count_q.bind(status);
        }
        if let Some(min) = filter.date_min {
            count_q = count_q.bind(min);
        }
        if let Some(max) = filter.date_max {
            count_q = count_q.bind(max);
        }
        let count = count_q.fetch_one(self.pool).await?;

        let list_sql = format!(
            r#"
            SELECT username, fullname, topic, status, date_presence
            FROM presences
            {where_clause}
            ORDER BY date_presence DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        );
        let mut q = sqlx::query_as::<_, (String, String, String, String, i64)>(&list_sql);
        for topic in &filter.topics {
            q = q.bind(topic);
        }
        for username in &filter.usernames {
            q = q.bind(username);
        }
        if let Some(status) = &filter.status {
            q = q.bind(status);
        }
        if let Some(min) = filter.date_min {
            q = q.bind(min);
        }
        if let Some(max) = filter.date_max {
            q = q.bind(max);
        }
        q = q.bind(filter.limit.max(0)).bind(filter.skip.max(0));

        let presences = q
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(|(username, fullname, topic, status, date_presence)| Presence {
                username,
                fullname,
                topic,
                status,
                date_presence,
            })
            .collect();

        Ok((count, presences))
    }
}
