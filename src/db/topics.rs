//! Topic repository: topic rows and their read/write ACLs.

use super::DbError;
use super::models::Topic;
use sqlx::SqlitePool;

/// Access level stored in an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicAccess {
    ReadOnly,
    ReadWrite,
}

impl TopicAccess {
    fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }
}

/// Repository for topic operations.
pub struct TopicRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TopicRepository<'a> {
    /// Create a new topic repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a topic by its exact path, with ACLs.
    pub async fn find_by_path(&self, path: &str) -> Result<Option<Topic>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>, i64)>(
            "SELECT id, path, description, created_at FROM topics WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(self.pool)
        .await?;

        let Some((id, path, description, created_at)) = row else {
            return Ok(None);
        };

        let mut topic = Topic {
            id,
            path,
            description,
            created_at,
            ..Default::default()
        };

        let acl = sqlx::query_as::<_, (String, String, String)>(
            "SELECT principal_kind, principal, access FROM topic_acl WHERE topic_id = ?",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        for (kind, principal, access) in acl {
            let set = match (kind.as_str(), access.as_str()) {
                ("user", "rw") => &mut topic.write_users,
                ("user", _) => &mut topic.read_users,
                ("group", "rw") => &mut topic.write_groups,
                _ => &mut topic.read_groups,
            };
            set.insert(principal);
        }

        Ok(Some(topic))
    }

    /// Create a topic. When `owner` is given the owner is granted read-write access.
    pub async fn create(&self, path: &str, owner: Option<&str>) -> Result<Topic, DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO topics (path, created_at)
            VALUES (?, ?)
            ON CONFLICT (path) DO NOTHING
            "#,
        )
        .bind(path)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TopicExists(path.to_string()));
        }
        let topic_id = result.last_insert_rowid();

        let mut topic = Topic {
            id: topic_id,
            path: path.to_string(),
            created_at: now,
            ..Default::default()
        };

        if let Some(owner) = owner {
            sqlx::query(
                r#"
                INSERT INTO topic_acl (topic_id, principal_kind, principal, access)
                VALUES (?, 'user', ?, 'rw')
                "#,
            )
            .bind(topic_id)
            .bind(owner)
            .execute(&mut *tx)
            .await?;
            topic.write_users.insert(owner.to_string());
        }

        tx.commit().await?;
        Ok(topic)
    }

    /// Grant a user access to a topic.
    pub async fn grant_user(
        &self,
        path: &str,
        username: &str,
        access: TopicAccess,
    ) -> Result<(), DbError> {
        self.grant(path, "user", username, access).await
    }

    /// Grant a group access to a topic.
    pub async fn grant_group(
        &self,
        path: &str,
        group: &str,
        access: TopicAccess,
    ) -> Result<(), DbError> {
        self.grant(path, "group", group, access).await
    }

    async fn grant(
        &self,
        path: &str,
        kind: &str,
        principal: &str,
        access: TopicAccess,
    ) -> Result<(), DbError> {
        let topic_id = sqlx::query_scalar::<_, i64>("SELECT id FROM topics WHERE path = ?")
            .bind(path)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::TopicNotFound(path.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO topic_acl (topic_id, principal_kind, principal, access)
            VALUES (?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(topic_id)
        .bind(kind)
        .bind(principal)
        .bind(access.as_str())
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
