//! Group membership repository.
//!
//! Only the read contract (group names of a user) and membership insertion
//! are needed by the core; group administration lives elsewhere.

use super::DbError;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

/// Repository for group membership.
pub struct GroupRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GroupRepository<'a> {
    /// Create a new group repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Names of the groups `username` belongs to.
    pub async fn groups_of(&self, username: &str) -> Result<BTreeSet<String>, DbError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT g.name
            FROM groups g
            JOIN group_members m ON m.group_id = g.id
            JOIN users u ON u.id = m.user_id
            WHERE u.username = ?
            "#,
        )
        .bind(username)
        .fetch_all(self.pool)
        .await?;
        Ok(names.into_iter().collect())
    }

    pub(crate) async fn groups_of_id(&self, user_id: i64) -> Result<BTreeSet<String>, DbError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT g.name
            FROM groups g
            JOIN group_members m ON m.group_id = g.id
            WHERE m.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(names.into_iter().collect())
    }

    /// Add `username` to `group`, creating the group if needed.
    ///
    /// Returns false if the user already was a member.
    pub async fn add_member(&self, group: &str, username: &str) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let user_id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::UserNotFound(username.to_string()))?;

        sqlx::query("INSERT INTO groups (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(group)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id)
            SELECT id, ? FROM groups WHERE name = ?
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(group)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_add_member_and_resolve() {
        let db = Database::new(":memory:").await.unwrap();
        db.users()
            .insert_pending("alice", "Alice A", "alice@example.com", "h")
            .await
            .unwrap();
        let groups = db.groups();

        assert!(groups.groups_of("alice").await.unwrap().is_empty());
        assert!(groups.add_member("everyone", "alice").await.unwrap());
        assert!(!groups.add_member("everyone", "alice").await.unwrap());
        assert!(groups.add_member("devs", "alice").await.unwrap());

        let names = groups.groups_of("alice").await.unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["devs", "everyone"]);
    }

    #[tokio::test]
    async fn test_add_unknown_user() {
        let db = Database::new(":memory:").await.unwrap();
        let err = db.groups().add_member("everyone", "ghost").await.unwrap_err();
        assert!(matches!(err, DbError::UserNotFound(u) if u == "ghost"));
    }
}
