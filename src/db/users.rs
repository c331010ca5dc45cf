//! User repository.
//!
//! Handles account rows, single-use tokens, privilege flags, rename re-keying
//! and the per-user collections (contacts, favorites, notification flags).

use super::models::{Contact, TokenKind, UniqueField, User, UserCriteria};
use super::{DbError, GroupRepository, placeholders};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

type UserRow = (
    i64,
    String,
    String,
    String,
    bool,
    bool,
    bool,
    bool,
    i64,
    Option<i64>,
);

const USER_COLUMNS: &str = "id, username, fullname, email, is_system, is_admin, is_archived, \
     can_write_notifications, created_at, verified_at";

fn user_from_row(row: UserRow) -> User {
    let (
        id,
        username,
        fullname,
        email,
        is_system,
        is_admin,
        is_archived,
        can_write_notifications,
        created_at,
        verified_at,
    ) = row;
    User {
        id,
        username,
        fullname,
        email,
        is_system,
        is_admin,
        is_archived,
        can_write_notifications,
        created_at,
        verified_at,
        contacts: Vec::new(),
        favorite_topics: BTreeSet::new(),
        favorite_tags: BTreeSet::new(),
        topics_notifications_disabled: BTreeSet::new(),
        groups: BTreeSet::new(),
    }
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a user by username, with contacts, favorites, notification flags
    /// and resolved groups.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut user = user_from_row(row);

        user.contacts = sqlx::query_as::<_, (String, String)>(
            "SELECT contact_username, contact_fullname FROM user_contacts WHERE user_id = ? ORDER BY id",
        )
        .bind(user.id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(|(username, fullname)| Contact { username, fullname })
        .collect();

        user.favorite_topics = self
            .string_set("SELECT topic FROM user_favorite_topics WHERE user_id = ?", user.id)
            .await?;
        user.favorite_tags = self
            .string_set("SELECT tag FROM user_favorite_tags WHERE user_id = ?", user.id)
            .await?;
        user.topics_notifications_disabled = self
            .string_set("SELECT topic FROM user_notifications_off WHERE user_id = ?", user.id)
            .await?;
        user.groups = GroupRepository::new(self.pool).groups_of_id(user.id).await?;

        Ok(Some(user))
    }

    async fn string_set(&self, sql: &str, user_id: i64) -> Result<BTreeSet<String>, DbError> {
        let rows = sqlx::query_scalar::<_, String>(sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Returns true if some user already holds `value` in the given identity column.
    pub async fn exists(&self, field: UniqueField, value: &str) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM users WHERE {} = ?",
            field.column()
        ))
        .bind(value)
        .fetch_one(self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Insert an unverified user together with its verification token hash.
    ///
    /// Uses a transaction so a user never exists without its pending token.
    /// UNIQUE constraints decide the winner when two creations race.
    pub async fn insert_pending(
        &self,
        username: &str,
        fullname: &str,
        email: &str,
        token_hash: &str,
    ) -> Result<User, DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, fullname, email, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(fullname)
        .bind(email)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from_write)?;

        let user_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO user_tokens (user_id, kind, token_hash, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(TokenKind::Verify.as_str())
        .bind(token_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user_from_row((
            user_id,
            username.to_string(),
            fullname.to_string(),
            email.to_string(),
            false,
            false,
            false,
            false,
            now,
            None,
        )))
    }

    /// Store a token hash, replacing any previous token of the same kind.
    pub async fn store_token(
        &self,
        user_id: i64,
        kind: TokenKind,
        token_hash: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO user_tokens (user_id, kind, token_hash, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id, kind) DO UPDATE
            SET token_hash = excluded.token_hash, created_at = excluded.created_at
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(token_hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Get the stored token hash for a user, if a token is pending.
    pub async fn token_hash(
        &self,
        user_id: i64,
        kind: TokenKind,
    ) -> Result<Option<String>, DbError> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT token_hash FROM user_tokens WHERE user_id = ? AND kind = ?",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(hash)
    }

    /// Delete a token if it still matches. Returns false when another request
    /// consumed or replaced it first.
    pub async fn consume_token(
        &self,
        user_id: i64,
        kind: TokenKind,
        token_hash: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "DELETE FROM user_tokens WHERE user_id = ? AND kind = ? AND token_hash = ?",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(token_hash)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Set a new password hash and mark the account verified if it was not already.
    ///
    /// Returns true only for the call that moved the account out of pending.
    pub async fn activate(&self, user_id: i64, password_hash: &str) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "UPDATE users SET verified_at = ? WHERE id = ? AND verified_at IS NULL",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    /// Get the stored password hash.
    pub async fn password_hash(&self, user_id: i64) -> Result<Option<String>, DbError> {
        let hash = sqlx::query_scalar::<_, Option<String>>(
            "SELECT password_hash FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(hash.flatten())
    }

    /// Replace the password hash.
    pub async fn set_password(&self, user_id: i64, password_hash: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Flag a user as system user. Returns false if it already was one.
    pub async fn convert_to_system(
        &self,
        user_id: i64,
        converted_by: &str,
        can_write_notifications: bool,
        password_hash: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_system = 1, can_write_notifications = ?, converted_by = ?,
                password_hash = ?, verified_at = COALESCE(verified_at, ?)
            WHERE id = ? AND is_system = 0 AND is_archived = 0
            "#,
        )
        .bind(can_write_notifications)
        .bind(converted_by)
        .bind(password_hash)
        .bind(chrono::Utc::now().timestamp())
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Flag a user as admin. Returns false if it already was one.
    pub async fn convert_to_admin(&self, user_id: i64, granted_by: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE users SET is_admin = 1, admin_granted_by = ? WHERE id = ? AND is_admin = 0 AND is_archived = 0",
        )
        .bind(granted_by)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Archive a user. Returns false if it already was archived.
    pub async fn archive(&self, user_id: i64, archived_by: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET is_archived = 1, archived_by = ?, archived_at = ?
            WHERE id = ? AND is_archived = 0
            "#,
        )
        .bind(archived_by)
        .bind(chrono::Utc::now().timestamp())
        .bind(user_id)
        .execute(self.pool)
        .await?;

        // Pending tokens of an archived account must never be redeemable
        sqlx::query("DELETE FROM user_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Replace fullname and email.
    pub async fn update_profile(
        &self,
        user_id: i64,
        fullname: &str,
        email: &str,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET fullname = ?, email = ? WHERE id = ?")
            .bind(fullname)
            .bind(email)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from_write)?;

        sqlx::query("UPDATE presences SET fullname = ? WHERE user_id = ?")
            .bind(fullname)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE user_contacts SET contact_fullname = ? WHERE contact_username = ?")
            .bind(fullname)
            .bind(&username)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Re-key a user from `old` to `new`.
    ///
    /// In one transaction: the username itself, contact entries pointing at
    /// it, presence rows, user ACL entries, every topic under `/Private/<old>`
    /// and every DM topic `/Private/<peer>/DM/<old>`, along with favorites,
    /// notification flags and presences that reference those paths.
    pub async fn rename(&self, user_id: i64, old: &str, new: &str) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET username = ? WHERE id = ?")
            .bind(new)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from_write)?;

        sqlx::query("UPDATE user_contacts SET contact_username = ? WHERE contact_username = ?")
            .bind(new)
            .bind(old)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE presences SET username = ? WHERE user_id = ?")
            .bind(new)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE topic_acl SET principal = ? WHERE principal_kind = 'user' AND principal = ?",
        )
        .bind(new)
        .bind(old)
        .execute(&mut *tx)
        .await?;

        let paths: Vec<String> =
            sqlx::query_scalar("SELECT path FROM topics WHERE path LIKE '/Private/%'")
                .fetch_all(&mut *tx)
                .await?;

        for path in paths {
            let Some(renamed) = renamed_path(&path, old, new) else {
                continue;
            };
            for sql in [
                "UPDATE topics SET path = ? WHERE path = ?",
                "UPDATE presences SET topic = ? WHERE topic = ?",
                "UPDATE user_favorite_topics SET topic = ? WHERE topic = ?",
                "UPDATE user_notifications_off SET topic = ? WHERE topic = ?",
            ] {
                sqlx::query(sql)
                    .bind(&renamed)
                    .bind(&path)
                    .execute(&mut *tx)
                    .await
                    .map_err(DbError::from_write)?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Append a contact. Returns false if the contact was already present.
    pub async fn add_contact(
        &self,
        user_id: i64,
        contact_username: &str,
        contact_fullname: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_contacts (user_id, contact_username, contact_fullname)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id, contact_username) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(contact_username)
        .bind(contact_fullname)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Remove a contact. Returns false if it was not present.
    pub async fn remove_contact(&self, user_id: i64, contact_username: &str) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM user_contacts WHERE user_id = ? AND contact_username = ?")
                .bind(user_id)
                .bind(contact_username)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Add a favorite topic path.
    pub async fn add_favorite_topic(&self, user_id: i64, topic: &str) -> Result<bool, DbError> {
        self.insert_member("user_favorite_topics", "topic", user_id, topic).await
    }

    /// Remove a favorite topic path.
    pub async fn remove_favorite_topic(&self, user_id: i64, topic: &str) -> Result<bool, DbError> {
        self.delete_member("user_favorite_topics", "topic", user_id, topic).await
    }

    /// Add a favorite tag.
    pub async fn add_favorite_tag(&self, user_id: i64, tag: &str) -> Result<bool, DbError> {
        self.insert_member("user_favorite_tags", "tag", user_id, tag).await
    }

    /// Remove a favorite tag.
    pub async fn remove_favorite_tag(&self, user_id: i64, tag: &str) -> Result<bool, DbError> {
        self.delete_member("user_favorite_tags", "tag", user_id, tag).await
    }

    /// Suppress broadcast notifications for a topic.
    pub async fn disable_notifications(&self, user_id: i64, topic: &str) -> Result<bool, DbError> {
        self.insert_member("user_notifications_off", "topic", user_id, topic).await
    }

    /// Stop suppressing broadcast notifications for a topic.
    pub async fn enable_notifications(&self, user_id: i64, topic: &str) -> Result<bool, DbError> {
        self.delete_member("user_notifications_off", "topic", user_id, topic).await
    }

    async fn insert_member(
        &self,
        table: &str,
        column: &str,
        user_id: i64,
        value: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(&format!(
            "INSERT INTO {table} (user_id, {column}) VALUES (?, ?) ON CONFLICT DO NOTHING"
        ))
        .bind(user_id)
        .bind(value)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_member(
        &self,
        table: &str,
        column: &str,
        user_id: i64,
        value: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE user_id = ? AND {column} = ?"
        ))
        .bind(user_id)
        .bind(value)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List users matching `criteria`, newest first. Returns the total number
    /// of matches (ignoring skip/limit) and the requested page.
    ///
    /// Emails are blanked unless `include_email` is set.
    pub async fn list(
        &self,
        criteria: &UserCriteria,
        include_email: bool,
    ) -> Result<(i64, Vec<User>), DbError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut texts: Vec<&str> = Vec::new();
        let mut ints: Vec<i64> = Vec::new();

        // Text filters are bound first, then integer filters, matching clause order below.
        let usernames: Vec<&str> = criteria
            .username
            .as_deref()
            .map(|u| u.split(',').map(str::trim).filter(|u| !u.is_empty()).collect())
            .unwrap_or_default();
        if !usernames.is_empty() {
            clauses.push(format!("username IN ({})", placeholders(usernames.len())));
            texts.extend(usernames);
        }
        if let Some(fullname) = criteria.fullname.as_deref() {
            clauses.push("fullname = ?".to_string());
            texts.push(fullname);
        }
        if let Some(min) = criteria.date_min_creation {
            clauses.push("created_at >= ?".to_string());
            ints.push(min);
        }
        if let Some(max) = criteria.date_max_creation {
            clauses.push("created_at <= ?".to_string());
            ints.push(max);
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM users {where_clause}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for t in &texts {
            count_q = count_q.bind(*t);
        }
        for i in &ints {
            count_q = count_q.bind(*i);
        }
        let count = count_q.fetch_one(self.pool).await?;

        let list_sql = format!(
            "SELECT {USER_COLUMNS} FROM users {where_clause} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut q = sqlx::query_as::<_, UserRow>(&list_sql);
        for t in &texts {
            q = q.bind(*t);
        }
        for i in &ints {
            q = q.bind(*i);
        }
        q = q.bind(criteria.limit.max(0)).bind(criteria.skip.max(0));

        let rows = q.fetch_all(self.pool).await?;
        let groups = GroupRepository::new(self.pool);
        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let mut user = user_from_row(row);
            if !include_email {
                user.email.clear();
            }
            if criteria.with_groups {
                user.groups = groups.groups_of_id(user.id).await?;
            }
            users.push(user);
        }

        Ok((count, users))
    }
}

/// New path for `path` after renaming user `old` to `new`, or `None` if the
/// path is unaffected.
///
/// Affected paths are the user's own private tree (`/Private/<old>` and
/// below) and the mirror side of DMs (`/Private/<peer>/DM/<old>`).
fn renamed_path(path: &str, old: &str, new: &str) -> Option<String> {
    let own_root = format!("/Private/{old}");
    if path == own_root {
        return Some(format!("/Private/{new}"));
    }
    if let Some(rest) = path.strip_prefix(&format!("{own_root}/")) {
        // Our own DM with ourselves would otherwise keep the old peer segment
        let rest = if rest == format!("DM/{old}") {
            format!("DM/{new}")
        } else {
            rest.to_string()
        };
        return Some(format!("/Private/{new}/{rest}"));
    }

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() == 5 && parts[1] == "Private" && parts[3] == "DM" && parts[4] == old {
        return Some(format!("/Private/{}/DM/{new}", parts[2]));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, PresenceFilter};

    async fn pending(db: &Database, username: &str) -> User {
        db.users()
            .insert_pending(
                username,
                &format!("{username} fullname"),
                &format!("{username}@example.com"),
                "hash",
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_renamed_path() {
        assert_eq!(renamed_path("/Private/alice", "alice", "al").as_deref(), Some("/Private/al"));
        assert_eq!(
            renamed_path("/Private/alice/Tasks", "alice", "al").as_deref(),
            Some("/Private/al/Tasks")
        );
        assert_eq!(
            renamed_path("/Private/bob/DM/alice", "alice", "al").as_deref(),
            Some("/Private/bob/DM/al")
        );
        assert_eq!(
            renamed_path("/Private/alice/DM/bob", "alice", "al").as_deref(),
            Some("/Private/al/DM/bob")
        );
        assert_eq!(renamed_path("/Private/alicia", "alice", "al"), None);
        assert_eq!(renamed_path("/Private/bob/Tasks/alice", "alice", "al"), None);
        assert_eq!(renamed_path("/Public/alice", "alice", "al"), None);
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let db = Database::new(":memory:").await.unwrap();
        let created = pending(&db, "alice").await;

        let found = db.users().find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email, "alice@example.com");
        assert!(found.verified_at.is_none());
        assert!(found.contacts.is_empty());

        assert!(db.users().find_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_constraints_map_to_field() {
        let db = Database::new(":memory:").await.unwrap();
        pending(&db, "alice").await;

        let err = db
            .users()
            .insert_pending("alice2", "Other Name", "alice@example.com", "h")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation(UniqueField::Email)));

        let err = db
            .users()
            .insert_pending("alice", "Other Name", "other@example.com", "h")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation(UniqueField::Username)));

        assert!(db.users().exists(UniqueField::Fullname, "alice fullname").await.unwrap());
        assert!(!db.users().exists(UniqueField::Fullname, "Other Name").await.unwrap());
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let db = Database::new(":memory:").await.unwrap();
        let user = pending(&db, "alice").await;
        let repo = db.users();

        assert_eq!(
            repo.token_hash(user.id, TokenKind::Verify).await.unwrap().as_deref(),
            Some("hash")
        );
        assert!(!repo.consume_token(user.id, TokenKind::Verify, "wrong").await.unwrap());
        assert!(repo.consume_token(user.id, TokenKind::Verify, "hash").await.unwrap());
        assert!(!repo.consume_token(user.id, TokenKind::Verify, "hash").await.unwrap());
        assert!(repo.token_hash(user.id, TokenKind::Verify).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_reports_first_activation_once() {
        let db = Database::new(":memory:").await.unwrap();
        let repo = db.users();
        let user = repo
            .insert_pending("alice", "Alice A", "alice@example.com", "h")
            .await
            .unwrap();

        assert!(repo.activate(user.id, "hash-1").await.unwrap());
        assert!(!repo.activate(user.id, "hash-2").await.unwrap());

        let found = repo.find_by_username("alice").await.unwrap().unwrap();
        assert!(found.verified_at.is_some());
        assert_eq!(repo.password_hash(user.id).await.unwrap().as_deref(), Some("hash-2"));
    }

    #[tokio::test]
    async fn test_store_token_replaces_previous() {
        let db = Database::new(":memory:").await.unwrap();
        let user = pending(&db, "alice").await;
        let repo = db.users();

        repo.store_token(user.id, TokenKind::Reset, "first").await.unwrap();
        repo.store_token(user.id, TokenKind::Reset, "second").await.unwrap();
        assert!(!repo.consume_token(user.id, TokenKind::Reset, "first").await.unwrap());
        assert!(repo.consume_token(user.id, TokenKind::Reset, "second").await.unwrap());
    }

    #[tokio::test]
    async fn test_flag_updates_report_no_op() {
        let db = Database::new(":memory:").await.unwrap();
        let user = pending(&db, "tat.system.bot").await;
        let repo = db.users();

        assert!(repo.convert_to_system(user.id, "root", true, "h").await.unwrap());
        assert!(!repo.convert_to_system(user.id, "root", true, "h").await.unwrap());
        assert!(repo.convert_to_admin(user.id, "root").await.unwrap());
        assert!(!repo.convert_to_admin(user.id, "root").await.unwrap());
        assert!(repo.archive(user.id, "root").await.unwrap());
        assert!(!repo.archive(user.id, "root").await.unwrap());

        let found = repo.find_by_username("tat.system.bot").await.unwrap().unwrap();
        assert!(found.is_system && found.is_admin && found.is_archived);
        assert!(found.can_write_notifications);
    }

    #[tokio::test]
    async fn test_collections_are_sets() {
        let db = Database::new(":memory:").await.unwrap();
        let user = pending(&db, "alice").await;
        let repo = db.users();

        assert!(repo.add_contact(user.id, "bob", "Bob").await.unwrap());
        assert!(!repo.add_contact(user.id, "bob", "Bob").await.unwrap());
        assert!(repo.add_contact(user.id, "carol", "Carol").await.unwrap());
        assert!(repo.add_favorite_tag(user.id, "urgent").await.unwrap());
        assert!(!repo.add_favorite_tag(user.id, "urgent").await.unwrap());
        assert!(repo.add_favorite_topic(user.id, "/Public").await.unwrap());
        assert!(repo.disable_notifications(user.id, "/Public").await.unwrap());

        let found = repo.find_by_username("alice").await.unwrap().unwrap();
        let names: Vec<&str> = found.contacts.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);
        assert!(found.favorite_tags.contains("urgent"));
        assert!(found.favorite_topics.contains("/Public"));
        assert!(found.topics_notifications_disabled.contains("/Public"));

        assert!(repo.remove_contact(user.id, "bob").await.unwrap());
        assert!(!repo.remove_contact(user.id, "bob").await.unwrap());
        assert!(repo.enable_notifications(user.id, "/Public").await.unwrap());
        assert!(!repo.remove_favorite_tag(user.id, "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_rekeys_references() {
        let db = Database::new(":memory:").await.unwrap();
        let alice = pending(&db, "alice").await;
        let bob = pending(&db, "bob").await;

        db.topics().create("/Private/alice", Some("alice")).await.unwrap();
        db.topics().create("/Private/alice/DM/bob", Some("alice")).await.unwrap();
        db.topics().create("/Private/bob/DM/alice", Some("bob")).await.unwrap();
        db.users().add_contact(bob.id, "alice", "alice fullname").await.unwrap();
        db.users().add_favorite_topic(bob.id, "/Private/bob/DM/alice").await.unwrap();
        db.presences()
            .upsert(&alice, "/Private/alice/DM/bob", "online")
            .await
            .unwrap();

        db.users().rename(alice.id, "alice", "alicia").await.unwrap();

        assert!(db.users().find_by_username("alice").await.unwrap().is_none());
        let topics = db.topics();
        let own = topics.find_by_path("/Private/alicia").await.unwrap().unwrap();
        assert!(own.write_users.contains("alicia"));
        assert!(topics.find_by_path("/Private/alicia/DM/bob").await.unwrap().is_some());
        assert!(topics.find_by_path("/Private/bob/DM/alicia").await.unwrap().is_some());
        assert!(topics.find_by_path("/Private/alice").await.unwrap().is_none());

        let bob = db.users().find_by_username("bob").await.unwrap().unwrap();
        assert!(bob.has_contact("alicia"));
        assert!(bob.favorite_topics.contains("/Private/bob/DM/alicia"));

        let (_, presences) = db
            .presences()
            .list(&PresenceFilter::for_topic("/Private/alicia/DM/bob"))
            .await
            .unwrap();
        assert_eq!(presences.len(), 1);
        assert_eq!(presences[0].username, "alicia");
    }

    #[tokio::test]
    async fn test_rename_conflict() {
        let db = Database::new(":memory:").await.unwrap();
        let alice = pending(&db, "alice").await;
        pending(&db, "bob").await;

        let err = db.users().rename(alice.id, "alice", "bob").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation(UniqueField::Username)));
    }

    #[tokio::test]
    async fn test_list_users() {
        let db = Database::new(":memory:").await.unwrap();
        for name in ["alice", "bob", "carol"] {
            pending(&db, name).await;
        }
        db.groups().add_member("everyone", "bob").await.unwrap();

        let (count, users) = db.users().list(&UserCriteria::default(), false).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(users.len(), 3);
        assert!(users.iter().all(|u| u.email.is_empty()));

        let criteria = UserCriteria {
            username: Some("alice,bob".into()),
            with_groups: true,
            limit: 1,
            ..Default::default()
        };
        let (count, users) = db.users().list(&criteria, true).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(users.len(), 1);
        assert!(!users[0].email.is_empty());

        let criteria = UserCriteria {
            username: Some("bob".into()),
            with_groups: true,
            ..Default::default()
        };
        let (_, users) = db.users().list(&criteria, true).await.unwrap();
        assert!(users[0].groups.contains("everyone"));
    }
}
