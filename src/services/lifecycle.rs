//! User lifecycle: registration, verification, password reset, privilege
//! conversion, archival, rename and profile update.
//!
//! ```text
//! Pending --verify--> Active --archive--> Archived
//!                       |
//!                       +-- is_system / is_admin flags (additive)
//! ```
//!
//! Every "already in target state" request is rejected with `Conflict`.
//! Archived users accept no further lifecycle operation.

use super::effect::{Effect, EffectQueue, Event, EventKind, MailMessage};
use super::{access::private_root, load_user, observe};
use crate::config::{AccountsConfig, ExposedConfig};
use crate::db::{Database, TokenKind, Topic, UniqueField, User, UserCriteria, UserState};
use crate::error::{ServiceError, ServiceResult};
use crate::security::{Secret, generate_password, generate_token, hash_password, token_digest, token_matches};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Usernames reserved for system accounts start with this prefix.
pub const SYSTEM_PREFIX: &str = "tat.system";

/// Suffixes of the canonical private topics under `/Private/<username>`.
pub const PRIVATE_TOPIC_SUFFIXES: [&str; 4] = ["", "Tasks", "Bookmarks", "Notifications"];

const MIN_USERNAME_LEN: usize = 3;
const MIN_FULLNAME_LEN: usize = 3;
const MIN_EMAIL_LEN: usize = 7;

/// The canonical private topic paths of `username`.
pub fn private_topic_paths(username: &str) -> Vec<String> {
    let root = private_root(username);
    PRIVATE_TOPIC_SUFFIXES
        .iter()
        .map(|suffix| {
            if suffix.is_empty() {
                root.clone()
            } else {
                format!("{root}/{suffix}")
            }
        })
        .collect()
}

/// Usernames end up in topic paths, so only `[A-Za-z0-9._-]` is accepted.
fn is_valid_username(username: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    username.chars().count() >= MIN_USERNAME_LEN
        && PATTERN
            .get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").ok())
            .as_ref()
            .is_some_and(|re| re.is_match(username))
}

/// Registration request.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub fullname: String,
    pub email: String,
    /// Verification link template; `:username` and `:token` are substituted.
    pub callback: Option<String>,
}

/// Result of a registration. The token is for the internal caller only.
#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub token: Secret,
    /// Set when the username was derived from the email.
    pub info: Option<String>,
}

/// A freshly issued password, relayed once to its owner.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: Secret,
    /// Externally exposed URL of the service.
    pub url: String,
}

#[derive(Serialize)]
struct UserEvent<'a> {
    username: &'a str,
    fullname: &'a str,
}

/// Account state machine.
#[derive(Clone)]
pub struct UserLifecycleManager {
    db: Database,
    accounts: AccountsConfig,
    exposed: ExposedConfig,
    effects: EffectQueue,
}

impl UserLifecycleManager {
    pub fn new(
        db: Database,
        accounts: AccountsConfig,
        exposed: ExposedConfig,
        effects: EffectQueue,
    ) -> Self {
        Self {
            db,
            accounts,
            exposed,
            effects,
        }
    }

    /// Register a pending user and mail a verification token.
    pub async fn create(&self, new: NewUser) -> ServiceResult<Registration> {
        let actor = new.username.trim().to_string();
        observe("create_user", &actor, None, self.create_inner(new)).await
    }

    async fn create_inner(&self, new: NewUser) -> ServiceResult<Registration> {
        let email = new.email.trim().to_string();
        let fullname = new.fullname.trim().to_string();
        let mut username = new.username.trim().to_string();
        let mut note = None;

        if self.accounts.username_from_email
            && let Some(at) = email.find('@')
            && at > 0
        {
            username = email[..at].trim().to_string();
            note = Some(format!("username is forced from email: {username}"));
        }

        if username.chars().count() < MIN_USERNAME_LEN
            || fullname.chars().count() < MIN_FULLNAME_LEN
            || email.chars().count() < MIN_EMAIL_LEN
        {
            return Err(ServiceError::Validation(format!(
                "invalid username ({username}) or fullname ({fullname}) or email ({email})"
            )));
        }
        if !is_valid_username(&username) {
            return Err(ServiceError::Validation(format!(
                "invalid username ({username}): allowed characters are letters, digits, '.', '_' and '-'"
            )));
        }
        if !self.accounts.is_email_allowed(&email) {
            return Err(ServiceError::Forbidden(format!(
                "your email domain is not allowed on this instance: {email}"
            )));
        }

        let users = self.db.users();
        for (field, value) in [
            (UniqueField::Username, &username),
            (UniqueField::Email, &email),
            (UniqueField::Fullname, &fullname),
        ] {
            if users.exists(field, value).await? {
                return Err(ServiceError::Conflict(format!("{field} already exists")));
            }
        }

        let token = generate_token();
        let user = users
            .insert_pending(&username, &fullname, &email, &token_digest(token.expose()))
            .await?;

        let callback = self.callback(new.callback, "verify");
        self.effects.submit(Effect::VerifyEmail(MailMessage {
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            email: user.email.clone(),
            token: token.clone(),
            callback,
        }));
        self.effects.submit(Effect::Publish(Event::new(
            EventKind::UserCreated,
            &UserEvent {
                username: &user.username,
                fullname: &user.fullname,
            },
        )));

        info!(username = %user.username, "User created, awaiting verification");
        Ok(Registration {
            username: user.username,
            token,
            info: note,
        })
    }

    /// Redeem a verification token and issue a password.
    pub async fn verify(&self, username: &str, token: &str) -> ServiceResult<Credentials> {
        observe("verify_user", username, None, async {
            let (user, password) = self.redeem(username, token, TokenKind::Verify).await?;
            Ok(self.credentials(user.username, password))
        })
        .await
    }

    /// Issue a reset token for the account matching both username and email.
    pub async fn ask_reset(
        &self,
        username: &str,
        email: &str,
        callback: Option<String>,
    ) -> ServiceResult<Secret> {
        observe("ask_reset", username, None, async {
            let username = username.trim();
            let email = email.trim();
            if username.chars().count() < MIN_USERNAME_LEN || email.chars().count() < MIN_EMAIL_LEN {
                return Err(ServiceError::Validation(format!(
                    "invalid username ({username}) or email ({email})"
                )));
            }

            let user = self
                .db
                .users()
                .find_by_username(username)
                .await?
                .filter(|u| u.email == email && !u.is_archived)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "user with username {username} and email {email} does not exist"
                    ))
                })?;

            let token = generate_token();
            self.db
                .users()
                .store_token(user.id, TokenKind::Reset, &token_digest(token.expose()))
                .await?;

            self.effects.submit(Effect::ResetEmail(MailMessage {
                username: user.username.clone(),
                fullname: user.fullname.clone(),
                email: user.email.clone(),
                token: token.clone(),
                callback: self.callback(callback, "reset"),
            }));
            info!(username = %user.username, "Password reset requested");
            Ok(token)
        })
        .await
    }

    /// Redeem a reset token and issue a new password.
    pub async fn complete_reset(&self, username: &str, token: &str) -> ServiceResult<Credentials> {
        observe("complete_reset", username, None, async {
            let (user, password) = self.redeem(username, token, TokenKind::Reset).await?;
            info!(username = %user.username, "Password reset completed");
            Ok(self.credentials(user.username, password))
        })
        .await
    }

    /// Turn `target` into a system user and issue it a new password.
    pub async fn convert_to_system(
        &self,
        acting_admin: &str,
        target: &str,
        can_write_notifications: bool,
    ) -> ServiceResult<Credentials> {
        observe("convert_to_system", acting_admin, Some(target), async {
            require_system_prefix(target)?;
            let user = self.load_mutable(target).await?;
            if user.is_system {
                return Err(ServiceError::Conflict(format!(
                    "user {target} is already a system user"
                )));
            }

            let password = generate_password();
            let hash = hash_secret(&password).await?;
            let converted = self
                .db
                .users()
                .convert_to_system(user.id, acting_admin, can_write_notifications, &hash)
                .await?;
            if !converted {
                return Err(ServiceError::Conflict(format!(
                    "user {target} is already a system user"
                )));
            }

            info!(username = %user.username, by = %acting_admin, can_write_notifications, "User converted to system user");
            Ok(self.credentials(user.username, password))
        })
        .await
    }

    /// Issue a new password to an existing system user.
    pub async fn reset_system_user_password(&self, target: &str) -> ServiceResult<Credentials> {
        observe("reset_system_password", target, None, async {
            require_system_prefix(target)?;
            let user = self.load_mutable(target).await?;
            if !user.is_system {
                return Err(ServiceError::Conflict(format!(
                    "user {target} is not a system user"
                )));
            }

            let password = generate_password();
            let hash = hash_secret(&password).await?;
            self.db.users().set_password(user.id, &hash).await?;

            info!(username = %user.username, "System user password reset");
            Ok(self.credentials(user.username, password))
        })
        .await
    }

    /// Grant admin rights to `target`.
    pub async fn convert_to_admin(&self, acting_admin: &str, target: &str) -> ServiceResult<()> {
        observe("convert_to_admin", acting_admin, Some(target), async {
            let user = self.load_mutable(target).await?;
            if user.is_admin || !self.db.users().convert_to_admin(user.id, acting_admin).await? {
                return Err(ServiceError::Conflict(format!(
                    "user {target} is already an admin user"
                )));
            }
            info!(username = %user.username, by = %acting_admin, "User granted admin");
            Ok(())
        })
        .await
    }

    /// Archive `target`. Terminal.
    pub async fn archive(&self, acting_admin: &str, target: &str) -> ServiceResult<()> {
        observe("archive_user", acting_admin, Some(target), async {
            let user = self.load_mutable(target).await?;
            if !self.db.users().archive(user.id, acting_admin).await? {
                return Err(ServiceError::Conflict(format!("user {target} is already archived")));
            }
            info!(username = %user.username, by = %acting_admin, "User archived");
            Ok(())
        })
        .await
    }

    /// Re-key `target` as `new_username`, along with everything it owns.
    pub async fn rename(&self, target: &str, new_username: &str) -> ServiceResult<()> {
        observe("rename_user", target, Some(new_username), async {
            let new_username = new_username.trim();
            if !is_valid_username(new_username) {
                return Err(ServiceError::Validation(format!(
                    "invalid new username ({new_username})"
                )));
            }

            let user = self.load_mutable(target).await?;
            if user.username == new_username {
                return Err(ServiceError::Conflict(format!(
                    "user is already named {new_username}"
                )));
            }
            if self.db.users().exists(UniqueField::Username, new_username).await? {
                return Err(ServiceError::Conflict(format!(
                    "{} already exists",
                    UniqueField::Username
                )));
            }

            self.db
                .users()
                .rename(user.id, &user.username, new_username)
                .await?;
            info!(old = %user.username, new = %new_username, "User renamed");
            Ok(())
        })
        .await
    }

    /// Replace fullname and email of `target`.
    pub async fn update(&self, target: &str, fullname: &str, email: &str) -> ServiceResult<()> {
        observe("update_user", target, None, async {
            let fullname = fullname.trim();
            let email = email.trim();
            if fullname.is_empty() || email.is_empty() {
                return Err(ServiceError::Validation(
                    "invalid fullname or email: both are required".into(),
                ));
            }

            let user = self.load_mutable(target).await?;
            let users = self.db.users();
            if fullname != user.fullname && users.exists(UniqueField::Fullname, fullname).await? {
                return Err(ServiceError::Conflict(format!("{} already exists", UniqueField::Fullname)));
            }
            if email != user.email && users.exists(UniqueField::Email, email).await? {
                return Err(ServiceError::Conflict(format!("{} already exists", UniqueField::Email)));
            }

            users.update_profile(user.id, fullname, email).await?;
            info!(username = %user.username, "User updated");
            Ok(())
        })
        .await
    }

    /// Full profile of `username`, email included.
    pub async fn me(&self, username: &str) -> ServiceResult<User> {
        observe("me", username, None, load_user(&self.db, username)).await
    }

    /// List users. Emails are only returned to admins.
    pub async fn list(
        &self,
        criteria: &UserCriteria,
        requester_is_admin: bool,
    ) -> ServiceResult<(i64, Vec<User>)> {
        observe("list_users", "", None, async {
            Ok(self.db.users().list(criteria, requester_is_admin).await?)
        })
        .await
    }

    /// Create a private topic owned by `username`.
    pub async fn create_private_topic(&self, username: &str, path: &str) -> ServiceResult<Topic> {
        let topic = self.db.topics().create(path, Some(username)).await?;
        info!(username, path, "Private topic created");
        Ok(topic)
    }

    async fn provision(&self, username: &str) {
        for path in private_topic_paths(username) {
            match self.create_private_topic(username, &path).await {
                Ok(_) | Err(ServiceError::Conflict(_)) => {}
                Err(e) => warn!(username, path = %path, error = %e, "Private topic creation failed"),
            }
        }
        if let Some(group) = self.accounts.default_group()
            && let Err(e) = self.db.groups().add_member(group, username).await
        {
            warn!(username, group, error = %e, "Default group membership failed");
        }
    }

    /// Consume a token of `kind` and activate the account with a fresh password.
    ///
    /// Every failure looks the same to the caller. Whichever token kind
    /// performs the first activation provisions the private topics and the
    /// default group membership (best effort) and publishes `user-verified`.
    async fn redeem(
        &self,
        username: &str,
        token: &str,
        kind: TokenKind,
    ) -> ServiceResult<(User, Secret)> {
        let failed = || ServiceError::Forbidden("verification failed".into());
        let users = self.db.users();

        let Some(user) = users.find_by_username(username.trim()).await? else {
            return Err(failed());
        };
        if user.state() == UserState::Archived {
            return Err(failed());
        }
        let Some(stored) = users.token_hash(user.id, kind).await? else {
            return Err(failed());
        };
        if !token_matches(token.trim(), &stored) {
            return Err(failed());
        }
        // A concurrent redemption that got here first wins.
        if !users.consume_token(user.id, kind, &stored).await? {
            return Err(failed());
        }

        let password = generate_password();
        let hash = hash_secret(&password).await?;
        if users.activate(user.id, &hash).await? {
            self.provision(&user.username).await;
            self.effects.submit(Effect::Publish(Event::new(
                EventKind::UserVerified,
                &UserEvent {
                    username: &user.username,
                    fullname: &user.fullname,
                },
            )));
            info!(username = %user.username, via = kind.as_str(), "User verified");
        }
        Ok((user, password))
    }

    async fn load_mutable(&self, username: &str) -> ServiceResult<User> {
        let user = load_user(&self.db, username).await?;
        if user.state() == UserState::Archived {
            return Err(ServiceError::Conflict(format!("user {username} is archived")));
        }
        Ok(user)
    }

    fn callback(&self, requested: Option<String>, action: &str) -> String {
        requested
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| format!("{}/user/{action}/:username/:token", self.exposed.url()))
    }

    fn credentials(&self, username: String, password: Secret) -> Credentials {
        Credentials {
            username,
            password,
            url: self.exposed.url(),
        }
    }
}

fn require_system_prefix(username: &str) -> ServiceResult<()> {
    if username.starts_with(SYSTEM_PREFIX) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "username {username} must begin with {SYSTEM_PREFIX}"
        )))
    }
}

/// Argon2 is CPU-bound; keep it off the async workers.
async fn hash_secret(secret: &Secret) -> ServiceResult<String> {
    let secret = secret.clone();
    tokio::task::spawn_blocking(move || hash_password(secret.expose()))
        .await
        .map_err(|e| ServiceError::internal(format!("hashing task failed: {e}")))?
        .map_err(|e| ServiceError::internal(format!("password hashing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::security::verify_password;
    use crate::services::effect::{BroadcastPublisher, LogMailer};
    use std::sync::Arc;

    async fn manager(accounts: AccountsConfig) -> (Database, UserLifecycleManager) {
        let db = Database::new(":memory:").await.unwrap();
        let (effects, _worker) = EffectQueue::spawn(
            Arc::new(LogMailer),
            Arc::new(BroadcastPublisher::new(16)),
            64,
        );
        let manager = UserLifecycleManager::new(
            db.clone(),
            accounts,
            ExposedConfig::default(),
            effects,
        );
        (db, manager)
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            fullname: format!("{username} fullname"),
            email: format!("{username}@example.com"),
            callback: None,
        }
    }

    async fn stored_hash(db: &Database, username: &str) -> String {
        let user = db.users().find_by_username(username).await.unwrap().unwrap();
        db.users().password_hash(user.id).await.unwrap().unwrap()
    }

    #[test]
    fn test_private_topic_paths() {
        assert_eq!(
            private_topic_paths("carol"),
            vec![
                "/Private/carol",
                "/Private/carol/Tasks",
                "/Private/carol/Bookmarks",
                "/Private/carol/Notifications",
            ]
        );
    }

    #[test]
    fn test_username_charset() {
        assert!(is_valid_username("first.last-2_x"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("al/ice"));
        assert!(!is_valid_username("al ice"));
    }

    #[tokio::test]
    async fn test_create_validates_lengths() {
        let (_db, m) = manager(AccountsConfig::default()).await;
        let mut req = new_user("alice");
        req.email = "a@b.c".into();
        assert_eq!(m.create(req).await.unwrap_err().kind(), ErrorKind::Validation);

        let mut req = new_user("al");
        req.fullname = "Al Pha".into();
        assert_eq!(m.create(req).await.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_domain() {
        let accounts = AccountsConfig {
            allowed_domains: vec!["corp.example".into()],
            ..Default::default()
        };
        let (_db, m) = manager(accounts).await;
        let err = m.create(new_user("alice")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_create_username_from_email() {
        let accounts = AccountsConfig {
            username_from_email: true,
            ..Default::default()
        };
        let (_db, m) = manager(accounts).await;
        let reg = m
            .create(NewUser {
                username: "ignored".into(),
                fullname: "First Last".into(),
                email: "first.last@example.com".into(),
                callback: None,
            })
            .await
            .unwrap();
        assert_eq!(reg.username, "first.last");
        assert!(reg.info.is_some());
    }

    #[tokio::test]
    async fn test_create_keeps_username_when_email_has_no_local_part() {
        let accounts = AccountsConfig {
            username_from_email: true,
            ..Default::default()
        };
        let (_db, m) = manager(accounts).await;
        let reg = m
            .create(NewUser {
                username: "keepme".into(),
                fullname: "Keep Me".into(),
                email: "nobody-at-example".into(),
                callback: None,
            })
            .await
            .unwrap();
        assert_eq!(reg.username, "keepme");
        assert!(reg.info.is_none());

        let reg = m
            .create(NewUser {
                username: "keepme2".into(),
                fullname: "Keep Me Too".into(),
                email: "@example.com".into(),
                callback: None,
            })
            .await
            .unwrap();
        assert_eq!(reg.username, "keepme2");
        assert!(reg.info.is_none());
    }

    #[tokio::test]
    async fn test_create_conflicts_on_each_identity_field() {
        let (_db, m) = manager(AccountsConfig::default()).await;
        m.create(new_user("alice")).await.unwrap();

        let dup_username = new_user("alice");
        let mut dup_email = new_user("alice2");
        dup_email.email = "alice@example.com".into();
        let mut dup_fullname = new_user("alice3");
        dup_fullname.fullname = "alice fullname".into();

        for req in [dup_username, dup_email, dup_fullname] {
            assert_eq!(m.create(req).await.unwrap_err().kind(), ErrorKind::Conflict);
        }
    }

    #[tokio::test]
    async fn test_verify_is_single_use() {
        let (db, m) = manager(AccountsConfig::default()).await;
        let reg = m.create(new_user("alice")).await.unwrap();

        let wrong = m.verify("alice", "not-the-token").await.unwrap_err();
        assert_eq!(wrong.kind(), ErrorKind::Forbidden);

        let creds = m.verify("alice", reg.token.expose()).await.unwrap();
        assert_eq!(creds.url, "http://localhost:8080");
        let hash = stored_hash(&db, "alice").await;
        assert!(verify_password(creds.password.expose(), &hash).unwrap());

        let replay = m.verify("alice", reg.token.expose()).await.unwrap_err();
        assert_eq!(replay.to_string(), "verification failed");
        let unknown = m.verify("nobody", reg.token.expose()).await.unwrap_err();
        assert_eq!(unknown.to_string(), "verification failed");
    }

    #[tokio::test]
    async fn test_first_verify_provisions_private_topics_and_group() {
        let accounts = AccountsConfig {
            default_group: "everyone".into(),
            ..Default::default()
        };
        let (db, m) = manager(accounts).await;
        let reg = m.create(new_user("carol")).await.unwrap();
        m.verify("carol", reg.token.expose()).await.unwrap();

        for path in private_topic_paths("carol") {
            let topic = db.topics().find_by_path(&path).await.unwrap().unwrap();
            assert!(topic.write_users.contains("carol"));
        }
        assert!(db.groups().groups_of("carol").await.unwrap().contains("everyone"));
    }

    #[tokio::test]
    async fn test_reset_before_verify_provisions_once() {
        let accounts = AccountsConfig {
            default_group: "everyone".into(),
            ..Default::default()
        };
        let (db, m) = manager(accounts).await;
        let reg = m.create(new_user("erin")).await.unwrap();

        let token = m.ask_reset("erin", "erin@example.com", None).await.unwrap();
        m.complete_reset("erin", token.expose()).await.unwrap();

        let user = db.users().find_by_username("erin").await.unwrap().unwrap();
        assert_eq!(user.state(), UserState::Active);
        for path in private_topic_paths("erin") {
            assert!(db.topics().find_by_path(&path).await.unwrap().is_some());
        }
        assert!(db.groups().groups_of("erin").await.unwrap().contains("everyone"));

        // The verification token stays valid and only rotates the password.
        let creds = m.verify("erin", reg.token.expose()).await.unwrap();
        let hash = stored_hash(&db, "erin").await;
        assert!(verify_password(creds.password.expose(), &hash).unwrap());
    }

    #[tokio::test]
    async fn test_reset_flow() {
        let (db, m) = manager(AccountsConfig::default()).await;
        let reg = m.create(new_user("alice")).await.unwrap();
        let first = m.verify("alice", reg.token.expose()).await.unwrap();

        let err = m.ask_reset("alice", "other@example.com", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = m.ask_reset("al", "alice@example.com", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let token = m.ask_reset("alice", "alice@example.com", None).await.unwrap();
        let second = m.complete_reset("alice", token.expose()).await.unwrap();
        assert_ne!(first.password, second.password);
        let hash = stored_hash(&db, "alice").await;
        assert!(verify_password(second.password.expose(), &hash).unwrap());

        assert!(m.complete_reset("alice", token.expose()).await.is_err());
    }

    #[tokio::test]
    async fn test_convert_to_system() {
        let (db, m) = manager(AccountsConfig::default()).await;
        m.create(new_user("bob")).await.unwrap();
        m.create(new_user("tat.system.bob")).await.unwrap();

        let err = m.convert_to_system("root", "bob", false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let creds = m.convert_to_system("root", "tat.system.bob", true).await.unwrap();
        let user = db.users().find_by_username("tat.system.bob").await.unwrap().unwrap();
        assert!(user.is_system);
        assert!(user.can_write_notifications);
        let hash = stored_hash(&db, "tat.system.bob").await;
        assert!(verify_password(creds.password.expose(), &hash).unwrap());

        let again = m.convert_to_system("root", "tat.system.bob", true).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::Conflict);

        let reset = m.reset_system_user_password("tat.system.bob").await.unwrap();
        assert_ne!(reset.password, creds.password);
    }

    #[tokio::test]
    async fn test_reset_system_password_requires_system_user() {
        let (_db, m) = manager(AccountsConfig::default()).await;
        m.create(new_user("tat.system.bot")).await.unwrap();
        let err = m.reset_system_user_password("tat.system.bot").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = m.reset_system_user_password("tat.system.ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_admin_and_archive_reject_repeats() {
        let (_db, m) = manager(AccountsConfig::default()).await;
        m.create(new_user("dave")).await.unwrap();

        m.convert_to_admin("root", "dave").await.unwrap();
        let err = m.convert_to_admin("root", "dave").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        m.archive("root", "dave").await.unwrap();
        let err = m.archive("root", "dave").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = m.update("dave", "Dave New", "dave@new.example").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = m.archive("root", "ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rename_and_update() {
        let (db, m) = manager(AccountsConfig::default()).await;
        m.create(new_user("erin")).await.unwrap();
        m.create(new_user("frank")).await.unwrap();

        let err = m.rename("erin", "frank").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = m.rename("erin", "er/in").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        m.rename("erin", "erin2").await.unwrap();
        assert!(db.users().find_by_username("erin").await.unwrap().is_none());

        let err = m.update("erin2", "  ", "x@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = m.update("erin2", "frank fullname", "x@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        m.update("erin2", " Erin Two ", "erin2@example.com").await.unwrap();
        let me = m.me("erin2").await.unwrap();
        assert_eq!(me.fullname, "Erin Two");
        assert_eq!(me.email, "erin2@example.com");
    }

    #[tokio::test]
    async fn test_list_hides_emails_from_non_admins() {
        let (_db, m) = manager(AccountsConfig::default()).await;
        m.create(new_user("gina")).await.unwrap();
        m.create(new_user("hank")).await.unwrap();

        let (count, users) = m.list(&UserCriteria::default(), false).await.unwrap();
        assert_eq!(count, 2);
        assert!(users.iter().all(|u| u.email.is_empty()));

        let (_, users) = m.list(&UserCriteria::default(), true).await.unwrap();
        assert!(users.iter().all(|u| !u.email.is_empty()));
    }
}
