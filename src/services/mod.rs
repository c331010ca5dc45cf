//! Core services.
//!
//! - [`access`]: topic read/write decisions
//! - [`presence`]: presence writes and DM-aware visibility
//! - [`lifecycle`]: account state machine
//! - [`contacts`]: contacts, favorites and notification flags
//! - [`checker`]: self-repair of private topics and default group
//! - [`effect`]: fire-and-forget mail and event delivery

pub mod access;
pub mod checker;
pub mod contacts;
pub mod effect;
pub mod lifecycle;
pub mod presence;

pub use access::TopicAccessGuard;
pub use checker::{CheckReport, ConsistencyChecker};
pub use contacts::{ContactAndFavoritesRegistry, ContactsPresences};
pub use effect::{
    BroadcastPublisher, Effect, EffectError, EffectQueue, Event, EventKind, EventPublisher,
    LogMailer, MailMessage, Mailer,
};
pub use lifecycle::{Credentials, NewUser, Registration, UserLifecycleManager};
pub use presence::{PresenceCriteria, PresenceService, build_query};

use crate::config::Config;
use crate::db::{Database, Topic, User, UserState};
use crate::error::{ServiceError, ServiceResult};
use crate::telemetry::{OperationTimer, spans};
use std::future::Future;
use tracing::Instrument;

/// All core services wired from one configuration.
#[derive(Clone)]
pub struct Services {
    pub access: TopicAccessGuard,
    pub presences: PresenceService,
    pub lifecycle: UserLifecycleManager,
    pub registry: ContactAndFavoritesRegistry,
    pub checker: ConsistencyChecker,
}

impl Services {
    /// Build every service. Configuration is passed down explicitly; nothing
    /// reads process-wide state.
    pub fn new(db: Database, config: &Config, effects: EffectQueue) -> Self {
        let access = TopicAccessGuard::new(config.access);
        let lifecycle = UserLifecycleManager::new(
            db.clone(),
            config.accounts.clone(),
            config.exposed.clone(),
            effects.clone(),
        );
        Self {
            access,
            presences: PresenceService::new(db.clone(), access, effects),
            registry: ContactAndFavoritesRegistry::new(db.clone(), access),
            checker: ConsistencyChecker::new(db, config.accounts.clone(), lifecycle.clone()),
            lifecycle,
        }
    }
}

/// Run one core operation inside its span, recording latency and error class.
pub(crate) async fn observe<T>(
    operation: &'static str,
    actor: &str,
    target: Option<&str>,
    fut: impl Future<Output = ServiceResult<T>>,
) -> ServiceResult<T> {
    let timer = OperationTimer::new(operation);
    let result = fut.instrument(spans::operation(operation, actor, target)).await;
    timer.finish(result)
}

/// Resolve a user by name.
pub(crate) async fn load_user(db: &Database, username: &str) -> ServiceResult<User> {
    db.users()
        .find_by_username(username)
        .await?
        .ok_or_else(|| ServiceError::user_not_found(username))
}

/// Resolve a user that is about to change state. Archived users are refused.
pub(crate) async fn load_actor(db: &Database, username: &str) -> ServiceResult<User> {
    let user = load_user(db, username).await?;
    if user.state() == UserState::Archived {
        return Err(ServiceError::Forbidden(format!("user {username} is archived")));
    }
    Ok(user)
}

/// Resolve a topic by exact path.
pub(crate) async fn load_topic(db: &Database, path: &str) -> ServiceResult<Topic> {
    db.topics()
        .find_by_path(path)
        .await?
        .ok_or_else(|| ServiceError::topic_not_found(path))
}
