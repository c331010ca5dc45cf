//! Fire-and-forget side effects.
//!
//! Core operations never talk to the mailer or the event bus directly. They
//! hand an [`Effect`] to the [`EffectQueue`], which returns immediately; a
//! single worker task drains the queue and delivers each effect. Delivery
//! failures are logged and counted, never reported to the caller.

use crate::security::Secret;
use crate::telemetry::spans;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

/// Delivery failure reported by a [`Mailer`] or [`EventPublisher`].
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("mail delivery failed: {0}")]
    Mail(String),
    #[error("event publication failed: {0}")]
    Publish(String),
}

/// A verification or reset mail.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub token: Secret,
    /// Link template. `:username` and `:token` are substituted on render.
    pub callback: String,
}

impl MailMessage {
    /// Render the link the recipient follows.
    pub fn link(&self) -> String {
        self.callback
            .replace(":username", &self.username)
            .replace(":token", self.token.expose())
    }
}

/// Event kinds published on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    UserCreated,
    UserVerified,
    PresenceCreated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserCreated => "user-created",
            Self::UserVerified => "user-verified",
            Self::PresenceCreated => "presence-created",
        }
    }
}

/// An event published after a state change.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: i64,
    pub payload: serde_json::Value,
}

impl Event {
    /// Build an event from any serializable payload.
    pub fn new(kind: EventKind, payload: &impl Serialize) -> Self {
        let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
            warn!(kind = kind.as_str(), error = %e, "Event payload not serializable");
            serde_json::Value::Null
        });
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: chrono::Utc::now().timestamp(),
            payload,
        }
    }
}

/// A side effect requested by a core operation.
#[derive(Debug, Clone)]
pub enum Effect {
    VerifyEmail(MailMessage),
    ResetEmail(MailMessage),
    Publish(Event),
}

impl Effect {
    /// Static label for metrics and spans.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerifyEmail(_) => "verify_email",
            Self::ResetEmail(_) => "reset_email",
            Self::Publish(event) => event.kind.as_str(),
        }
    }
}

/// Outbound mail delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verify_email(&self, mail: &MailMessage) -> Result<(), EffectError>;

    async fn send_reset_email(&self, mail: &MailMessage) -> Result<(), EffectError>;
}

/// Event fan-out.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), EffectError>;
}

/// Non-blocking handle to the side-effect worker.
#[derive(Clone)]
pub struct EffectQueue {
    sender: mpsc::Sender<Effect>,
}

impl EffectQueue {
    /// Spawn the worker and return the submission handle.
    ///
    /// The worker exits once every clone of the returned queue is dropped and
    /// the backlog is drained.
    pub fn spawn(
        mailer: Arc<dyn Mailer>,
        publisher: Arc<dyn EventPublisher>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Effect>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(effect) = receiver.recv().await {
                let kind = effect.kind();
                let result = deliver(mailer.as_ref(), publisher.as_ref(), &effect)
                    .instrument(spans::effect(kind))
                    .await;
                match result {
                    Ok(()) => {
                        crate::metrics::record_effect(kind, true);
                        debug!(kind, "Effect delivered");
                    }
                    Err(e) => {
                        crate::metrics::record_effect(kind, false);
                        warn!(kind, error = %e, "Effect delivery failed");
                    }
                }
            }
            debug!("Effect worker stopped");
        });

        (Self { sender }, handle)
    }

    /// Queue an effect. Never blocks and never fails the caller.
    pub fn submit(&self, effect: Effect) {
        if let Err(e) = self.sender.try_send(effect) {
            let (reason, effect) = match e {
                mpsc::error::TrySendError::Full(effect) => ("queue full", effect),
                mpsc::error::TrySendError::Closed(effect) => ("queue closed", effect),
            };
            crate::metrics::record_effect_dropped();
            warn!(kind = effect.kind(), reason, "Effect dropped");
        }
    }
}

async fn deliver(
    mailer: &dyn Mailer,
    publisher: &dyn EventPublisher,
    effect: &Effect,
) -> Result<(), EffectError> {
    match effect {
        Effect::VerifyEmail(mail) => mailer.send_verify_email(mail).await,
        Effect::ResetEmail(mail) => mailer.send_reset_email(mail).await,
        Effect::Publish(event) => publisher.publish(event).await,
    }
}

/// Mailer that renders mails into the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verify_email(&self, mail: &MailMessage) -> Result<(), EffectError> {
        info!(username = %mail.username, email = %mail.email, "Verification mail queued");
        debug!(link = %mail.link(), "Verification link");
        Ok(())
    }

    async fn send_reset_email(&self, mail: &MailMessage) -> Result<(), EffectError> {
        info!(username = %mail.username, email = %mail.email, "Reset mail queued");
        debug!(link = %mail.link(), "Reset link");
        Ok(())
    }
}

/// In-process event bus built on a broadcast channel.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Event>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &Event) -> Result<(), EffectError> {
        // No subscriber is not a failure: nobody is listening yet.
        if self.sender.send(event.clone()).is_err() {
            debug!(kind = event.kind.as_str(), "Event published with no subscribers");
        }
        Ok(())
    }
}
