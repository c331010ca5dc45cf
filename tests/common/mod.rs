//! Integration test common infrastructure.
//!
//! Wires the core services against an in-memory database with recording
//! mail and event doubles, so tests can assert on fire-and-forget effects.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tat_core::services::{
    Credentials, EffectError, EffectQueue, Event, EventKind, EventPublisher, MailMessage, Mailer,
    NewUser,
};
use tat_core::{Config, Database, Services};
use tokio::sync::mpsc;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Which mail a [`RecordingMailer`] was asked to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Verify,
    Reset,
}

/// Mailer that forwards every mail to the test.
pub struct RecordingMailer {
    tx: mpsc::UnboundedSender<(MailKind, MailMessage)>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verify_email(&self, mail: &MailMessage) -> Result<(), EffectError> {
        self.tx
            .send((MailKind::Verify, mail.clone()))
            .map_err(|e| EffectError::Mail(e.to_string()))
    }

    async fn send_reset_email(&self, mail: &MailMessage) -> Result<(), EffectError> {
        self.tx
            .send((MailKind::Reset, mail.clone()))
            .map_err(|e| EffectError::Mail(e.to_string()))
    }
}

/// Publisher that forwards every event to the test.
pub struct RecordingPublisher {
    tx: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &Event) -> Result<(), EffectError> {
        self.tx
            .send(event.clone())
            .map_err(|e| EffectError::Publish(e.to_string()))
    }
}

/// A fully wired core for one test.
pub struct TestCore {
    pub db: Database,
    pub services: Services,
    mails: mpsc::UnboundedReceiver<(MailKind, MailMessage)>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl TestCore {
    /// Spawn a core with default configuration.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::with_config("").await
    }

    /// Spawn a core from a TOML configuration snippet. The database is always in memory.
    pub async fn with_config(toml: &str) -> anyhow::Result<Self> {
        let mut config = Config::from_toml(toml)?;
        config.database.path = ":memory:".to_string();

        let db = Database::new(&config.database.path).await?;
        let (mail_tx, mails) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (effects, _worker) = EffectQueue::spawn(
            Arc::new(RecordingMailer { tx: mail_tx }),
            Arc::new(RecordingPublisher { tx: event_tx }),
            config.effects.queue_capacity,
        );

        Ok(Self {
            services: Services::new(db.clone(), &config, effects),
            db,
            mails,
            events,
        })
    }

    /// Register and verify `username`, returning its issued credentials.
    pub async fn active_user(&self, username: &str) -> anyhow::Result<Credentials> {
        let registration = self
            .services
            .lifecycle
            .create(new_user(username))
            .await?;
        let credentials = self
            .services
            .lifecycle
            .verify(&registration.username, registration.token.expose())
            .await?;
        Ok(credentials)
    }

    /// Next mail handed to the mailer.
    pub async fn next_mail(&mut self) -> anyhow::Result<(MailKind, MailMessage)> {
        timeout(RECV_TIMEOUT, self.mails.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("mail channel closed"))
    }

    /// Next event of `kind`, skipping others.
    pub async fn next_event(&mut self, kind: EventKind) -> anyhow::Result<Event> {
        loop {
            let event = timeout(RECV_TIMEOUT, self.events.recv())
                .await?
                .ok_or_else(|| anyhow::anyhow!("event channel closed"))?;
            if event.kind == kind {
                return Ok(event);
            }
        }
    }
}

/// A registration request with derived fullname and email.
pub fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        fullname: format!("{username} fullname"),
        email: format!("{username}@example.com"),
        callback: None,
    }
}
