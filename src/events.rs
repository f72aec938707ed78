//! Broadcast events and the notifier seam.
//!
//! The core never talks to a transport. Every state change emits a
//! [`CollabEvent`] through the [`Notifier`] capability; the embedding
//! server decides how notifications reach connected clients. Delivery is
//! at-least-once and best-effort ordered; there is no persisted event log
//! or replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::document::{CursorPosition, DocumentChange};

pub const EVENT_SCHEMA_VERSION: &str = "coedit.event.v1";

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Events fanned out to the other active participants of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CollabEvent {
    UserJoined {
        participant_id: String,
    },
    UserLeft {
        participant_id: String,
    },
    ChangesApplied {
        participant_id: String,
        changes: Vec<DocumentChange>,
        new_revision: u64,
    },
    SectionLocked {
        section_id: String,
        participant_id: String,
    },
    SectionUnlocked {
        section_id: String,
    },
    CursorMoved {
        participant_id: String,
        position: CursorPosition,
    },
}

/// A published event with its routing envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub schema_version: &'static str,
    pub document_id: String,
    pub timestamp: DateTime<Utc>,
    /// Participant the transport must not deliver to (the actor)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    #[serde(flatten)]
    pub event: CollabEvent,
}

impl Notification {
    pub fn new(document_id: impl Into<String>, event: CollabEvent, exclude: Option<&str>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            document_id: document_id.into(),
            timestamp: Utc::now(),
            exclude: exclude.map(str::to_string),
            event,
        }
    }
}

/// Fan-out capability the core depends on.
///
/// `exclude` names the acting participant; implementations must not
/// deliver the event back to them.
pub trait Notifier: Send + Sync {
    fn publish(&self, document_id: &str, event: CollabEvent, exclude: Option<&str>);
}

/// In-process notifier backed by a `tokio::sync::broadcast` channel.
///
/// Transport adapters subscribe and forward notifications to their
/// connections, applying the `exclude` field per recipient. With no
/// subscribers events are dropped, which is fine: nobody is listening.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every notification published through this notifier.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, document_id: &str, event: CollabEvent, exclude: Option<&str>) {
        // SendError only means there are zero receivers.
        let _ = self
            .sender
            .send(Notification::new(document_id, event, exclude));
    }
}

/// Notifier that drops everything. Useful in tests and batch tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn publish(&self, _document_id: &str, _event: CollabEvent, _exclude: Option<&str>) {}
}
