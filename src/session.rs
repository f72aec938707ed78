//! Collaboration sessions: the set of participants active on a document.
//!
//! A session exists only while it has participants. Creation happens on
//! first join and the owning coordinator destroys the record when the
//! last participant leaves, so an empty session is never observable.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::document::SessionInfo;

/// Active participants on a single document.
#[derive(Debug, Clone)]
pub struct Session {
    document_id: String,
    participants: HashSet<String>,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with its first participant.
    pub fn new(document_id: impl Into<String>, first_participant: impl Into<String>) -> Self {
        let mut participants = HashSet::new();
        participants.insert(first_participant.into());
        Self {
            document_id: document_id.into(),
            participants,
            started_at: Utc::now(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Add a participant. Returns `false` when already present (join is
    /// idempotent).
    pub fn join(&mut self, participant_id: impl Into<String>) -> bool {
        self.participants.insert(participant_id.into())
    }

    /// Remove a participant. Returns `false` when not a member (leave is
    /// an idempotent no-op).
    pub fn leave(&mut self, participant_id: &str) -> bool {
        self.participants.remove(participant_id)
    }

    pub fn is_member(&self, participant_id: &str) -> bool {
        self.participants.contains(participant_id)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Snapshot the session for callers, with participants sorted so the
    /// output is deterministic.
    pub fn info(&self) -> SessionInfo {
        let mut participants: Vec<String> = self.participants.iter().cloned().collect();
        participants.sort();
        SessionInfo {
            document_id: self.document_id.clone(),
            participants,
        }
    }
}
