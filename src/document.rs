//! Shared data types for documents and edit operations.
//!
//! A [`Document`] is the working copy the synchronizer mutates; the
//! authoritative record lives behind the [`DocumentRepository`]
//! (`crate::repository`) contract. A [`DocumentChange`] is ephemeral:
//! it is validated, applied, and discarded once the version it produced
//! exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Working copy of a document under active editing.
///
/// The revision counter increments exactly once per applied change or
/// revert and is the basis for stale-write detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier
    pub id: String,
    /// Current content
    pub content: String,
    /// Strictly increasing revision counter
    pub revision: u64,
    /// Identifier of the owning participant
    pub owner_id: String,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            revision: 0,
            owner_id: owner_id.into(),
        }
    }
}

/// A single edit operation.
///
/// Positions are character offsets into the current content. The strict
/// base-revision check in the synchronizer guarantees an operation is
/// applied to the exact content it was produced against, so offsets are
/// applied verbatim with no rebasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeOp {
    /// Insert `text` at character offset `position`
    Insert { position: usize, text: String },
    /// Delete the character range `start..end`
    Delete { start: usize, end: usize },
    /// Replace the entire content (used by revert)
    Replace { content: String },
}

impl ChangeOp {
    /// Validate the operation against `content` without applying it.
    pub fn validate(&self, content: &str) -> Result<()> {
        let len = content.chars().count();
        match self {
            ChangeOp::Insert { position, .. } => {
                if *position > len {
                    return Err(Error::InvalidChange(format!(
                        "insert position {position} past end of content (length {len})"
                    )));
                }
            }
            ChangeOp::Delete { start, end } => {
                if start > end {
                    return Err(Error::InvalidChange(format!(
                        "delete range start {start} after end {end}"
                    )));
                }
                if *end > len {
                    return Err(Error::InvalidChange(format!(
                        "delete range end {end} past end of content (length {len})"
                    )));
                }
            }
            ChangeOp::Replace { .. } => {}
        }
        Ok(())
    }

    /// Apply the operation to `content`, returning the new content.
    ///
    /// Callers must validate first; out-of-range offsets are a caller bug.
    pub fn apply(&self, content: &str) -> String {
        match self {
            ChangeOp::Insert { position, text } => {
                let mut out = String::with_capacity(content.len() + text.len());
                out.extend(content.chars().take(*position));
                out.push_str(text);
                out.extend(content.chars().skip(*position));
                out
            }
            ChangeOp::Delete { start, end } => {
                let mut out = String::with_capacity(content.len());
                out.extend(content.chars().take(*start));
                out.extend(content.chars().skip(*end));
                out
            }
            ChangeOp::Replace { content: new } => new.clone(),
        }
    }
}

/// An edit submitted by a participant, consumed by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// Participant who authored the change
    pub author_id: String,
    /// Section the change targets, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    /// The edit operation
    pub op: ChangeOp,
    /// Document revision the change was produced against
    pub base_revision: u64,
}

impl DocumentChange {
    pub fn new(author_id: impl Into<String>, op: ChangeOp, base_revision: u64) -> Self {
        Self {
            author_id: author_id.into(),
            section_id: None,
            op,
            base_revision,
        }
    }

    /// Target a specific section (subject to section locking).
    pub fn in_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }
}

/// Cursor position exchanged between clients; never touches state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: u64,
    pub column: u64,
}

/// Snapshot of a session returned from `join` and participant listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub document_id: String,
    /// Active participants, sorted for deterministic output
    pub participants: Vec<String>,
}

/// Read-only view used by a client to resynchronize after a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    pub document_id: String,
    pub content: String,
    pub revision: u64,
    /// Section id to lock holder
    pub locked_sections: Vec<(String, String)>,
    pub retrieved_at: DateTime<Utc>,
}
