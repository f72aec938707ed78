//! Ordered change application with conflict detection.
//!
//! A batch is validated and applied as a unit against a scratch copy of
//! the document; nothing is committed unless every change passes its
//! lock, revision, and payload checks, so a failing batch leaves the
//! document untouched. Within a batch, changes apply in the exact order
//! submitted and the revision counter increments once per change.

use chrono::{DateTime, Duration, Utc};

use crate::document::{Document, DocumentChange};
use crate::error::{Error, Result};
use crate::lock::LockTable;

/// Result of a successfully applied batch, ready to commit.
#[derive(Debug, Clone)]
pub struct AppliedBatch {
    /// Document revision after the batch
    pub new_revision: u64,
    /// Document content after the batch
    pub new_content: String,
    /// Audit trail: the changes in application order
    pub applied: Vec<DocumentChange>,
    /// Sections the author edited while holding their lock; the caller
    /// refreshes these so active editing keeps a lock alive
    pub touched_sections: Vec<String>,
}

/// Validate and apply `changes` in order against `document`.
///
/// Checks per change:
/// 1. a section lock held by another live participant fails the whole
///    batch with a lock conflict;
/// 2. the change's base revision must equal the document revision at the
///    point it applies (stale-write detection);
/// 3. the payload must be applicable to the current content.
///
/// The input document is not mutated; the caller commits the returned
/// [`AppliedBatch`] under its per-document critical section.
pub fn apply_batch(
    document: &Document,
    participant_id: &str,
    changes: &[DocumentChange],
    locks: &LockTable,
    lock_ttl: Duration,
    now: DateTime<Utc>,
) -> Result<AppliedBatch> {
    if changes.is_empty() {
        return Err(Error::EmptyBatch);
    }

    let mut content = document.content.clone();
    let mut revision = document.revision;
    let mut touched_sections = Vec::new();

    for change in changes {
        if change.author_id != participant_id {
            return Err(Error::InvalidChange(format!(
                "change authored by {} submitted by {}",
                change.author_id, participant_id
            )));
        }

        if let Some(section_id) = &change.section_id {
            match locks.holder(section_id, lock_ttl, now) {
                Some(lock) if lock.participant_id != participant_id => {
                    return Err(Error::SectionLockedByOther {
                        section_id: section_id.clone(),
                        holder: lock.participant_id.clone(),
                    });
                }
                Some(_) => touched_sections.push(section_id.clone()),
                None => {}
            }
        }

        if change.base_revision != revision {
            return Err(Error::StaleRevision {
                base: change.base_revision,
                current: revision,
            });
        }

        change.op.validate(&content)?;
        content = change.op.apply(&content);
        revision += 1;
    }

    Ok(AppliedBatch {
        new_revision: revision,
        new_content: content,
        applied: changes.to_vec(),
        touched_sections,
    })
}
