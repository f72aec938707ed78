//! Append-only version history.
//!
//! Every snapshot becomes an immutable [`Version`] with the next sequence
//! number for its document (1, 2, 3, ... with no gaps or reuse). Exactly
//! one version per document carries the current flag. History is never
//! rewritten: a revert records a brand-new version whose content equals
//! the target's.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable snapshot of document content at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub document_id: String,
    /// Per-document sequence number, strictly increasing from 1
    pub sequence: u64,
    pub content: String,
    /// Content size in bytes (UTF-8)
    pub size_bytes: u64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Exactly one version per document is current
    pub is_current: bool,
}

/// Append-only per-document version history.
#[derive(Debug, Clone, Default)]
pub struct VersionStore {
    versions: HashMap<String, Vec<Version>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted versions, e.g. on
    /// startup from the external document store.
    pub fn from_versions(versions: Vec<Version>) -> Self {
        let mut store = Self::new();
        for version in versions {
            store
                .versions
                .entry(version.document_id.clone())
                .or_default()
                .push(version);
        }
        for history in store.versions.values_mut() {
            history.sort_by_key(|v| v.sequence);
            normalize_current(history);
        }
        store
    }

    /// Absorb persisted history for a document not yet tracked in memory.
    /// A no-op when history is already present or `versions` is empty.
    pub fn seed(&mut self, document_id: &str, mut versions: Vec<Version>) {
        if versions.is_empty() || self.count(document_id) > 0 {
            return;
        }
        versions.sort_by_key(|v| v.sequence);
        normalize_current(&mut versions);
        self.versions.insert(document_id.to_string(), versions);
    }

    /// Build the next version for a document without recording it.
    ///
    /// The caller persists the draft and then hands it to
    /// [`commit`](Self::commit). The sequence number is not reserved: if
    /// persistence fails and the draft is dropped, the next draft reuses
    /// it, keeping the history gap-free.
    pub fn draft(
        &self,
        document_id: &str,
        content: &str,
        created_by: &str,
        comment: Option<String>,
    ) -> Version {
        let sequence = self
            .versions
            .get(document_id)
            .and_then(|history| history.last())
            .map(|v| v.sequence + 1)
            .unwrap_or(1);
        Version {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            sequence,
            content: content.to_string(),
            size_bytes: content.len() as u64,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            comment,
            is_current: true,
        }
    }

    /// Record a drafted version, moving the current flag to it.
    pub fn commit(&mut self, version: Version) {
        let history = self.versions.entry(version.document_id.clone()).or_default();
        if let Some(previous) = history.iter_mut().find(|v| v.is_current) {
            previous.is_current = false;
        }
        tracing::debug!(
            document_id = %version.document_id,
            sequence = version.sequence,
            size_bytes = version.size_bytes,
            "snapshot recorded"
        );
        history.push(version);
    }

    /// Draft and record a snapshot in one step.
    pub fn snapshot(
        &mut self,
        document_id: &str,
        content: &str,
        created_by: &str,
        comment: Option<String>,
    ) -> Version {
        let version = self.draft(document_id, content, created_by, comment);
        self.commit(version.clone());
        version
    }

    /// All versions for a document, newest first. Empty when the document
    /// has never been snapshotted.
    pub fn list(&self, document_id: &str) -> Vec<Version> {
        let mut versions = self
            .versions
            .get(document_id)
            .cloned()
            .unwrap_or_default();
        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        versions
    }

    /// Look up a version by id, scoped to the document.
    pub fn find(&self, document_id: &str, version_id: &Uuid) -> Option<&Version> {
        self.versions
            .get(document_id)
            .and_then(|history| history.iter().find(|v| v.id == *version_id))
    }

    /// The version currently flagged as current, if any.
    pub fn current(&self, document_id: &str) -> Option<&Version> {
        self.versions
            .get(document_id)
            .and_then(|history| history.iter().find(|v| v.is_current))
    }

    /// Number of versions recorded for a document.
    pub fn count(&self, document_id: &str) -> usize {
        self.versions.get(document_id).map(Vec::len).unwrap_or(0)
    }
}

/// Persisted records freeze the current flag at write time, so every
/// line of an append-only log claims to be current. Only the highest
/// sequence actually is.
fn normalize_current(history: &mut [Version]) {
    let last = history.len();
    for (i, version) in history.iter_mut().enumerate() {
        version.is_current = i + 1 == last;
    }
}
