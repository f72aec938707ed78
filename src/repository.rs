//! The narrow persistence contract to the external document store.
//!
//! The core reads and writes documents and versions through
//! [`DocumentRepository`] and never assumes a storage engine. Identifier
//! references only: no entity graphs, no back-pointers. The access check
//! lives here too, because permission records belong to the same external
//! store as the documents they guard.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::Document;
use crate::error::Result;
use crate::version::Version;

/// Persistence seam for documents and their version history.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Fetch a document by id. `None` when it does not exist.
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    /// Persist the current state of a document.
    async fn save_document(&self, document: &Document) -> Result<()>;

    /// Persist a version record. Versions are append-only; implementations
    /// must never overwrite or delete prior entries.
    async fn append_version(&self, version: &Version) -> Result<()>;

    /// All persisted versions of a document, any order.
    async fn load_versions(&self, document_id: &str) -> Result<Vec<Version>>;

    /// Whether the participant may edit the document.
    async fn can_edit(&self, document_id: &str, participant_id: &str) -> Result<bool>;
}

/// In-memory repository for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<String, Document>,
    versions: HashMap<String, Vec<Version>>,
    editors: HashMap<String, HashSet<String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document. The owner can always edit.
    pub async fn insert_document(&self, document: Document) {
        let mut state = self.inner.write().await;
        state.documents.insert(document.id.clone(), document);
    }

    /// Grant edit access to a participant other than the owner.
    pub async fn grant_edit(&self, document_id: &str, participant_id: &str) {
        let mut state = self.inner.write().await;
        state
            .editors
            .entry(document_id.to_string())
            .or_default()
            .insert(participant_id.to_string());
    }
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let state = self.inner.read().await;
        Ok(state.documents.get(document_id).cloned())
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        let mut state = self.inner.write().await;
        state.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn append_version(&self, version: &Version) -> Result<()> {
        let mut state = self.inner.write().await;
        state
            .versions
            .entry(version.document_id.clone())
            .or_default()
            .push(version.clone());
        Ok(())
    }

    async fn load_versions(&self, document_id: &str) -> Result<Vec<Version>> {
        let state = self.inner.read().await;
        Ok(state.versions.get(document_id).cloned().unwrap_or_default())
    }

    async fn can_edit(&self, document_id: &str, participant_id: &str) -> Result<bool> {
        let state = self.inner.read().await;
        let is_owner = state
            .documents
            .get(document_id)
            .map(|doc| doc.owner_id == participant_id)
            .unwrap_or(false);
        let is_editor = state
            .editors
            .get(document_id)
            .map(|editors| editors.contains(participant_id))
            .unwrap_or(false);
        Ok(is_owner || is_editor)
    }
}
