//! File-backed document repository.
//!
//! A reference [`DocumentRepository`] for single-host deployments and
//! integration testing. Layout under the store root:
//!
//! ```text
//! <root>/
//!   documents/<key>.json      # document state + editor grants (atomic writes)
//!   versions/<key>.jsonl      # append-only version records
//! ```
//!
//! Document writes go through temp-file-plus-rename so concurrent readers
//! never observe a partial write. Version history is JSONL append-only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::document::Document;
use crate::error::Result;
use crate::repository::DocumentRepository;
use crate::version::Version;

/// Persisted document record: the document plus its editor grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    document: Document,
    #[serde(default)]
    editors: Vec<String>,
}

/// File-system backed repository.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the store directories.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.documents_dir()).await?;
        fs::create_dir_all(self.versions_dir()).await?;
        Ok(())
    }

    /// Create a document record. The owner can always edit.
    pub async fn create_document(&self, document: Document) -> Result<()> {
        self.write_stored(&StoredDocument {
            document,
            editors: Vec::new(),
        })
        .await
    }

    /// Grant edit access to a participant other than the owner.
    pub async fn grant_edit(&self, document_id: &str, participant_id: &str) -> Result<()> {
        if let Some(mut stored) = self.read_stored(document_id).await? {
            if !stored.editors.iter().any(|e| e == participant_id) {
                stored.editors.push(participant_id.to_string());
                self.write_stored(&stored).await?;
            }
        }
        Ok(())
    }

    fn documents_dir(&self) -> PathBuf {
        self.root.join("documents")
    }

    fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    fn document_file(&self, document_id: &str) -> PathBuf {
        self.documents_dir().join(format!("{}.json", file_key(document_id)))
    }

    fn versions_file(&self, document_id: &str) -> PathBuf {
        self.versions_dir().join(format!("{}.jsonl", file_key(document_id)))
    }

    async fn read_stored(&self, document_id: &str) -> Result<Option<StoredDocument>> {
        let path = self.document_file(document_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let stored: StoredDocument = serde_json::from_str(&content)?;
        Ok(Some(stored))
    }

    async fn write_stored(&self, stored: &StoredDocument) -> Result<()> {
        let path = self.document_file(&stored.document.id);
        let json = serde_json::to_string_pretty(stored)?;
        write_atomic(&path, json.as_bytes()).await
    }
}

#[async_trait]
impl DocumentRepository for FileStore {
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(self.read_stored(document_id).await?.map(|s| s.document))
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        // Keep editor grants across saves of the working copy.
        let editors = self
            .read_stored(&document.id)
            .await?
            .map(|s| s.editors)
            .unwrap_or_default();
        self.write_stored(&StoredDocument {
            document: document.clone(),
            editors,
        })
        .await
    }

    async fn append_version(&self, version: &Version) -> Result<()> {
        let path = self.versions_file(&version.document_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(version)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn load_versions(&self, document_id: &str) -> Result<Vec<Version>> {
        let path = self.versions_file(document_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).await?;
        let mut versions = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let version: Version = serde_json::from_str(line)?;
            versions.push(version);
        }
        Ok(versions)
    }

    async fn can_edit(&self, document_id: &str, participant_id: &str) -> Result<bool> {
        match self.read_stored(document_id).await? {
            Some(stored) => Ok(stored.document.owner_id == participant_id
                || stored.editors.iter().any(|e| e == participant_id)),
            None => Ok(false),
        }
    }
}

/// Write data atomically using temp file + rename so readers never see a
/// partial write.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;

    fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Sanitize a document id into a stable file name.
fn file_key(document_id: &str) -> String {
    let mut key = String::with_capacity(document_id.len());
    for ch in document_id.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            key.push(ch);
        } else {
            key.push('_');
        }
    }
    if key.is_empty() {
        "_".to_string()
    } else {
        key
    }
}
