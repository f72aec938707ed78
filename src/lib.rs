//! coedit - Collaborative Document Synchronization Core
//!
//! This library provides the coordination core for multi-user document
//! editing: sessions, section locks, ordered change application, and
//! version history behind a single async facade.
//!
//! # Core Concepts
//!
//! - **Sessions**: The set of participants active on a document
//! - **Section Locks**: Exclusive edit reservations with TTL expiry
//! - **Change Sync**: Atomic batches with stale-write detection
//! - **Version History**: Append-only snapshots; revert never rewrites
//! - **Notifier**: The fan-out seam to whatever transport embeds the core
//!
//! # Module Organization
//!
//! - `config`: Configuration loading from `coedit.toml`
//! - `coordinator`: The public async facade over per-document rooms
//! - `document`: Documents, edit operations, and shared view types
//! - `error`: Error types and result aliases
//! - `events`: Broadcast events and the [`Notifier`](events::Notifier) seam
//! - `lock`: Section lock table with TTL expiry and forced takeover
//! - `repository`: Persistence contract to the external document store
//! - `session`: Participant membership per document
//! - `storage`: File-backed reference repository
//! - `sync`: Batch validation and application
//! - `version`: Append-only version history

pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod events;
pub mod lock;
pub mod repository;
pub mod session;
pub mod storage;
pub mod sync;
pub mod version;

pub use config::{Config, SnapshotPolicy};
pub use coordinator::Coordinator;
pub use document::{ChangeOp, CursorPosition, Document, DocumentChange, DocumentState, SessionInfo};
pub use error::{Error, ErrorKind, Result};
pub use events::{BroadcastNotifier, CollabEvent, Notification, Notifier, NullNotifier};
pub use repository::{DocumentRepository, MemoryRepository};
pub use storage::FileStore;
pub use version::Version;
