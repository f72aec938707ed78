//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use coedit::{
    BroadcastNotifier, ChangeOp, Config, Coordinator, Document, DocumentChange, MemoryRepository,
};

static TRACING: Once = Once::new();

/// Route library logs through the test harness, filtered by RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A coordinator over a seeded in-memory repository.
///
/// The repository holds one document `doc` ("hello world", owned by
/// `alice`) with edit grants for `bob` and `carol`. `mallory` has no
/// access anywhere.
pub struct Fixture {
    pub repo: Arc<MemoryRepository>,
    pub notifier: Arc<BroadcastNotifier>,
    pub coordinator: Arc<Coordinator>,
}

pub async fn fixture() -> Fixture {
    fixture_with(Config::default()).await
}

pub async fn fixture_with(config: Config) -> Fixture {
    init_tracing();
    let repo = Arc::new(MemoryRepository::new());
    repo.insert_document(Document::new("doc", "hello world", "alice"))
        .await;
    repo.grant_edit("doc", "bob").await;
    repo.grant_edit("doc", "carol").await;

    let notifier = Arc::new(BroadcastNotifier::default());
    let coordinator = Arc::new(
        Coordinator::new(repo.clone(), notifier.clone(), &config).expect("coordinator"),
    );
    Fixture {
        repo,
        notifier,
        coordinator,
    }
}

pub fn insert(author: &str, position: usize, text: &str, base: u64) -> DocumentChange {
    DocumentChange::new(
        author,
        ChangeOp::Insert {
            position,
            text: text.to_string(),
        },
        base,
    )
}

pub fn delete(author: &str, start: usize, end: usize, base: u64) -> DocumentChange {
    DocumentChange::new(author, ChangeOp::Delete { start, end }, base)
}
