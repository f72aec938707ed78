//! Session membership: join, leave, participant listing, and the
//! events each transition emits.

mod support;

use coedit::{CollabEvent, CursorPosition, Error, ErrorKind};
use support::fixture;

#[tokio::test]
async fn first_join_creates_the_session() {
    let f = fixture().await;

    let info = f.coordinator.join("doc", "alice").await.expect("join");
    assert_eq!(info.document_id, "doc");
    assert_eq!(info.participants, vec!["alice"]);

    let participants = f.coordinator.list_participants("doc").await;
    assert_eq!(participants, vec!["alice"]);
}

#[tokio::test]
async fn participants_are_listed_sorted() {
    let f = fixture().await;
    f.coordinator.join("doc", "carol").await.expect("join");
    f.coordinator.join("doc", "alice").await.expect("join");
    f.coordinator.join("doc", "bob").await.expect("join");

    let info = f.coordinator.join("doc", "bob").await.expect("rejoin");
    assert_eq!(info.participants, vec!["alice", "bob", "carol"]);
}

#[tokio::test]
async fn rejoin_is_idempotent_and_silent() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");

    let mut rx = f.notifier.subscribe();
    let info = f.coordinator.join("doc", "alice").await.expect("rejoin");
    assert_eq!(info.participants, vec!["alice"]);
    assert_eq!(f.coordinator.list_participants("doc").await.len(), 1);

    // No duplicate-join event; the next event is bob's.
    f.coordinator.join("doc", "bob").await.expect("join");
    let notification = rx.recv().await.expect("event");
    assert_eq!(
        notification.event,
        CollabEvent::UserJoined {
            participant_id: "bob".to_string()
        }
    );
}

#[tokio::test]
async fn join_notifies_others_but_not_the_actor() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");

    let mut rx = f.notifier.subscribe();
    f.coordinator.join("doc", "bob").await.expect("join");

    let notification = rx.recv().await.expect("event");
    assert_eq!(notification.exclude.as_deref(), Some("bob"));
}

#[tokio::test]
async fn join_missing_document_is_not_found() {
    let f = fixture().await;
    let err = f
        .coordinator
        .join("missing", "alice")
        .await
        .expect_err("no document");
    assert!(matches!(err, Error::DocumentNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn join_without_access_is_denied() {
    let f = fixture().await;
    let err = f
        .coordinator
        .join("doc", "mallory")
        .await
        .expect_err("no access");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn leave_removes_membership_and_notifies() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");
    f.coordinator.join("doc", "bob").await.expect("join");

    let mut rx = f.notifier.subscribe();
    f.coordinator.leave("doc", "bob").await;

    assert_eq!(f.coordinator.list_participants("doc").await, vec!["alice"]);
    let notification = rx.recv().await.expect("event");
    assert_eq!(
        notification.event,
        CollabEvent::UserLeft {
            participant_id: "bob".to_string()
        }
    );
}

#[tokio::test]
async fn leave_releases_held_locks_first() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");
    f.coordinator.join("doc", "bob").await.expect("join");
    assert!(f
        .coordinator
        .lock_section("doc", "bob", "intro")
        .await
        .expect("lock"));

    let mut rx = f.notifier.subscribe();
    f.coordinator.leave("doc", "bob").await;

    let first = rx.recv().await.expect("event");
    assert_eq!(
        first.event,
        CollabEvent::SectionUnlocked {
            section_id: "intro".to_string()
        }
    );
    let second = rx.recv().await.expect("event");
    assert_eq!(
        second.event,
        CollabEvent::UserLeft {
            participant_id: "bob".to_string()
        }
    );

    // Section is free for someone else now.
    assert!(f
        .coordinator
        .lock_section("doc", "alice", "intro")
        .await
        .expect("lock"));
}

#[tokio::test]
async fn leave_is_a_noop_for_non_members() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");

    f.coordinator.leave("doc", "never-joined").await;
    f.coordinator.leave("missing", "alice").await;
    assert_eq!(f.coordinator.list_participants("doc").await, vec!["alice"]);
}

#[tokio::test]
async fn session_disappears_after_last_leave() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");
    f.coordinator.leave("doc", "alice").await;

    assert!(f.coordinator.list_participants("doc").await.is_empty());
}

#[tokio::test]
async fn listing_participants_of_a_quiet_document_is_empty() {
    let f = fixture().await;
    assert!(f.coordinator.list_participants("doc").await.is_empty());
    assert!(f.coordinator.list_participants("missing").await.is_empty());
}

#[tokio::test]
async fn cursor_broadcast_reaches_others_only() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");
    f.coordinator.join("doc", "bob").await.expect("join");

    let mut rx = f.notifier.subscribe();
    f.coordinator
        .broadcast_cursor("doc", "alice", CursorPosition { line: 3, column: 14 })
        .await;

    let notification = rx.recv().await.expect("event");
    assert_eq!(notification.exclude.as_deref(), Some("alice"));
    assert_eq!(
        notification.event,
        CollabEvent::CursorMoved {
            participant_id: "alice".to_string(),
            position: CursorPosition { line: 3, column: 14 },
        }
    );
}

#[tokio::test]
async fn cursor_from_non_member_is_dropped() {
    let f = fixture().await;
    f.coordinator.join("doc", "alice").await.expect("join");

    let mut rx = f.notifier.subscribe();
    f.coordinator
        .broadcast_cursor("doc", "bob", CursorPosition { line: 1, column: 1 })
        .await;
    f.coordinator.leave("doc", "alice").await;

    // The only event seen is alice leaving.
    let notification = rx.recv().await.expect("event");
    assert_eq!(
        notification.event,
        CollabEvent::UserLeft {
            participant_id: "alice".to_string()
        }
    );
}
