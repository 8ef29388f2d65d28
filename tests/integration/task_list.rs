//! Integration tests for the optimistic `TaskList`.
//!
//! Exercises the commit/report cycle: provisional ids, sync state
//! transitions, and re-issuing rejected writes on the next commit.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use planverse::store::{AccessPolicy, AccessRule, MemoryStore, TaskStore};
use planverse::sync::{FailureNotifier, Reconciler};
use planverse::tasks::{SyncState, TaskList, WriteOp};
use planverse_proto::{CollectionPath, Priority, Task, TaskDraft, TaskEdit, WriteKind};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn path() -> CollectionPath {
    CollectionPath::tasks_for("u1").unwrap()
}

fn due(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap()
}

fn draft(title: &str, day: u32) -> Task {
    Task::new(title, due(day)).unwrap()
}

async fn open_list(store: &Arc<MemoryStore>) -> (TaskList, Reconciler<MemoryStore>) {
    let snapshot = store.list(&path()).await.unwrap();
    let reconciler = Reconciler::new(Arc::clone(store), path());
    (TaskList::from_snapshot(snapshot), reconciler)
}

// ===========================================================================
// Happy path
// ===========================================================================

#[tokio::test]
async fn added_task_gets_store_id_after_report() {
    let store = Arc::new(MemoryStore::new());
    let (mut list, reconciler) = open_list(&store).await;

    let provisional = list.add(TaskDraft::new("Write report", due(3))).unwrap();
    let handle = list.commit(&reconciler);
    assert_eq!(list.sync_state(&provisional), Some(&SyncState::Pending));
    assert_eq!(list.baseline().len(), 1);

    let report = handle.wait().await;
    list.apply_report(&report);

    let assigned = report.outcomes[0].assigned_id().unwrap().clone();
    assert_ne!(assigned, provisional);
    assert_eq!(list.tasks()[0].id.as_ref(), Some(&assigned));
    assert_eq!(list.baseline()[0].id.as_ref(), Some(&assigned));
    assert_eq!(list.sync_state(&assigned), Some(&SyncState::Confirmed));
    // the provisional id still resolves
    assert_eq!(list.get(&provisional).unwrap().title, "Write report");
    assert_eq!(list.pending_count(), 0);

    // a second commit has nothing left to do
    assert!(list.commit(&reconciler).is_empty());
    assert_eq!(store.len(&path()).await, 1);
}

#[tokio::test]
async fn edit_toggle_remove_round_trip() {
    let store = Arc::new(MemoryStore::new());
    store.seed(&path(), [draft("A", 1), draft("B", 2), draft("C", 3)]).await;
    let (mut list, reconciler) = open_list(&store).await;
    let ids: Vec<_> = list.tasks().iter().map(|t| t.id.clone().unwrap()).collect();

    list.toggle_complete(&ids[0]).unwrap();
    list.edit(
        &ids[1],
        &TaskEdit {
            priority: Some(Priority::High),
            description: Some(Some("details".to_string())),
            ..TaskEdit::default()
        },
    )
    .unwrap();
    list.remove(&ids[2]).unwrap();
    assert_eq!(list.pending_count(), 3);

    let handle = list.commit(&reconciler);
    assert_eq!(handle.len(), 3);
    let report = handle.wait().await;
    list.apply_report(&report);

    assert_eq!(list.pending_count(), 0);
    assert_eq!(list.sync_state(&ids[0]), Some(&SyncState::Confirmed));
    assert!(list.sync_state(&ids[2]).is_none());
    assert_eq!(store.list(&path()).await.unwrap(), list.desired());
}

#[tokio::test]
async fn edits_that_cancel_out_settle_without_writes() {
    let store = Arc::new(MemoryStore::new());
    store.seed(&path(), [draft("A", 1)]).await;
    let (mut list, reconciler) = open_list(&store).await;
    let id = list.tasks()[0].id.clone().unwrap();

    list.toggle_complete(&id).unwrap();
    list.toggle_complete(&id).unwrap();
    assert_eq!(list.sync_state(&id), Some(&SyncState::Pending));

    let handle = list.commit(&reconciler);
    assert!(handle.is_empty());
    assert_eq!(list.sync_state(&id), Some(&SyncState::Confirmed));
}

// ===========================================================================
// Failures and retry
// ===========================================================================

#[tokio::test]
async fn rejected_create_is_failed_and_retried_on_next_commit() {
    let store = Arc::new(
        MemoryStore::new()
            .with_policy(AccessPolicy::allow_all().with_rule(AccessRule::deny(WriteKind::Create))),
    );
    let (notifier, mut failures) = FailureNotifier::channel(4);
    let reconciler = Reconciler::new(Arc::clone(&store), path()).with_notifier(notifier);
    let mut list = TaskList::new();

    let id = list.add(TaskDraft::new("Pay rent", due(1))).unwrap();
    let report = list.commit(&reconciler).wait().await;
    list.apply_report(&report);

    // optimistic state survives the rejection
    assert_eq!(list.tasks().len(), 1);
    assert!(matches!(list.sync_state(&id), Some(SyncState::Failed(_))));
    assert_eq!(list.failed().count(), 1);
    assert!(list.baseline().is_empty());
    assert!(failures.recv().await.unwrap().is_permission());

    store.set_policy(AccessPolicy::allow_all());
    let handle = list.commit(&reconciler);
    assert_eq!(handle.len(), 1);
    let report = handle.wait().await;
    list.apply_report(&report);

    assert_eq!(list.failed().count(), 0);
    assert_eq!(list.sync_state(&id), Some(&SyncState::Confirmed));
    assert_eq!(store.len(&path()).await, 1);
}

#[tokio::test]
async fn rejected_update_restores_baseline_for_retry() {
    let store = Arc::new(MemoryStore::new());
    store.seed(&path(), [draft("A", 1)]).await;
    let (mut list, reconciler) = open_list(&store).await;
    let id = list.tasks()[0].id.clone().unwrap();

    store.set_policy(AccessPolicy::allow_all().with_rule(AccessRule::deny(WriteKind::Update)));
    list.toggle_complete(&id).unwrap();
    let report = list.commit(&reconciler).wait().await;
    list.apply_report(&report);

    assert!(matches!(list.sync_state(&id), Some(SyncState::Failed(reason)) if reason.contains("update")));
    assert!(list.tasks()[0].completed);
    assert!(!list.baseline()[0].completed);
    assert!(!store.get(&path(), &id).await.unwrap().completed);

    store.set_policy(AccessPolicy::allow_all());
    let report = list.commit(&reconciler).wait().await;
    list.apply_report(&report);
    assert_eq!(list.sync_state(&id), Some(&SyncState::Confirmed));
    assert!(store.get(&path(), &id).await.unwrap().completed);
}

#[tokio::test]
async fn rejected_delete_is_reissued() {
    let store = Arc::new(MemoryStore::new());
    store.seed(&path(), [draft("A", 1)]).await;
    let (mut list, reconciler) = open_list(&store).await;
    let id = list.tasks()[0].id.clone().unwrap();

    store.set_policy(AccessPolicy::allow_all().with_rule(AccessRule::deny(WriteKind::Delete)));
    list.remove(&id).unwrap();
    let report = list.commit(&reconciler).wait().await;
    list.apply_report(&report);

    assert!(list.tasks().is_empty());
    assert!(matches!(list.sync_state(&id), Some(SyncState::Failed(_))));
    assert_eq!(store.len(&path()).await, 1);

    store.set_policy(AccessPolicy::allow_all());
    let report = list.commit(&reconciler).wait().await;
    list.apply_report(&report);
    assert!(list.sync_state(&id).is_none());
    assert_eq!(store.len(&path()).await, 0);
}

#[tokio::test]
async fn stale_report_does_not_override_newer_edit() {
    let store = Arc::new(MemoryStore::new());
    store.seed(&path(), [draft("A", 1)]).await;
    let (mut list, reconciler) = open_list(&store).await;
    let id = list.tasks()[0].id.clone().unwrap();

    list.toggle_complete(&id).unwrap();
    let first = list.commit(&reconciler);
    list.edit(
        &id,
        &TaskEdit {
            title: Some("A2".to_string()),
            ..TaskEdit::default()
        },
    )
    .unwrap();
    let second = list.commit(&reconciler);

    let first = first.wait().await;
    list.apply_report(&first);
    assert_eq!(list.sync_state(&id), Some(&SyncState::Pending));

    let second = second.wait().await;
    list.apply_report(&second);
    assert_eq!(list.sync_state(&id), Some(&SyncState::Confirmed));

    let stored = store.get(&path(), &id).await.unwrap();
    assert_eq!(stored.title, "A2");
    assert!(stored.completed);
}

#[tokio::test]
async fn task_removed_before_create_confirms_is_deleted_next_commit() {
    let store = Arc::new(MemoryStore::new());
    let (mut list, reconciler) = open_list(&store).await;

    let id = list.add(TaskDraft::new("Fleeting", due(1))).unwrap();
    let create = list.commit(&reconciler);
    list.remove(&id).unwrap();
    let delete = list.commit(&reconciler);

    let delete = delete.wait().await;
    list.apply_report(&delete);
    let create = create.wait().await;
    list.apply_report(&create);
    assert_eq!(store.len(&path()).await, 1);

    let cleanup = list.commit(&reconciler);
    assert_eq!(cleanup.len(), 1);
    let cleanup = cleanup.wait().await;
    list.apply_report(&cleanup);
    assert_eq!(store.len(&path()).await, 0);
    assert!(list.tasks().is_empty());
    assert_eq!(list.pending_count(), 0);
}

#[tokio::test]
async fn edit_during_in_flight_create_is_sent_after_id_is_assigned() {
    let store = Arc::new(MemoryStore::new().with_latency(WriteKind::Create, Duration::from_millis(30)));
    let (mut list, reconciler) = open_list(&store).await;

    let id = list.add(TaskDraft::new("Draft", due(1))).unwrap();
    let create = list.commit(&reconciler);
    list.edit(
        &id,
        &TaskEdit {
            title: Some("Draft v2".to_string()),
            ..TaskEdit::default()
        },
    )
    .unwrap();
    // the update waits for the store id
    let held = list.commit(&reconciler);
    assert!(held.is_empty());
    assert_eq!(list.baseline()[0].title, "Draft");

    let create = create.wait().await;
    list.apply_report(&create);
    let held = held.wait().await;
    list.apply_report(&held);

    let assigned = create.outcomes[0].assigned_id().unwrap().clone();
    assert_eq!(list.sync_state(&assigned), Some(&SyncState::Pending));
    assert_eq!(list.baseline().len(), 1);

    let retry = list.commit(&reconciler);
    assert_eq!(retry.len(), 1);
    assert_eq!(retry.ops()[0].kind(), WriteKind::Update);
    let retry = retry.wait().await;
    list.apply_report(&retry);

    assert_eq!(list.sync_state(&id), Some(&SyncState::Confirmed));
    let stored = store.list(&path()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Draft v2");
    assert_eq!(stored[0].id.as_ref(), Some(&assigned));
}

#[tokio::test]
async fn failed_delete_after_create_confirms_keeps_document_for_retry() {
    let store = Arc::new(
        MemoryStore::new()
            .with_latency(WriteKind::Create, Duration::from_millis(30))
            .with_policy(AccessPolicy::allow_all().with_rule(AccessRule::deny(WriteKind::Delete))),
    );
    let (mut list, reconciler) = open_list(&store).await;

    let id = list.add(TaskDraft::new("Fleeting", due(1))).unwrap();
    let create = list.commit(&reconciler);
    list.remove(&id).unwrap();
    let delete = list.commit(&reconciler);

    // the create lands first, then the delete reports its rejection
    let create = create.wait().await;
    list.apply_report(&create);
    let delete = delete.wait().await;
    list.apply_report(&delete);

    let assigned = create.outcomes[0].assigned_id().unwrap().clone();
    assert!(matches!(list.sync_state(&assigned), Some(SyncState::Failed(_))));
    assert_eq!(list.baseline().len(), 1);
    assert_eq!(list.baseline()[0].id.as_ref(), Some(&assigned));

    store.set_policy(AccessPolicy::allow_all());
    let retry = list.commit(&reconciler);
    assert_eq!(retry.ops(), &[WriteOp::Delete(assigned.clone())]);
    let retry = retry.wait().await;
    list.apply_report(&retry);

    assert_eq!(store.len(&path()).await, 0);
    assert!(list.sync_state(&assigned).is_none());
    assert_eq!(list.pending_count(), 0);
}
