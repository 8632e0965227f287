//! Integration tests for detection, dispatch and outcome handling
//!
//! Each test builds a fresh harness: temp sync root, in-memory SQLite store
//! with the root mapped, real filesystem adapter, fake remote session.

mod common;

use std::sync::Arc;

use cmisync_core::domain::{
    ContentChangeType, FileEvent, LocalObjectRef, MetaDataChangeType, QueueEvent, SituationType,
    SyncEvent,
};
use cmisync_core::ports::{IMetaDataStorage, RemoteError};
use cmisync_sync::detection::LocalSituationDetector;
use cmisync_sync::mechanism::SyncMechanism;
use cmisync_sync::metrics::SyncMetrics;
use cmisync_sync::solver::{SolverKey, SolverMatrix};
use cmisync_sync::SyncError;

use common::{rid, Harness};

// ============================================================================
// Helpers
// ============================================================================

fn local_created(path: &std::path::Path) -> Box<SyncEvent> {
    let event = FileEvent::new(
        MetaDataChangeType::Created,
        MetaDataChangeType::None,
        ContentChangeType::Created,
        ContentChangeType::None,
    )
    .unwrap()
    .with_local(LocalObjectRef::simple(path));
    Box::new(event.into())
}

fn local_moved(old: &std::path::Path, new: &std::path::Path) -> SyncEvent {
    FileEvent::new(
        MetaDataChangeType::Moved,
        MetaDataChangeType::None,
        ContentChangeType::None,
        ContentChangeType::None,
    )
    .unwrap()
    .with_local(LocalObjectRef::moved(old, new))
    .into()
}

fn mechanism(h: &Harness) -> SyncMechanism {
    SyncMechanism::new(h.ctx(), h.queue.clone())
}

// ============================================================================
// Matrix
// ============================================================================

#[test]
fn test_standard_matrix_is_exhaustive() {
    let matrix = SolverMatrix::standard();

    assert!(matrix.is_complete());
    assert!(matrix.missing_cells().is_empty());
    for local in SituationType::ALL {
        for remote in SituationType::ALL {
            assert!(matrix.get(local, remote).is_some(), "{local}/{remote} unassigned");
        }
    }
}

#[tokio::test]
async fn test_missing_cell_fails_fast() {
    let mut h = Harness::new().await;
    let path = h.write("new.txt", b"data");
    let mechanism = mechanism(&h).with_matrix(SolverMatrix::empty());

    let err = mechanism.handle_event(local_created(&path)).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::MissingSolver {
            local: SituationType::Added,
            remote: SituationType::NoChange
        }
    ));
    assert!(h.drain().is_empty());
    assert!(h.session.mutating_calls().is_empty());
}

// ============================================================================
// Local rename vs move
// ============================================================================

#[tokio::test]
async fn test_rename_within_parent_is_renamed() {
    let h = Harness::new().await;
    h.mapped_folder("p1", "root", "a").await;
    h.mapped_file("x", "p1", "a/x.txt", b"x").await;

    let old = h.path("a/x.txt");
    let new = h.path("a/y.txt");
    std::fs::rename(&old, &new).unwrap();

    let detector = LocalSituationDetector::new(h.fs.clone());
    let situation = detector.analyse(h.store.as_ref(), &local_moved(&old, &new)).await;

    assert_eq!(situation, SituationType::Renamed);
}

#[tokio::test]
async fn test_move_to_other_parent_is_moved() {
    let h = Harness::new().await;
    h.mapped_folder("p1", "root", "a").await;
    h.mapped_folder("p2", "root", "b").await;
    h.mapped_file("x", "p1", "a/x.txt", b"x").await;

    let old = h.path("a/x.txt");
    let new = h.path("b/x.txt");
    std::fs::rename(&old, &new).unwrap();

    let detector = LocalSituationDetector::new(h.fs.clone());
    let situation = detector.analyse(h.store.as_ref(), &local_moved(&old, &new)).await;

    assert_eq!(situation, SituationType::Moved);
}

#[tokio::test]
async fn test_local_rename_is_applied_remotely() {
    let mut h = Harness::new().await;
    h.mapped_file("x", "root", "x.txt", b"x").await;
    let old = h.path("x.txt");
    let new = h.path("renamed.txt");
    std::fs::rename(&old, &new).unwrap();

    mechanism(&h)
        .handle_event(Box::new(local_moved(&old, &new)))
        .await
        .unwrap();

    assert_eq!(h.session.object(&rid("x")).unwrap().name, "renamed.txt");
    let mapped = h.store.get_by_path(&new).await.unwrap().unwrap();
    assert_eq!(mapped.remote_id, rid("x"));
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_local_move_is_applied_remotely() {
    let h = Harness::new().await;
    h.mapped_folder("p1", "root", "a").await;
    h.mapped_folder("p2", "root", "b").await;
    h.mapped_file("x", "p1", "a/x.txt", b"x").await;
    let old = h.path("a/x.txt");
    let new = h.path("b/x.txt");
    std::fs::rename(&old, &new).unwrap();

    mechanism(&h)
        .handle_event(Box::new(local_moved(&old, &new)))
        .await
        .unwrap();

    assert_eq!(h.session.object(&rid("x")).unwrap().parent_id, Some(rid("p2")));
    assert!(h.store.get_by_path(&new).await.unwrap().is_some());
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn test_new_local_file_is_uploaded_and_mapped() {
    let mut h = Harness::new().await;
    let path = h.write("report.txt", b"quarterly numbers");

    mechanism(&h).handle_event(local_created(&path)).await.unwrap();

    let remote = h.session.find_by_name("report.txt").unwrap();
    assert_eq!(h.session.content(&remote.id).unwrap(), b"quarterly numbers");
    let mapped = h.store.get_by_path(&path).await.unwrap().unwrap();
    assert_eq!(mapped.remote_id, remote.id);
    assert!(mapped.local_identity.is_some());
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_retry_requeues_same_instance() {
    let mut h = Harness::new().await;
    let path = h.write("flaky.txt", b"data");
    h.session
        .fail_next(RemoteError::Connection("connection reset".into()), 3);
    let mechanism = mechanism(&h);

    let mut event = local_created(&path);
    let original: *const SyncEvent = &*event;

    for expected in 1..=3 {
        mechanism.handle_event(event).await.unwrap();

        let mut queued = h.drain();
        assert_eq!(queued.len(), 1);
        let QueueEvent::Sync(requeued) = queued.remove(0) else {
            panic!("expected the sync event to be requeued");
        };
        assert!(std::ptr::eq(original, &*requeued));
        assert_eq!(requeued.retry_count(), expected);
        event = requeued;
    }

    // The fourth attempt goes through
    mechanism.handle_event(event).await.unwrap();
    assert!(h.session.find_by_name("flaky.txt").is_some());
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_quota_needs_interaction_without_requeue() {
    let mut h = Harness::new().await;
    let path = h.write("big.iso", b"large");
    h.session
        .fail_next(RemoteError::QuotaExceeded("storage full".into()), 1);

    mechanism(&h).handle_event(local_created(&path)).await.unwrap();

    let queued = h.drain();
    assert_eq!(queued.len(), 1);
    match &queued[0] {
        QueueEvent::InteractionNeeded(request) => {
            assert_eq!(request.detail.title, "Storage quota exceeded");
            assert_eq!(request.detail.affected_paths, vec![path.clone()]);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(h.store.get_by_path(&path).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unclassified_failure_forces_full_sync() {
    let mut h = Harness::new().await;
    let path = h.write("secret.txt", b"data");
    h.session
        .fail_next(RemoteError::PermissionDenied("read-only folder".into()), 1);

    let err = mechanism(&h).handle_event(local_created(&path)).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::SolverFailed {
            solver: SolverKey::LocalObjectAdded,
            ..
        }
    ));
    let queued = h.drain();
    assert_eq!(queued.len(), 1);
    assert!(matches!(queued[0], QueueEvent::StartNextSync { full_sync: true }));
}

#[tokio::test]
async fn test_unmapped_parent_forces_full_sync_whatever_its_name() {
    for folder in ["plain", "network", "Q3-500"] {
        let mut h = Harness::new().await;
        let path = h.write(&format!("{folder}/a.txt"), b"data");

        let err = mechanism(&h).handle_event(local_created(&path)).await.unwrap_err();

        assert!(
            matches!(err, SyncError::SolverFailed { solver: SolverKey::LocalObjectAdded, .. }),
            "{folder}: {err}"
        );
        let queued = h.drain();
        assert_eq!(queued.len(), 1, "{folder}");
        assert!(matches!(queued[0], QueueEvent::StartNextSync { full_sync: true }));
    }
}

#[tokio::test]
async fn test_outcomes_are_counted() {
    let h = Harness::new().await;
    let path = h.write("counted.txt", b"data");
    let metrics = Arc::new(SyncMetrics::new().unwrap());

    mechanism(&h)
        .with_metrics(metrics.clone())
        .handle_event(local_created(&path))
        .await
        .unwrap();

    let value = metrics
        .solver_outcomes_total
        .with_label_values(&["local_object_added", "success"])
        .get();
    assert_eq!(value, 1);
}

// ============================================================================
// Remote-side strategies
// ============================================================================

#[tokio::test]
async fn test_remote_delete_keeps_modified_local_file() {
    let h = Harness::new().await;
    h.mapped_file("doc", "root", "keep.txt", b"v1").await;
    let path = h.write("keep.txt", b"edited locally");
    h.session.remove("doc");

    let event = FileEvent::new(
        MetaDataChangeType::None,
        MetaDataChangeType::Deleted,
        ContentChangeType::None,
        ContentChangeType::Deleted,
    )
    .unwrap()
    .with_remote(cmisync_core::domain::RemoteObject::document(
        rid("doc"),
        Some(rid("root")),
        "keep.txt",
    ));

    mechanism(&h).handle_event(Box::new(event.into())).await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"edited locally");
    assert!(h.store.get_by_remote_id(&rid("doc")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_both_changed_keeps_conflict_copy() {
    let h = Harness::new().await;
    h.mapped_file("doc", "root", "shared.txt", b"base").await;
    let path = h.write("shared.txt", b"local edit");
    let remote = h.session.put_document("doc", "root", "shared.txt", b"remote edit");

    let event = FileEvent::new(
        MetaDataChangeType::Changed,
        MetaDataChangeType::Changed,
        ContentChangeType::Changed,
        ContentChangeType::Changed,
    )
    .unwrap()
    .with_local(LocalObjectRef::simple(&path))
    .with_remote(remote);

    mechanism(&h).handle_event(Box::new(event.into())).await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"remote edit");
    let copies: Vec<_> = std::fs::read_dir(&h.root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != "shared.txt")
        .collect();
    assert_eq!(copies.len(), 1, "expected one conflict copy, got {copies:?}");
    let copy = h.root.join(&copies[0]);
    assert_eq!(std::fs::read(copy).unwrap(), b"local edit");
}
