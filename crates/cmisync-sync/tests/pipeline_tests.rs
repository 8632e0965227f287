//! Integration tests for event normalization and the full drain loop

mod common;

use std::sync::Arc;

use cmisync_core::domain::{
    FsChange, MetaDataChangeType, ContentChangeType, QueueEvent, SyncEvent,
};
use cmisync_core::ports::{ChangeLogEntry, IMetaDataStorage, RemoteChangeType, RemoteError};
use cmisync_sync::filter::{EventFilter, IgnoreRules};
use cmisync_sync::handlers::{FullSyncRequests, InteractionHandler};
use cmisync_sync::local_events::LocalEventTransformer;
use cmisync_sync::mechanism::SyncMechanism;
use cmisync_sync::metrics::SyncMetrics;
use cmisync_sync::queue::{EventLoop, EventQueue};
use cmisync_sync::remote_events::RemoteChangePoller;
use tokio_util::sync::CancellationToken;

use common::{rid, Harness, RecordingNotifier, UnreadableFileSystem};

// ============================================================================
// Helpers
// ============================================================================

fn poller(h: &Harness) -> RemoteChangePoller {
    RemoteChangePoller::new(h.session.clone(), h.store.clone(), h.fs.clone(), h.queue.clone())
}

fn transformer(h: &Harness) -> LocalEventTransformer {
    LocalEventTransformer::new(h.store.clone(), h.fs.clone(), h.queue.clone())
}

fn entry(change_type: RemoteChangeType, id: &str) -> ChangeLogEntry {
    ChangeLogEntry::new(change_type, rid(id))
}

fn sync_events(events: Vec<QueueEvent>) -> Vec<Box<SyncEvent>> {
    events
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::Sync(event) => Some(event),
            _ => None,
        })
        .collect()
}

struct Pipeline {
    event_loop: EventLoop,
    notifier: Arc<RecordingNotifier>,
    full_sync: FullSyncRequests,
    metrics: Arc<SyncMetrics>,
}

fn pipeline(h: &Harness, rules: IgnoreRules) -> Pipeline {
    let (_unused, rx) = EventQueue::new();
    let mut event_loop = EventLoop::new(rx, CancellationToken::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let full_sync = FullSyncRequests::new();
    let metrics = Arc::new(SyncMetrics::new().unwrap());

    event_loop.add_handler(Arc::new(
        EventFilter::new(rules, h.store.clone()).with_metrics(metrics.clone()),
    ));
    event_loop.add_handler(Arc::new(transformer(h)));
    event_loop.add_handler(Arc::new(poller(h)));
    event_loop.add_handler(Arc::new(
        SyncMechanism::new(h.ctx(), h.queue.clone()).with_metrics(metrics.clone()),
    ));
    event_loop.add_handler(Arc::new(InteractionHandler::new(notifier.clone())));
    event_loop.add_handler(Arc::new(full_sync.clone()));

    Pipeline {
        event_loop,
        notifier,
        full_sync,
        metrics,
    }
}

/// Dispatches queued events until the queue stays empty
async fn run_until_idle(h: &mut Harness, pipeline: &Pipeline) {
    for _ in 0..50 {
        let events = h.drain();
        if events.is_empty() {
            return;
        }
        for event in events {
            let _ = pipeline.event_loop.dispatch(event).await;
        }
    }
    panic!("queue did not settle");
}

// ============================================================================
// Remote change log polling
// ============================================================================

#[tokio::test]
async fn test_first_poll_anchors_token_and_requests_full_sync() {
    let mut h = Harness::new().await;
    h.session.set_latest_token("500");

    let queued = poller(&h).poll().await.unwrap();

    assert_eq!(queued, 0);
    assert_eq!(h.store.change_log_token().await.unwrap().unwrap().as_str(), "500");
    let events = h.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], QueueEvent::StartNextSync { full_sync: true }));
}

#[tokio::test]
async fn test_poll_skipped_when_token_unchanged() {
    let mut h = Harness::new().await;
    h.session.set_latest_token("7");
    h.store
        .set_change_log_token(&"7".parse().unwrap())
        .await
        .unwrap();

    assert_eq!(poller(&h).poll().await.unwrap(), 0);
    assert!(h.drain().is_empty());
    assert!(!h.session.calls().iter().any(|c| c.starts_with("changes")));
}

#[tokio::test]
async fn test_page_seam_duplicate_is_dropped() {
    let mut h = Harness::new().await;
    h.session.put_document("A", "root", "a.txt", b"a");
    h.session.put_document("X", "root", "x.txt", b"x");
    h.session.put_document("B", "root", "b.txt", b"b");
    h.store
        .set_change_log_token(&"1".parse().unwrap())
        .await
        .unwrap();
    h.session.set_latest_token("3");
    h.session.push_page(
        vec![entry(RemoteChangeType::Created, "A"), entry(RemoteChangeType::Updated, "X")],
        "2",
        true,
    );
    h.session.push_page(
        vec![entry(RemoteChangeType::Updated, "X"), entry(RemoteChangeType::Created, "B")],
        "3",
        false,
    );

    let queued = poller(&h).with_page_size(2).poll().await.unwrap();

    assert_eq!(queued, 3);
    let events = sync_events(h.drain());
    let for_x = events
        .iter()
        .filter(|e| e.remote_object().map(|r| r.id == rid("X")).unwrap_or(false))
        .count();
    assert_eq!(for_x, 1);
    assert_eq!(h.store.change_log_token().await.unwrap().unwrap().as_str(), "3");
}

#[tokio::test]
async fn test_unreadable_local_copy_does_not_pin_the_token() {
    let mut h = Harness::new().await;
    h.mapped_file("doc", "root", "a.txt", b"hello").await;
    h.session.put_document("doc", "root", "a.txt", b"changed remotely");
    h.session.put_document("B", "root", "b.txt", b"b");
    h.store
        .set_change_log_token(&"1".parse().unwrap())
        .await
        .unwrap();
    h.session.set_latest_token("2");
    h.session.push_page(
        vec![entry(RemoteChangeType::Updated, "doc"), entry(RemoteChangeType::Created, "B")],
        "2",
        false,
    );

    let fs = Arc::new(UnreadableFileSystem::new());
    fs.deny(&h.path("a.txt"));
    let poller =
        RemoteChangePoller::new(h.session.clone(), h.store.clone(), fs, h.queue.clone());

    let queued = poller.poll().await.unwrap();

    assert_eq!(queued, 1);
    assert_eq!(h.store.change_log_token().await.unwrap().unwrap().as_str(), "2");
    let drained = h.drain();
    assert!(drained
        .iter()
        .any(|e| matches!(e, QueueEvent::StartNextSync { full_sync: true })));
    let events = sync_events(drained);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].remote_object().unwrap().id, rid("B"));
}

#[tokio::test]
async fn test_unknown_delete_and_vanished_object_are_dropped() {
    let mut h = Harness::new().await;
    h.store
        .set_change_log_token(&"1".parse().unwrap())
        .await
        .unwrap();
    h.session.set_latest_token("2");
    h.session.push_page(
        vec![
            entry(RemoteChangeType::Deleted, "never-mapped"),
            entry(RemoteChangeType::Created, "already-gone"),
        ],
        "2",
        false,
    );

    assert_eq!(poller(&h).poll().await.unwrap(), 0);
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_security_touch_is_idempotent() {
    let mut h = Harness::new().await;
    h.mapped_file("doc", "root", "a.txt", b"hello").await;
    let path = h.path("a.txt");
    let pipeline = pipeline(&h, IgnoreRules::new(&[], false).unwrap());
    h.store
        .set_change_log_token(&"1".parse().unwrap())
        .await
        .unwrap();

    let touched = h.session.touch("doc");
    h.session.set_latest_token("2");
    h.session.push_page(vec![entry(RemoteChangeType::Security, "doc")], "2", false);
    h.queue.push(QueueEvent::StartNextSync { full_sync: false });
    run_until_idle(&mut h, &pipeline).await;

    let after_first = h.store.get_by_remote_id(&rid("doc")).await.unwrap().unwrap();
    assert_eq!(after_first.change_token, touched.change_token);

    h.session.set_latest_token("3");
    h.session.push_page(vec![entry(RemoteChangeType::Security, "doc")], "3", false);
    h.queue.push(QueueEvent::StartNextSync { full_sync: false });
    run_until_idle(&mut h, &pipeline).await;

    let after_second = h.store.get_by_remote_id(&rid("doc")).await.unwrap().unwrap();
    assert_eq!(after_first.change_token, after_second.change_token);
    assert_eq!(after_first.checksum, after_second.checksum);
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    assert!(h.session.mutating_calls().is_empty(), "{:?}", h.session.calls());
}

#[tokio::test]
async fn test_remote_content_change_is_downloaded() {
    let mut h = Harness::new().await;
    h.mapped_file("doc", "root", "a.txt", b"old").await;
    let pipeline = pipeline(&h, IgnoreRules::new(&[], false).unwrap());
    h.store
        .set_change_log_token(&"1".parse().unwrap())
        .await
        .unwrap();

    h.session.put_document("doc", "root", "a.txt", b"new content");
    h.session.set_latest_token("2");
    h.session.push_page(vec![entry(RemoteChangeType::Updated, "doc")], "2", false);
    h.queue.push(QueueEvent::StartNextSync { full_sync: false });
    run_until_idle(&mut h, &pipeline).await;

    assert_eq!(std::fs::read(h.path("a.txt")).unwrap(), b"new content");
}

#[tokio::test]
async fn test_new_remote_document_is_downloaded() {
    let mut h = Harness::new().await;
    let pipeline = pipeline(&h, IgnoreRules::new(&[], false).unwrap());
    h.store
        .set_change_log_token(&"1".parse().unwrap())
        .await
        .unwrap();

    h.session.put_document("fresh", "root", "fresh.txt", b"from server");
    h.session.set_latest_token("2");
    h.session.push_page(vec![entry(RemoteChangeType::Created, "fresh")], "2", false);
    h.queue.push(QueueEvent::StartNextSync { full_sync: false });
    run_until_idle(&mut h, &pipeline).await;

    let path = h.path("fresh.txt");
    assert_eq!(std::fs::read(&path).unwrap(), b"from server");
    let mapped = h.store.get_by_path(&path).await.unwrap().unwrap();
    assert_eq!(mapped.remote_id, rid("fresh"));
}

// ============================================================================
// Local change normalization
// ============================================================================

#[tokio::test]
async fn test_changed_unmapped_file_becomes_created() {
    let h = Harness::new().await;
    let path = h.write("unknown.txt", b"data");

    let event = transformer(&h)
        .transform(&FsChange::changed(&path, false))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.local_change(), MetaDataChangeType::Created);
    assert_eq!(event.local_content(), ContentChangeType::Created);
}

#[tokio::test]
async fn test_changed_mapped_file_is_content_only() {
    let h = Harness::new().await;
    h.mapped_file("doc", "root", "a.txt", b"v1").await;
    let path = h.write("a.txt", b"v2");

    let event = transformer(&h)
        .transform(&FsChange::changed(&path, false))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.local_change(), MetaDataChangeType::None);
    assert_eq!(event.local_content(), ContentChangeType::Changed);
}

#[tokio::test]
async fn test_delete_takes_kind_from_mapping() {
    let h = Harness::new().await;
    h.mapped_folder("dir", "root", "folder").await;
    let path = h.path("folder");
    std::fs::remove_dir(&path).unwrap();

    let event = transformer(&h)
        .transform(&FsChange::deleted(&path))
        .await
        .unwrap()
        .unwrap();

    assert!(event.is_folder());
    assert_eq!(event.local_change(), MetaDataChangeType::Deleted);

    let unmapped = transformer(&h)
        .transform(&FsChange::deleted(h.path("never-synced.txt")))
        .await
        .unwrap();
    assert!(unmapped.is_none());
}

#[tokio::test]
async fn test_rename_becomes_moved_variant() {
    let h = Harness::new().await;
    h.mapped_file("doc", "root", "a.txt", b"v1").await;
    let old = h.path("a.txt");
    let new = h.path("b.txt");
    std::fs::rename(&old, &new).unwrap();

    let event = transformer(&h)
        .transform(&FsChange::renamed(&old, &new, false))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.local_change(), MetaDataChangeType::Moved);
    let local = event.local_object().unwrap();
    assert_eq!(local.old_path(), Some(old.as_path()));
    assert_eq!(local.path(), new.as_path());
}

#[tokio::test]
async fn test_rename_across_root_boundary_degrades() {
    let h = Harness::new().await;
    h.mapped_file("doc", "root", "a.txt", b"v1").await;
    let inside = h.path("a.txt");
    let outside = h.dir.path().join("outside.txt");

    let out = transformer(&h)
        .transform(&FsChange::renamed(&inside, &outside, false))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.local_change(), MetaDataChangeType::Deleted);
    assert_eq!(out.local_path(), Some(inside.as_path()));

    let incoming = h.path("incoming.txt");
    let back = transformer(&h)
        .transform(&FsChange::renamed(&outside, &incoming, false))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(back.local_change(), MetaDataChangeType::Created);
    assert_eq!(back.local_path(), Some(incoming.as_path()));
}

// ============================================================================
// Full drain loop
// ============================================================================

#[tokio::test]
async fn test_local_file_flows_through_pipeline() {
    let mut h = Harness::new().await;
    let pipeline = pipeline(&h, IgnoreRules::new(&[], false).unwrap());
    let path = h.write("notes.txt", b"meeting notes");

    h.queue.push(QueueEvent::Fs(FsChange::created(&path, false)));
    run_until_idle(&mut h, &pipeline).await;

    let remote = h.session.find_by_name("notes.txt").unwrap();
    assert_eq!(h.session.content(&remote.id).unwrap(), b"meeting notes");
    assert!(h.store.get_by_path(&path).await.unwrap().is_some());
}

#[tokio::test]
async fn test_ignored_names_never_reach_the_remote() {
    let mut h = Harness::new().await;
    let rules = IgnoreRules::new(&["*.bak".to_string()], true).unwrap();
    let pipeline = pipeline(&h, rules);

    for name in ["~$draft.docx", "old.bak", ".hidden"] {
        let path = h.write(name, b"skip me");
        h.queue.push(QueueEvent::Fs(FsChange::created(&path, false)));
    }
    run_until_idle(&mut h, &pipeline).await;

    assert!(h.session.mutating_calls().is_empty());
    let ignored = pipeline
        .metrics
        .filtered_events_total
        .with_label_values(&["ignored_name"])
        .get();
    let hidden = pipeline
        .metrics
        .filtered_events_total
        .with_label_values(&["hidden"])
        .get();
    assert_eq!((ignored, hidden), (2, 1));
}

#[tokio::test]
async fn test_ignored_folder_hides_its_subtree() {
    let mut h = Harness::new().await;
    let mut mapped = h.mapped_folder("private", "root", "private").await;
    mapped.ignored = true;
    h.store.save(&mapped).await.unwrap();
    let pipeline = pipeline(&h, IgnoreRules::new(&[], false).unwrap());

    let path = h.write("private/diary.txt", b"dear diary");
    h.queue.push(QueueEvent::Fs(FsChange::created(&path, false)));
    run_until_idle(&mut h, &pipeline).await;

    assert!(h.session.find_by_name("diary.txt").is_none());
}

#[tokio::test]
async fn test_quota_reaches_the_user_once() {
    let mut h = Harness::new().await;
    let pipeline = pipeline(&h, IgnoreRules::new(&[], false).unwrap());
    h.session
        .fail_next(RemoteError::QuotaExceeded("storage full".into()), 1);

    let path = h.write("video.mp4", b"frames");
    h.queue.push(QueueEvent::Fs(FsChange::created(&path, false)));
    run_until_idle(&mut h, &pipeline).await;

    let notifications = pipeline.notifier.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].category, "quota");
    assert_eq!(notifications[0].paths, vec![path.clone()]);
    assert!(!pipeline.full_sync.is_requested());
}

#[tokio::test]
async fn test_fatal_failure_latches_full_sync() {
    let mut h = Harness::new().await;
    let pipeline = pipeline(&h, IgnoreRules::new(&[], false).unwrap());
    h.session
        .fail_next(RemoteError::PermissionDenied("read-only".into()), 1);

    let path = h.write("denied.txt", b"data");
    h.queue.push(QueueEvent::Fs(FsChange::created(&path, false)));
    run_until_idle(&mut h, &pipeline).await;

    assert!(pipeline.full_sync.take());
}
