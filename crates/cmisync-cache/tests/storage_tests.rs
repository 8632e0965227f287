//! Integration tests for SqliteMetaDataStorage
//!
//! Every test gets a fresh in-memory database.

use std::path::{Path, PathBuf};

use cmisync_cache::pool::SCHEMA_VERSION;
use cmisync_cache::{DatabasePool, SqliteMetaDataStorage};
use cmisync_core::domain::{
    ChangeLogToken, ChangeToken, Checksum, LocalIdentity, MappedObject, ObjectKind, RemoteId,
};
use cmisync_core::ports::IMetaDataStorage;

// ============================================================================
// Test helpers
// ============================================================================

const ROOT: &str = "/home/user/CmisSync";

fn rid(s: &str) -> RemoteId {
    RemoteId::new(s).unwrap()
}

fn identity(s: &str) -> LocalIdentity {
    LocalIdentity::new(s).unwrap()
}

/// Fresh store with the root mapped to remote folder "root"
async fn setup() -> SqliteMetaDataStorage {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let store = SqliteMetaDataStorage::new(pool.pool().clone(), ROOT);
    store
        .init_root(rid("root"), Some(identity("1:1")))
        .await
        .unwrap();
    store
}

fn folder(id: &str, parent: &str, name: &str) -> MappedObject {
    MappedObject::new(rid(id), Some(rid(parent)), name, ObjectKind::Folder)
}

fn file(id: &str, parent: &str, name: &str) -> MappedObject {
    MappedObject::new(rid(id), Some(rid(parent)), name, ObjectKind::File)
}

fn root_path(rel: &str) -> PathBuf {
    Path::new(ROOT).join(rel)
}

// ============================================================================
// Root and path resolution
// ============================================================================

#[tokio::test]
async fn test_root_is_resolved_by_path() {
    let store = setup().await;

    let root = store.get_by_path(Path::new(ROOT)).await.unwrap().unwrap();
    assert_eq!(root.remote_id, rid("root"));
    assert!(root.parent_id.is_none());
    assert_eq!(root.local_identity, Some(identity("1:1")));
}

#[tokio::test]
async fn test_init_root_is_idempotent_and_refuses_remap() {
    let store = setup().await;

    store.init_root(rid("root"), None).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);

    let err = store.init_root(rid("other"), None).await.unwrap_err();
    assert!(err.to_string().contains("already mapped"));
}

#[tokio::test]
async fn test_nested_path_lookup() {
    let store = setup().await;
    store.save(&folder("docs", "root", "Documents")).await.unwrap();
    store.save(&file("report", "docs", "report.pdf")).await.unwrap();

    let found = store
        .get_by_path(&root_path("Documents/report.pdf"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.remote_id, rid("report"));

    assert!(store
        .get_by_path(&root_path("Documents/missing.pdf"))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_by_path(Path::new("/tmp/elsewhere"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_local_path_follows_folder_rename() {
    let store = setup().await;
    let mut docs = folder("docs", "root", "Documents");
    store.save(&docs).await.unwrap();
    let report = file("report", "docs", "report.pdf");
    store.save(&report).await.unwrap();

    assert_eq!(
        store.local_path_of(&report).await.unwrap(),
        Some(root_path("Documents/report.pdf"))
    );

    docs.name = "Archive".to_string();
    store.save(&docs).await.unwrap();

    assert_eq!(
        store.local_path_of(&report).await.unwrap(),
        Some(root_path("Archive/report.pdf"))
    );
}

#[tokio::test]
async fn test_local_path_of_orphan_is_none() {
    let store = setup().await;
    let orphan = file("orphan", "ghost", "a.txt");
    store.save(&orphan).await.unwrap();

    assert_eq!(store.local_path_of(&orphan).await.unwrap(), None);
}

// ============================================================================
// Save and lookups
// ============================================================================

#[tokio::test]
async fn test_save_round_trips_all_fields() {
    let store = setup().await;
    let mut object = file("doc", "root", "a.txt")
        .with_change_token(ChangeToken::new("t1").unwrap())
        .with_checksum(Checksum::sha256("abc123").unwrap())
        .with_identity(identity("1:42"));
    object.content_size = Some(2048);
    object.read_only = true;
    object.retries.upload = 3;
    object.record_local_write(None, None);
    store.save(&object).await.unwrap();

    let loaded = store.get_by_remote_id(&rid("doc")).await.unwrap().unwrap();
    assert_eq!(loaded.name, "a.txt");
    assert_eq!(loaded.change_token, object.change_token);
    assert_eq!(loaded.checksum, object.checksum);
    assert_eq!(loaded.content_size, Some(2048));
    assert!(loaded.read_only);
    assert!(!loaded.ignored);
    assert_eq!(loaded.retries.upload, 3);
    assert!(loaded.last_local_write.is_some());

    let by_identity = store.get_by_identity(&identity("1:42")).await.unwrap().unwrap();
    assert_eq!(by_identity.remote_id, rid("doc"));
}

#[tokio::test]
async fn test_save_updates_in_place() {
    let store = setup().await;
    let mut object = file("doc", "root", "a.txt");
    store.save(&object).await.unwrap();

    object.name = "b.txt".to_string();
    object.change_token = Some(ChangeToken::new("t2").unwrap());
    store.save(&object).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 2);
    let loaded = store.get_by_path(&root_path("b.txt")).await.unwrap().unwrap();
    assert_eq!(loaded.change_token.unwrap().as_str(), "t2");
}

#[tokio::test]
async fn test_sibling_name_collision_is_rejected() {
    let store = setup().await;
    store.save(&file("one", "root", "same.txt")).await.unwrap();

    let result = store.save(&file("two", "root", "same.txt")).await;
    assert!(result.is_err());
    assert!(store.get_by_remote_id(&rid("one")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_identity_collision_is_rejected() {
    let store = setup().await;
    store
        .save(&file("one", "root", "a.txt").with_identity(identity("1:7")))
        .await
        .unwrap();

    let result = store
        .save(&file("two", "root", "b.txt").with_identity(identity("1:7")))
        .await;
    assert!(result.is_err());
}

// ============================================================================
// Subtrees and children
// ============================================================================

#[tokio::test]
async fn test_remove_subtree_removes_descendants() {
    let store = setup().await;
    store.save(&folder("docs", "root", "Documents")).await.unwrap();
    store.save(&folder("sub", "docs", "Sub")).await.unwrap();
    store.save(&file("deep", "sub", "deep.txt")).await.unwrap();
    store.save(&file("keep", "root", "keep.txt")).await.unwrap();

    let removed = store.remove_subtree(&rid("docs")).await.unwrap();

    assert_eq!(removed, 3);
    assert!(store.get_by_remote_id(&rid("deep")).await.unwrap().is_none());
    assert!(store.get_by_remote_id(&rid("keep")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_children_sorted_by_name() {
    let store = setup().await;
    store.save(&file("b", "root", "b.txt")).await.unwrap();
    store.save(&file("a", "root", "a.txt")).await.unwrap();

    let names: Vec<String> = store
        .children(&rid("root"))
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

// ============================================================================
// Change log token
// ============================================================================

#[tokio::test]
async fn test_change_log_token_round_trip() {
    let store = setup().await;
    assert!(store.change_log_token().await.unwrap().is_none());

    store
        .set_change_log_token(&ChangeLogToken::new("100").unwrap())
        .await
        .unwrap();
    store
        .set_change_log_token(&ChangeLogToken::new("200").unwrap())
        .await
        .unwrap();

    let token = store.change_log_token().await.unwrap().unwrap();
    assert_eq!(token.as_str(), "200");
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested/metadata.db");

    {
        let pool = DatabasePool::new(&db).await.unwrap();
        let store = SqliteMetaDataStorage::new(pool.pool().clone(), ROOT);
        store.init_root(rid("root"), None).await.unwrap();
        store
            .set_change_log_token(&ChangeLogToken::new("7").unwrap())
            .await
            .unwrap();
        pool.pool().close().await;
    }

    let pool = DatabasePool::open_existing(&db).await.unwrap();
    let store = SqliteMetaDataStorage::new(pool.pool().clone(), ROOT);
    assert_eq!(store.change_log_token().await.unwrap().unwrap().as_str(), "7");
    assert!(store.root().await.unwrap().is_some());
}

#[tokio::test]
async fn test_open_existing_refuses_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = DatabasePool::open_existing(&dir.path().join("absent.db")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_migrations_record_schema_version_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("metadata.db");

    let first = DatabasePool::new(&db).await.unwrap();
    assert_eq!(first.schema_version().await.unwrap(), SCHEMA_VERSION);
    first.pool().close().await;

    // Reopening finds nothing pending and keeps the data
    let second = DatabasePool::new(&db).await.unwrap();
    assert_eq!(second.schema_version().await.unwrap(), SCHEMA_VERSION);
}

#[tokio::test]
async fn test_open_existing_rejects_unmigrated_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("empty.db");
    std::fs::File::create(&db).unwrap();

    let result = DatabasePool::open_existing(&db).await;
    assert!(matches!(result, Err(cmisync_cache::CacheError::MigrationFailed(_))));
}

#[tokio::test]
async fn test_in_memory_pools_are_migrated_and_private() {
    let first = DatabasePool::in_memory().await.unwrap();
    let second = DatabasePool::in_memory().await.unwrap();
    assert_eq!(first.schema_version().await.unwrap(), SCHEMA_VERSION);

    let store = SqliteMetaDataStorage::new(first.pool().clone(), ROOT);
    store.init_root(rid("root"), None).await.unwrap();

    let other = SqliteMetaDataStorage::new(second.pool().clone(), ROOT);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(other.count().await.unwrap(), 0);
}
