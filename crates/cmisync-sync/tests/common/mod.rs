//! Shared fixtures for the engine integration tests
//!
//! - [`FakeRemoteSession`]: in-memory repository with a scripted change log
//!   and injectable failures
//! - [`RecordingNotifier`]: collects notifications
//! - [`UnreadableFileSystem`]: the real adapter with chosen files unreadable
//! - [`Harness`]: a temp sync root, an in-memory SQLite store with the root
//!   mapped, the real filesystem adapter and an event queue

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use cmisync_cache::{DatabasePool, SqliteMetaDataStorage};
use cmisync_core::domain::{
    ChangeLogToken, ChangeToken, Checksum, LocalIdentity, MappedObject, QueueEvent, RemoteId,
    RemoteObject,
};
use cmisync_core::ports::{
    ChangeLogEntry, ChangeLogPage, FileSystemState, ILocalFileSystem, IMetaDataStorage, INotificationService,
    IRemoteSession, Notification, RemoteError,
};
use cmisync_sync::filesystem::LocalFileSystemAdapter;
use cmisync_sync::queue::EventQueue;
use cmisync_sync::solver::SolverContext;

pub const REMOTE_ROOT: &str = "root";

pub fn rid(s: &str) -> RemoteId {
    RemoteId::new(s).unwrap()
}

pub fn sha256(data: &[u8]) -> Checksum {
    Checksum::sha256(format!("{:x}", Sha256::digest(data))).unwrap()
}

// ============================================================================
// FakeRemoteSession
// ============================================================================

#[derive(Default)]
struct FakeState {
    objects: HashMap<RemoteId, RemoteObject>,
    contents: HashMap<RemoteId, Vec<u8>>,
    pages: VecDeque<ChangeLogPage>,
    latest_token: Option<ChangeLogToken>,
    failures: VecDeque<RemoteError>,
    calls: Vec<String>,
    next_id: u32,
    next_token: u32,
}

impl FakeState {
    fn token(&mut self) -> ChangeToken {
        self.next_token += 1;
        ChangeToken::new(format!("v{}", self.next_token)).unwrap()
    }

    fn record(&mut self, call: impl Into<String>) -> anyhow::Result<()> {
        self.calls.push(call.into());
        match self.failures.pop_front() {
            Some(err) => Err(anyhow::Error::new(err)),
            None => Ok(()),
        }
    }
}

/// In-memory remote repository
#[derive(Default)]
pub struct FakeRemoteSession {
    state: Mutex<FakeState>,
}

impl FakeRemoteSession {
    pub fn new() -> Self {
        let session = Self::default();
        session.insert(RemoteObject::folder(rid(REMOTE_ROOT), None, "root"), None);
        session
    }

    fn insert(&self, object: RemoteObject, content: Option<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        if let Some(content) = content {
            state.contents.insert(object.id.clone(), content);
        }
        state.objects.insert(object.id.clone(), object);
    }

    /// Seeds a document; returns its snapshot
    pub fn put_document(&self, id: &str, parent: &str, name: &str, content: &[u8]) -> RemoteObject {
        let token = self.state.lock().unwrap().token();
        let object = RemoteObject::document(rid(id), Some(rid(parent)), name)
            .with_change_token(token)
            .with_content(sha256(content), content.len() as u64);
        self.insert(object.clone(), Some(content.to_vec()));
        object
    }

    pub fn put_folder(&self, id: &str, parent: &str, name: &str) -> RemoteObject {
        let token = self.state.lock().unwrap().token();
        let object = RemoteObject::folder(rid(id), Some(rid(parent)), name).with_change_token(token);
        self.insert(object.clone(), None);
        object
    }

    /// Bumps the change token without touching content (e.g. an ACL change)
    pub fn touch(&self, id: &str) -> RemoteObject {
        let mut state = self.state.lock().unwrap();
        let token = state.token();
        let object = state.objects.get_mut(&rid(id)).unwrap();
        object.change_token = Some(token);
        object.clone()
    }

    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.objects.remove(&rid(id));
        state.contents.remove(&rid(id));
    }

    pub fn object(&self, id: &RemoteId) -> Option<RemoteObject> {
        self.state.lock().unwrap().objects.get(id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<RemoteObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .values()
            .find(|o| o.name == name)
            .cloned()
    }

    pub fn content(&self, id: &RemoteId) -> Option<Vec<u8>> {
        self.state.lock().unwrap().contents.get(id).cloned()
    }

    /// Queues failures returned by the next mutating or content calls
    pub fn fail_next(&self, err: RemoteError, times: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..times {
            state.failures.push_back(err.clone());
        }
    }

    pub fn set_latest_token(&self, token: &str) {
        self.state.lock().unwrap().latest_token = Some(ChangeLogToken::new(token).unwrap());
    }

    /// Scripts the next change log page
    pub fn push_page(&self, entries: Vec<ChangeLogEntry>, token: &str, has_more: bool) {
        self.state.lock().unwrap().pages.push_back(ChangeLogPage {
            entries,
            has_more,
            latest_token: Some(ChangeLogToken::new(token).unwrap()),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get_object") && !c.starts_with("changes"))
            .collect()
    }
}

#[async_trait]
impl IRemoteSession for FakeRemoteSession {
    async fn get_content_changes(
        &self,
        token: Option<&ChangeLogToken>,
        _page_size: u32,
    ) -> anyhow::Result<ChangeLogPage> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("changes {}", token.map(|t| t.as_str()).unwrap_or("-")));
        if let Some(page) = state.pages.pop_front() {
            return Ok(page);
        }
        Ok(ChangeLogPage {
            entries: Vec::new(),
            has_more: false,
            latest_token: state.latest_token.clone(),
        })
    }

    async fn latest_change_log_token(&self) -> anyhow::Result<Option<ChangeLogToken>> {
        Ok(self.state.lock().unwrap().latest_token.clone())
    }

    async fn get_object(&self, id: &RemoteId) -> anyhow::Result<Option<RemoteObject>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get_object {id}"));
        Ok(state.objects.get(id).cloned())
    }

    async fn create_folder(&self, parent_id: &RemoteId, name: &str) -> anyhow::Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_folder {name}"))?;
        state.next_id += 1;
        let token = state.token();
        let object = RemoteObject::folder(
            rid(&format!("obj-{}", state.next_id)),
            Some(parent_id.clone()),
            name,
        )
        .with_change_token(token);
        state.objects.insert(object.id.clone(), object.clone());
        Ok(object)
    }

    async fn create_document(
        &self,
        parent_id: &RemoteId,
        name: &str,
        content: &[u8],
    ) -> anyhow::Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_document {name}"))?;
        state.next_id += 1;
        let token = state.token();
        let object = RemoteObject::document(
            rid(&format!("obj-{}", state.next_id)),
            Some(parent_id.clone()),
            name,
        )
        .with_change_token(token)
        .with_content(sha256(content), content.len() as u64);
        state.contents.insert(object.id.clone(), content.to_vec());
        state.objects.insert(object.id.clone(), object.clone());
        Ok(object)
    }

    async fn get_content(&self, id: &RemoteId) -> anyhow::Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("get_content {id}"))?;
        state
            .contents
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()).into())
    }

    async fn set_content(
        &self,
        id: &RemoteId,
        content: &[u8],
        expected_token: Option<&ChangeToken>,
    ) -> anyhow::Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("set_content {id}"))?;
        let current = state
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        if expected_token.is_some() && expected_token != current.change_token.as_ref() {
            return Err(RemoteError::Conflict(id.to_string()).into());
        }
        let token = state.token();
        let updated = current
            .with_change_token(token)
            .with_content(sha256(content), content.len() as u64);
        state.contents.insert(id.clone(), content.to_vec());
        state.objects.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    async fn rename(&self, id: &RemoteId, new_name: &str) -> anyhow::Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("rename {id} {new_name}"))?;
        let token = state.token();
        let object = state
            .objects
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        object.name = new_name.to_string();
        object.change_token = Some(token);
        Ok(object.clone())
    }

    async fn move_object(
        &self,
        id: &RemoteId,
        _source_parent: &RemoteId,
        target_parent: &RemoteId,
    ) -> anyhow::Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("move {id} {target_parent}"))?;
        let token = state.token();
        let object = state
            .objects
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        object.parent_id = Some(target_parent.clone());
        object.change_token = Some(token);
        Ok(object.clone())
    }

    async fn delete(&self, id: &RemoteId) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("delete {id}"))?;
        if state.objects.remove(id).is_none() {
            return Err(RemoteError::NotFound(id.to_string()).into());
        }
        state.contents.remove(id);
        Ok(())
    }
}

// ============================================================================
// RecordingNotifier
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<Notification>>,
}

#[async_trait]
impl INotificationService for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// UnreadableFileSystem
// ============================================================================

/// Real filesystem adapter whose reads fail for the chosen paths
pub struct UnreadableFileSystem {
    inner: LocalFileSystemAdapter,
    unreadable: Mutex<Vec<PathBuf>>,
}

impl UnreadableFileSystem {
    pub fn new() -> Self {
        Self {
            inner: LocalFileSystemAdapter::new(),
            unreadable: Mutex::new(Vec::new()),
        }
    }

    pub fn deny(&self, path: &Path) {
        self.unreadable.lock().unwrap().push(path.to_path_buf());
    }

    fn check(&self, path: &Path) -> anyhow::Result<()> {
        if self.unreadable.lock().unwrap().iter().any(|p| p == path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ILocalFileSystem for UnreadableFileSystem {
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        self.inner.get_state(path).await
    }

    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        self.check(path)?;
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_file(path, data).await
    }

    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_directory(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        self.inner.rename(from, to).await
    }

    async fn delete(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.delete(path).await
    }

    async fn compute_checksum(&self, path: &Path) -> anyhow::Result<Checksum> {
        self.check(path)?;
        self.inner.compute_checksum(path).await
    }

    async fn identity(&self, path: &Path) -> anyhow::Result<Option<LocalIdentity>> {
        self.inner.identity(path).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub root: PathBuf,
    pub store: Arc<SqliteMetaDataStorage>,
    pub session: Arc<FakeRemoteSession>,
    pub fs: Arc<LocalFileSystemAdapter>,
    pub queue: EventQueue,
    pub rx: UnboundedReceiver<QueueEvent>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sync");
        std::fs::create_dir_all(&root).unwrap();

        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let store = Arc::new(SqliteMetaDataStorage::new(pool.pool().clone(), &root));
        let fs = Arc::new(LocalFileSystemAdapter::new());

        let identity = fs.identity(&root).await.unwrap();
        store.init_root(rid(REMOTE_ROOT), identity).await.unwrap();

        let (queue, rx) = EventQueue::new();
        Self {
            dir,
            root,
            store,
            session: Arc::new(FakeRemoteSession::new()),
            fs,
            queue,
            rx,
        }
    }

    pub fn ctx(&self) -> SolverContext {
        SolverContext::new(self.store.clone(), self.session.clone(), self.fs.clone())
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    /// Seeds a remote folder and its local counterpart, mapped
    pub async fn mapped_folder(&self, id: &str, parent: &str, rel: &str) -> MappedObject {
        let name = file_name(rel);
        let remote = self.session.put_folder(id, parent, &name);
        let path = self.mkdir(rel);
        let mut mapped = MappedObject::from_remote(&remote);
        mapped.local_identity = self.fs.identity(&path).await.unwrap();
        self.store.save(&mapped).await.unwrap();
        mapped
    }

    /// Seeds a remote document and an identical local file, mapped
    pub async fn mapped_file(&self, id: &str, parent: &str, rel: &str, content: &[u8]) -> MappedObject {
        let name = file_name(rel);
        let remote = self.session.put_document(id, parent, &name, content);
        let path = self.write(rel, content);
        let mut mapped = MappedObject::from_remote(&remote);
        mapped.local_identity = self.fs.identity(&path).await.unwrap();
        mapped.record_local_write(Some(sha256(content)), Some(content.len() as u64));
        self.store.save(&mapped).await.unwrap();
        mapped
    }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn file_name(rel: &str) -> String {
    Path::new(rel)
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned()
}
