//! Shared test doubles for sync integration tests
//!
//! - [`ScriptedRemote`]: an `IRemoteClient` that serves canned delta pages
//!   and file content, with injectable failures and latency
//! - [`MemoryLocal`]: an `ILocalFileAccess` backed by a map
//! - [`repository`]: a fresh in-memory SQLite state repository

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::io::AsyncReadExt;

use drivemirror_cache::{DatabasePool, SqliteStateRepository};
use drivemirror_core::domain::newtypes::{RelativePath, RemoteId, RemotePath};
use drivemirror_core::ports::{
    ContentStream, DeltaItem, DeltaPage, ILocalFileAccess, IRemoteClient, LocalFileInfo,
    UploadSession,
};
use drivemirror_sync::{RetryPolicy, TransferSettings};

pub const HASH_A: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAA=";

// ============================================================================
// Fixtures
// ============================================================================

pub async fn repository() -> (DatabasePool, Arc<SqliteStateRepository>) {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));
    (pool, repo)
}

/// Settings with short backoff so retry tests stay fast
pub fn fast_settings(max_concurrency: usize) -> TransferSettings {
    TransferSettings {
        batch_size: 100,
        max_concurrency,
        queue_capacity: 4,
        chunk_size: 320 * 1024,
        retry: RetryPolicy::new(3, Duration::from_millis(5)),
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn rel(path: &str) -> RelativePath {
    RelativePath::new(path.to_string()).unwrap()
}

pub fn rid(id: &str) -> RemoteId {
    RemoteId::new(id.to_string()).unwrap()
}

pub fn delta_file(id: &str, path: &str, size: u64) -> DeltaItem {
    DeltaItem {
        id: id.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: Some(format!("/{path}")),
        size: Some(size),
        modified: Some(base_time()),
        ..Default::default()
    }
}

pub fn page(items: Vec<DeltaItem>, next: Option<&str>, delta: Option<&str>) -> DeltaPage {
    DeltaPage {
        items,
        next_link: next.map(str::to_string),
        delta_link: delta.map(str::to_string),
    }
}

pub fn delta_link(token: &str) -> String {
    format!("https://graph.example.test/v1.0/me/drive/root/delta?token={token}")
}

// ============================================================================
// ScriptedRemote
// ============================================================================

/// One recorded `upload_chunk` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCall {
    pub session_id: String,
    pub start: u64,
    pub end: u64,
    pub total: u64,
    pub len: usize,
}

#[derive(Default)]
pub struct ScriptedRemote {
    /// Pages keyed by request position; `""` is the initial request
    pages: Mutex<HashMap<String, DeltaPage>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    /// Remaining injected failures per remote id
    download_failures: Mutex<HashMap<String, u32>>,
    download_delay: Mutex<Option<Duration>>,
    chunk_failures: AtomicUsize,

    pub delta_requests: Mutex<Vec<Option<String>>>,
    pub download_calls: Mutex<HashMap<String, usize>>,
    pub sessions: Mutex<Vec<(String, String)>>,
    pub chunks: Mutex<Vec<ChunkCall>>,
    /// `(parent, file name, body length)` of each simple upload
    pub small_uploads: Mutex<Vec<(String, String, usize)>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, position: Option<&str>, page: DeltaPage) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(position.unwrap_or_default().to_string(), page);
        self
    }

    pub fn with_content(self, id: &str, content: Vec<u8>) -> Self {
        self.contents.lock().unwrap().insert(id.to_string(), content);
        self
    }

    pub fn failing_downloads(self, id: &str, times: u32) -> Self {
        self.download_failures
            .lock()
            .unwrap()
            .insert(id.to_string(), times);
        self
    }

    pub fn with_download_delay(self, delay: Duration) -> Self {
        *self.download_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn failing_chunks(self, times: usize) -> Self {
        self.chunk_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn downloads_of(&self, id: &str) -> usize {
        self.download_calls
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    /// Every call made through the port
    pub fn total_calls(&self) -> usize {
        self.delta_requests.lock().unwrap().len()
            + self.download_calls.lock().unwrap().values().sum::<usize>()
            + self.sessions.lock().unwrap().len()
            + self.chunks.lock().unwrap().len()
            + self.small_uploads.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl IRemoteClient for ScriptedRemote {
    async fn get_delta_page(&self, position: Option<&str>) -> anyhow::Result<DeltaPage> {
        self.delta_requests
            .lock()
            .unwrap()
            .push(position.map(str::to_string));

        let key = position.unwrap_or_default();
        self.pages
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted page for position {key:?}"))
    }

    async fn download_content(&self, id: &RemoteId) -> anyhow::Result<ContentStream> {
        *self
            .download_calls
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.download_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(id.as_str()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("503 Service Unavailable for {id}");
                }
            }
        }

        let content = self
            .contents
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(Cursor::new(content)))
    }

    async fn create_upload_session(
        &self,
        parent: &RemotePath,
        file_name: &str,
    ) -> anyhow::Result<UploadSession> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push((parent.to_string(), file_name.to_string()));
        Ok(UploadSession {
            upload_url: format!("https://upload.example.test/{}", sessions.len()),
            id: format!("session-{}", sessions.len()),
            expires_at: None,
        })
    }

    async fn upload_small(
        &self,
        parent: &RemotePath,
        file_name: &str,
        content: &[u8],
    ) -> anyhow::Result<()> {
        self.small_uploads.lock().unwrap().push((
            parent.to_string(),
            file_name.to_string(),
            content.len(),
        ));
        Ok(())
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        chunk: &[u8],
        range_start: u64,
        range_end: u64,
        total_len: u64,
    ) -> anyhow::Result<()> {
        self.chunks.lock().unwrap().push(ChunkCall {
            session_id: session.id.clone(),
            start: range_start,
            end: range_end,
            total: total_len,
            len: chunk.len(),
        });

        let failing = self
            .chunk_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("connection reset while uploading");
        }
        Ok(())
    }
}

// ============================================================================
// MemoryLocal
// ============================================================================

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory mirror; written files get a fresh microsecond timestamp
#[derive(Default)]
pub struct MemoryLocal {
    files: Mutex<BTreeMap<String, StoredFile>>,
}

impl MemoryLocal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, content: &[u8], modified: DateTime<Utc>) {
        self.files.lock().unwrap().insert(
            path.to_string(),
            StoredFile {
                content: content.to_vec(),
                modified,
            },
        );
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|f| f.content.clone())
    }

    fn info(path: &str, file: &StoredFile) -> LocalFileInfo {
        LocalFileInfo {
            relative_path: rel(path),
            size: file.content.len() as u64,
            last_write_time: file.modified,
            hash: None,
        }
    }
}

fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

#[async_trait::async_trait]
impl ILocalFileAccess for MemoryLocal {
    async fn enumerate_files(&self) -> anyhow::Result<Vec<LocalFileInfo>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(path, file)| Self::info(path, file))
            .collect())
    }

    async fn get_file_info(&self, path: &RelativePath) -> anyhow::Result<Option<LocalFileInfo>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(path.as_str())
            .map(|file| Self::info(path.as_str(), file)))
    }

    async fn write_file(&self, path: &RelativePath, mut content: ContentStream) -> anyhow::Result<()> {
        let mut bytes = Vec::new();
        content.read_to_end(&mut bytes).await?;
        self.put(path.as_str(), &bytes, now_micros());
        Ok(())
    }

    async fn open_read(&self, path: &RelativePath) -> anyhow::Result<Option<ContentStream>> {
        Ok(self
            .content(path.as_str())
            .map(|bytes| Box::new(Cursor::new(bytes)) as ContentStream))
    }

    async fn delete_file(&self, path: &RelativePath) -> anyhow::Result<()> {
        self.files.lock().unwrap().remove(path.as_str());
        Ok(())
    }
}
