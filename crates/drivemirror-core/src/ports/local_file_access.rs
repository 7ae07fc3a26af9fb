//! Local file access port (driven/secondary port)
//!
//! Abstracts the local mirror so the sync core can be exercised against
//! an in-memory store. All paths are relative to the sync root.

use chrono::{DateTime, Utc};

use crate::domain::newtypes::{FileHash, RelativePath};
use crate::ports::remote_client::ContentStream;

/// Result of enumerating or stat-ing a local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileInfo {
    pub relative_path: RelativePath,
    pub size: u64,
    pub last_write_time: DateTime<Utc>,
    /// Content hash, when the implementation computes one
    pub hash: Option<FileHash>,
}

/// Port trait for the local mirror
#[async_trait::async_trait]
pub trait ILocalFileAccess: Send + Sync {
    /// Lists every regular file under the sync root
    async fn enumerate_files(&self) -> anyhow::Result<Vec<LocalFileInfo>>;

    /// Stats a single file, `None` when it does not exist
    async fn get_file_info(&self, path: &RelativePath) -> anyhow::Result<Option<LocalFileInfo>>;

    /// Writes the stream to `path`, replacing any existing file
    ///
    /// Implementations must not leave a partially written file at `path`.
    async fn write_file(&self, path: &RelativePath, content: ContentStream) -> anyhow::Result<()>;

    /// Opens a file for reading, `None` when it does not exist
    async fn open_read(&self, path: &RelativePath) -> anyhow::Result<Option<ContentStream>>;

    /// Deletes a file; deleting a missing file is not an error
    async fn delete_file(&self, path: &RelativePath) -> anyhow::Result<()>;
}
