//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileAccess`] over a sync root directory using `tokio::fs`.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: content is streamed into a sibling temp file and
//!   renamed over the target, so a crash never leaves a half-written file
//!   at the real path.
//! - **quickXorHash**: the OneDrive content hash, computed while streaming
//!   the file so local and remote hashes compare without downloading.
//!   Hashing on enumeration is optional because it reads every byte.
//! - **Timestamps** are truncated to microseconds, the precision the state
//!   repository keeps.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use drivemirror_core::domain::newtypes::{FileHash, RelativePath};
use drivemirror_core::domain::{to_stored_precision, DomainError};
use drivemirror_core::ports::{ContentStream, ILocalFileAccess, LocalFileInfo};

/// Suffix of in-progress download files; never reported by enumeration
pub const PARTIAL_SUFFIX: &str = ".drivemirror-partial";

/// Read buffer for hashing
const HASH_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// LocalFileAccessAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileAccess`] port to a directory tree
#[derive(Debug, Clone)]
pub struct LocalFileAccessAdapter {
    root: PathBuf,
    compute_hashes: bool,
}

impl LocalFileAccessAdapter {
    /// Creates an adapter rooted at `root`
    ///
    /// With `compute_hashes`, enumeration and stat results carry a
    /// quickXorHash of the content.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, compute_hashes: bool) -> Self {
        Self {
            root: root.into(),
            compute_hashes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn describe(
        &self,
        relative_path: RelativePath,
        absolute: &Path,
        metadata: &std::fs::Metadata,
    ) -> anyhow::Result<LocalFileInfo> {
        let hash = if self.compute_hashes {
            Some(hash_file(absolute).await?)
        } else {
            None
        };

        Ok(LocalFileInfo {
            relative_path,
            size: metadata.len(),
            last_write_time: modified_time(metadata),
            hash,
        })
    }
}

// ============================================================================
// QuickXorHash implementation
// ============================================================================

/// OneDrive-compatible quickXorHash algorithm
///
/// The algorithm works on a 160-bit (20-byte) state. Each input byte is
/// XOR-ed into the state at the current *bit* position and the position
/// advances by 11 bits (mod 160). Finally the total length (little-endian
/// `u64`) is XOR-ed into the first 8 bytes; the 20 bytes are base64-encoded.
#[derive(Debug, Clone)]
pub struct QuickXorHash {
    data: [u8; 20],
    shift: usize,
    length: u64,
}

impl Default for QuickXorHash {
    fn default() -> Self {
        Self::new()
    }
}

impl QuickXorHash {
    const WIDTH_BITS: usize = 160;
    const SHIFT_STEP: usize = 11;

    pub fn new() -> Self {
        Self {
            data: [0u8; 20],
            shift: 0,
            length: 0,
        }
    }

    pub fn update(&mut self, input: &[u8]) {
        for &byte in input {
            let byte_pos = self.shift / 8;
            let bit_offset = self.shift % 8;

            self.data[byte_pos % 20] ^= byte << bit_offset;
            if bit_offset > 0 {
                self.data[(byte_pos + 1) % 20] ^= byte >> (8 - bit_offset);
            }

            self.shift = (self.shift + Self::SHIFT_STEP) % Self::WIDTH_BITS;
        }
        self.length += input.len() as u64;
    }

    pub fn finalize(mut self) -> [u8; 20] {
        for (i, lb) in self.length.to_le_bytes().into_iter().enumerate() {
            self.data[i] ^= lb;
        }
        self.data
    }

    /// Finalizes and encodes the digest as a [`FileHash`]
    pub fn finish(self) -> Result<FileHash, DomainError> {
        FileHash::new(base64::engine::general_purpose::STANDARD.encode(self.finalize()))
    }
}

/// Streams a file through [`QuickXorHash`]
pub async fn hash_file(path: &Path) -> anyhow::Result<FileHash> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = QuickXorHash::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finish()?)
}

// ============================================================================
// Helpers
// ============================================================================

fn modified_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .ok()
        .and_then(|st| st.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, dur.subsec_nanos()))
        .map(to_stored_precision)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut p = target.as_os_str().to_owned();
    p.push(PARTIAL_SUFFIX);
    PathBuf::from(p)
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX))
}

async fn stat_regular_file(path: &Path) -> anyhow::Result<Option<std::fs::Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => Ok(Some(m)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

// ============================================================================
// ILocalFileAccess implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileAccess for LocalFileAccessAdapter {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn enumerate_files(&self) -> anyhow::Result<Vec<LocalFileInfo>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(dir = %dir.display(), "directory vanished during scan");
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", dir.display()))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() || is_partial(&path) {
                    continue;
                }

                let relative = match RelativePath::from_local(&self.root, &path) {
                    Ok(relative) => relative,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unrepresentable path");
                        continue;
                    }
                };

                // The file may disappear between listing and stat.
                let Some(metadata) = stat_regular_file(&path).await? else {
                    continue;
                };
                files.push(self.describe(relative, &path, &metadata).await?);
            }
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        debug!(count = files.len(), "enumeration complete");
        Ok(files)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get_file_info(&self, path: &RelativePath) -> anyhow::Result<Option<LocalFileInfo>> {
        let absolute = path.to_path_buf(&self.root);
        match stat_regular_file(&absolute).await? {
            Some(metadata) => Ok(Some(
                self.describe(path.clone(), &absolute, &metadata).await?,
            )),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, content), fields(path = %path))]
    async fn write_file(&self, path: &RelativePath, mut content: ContentStream) -> anyhow::Result<()> {
        let target = path.to_path_buf(&self.root);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp_path = partial_path(&target);
        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            let bytes = tokio::io::copy(&mut content, &mut file).await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(e).with_context(|| format!("Failed to write {}", tmp_path.display()));
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp_path, &target).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e)
                .with_context(|| format!("Failed to move download into {}", target.display()));
        }

        debug!(bytes, "write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn open_read(&self, path: &RelativePath) -> anyhow::Result<Option<ContentStream>> {
        let absolute = path.to_path_buf(&self.root);
        match tokio::fs::File::open(&absolute).await {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to open {}", absolute.display())),
        }
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete_file(&self, path: &RelativePath) -> anyhow::Result<()> {
        let absolute = path.to_path_buf(&self.root);
        match tokio::fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("file already absent");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", absolute.display())),
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
