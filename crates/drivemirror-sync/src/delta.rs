//! Delta page processor
//!
//! Drains the remote delta feed page by page. Each page is mapped to
//! [`RemoteItem`] snapshots and applied through the repository as one
//! transaction, so a RemoteItem row only ever exists for a fully applied page.
//!
//! ## Token tracking
//!
//! The resumption token is read from the `token` query parameter of a
//! page's delta link, falling back to the whole link when the parameter is
//! absent. Pages without a usable token never overwrite the candidate, so
//! the outcome carries the last non-empty token seen. Nothing is persisted
//! here; the engine stores the token only after the whole run succeeded.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drivemirror_core::domain::{
    newtypes::{DeltaToken, FileHash, RelativePath, RemoteId},
    RemoteItem,
};
use drivemirror_core::ports::{DeltaItem, DeltaPage, IRemoteClient, IStateRepository};

use crate::SyncError;

/// Result of draining the delta feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaOutcome {
    /// Last non-empty resumption token seen, if any page carried one
    pub final_token: Option<DeltaToken>,
    pub page_count: u32,
    pub total_items: u64,
}

/// Result of applying a single delta page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOutcome {
    /// Token to resume from: the delta link's token, else the next link's
    pub token: Option<DeltaToken>,
    pub items: u64,
    /// Whether the feed reported more pages after this one
    pub has_more: bool,
}

/// Applies delta pages from the remote client to the state repository
pub struct DeltaPageProcessor {
    remote: Arc<dyn IRemoteClient>,
    repository: Arc<dyn IStateRepository>,
}

impl DeltaPageProcessor {
    pub fn new(remote: Arc<dyn IRemoteClient>, repository: Arc<dyn IStateRepository>) -> Self {
        Self { remote, repository }
    }

    /// Requests and applies pages until no continuation link remains
    ///
    /// `start` is `None` for a full enumeration. Cancellation is checked
    /// before every page request. A failure fetching or applying any page
    /// aborts the run.
    #[tracing::instrument(skip(self, start, cancel), fields(from_token = start.is_some()))]
    pub async fn process_all_pages(
        &self,
        start: Option<&DeltaToken>,
        cancel: &CancellationToken,
    ) -> Result<DeltaOutcome, SyncError> {
        let mut position = start.map(|t| t.as_str().to_string());
        let mut outcome = DeltaOutcome::default();

        loop {
            if cancel.is_cancelled() {
                info!(pages = outcome.page_count, "Delta enumeration cancelled");
                return Err(SyncError::Cancelled);
            }

            let page = self
                .remote
                .get_delta_page(position.as_deref())
                .await
                .with_context(|| format!("Failed to fetch delta page {}", outcome.page_count + 1))?;

            outcome.total_items += self.apply_page(&page).await?;
            outcome.page_count += 1;

            if let Some(token) = page.delta_link.as_deref().and_then(token_from_link) {
                outcome.final_token = Some(token);
            }

            debug!(
                page = outcome.page_count,
                items = page.items.len(),
                has_next = page.next_link.is_some(),
                "Applied delta page"
            );

            match page.next_link {
                Some(next) if !next.is_empty() => position = Some(next),
                _ => break,
            }
        }

        info!(
            pages = outcome.page_count,
            items = outcome.total_items,
            has_token = outcome.final_token.is_some(),
            "Delta enumeration complete"
        );
        Ok(outcome)
    }

    /// Requests and applies exactly one page starting at `token`
    #[tracing::instrument(skip(self, token, cancel))]
    pub async fn process_single_page(
        &self,
        token: &DeltaToken,
        cancel: &CancellationToken,
    ) -> Result<PageOutcome, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let page = self
            .remote
            .get_delta_page(Some(token.as_str()))
            .await
            .context("Failed to fetch delta page")?;

        let items = self.apply_page(&page).await?;
        let has_more = page.next_link.as_deref().is_some_and(|l| !l.is_empty());
        let next_token = page
            .delta_link
            .as_deref()
            .and_then(token_from_link)
            .or_else(|| page.next_link.as_deref().and_then(token_from_link));

        info!(items, has_more, "Applied incremental delta page");
        Ok(PageOutcome {
            token: next_token,
            items,
            has_more,
        })
    }

    /// Maps and applies one page in a single repository transaction
    async fn apply_page(&self, page: &DeltaPage) -> Result<u64, SyncError> {
        let items: Vec<RemoteItem> = page.items.iter().filter_map(map_delta_item).collect();

        self.repository
            .apply_remote_items(&items)
            .await
            .context("Failed to apply delta page")?;

        Ok(items.len() as u64)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts the resumption token from a delta or next link
///
/// Input: `https://graph.microsoft.com/v1.0/me/drive/root/delta?token=abc123`
/// Output: `Some("abc123")`. A link without a `token` parameter is used
/// whole; an empty link yields `None`.
pub fn token_from_link(link: &str) -> Option<DeltaToken> {
    let raw = url::Url::parse(link)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(key, _)| key == "token")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| link.to_string());

    DeltaToken::new(raw).ok()
}

/// Maps a delta DTO to a remote item snapshot
///
/// The drive root is skipped. Items whose id or path cannot be represented
/// are skipped with a warning rather than failing the page.
fn map_delta_item(item: &DeltaItem) -> Option<RemoteItem> {
    if item.is_root {
        return None;
    }

    match try_map_delta_item(item) {
        Ok(mapped) => Some(mapped),
        Err(e) => {
            warn!(id = %item.id, name = %item.name, error = %e, "Skipping unmappable delta item");
            None
        }
    }
}

fn try_map_delta_item(item: &DeltaItem) -> Result<RemoteItem, SyncError> {
    let id = RemoteId::new(item.id.clone())?;

    // Deleted entries usually come without a path; the repository keeps
    // the stored one, the name only matters for a never-seen tombstone.
    let path = match item.path.as_deref().filter(|p| !p.is_empty() && *p != "/") {
        Some(p) => RelativePath::from_remote(p)?,
        None if !item.name.is_empty() => RelativePath::new(item.name.clone())?,
        None => RelativePath::new(item.id.clone())?,
    };

    let last_modified = item.modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut mapped = if item.is_directory {
        RemoteItem::folder(id, path, last_modified)
    } else {
        RemoteItem::file(id, path, item.size.unwrap_or(0), last_modified)
    };
    mapped = mapped.with_tags(item.etag.clone(), item.ctag.clone());

    if let Some(hash) = item.hash.clone().and_then(|h| FileHash::new(h).ok()) {
        mapped = mapped.with_hash(hash);
    }
    if item.is_deleted {
        mapped = mapped.deleted();
    }

    Ok(mapped)
}
