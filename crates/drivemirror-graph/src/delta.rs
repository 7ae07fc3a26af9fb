//! Microsoft Graph Delta API
//!
//! Fetches one page of the drive delta feed and maps it onto the port-level
//! [`DeltaPage`]. Following `@odata.nextLink` pages is the caller's job; the
//! sync core requests one page at a time so it can persist each page before
//! asking for the next.
//!
//! ## Positions
//!
//! | position                      | request                                  |
//! |-------------------------------|------------------------------------------|
//! | `None`                        | `GET {base}/me/drive/root/delta`         |
//! | absolute `http(s)://` link    | `GET {link}` (continuation link)         |
//! | anything else                 | `GET {base}/me/drive/root/delta?token=…` |
//!
//! A `410 Gone` answer means the token expired and surfaces as
//! [`GraphError::ResyncRequired`].

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use drivemirror_core::ports::{DeltaItem, DeltaPage};

use crate::client::{ensure_success, GraphClient, REQUEST_TIMEOUT};
use crate::GraphError;

/// Path for the delta endpoint relative to the Graph API base URL
pub const DELTA_PATH: &str = "/me/drive/root/delta";

// ============================================================================
// Microsoft Graph API response types (JSON deserialization)
// ============================================================================

/// Raw response from `GET /me/drive/root/delta`
///
/// See: <https://learn.microsoft.com/en-us/graph/api/driveitem-delta>
#[derive(Debug, Deserialize)]
struct GraphDeltaResponse {
    #[serde(default)]
    value: Vec<GraphDriveItem>,

    /// URL for the next page of results
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,

    /// URL carrying the token for the next sync cycle (last page only)
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

/// A DriveItem as it appears in the delta feed
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDriveItem {
    id: String,

    /// Deleted items may omit the name
    #[serde(default)]
    name: String,

    size: Option<u64>,

    last_modified_date_time: Option<DateTime<Utc>>,

    #[serde(rename = "eTag")]
    e_tag: Option<String>,

    #[serde(rename = "cTag")]
    c_tag: Option<String>,

    parent_reference: Option<GraphParentReference>,

    file: Option<GraphFileFacet>,

    folder: Option<serde_json::Value>,

    deleted: Option<serde_json::Value>,

    /// Present only on the drive root
    root: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphParentReference {
    id: Option<String>,

    /// Parent path, e.g. `/drive/root:/Documents`
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphFileFacet {
    hashes: Option<GraphHashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphHashes {
    /// QuickXorHash in Base64
    quick_xor_hash: Option<String>,
}

// ============================================================================
// DeltaParser
// ============================================================================

/// Maps Graph delta payloads onto port DTOs
pub struct DeltaParser;

impl DeltaParser {
    fn parse_item(item: GraphDriveItem) -> DeltaItem {
        let hash = item
            .file
            .as_ref()
            .and_then(|f| f.hashes.as_ref())
            .and_then(|h| h.quick_xor_hash.clone());

        let path = item
            .parent_reference
            .as_ref()
            .and_then(|pr| pr.path.as_deref())
            .map(|parent| Self::normalize_parent_path(parent, &item.name));

        DeltaItem {
            path,
            hash,
            size: item.size,
            modified: item.last_modified_date_time,
            etag: item.e_tag,
            ctag: item.c_tag,
            is_deleted: item.deleted.is_some(),
            is_directory: item.folder.is_some() || item.root.is_some(),
            is_root: item.root.is_some(),
            parent_id: item.parent_reference.and_then(|pr| pr.id),
            id: item.id,
            name: item.name,
        }
    }

    /// Joins a Graph parent path and an item name into a drive path
    ///
    /// `/drive/root:` becomes `/`, `/drive/root:/Documents` becomes
    /// `/Documents`. Drive-qualified forms such as `/drives/{id}/root:/x`
    /// are handled the same way. Paths without a `root:` marker are kept.
    pub fn normalize_parent_path(parent_path: &str, item_name: &str) -> String {
        let parent = match parent_path.find("root:") {
            Some(idx) => &parent_path[idx + "root:".len()..],
            None => parent_path,
        };
        let parent = parent.trim_end_matches('/');

        if parent.is_empty() {
            format!("/{item_name}")
        } else {
            format!("{parent}/{item_name}")
        }
    }

    fn parse_response(response: GraphDeltaResponse) -> DeltaPage {
        DeltaPage {
            items: response.value.into_iter().map(Self::parse_item).collect(),
            next_link: response.next_link,
            delta_link: response.delta_link,
        }
    }

    /// Parses a raw delta response body
    pub fn parse_body(body: &[u8]) -> Result<DeltaPage, GraphError> {
        let response: GraphDeltaResponse = serde_json::from_slice(body)
            .map_err(|e| GraphError::InvalidResponse(format!("delta page: {e}")))?;
        Ok(Self::parse_response(response))
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Returns true when `position` is a continuation link rather than a token
fn is_link(position: &str) -> bool {
    position.starts_with("https://") || position.starts_with("http://")
}

/// Fetches a single page of the delta feed
///
/// See the module documentation for how `position` selects the request.
pub async fn get_delta_page(
    client: &GraphClient,
    position: Option<&str>,
) -> Result<DeltaPage, GraphError> {
    let request = match position {
        None => client.request(Method::GET, DELTA_PATH),
        Some(link) if is_link(link) => client.request_url(Method::GET, link),
        Some(token) => client
            .request(Method::GET, DELTA_PATH)
            .query(&[("token", token)]),
    };

    let response = request.timeout(REQUEST_TIMEOUT).send().await?;
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    let page = DeltaParser::parse_body(&body)?;

    debug!(
        items = page.items.len(),
        has_next = page.next_link.is_some(),
        has_delta_link = page.delta_link.is_some(),
        "Received delta page"
    );
    Ok(page)
}

// ============================================================================
// Tests
// ============================================================================
