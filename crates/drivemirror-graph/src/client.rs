//! Microsoft Graph API client
//!
//! Provides an authenticated HTTP client for the Graph drive endpoints:
//! base URL handling, bearer headers, URL construction from path segments
//! and the mapping of non-success responses onto [`GraphError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_graph::client::GraphClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), drivemirror_graph::GraphError> {
//! let client = GraphClient::new("access-token-here");
//! let response = client.request(Method::GET, "/me/drive").send().await?;
//! let response = drivemirror_graph::client::ensure_success(response).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::GraphError;

/// Base URL for Microsoft Graph API v1.0
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Wait used for a 429 response without a usable `Retry-After` header
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Timeout for requests whose body is small (metadata, sessions, chunks)
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

// ============================================================================
// Error body
// ============================================================================

/// `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with authentication headers and base URL
/// construction. Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
    /// OAuth2 access token
    access_token: String,
}

impl fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl GraphClient {
    /// Creates a new GraphClient with the given access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, GRAPH_BASE_URL)
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The raw HTTP client, for requests to pre-authenticated URLs
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Prepends the base URL and adds the Authorization header. `path` is
    /// relative to the base URL (e.g., "/me/drive/root/delta").
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url).bearer_auth(&self.access_token)
    }

    /// Creates an authenticated request for an absolute URL
    ///
    /// Continuation links returned by the API are absolute, so they must
    /// not go through [`request`](Self::request).
    pub fn request_url(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.access_token)
    }

    /// Builds an endpoint URL by appending percent-encoded path segments
    ///
    /// Segments may contain spaces or other reserved characters; each one is
    /// encoded on its own, so a file name never splits into two segments.
    pub fn endpoint<'a, I>(&self, segments: I) -> Result<Url, GraphError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GraphError::InvalidRequest(format!("bad base URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| {
                GraphError::InvalidRequest(format!("base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

// ============================================================================
// Response handling
// ============================================================================

/// Passes a successful response through and classifies anything else
pub async fn ensure_success(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER));
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);

    debug!(status = status.as_u16(), %message, "Graph request failed");
    Err(GraphError::from_status(status, message, retry_after))
}

/// Extracts `code: message` from a Graph error body, else the raw text
fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let ErrorDetail { code, message } = envelope.error;
        return match (code, message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code,
            (None, Some(message)) => message,
            (None, None) => String::new(),
        };
    }

    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Parses a `Retry-After` header value
///
/// Accepts delay-seconds or an HTTP-date. Dates more than an hour ahead,
/// dates in the past and unparsable values fall back to `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Some(secs) = u64::try_from(wait.num_seconds())
            .ok()
            .filter(|&s| s > 0 && s <= 3600)
        {
            return Duration::from_secs(secs);
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
