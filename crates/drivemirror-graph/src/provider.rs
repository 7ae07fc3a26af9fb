//! GraphRemoteClient - IRemoteClient implementation for Microsoft Graph API
//!
//! Wraps the [`GraphClient`] and delegates to the delta and upload modules
//! to fulfil the [`IRemoteClient`] port contract.
//!
//! ## Design Notes
//!
//! - Errors leave this adapter as `anyhow::Error` wrapping a [`GraphError`],
//!   so callers can downcast to inspect the status class.
//! - Downloads are streamed: the response body is exposed as an
//!   `AsyncRead` and never buffered whole.
//! - No retries happen here; the sync core owns attempts and backoff.
//!
//! [`GraphError`]: crate::GraphError

use anyhow::{Context, Result};
use futures_util::TryStreamExt;
use reqwest::Method;
use tokio_util::io::StreamReader;
use tracing::debug;

use drivemirror_core::domain::newtypes::{RemoteId, RemotePath};
use drivemirror_core::ports::{ContentStream, DeltaPage, IRemoteClient, UploadSession};

use crate::client::{ensure_success, GraphClient};
use crate::upload::{self, ChunkStatus};
use crate::{delta, GraphError};

/// Remote drive client backed by the Microsoft Graph API
#[derive(Debug, Clone)]
pub struct GraphRemoteClient {
    client: GraphClient,
}

impl GraphRemoteClient {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    async fn open_content(&self, id: &RemoteId) -> Result<ContentStream, GraphError> {
        let url = self
            .client
            .endpoint(["me", "drive", "items", id.as_str(), "content"])?;
        let response = self.client.request_url(Method::GET, url.as_str()).send().await?;
        let response = ensure_success(response).await?;

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(body))))
    }
}

#[async_trait::async_trait]
impl IRemoteClient for GraphRemoteClient {
    async fn get_delta_page(&self, position: Option<&str>) -> Result<DeltaPage> {
        debug!(has_position = position.is_some(), "GraphRemoteClient::get_delta_page");
        delta::get_delta_page(&self.client, position)
            .await
            .context("Delta page request failed")
    }

    async fn download_content(&self, id: &RemoteId) -> Result<ContentStream> {
        debug!(%id, "GraphRemoteClient::download_content");
        self.open_content(id)
            .await
            .with_context(|| format!("Failed to download item {id}"))
    }

    async fn create_upload_session(
        &self,
        parent: &RemotePath,
        file_name: &str,
    ) -> Result<UploadSession> {
        debug!(%parent, file_name, "GraphRemoteClient::create_upload_session");
        upload::create_upload_session(&self.client, parent, file_name)
            .await
            .with_context(|| format!("Failed to create upload session for {file_name}"))
    }

    async fn upload_small(
        &self,
        parent: &RemotePath,
        file_name: &str,
        content: &[u8],
    ) -> Result<()> {
        debug!(%parent, file_name, bytes = content.len(), "GraphRemoteClient::upload_small");
        upload::upload_small(&self.client, parent, file_name, content)
            .await
            .with_context(|| format!("Failed to upload {file_name}"))
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        chunk: &[u8],
        range_start: u64,
        range_end: u64,
        total_len: u64,
    ) -> Result<()> {
        let status = upload::upload_chunk(
            &self.client,
            session,
            chunk,
            range_start,
            range_end,
            total_len,
        )
        .await
        .with_context(|| {
            format!("Failed to upload bytes {range_start}-{range_end}/{total_len}")
        })?;

        let is_last = range_end + 1 == total_len;
        match (status, is_last) {
            (ChunkStatus::Accepted, false) | (ChunkStatus::Completed, true) => Ok(()),
            (ChunkStatus::Accepted, true) => {
                anyhow::bail!("Upload session {} did not complete after the final chunk", session.id)
            }
            (ChunkStatus::Completed, false) => anyhow::bail!(
                "Upload session {} completed early at byte {range_end} of {total_len}",
                session.id
            ),
        }
    }
}
