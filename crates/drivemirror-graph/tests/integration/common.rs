//! Shared test helpers for Graph API integration tests
//!
//! Each helper mounts mock endpoints on a wiremock server; the adapter
//! under test points at the server's URI.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivemirror_graph::{GraphClient, GraphRemoteClient};

pub const ACCESS_TOKEN: &str = "test-access-token";

/// Starts a mock server and returns an adapter pointed at it
pub async fn setup_graph_mock() -> (MockServer, GraphRemoteClient) {
    let server = MockServer::start().await;
    let client = GraphClient::with_base_url(ACCESS_TOKEN, server.uri());
    (server, GraphRemoteClient::new(client))
}

/// A file item as the delta feed reports it
pub fn file_item(id: &str, name: &str, parent: &str, size: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "size": size,
        "eTag": format!("\"{{{id}}},1\""),
        "lastModifiedDateTime": "2026-01-15T10:00:00Z",
        "parentReference": { "id": "root-id", "path": parent },
        "file": { "hashes": { "quickXorHash": "AAAAAAAAAAAAAAAAAAAAAAAAAAA=" } }
    })
}

/// Mounts a file download endpoint for a specific item ID
pub async fn mount_download(server: &MockServer, item_id: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/me/drive/items/{item_id}/content")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}

/// Mounts `createUploadSession` for `{parent}/{name}` returning `/upload/{session}`
pub async fn mount_upload_session(server: &MockServer, item_path: &str, session: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/me/drive/root:{item_path}:/createUploadSession")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uploadUrl": format!("{}/upload/{session}", server.uri()),
            "expirationDateTime": "2026-01-16T10:00:00Z",
            "nextExpectedRanges": ["0-"]
        })))
        .mount(server)
        .await;
}
