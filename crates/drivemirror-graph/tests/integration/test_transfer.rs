//! Downloads and upload sessions against a mock Graph API

use drivemirror_core::domain::newtypes::{RemoteId, RemotePath};
use drivemirror_core::ports::{IRemoteClient, UploadSession};
use drivemirror_graph::GraphError;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, ACCESS_TOKEN};

fn rid(id: &str) -> RemoteId {
    RemoteId::new(id.to_string()).unwrap()
}

async fn mount_chunk(server: &MockServer, range: &str, status: u16) {
    Mock::given(method("PUT"))
        .and(path("/upload/sess-1"))
        .and(header("Content-Range", range))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(server)
        .await;
}

fn session(server: &MockServer) -> UploadSession {
    UploadSession {
        upload_url: format!("{}/upload/sess-1", server.uri()),
        id: "sess-1".to_string(),
        expires_at: None,
    }
}

// ============================================================================
// Download tests
// ============================================================================

#[tokio::test]
async fn test_download_streams_content() {
    let (server, remote) = common::setup_graph_mock().await;
    let content: Vec<u8> = (0..1_048_576).map(|i| (i % 251) as u8).collect();
    common::mount_download(&server, "large-001", &content).await;

    let mut stream = remote.download_content(&rid("large-001")).await.unwrap();
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await.unwrap();

    assert_eq!(data.len(), content.len());
    assert_eq!(data, content);
}

#[tokio::test]
async fn test_download_empty_file() {
    let (server, remote) = common::setup_graph_mock().await;
    common::mount_download(&server, "empty-001", &[]).await;

    let mut stream = remote.download_content(&rid("empty-001")).await.unwrap();
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await.unwrap();

    assert!(data.is_empty());
}

#[tokio::test]
async fn test_download_missing_item_is_not_found() {
    let (_server, remote) = common::setup_graph_mock().await;

    let err = match remote.download_content(&rid("missing")).await {
        Ok(_) => panic!("download of a missing item succeeded"),
        Err(err) => err,
    };

    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::NotFound(_))
    ));
    assert!(format!("{err:#}").contains("missing"));
}

// ============================================================================
// Upload tests
// ============================================================================

#[tokio::test]
async fn test_create_upload_session_in_subfolder() {
    let (server, remote) = common::setup_graph_mock().await;
    Mock::given(method("POST"))
        .and(path("/me/drive/root:/docs/big.bin:/createUploadSession"))
        .and(body_partial_json(serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uploadUrl": format!("{}/upload/sess-1", server.uri()),
            "expirationDateTime": "2026-01-16T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let parent = RemotePath::new("/docs".to_string()).unwrap();
    let session = remote.create_upload_session(&parent, "big.bin").await.unwrap();

    assert_eq!(session.id, "sess-1");
    assert!(session.upload_url.ends_with("/upload/sess-1"));
    assert_eq!(
        session.expires_at.unwrap().to_rfc3339(),
        "2026-01-16T10:00:00+00:00"
    );
}

#[tokio::test]
async fn test_create_upload_session_in_root() {
    let (server, remote) = common::setup_graph_mock().await;
    common::mount_upload_session(&server, "/top.txt", "sess-root").await;

    let session = remote
        .create_upload_session(&RemotePath::root(), "top.txt")
        .await
        .unwrap();

    assert_eq!(session.id, "sess-root");
}

#[tokio::test]
async fn test_chunks_carry_content_range_without_bearer() {
    let (server, remote) = common::setup_graph_mock().await;
    mount_chunk(&server, "bytes 0-3/8", 202).await;
    mount_chunk(&server, "bytes 4-7/8", 201).await;
    let session = session(&server);

    remote.upload_chunk(&session, b"abcd", 0, 3, 8).await.unwrap();
    remote.upload_chunk(&session, b"efgh", 4, 7, 8).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.headers.get("authorization").is_none()));
    assert_eq!(requests[0].body, b"abcd");
    assert_eq!(requests[1].body, b"efgh");
}

#[tokio::test]
async fn test_single_chunk_upload_completes_with_ok() {
    let (server, remote) = common::setup_graph_mock().await;
    mount_chunk(&server, "bytes 0-4/5", 200).await;

    remote
        .upload_chunk(&session(&server), b"hello", 0, 4, 5)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_final_chunk_must_complete_the_session() {
    let (server, remote) = common::setup_graph_mock().await;
    mount_chunk(&server, "bytes 0-4/5", 202).await;

    let err = remote
        .upload_chunk(&session(&server), b"hello", 0, 4, 5)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("did not complete"));
}

#[tokio::test]
async fn test_mismatched_chunk_is_rejected_before_sending() {
    let (server, remote) = common::setup_graph_mock().await;

    let err = remote
        .upload_chunk(&session(&server), b"abc", 0, 3, 8)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::InvalidRequest(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_chunk_reports_status() {
    let (server, remote) = common::setup_graph_mock().await;
    mount_chunk(&server, "bytes 0-3/8", 416).await;

    let err = remote
        .upload_chunk(&session(&server), b"abcd", 0, 3, 8)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::UnexpectedStatus { status: 416, .. })
    ));
}

#[tokio::test]
async fn test_empty_file_uses_simple_upload() {
    let (server, remote) = common::setup_graph_mock().await;
    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/docs/empty.txt:/content"))
        .and(header("Authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "empty-001",
            "name": "empty.txt",
            "size": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let parent = RemotePath::new("/docs".to_string()).unwrap();
    remote.upload_small(&parent, "empty.txt", &[]).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].body.is_empty());
}

#[tokio::test]
async fn test_simple_upload_rejects_large_body() {
    let (server, remote) = common::setup_graph_mock().await;
    let data = vec![0u8; drivemirror_graph::upload::SMALL_UPLOAD_LIMIT + 1];

    let err = remote
        .upload_small(&RemotePath::root(), "big.bin", &data)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::InvalidRequest(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}
