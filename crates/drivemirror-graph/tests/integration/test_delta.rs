//! Delta page requests against a mock Graph API

use std::time::Duration;

use drivemirror_core::ports::IRemoteClient;
use drivemirror_graph::GraphError;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, ACCESS_TOKEN};

#[tokio::test]
async fn test_initial_page_is_authenticated_and_parsed() {
    let (server, remote) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(header("Authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                { "id": "root-id", "name": "root", "root": {}, "folder": { "childCount": 2 } },
                common::file_item("file-001", "a.txt", "/drive/root:", 10),
                common::file_item("file-002", "b.txt", "/drive/root:/Docs", 20),
                { "id": "gone-001", "deleted": { "state": "deleted" } }
            ],
            "@odata.deltaLink": format!("{}/me/drive/root/delta?token=t1", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = remote.get_delta_page(None).await.unwrap();

    assert_eq!(page.items.len(), 4);
    assert!(page.items[0].is_root);
    assert_eq!(page.items[1].path.as_deref(), Some("/a.txt"));
    assert_eq!(page.items[2].path.as_deref(), Some("/Docs/b.txt"));
    assert_eq!(page.items[2].etag.as_deref(), Some("\"{file-002},1\""));
    assert!(page.items[3].is_deleted);
    assert!(page.next_link.is_none());
    assert!(page.delta_link.unwrap().ends_with("token=t1"));
}

#[tokio::test]
async fn test_token_position_is_sent_as_query_parameter() {
    let (server, remote) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(query_param("token", "stored-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [],
            "@odata.deltaLink": format!("{}/me/drive/root/delta?token=t2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = remote.get_delta_page(Some("stored-token")).await.unwrap();
    assert!(page.items.is_empty());
    assert!(page.delta_link.is_some());
}

#[tokio::test]
async fn test_absolute_next_link_is_followed() {
    let (server, remote) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(query_param("$skiptoken", "page2"))
        .and(header("Authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [common::file_item("file-003", "c.txt", "/drive/root:", 3)],
            "@odata.nextLink": format!("{}/me/drive/root/delta?$skiptoken=page3", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let link = format!("{}/me/drive/root/delta?$skiptoken=page2", server.uri());
    let page = remote.get_delta_page(Some(&link)).await.unwrap();

    assert_eq!(page.items[0].id, "file-003");
    assert!(page.next_link.unwrap().ends_with("page3"));
    assert!(page.delta_link.is_none());
}

#[tokio::test]
async fn test_expired_token_requires_resync() {
    let (server, remote) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(410).set_body_json(serde_json::json!({
            "error": { "code": "resyncRequired", "message": "Resync required" }
        })))
        .mount(&server)
        .await;

    let err = remote.get_delta_page(Some("old")).await.unwrap_err();
    match err.downcast_ref::<GraphError>() {
        Some(GraphError::ResyncRequired(message)) => {
            assert_eq!(message, "resyncRequired: Resync required")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_throttling_reports_retry_after() {
    let (server, remote) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = remote.get_delta_page(None).await.unwrap_err();
    let graph = err.downcast_ref::<GraphError>().unwrap();
    assert_eq!(graph.retry_after(), Some(Duration::from_secs(7)));
    assert!(graph.is_transient());
}

#[tokio::test]
async fn test_server_error_message_names_status() {
    let (server, remote) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = remote.get_delta_page(None).await.unwrap_err();
    let rendered = format!("{err:#}");
    assert!(rendered.contains("503"), "{rendered}");
    assert!(rendered.contains("maintenance"), "{rendered}");
}

#[tokio::test]
async fn test_malformed_page_is_invalid_response() {
    let (server, remote) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = remote.get_delta_page(None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::InvalidResponse(_))
    ));
}
