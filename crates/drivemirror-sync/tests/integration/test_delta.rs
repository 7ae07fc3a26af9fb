//! Delta page processor tests

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use drivemirror_core::domain::newtypes::DeltaToken;
use drivemirror_core::ports::IStateRepository;
use drivemirror_sync::{DeltaPageProcessor, SyncError};

use crate::common::*;

#[tokio::test]
async fn test_last_non_empty_token_wins() {
    let (_pool, repo) = repository().await;
    let remote = Arc::new(
        ScriptedRemote::new()
            .with_page(None, page(vec![delta_file("A1", "a.txt", 1)], Some("next1"), None))
            .with_page(
                Some("next1"),
                page(vec![delta_file("B1", "b.txt", 2)], Some("next2"), None),
            )
            .with_page(
                Some("next2"),
                page(
                    vec![delta_file("C1", "c.txt", 3)],
                    None,
                    Some(&delta_link("tokenX")),
                ),
            ),
    );

    let processor = DeltaPageProcessor::new(remote.clone(), repo.clone());
    let outcome = processor
        .process_all_pages(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.final_token.unwrap().as_str(), "tokenX");
    assert_eq!(outcome.page_count, 3);
    assert_eq!(outcome.total_items, 3);
    assert_eq!(
        *remote.delta_requests.lock().unwrap(),
        vec![None, Some("next1".to_string()), Some("next2".to_string())]
    );
    assert_eq!(repo.get_pending_download_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_page_without_token_keeps_earlier_candidate() {
    let (_pool, repo) = repository().await;
    let remote = Arc::new(
        ScriptedRemote::new()
            .with_page(None, page(vec![], Some("next1"), Some(&delta_link("early"))))
            .with_page(Some("next1"), page(vec![], None, None)),
    );

    let outcome = DeltaPageProcessor::new(remote, repo)
        .process_all_pages(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.final_token.unwrap().as_str(), "early");
    assert_eq!(outcome.page_count, 2);
}

#[tokio::test]
async fn test_resumes_from_start_token() {
    let (_pool, repo) = repository().await;
    let remote = Arc::new(ScriptedRemote::new().with_page(
        Some("stored"),
        page(vec![delta_file("A1", "a.txt", 1)], None, Some(&delta_link("fresh"))),
    ));

    let start = DeltaToken::new("stored".to_string()).unwrap();
    let outcome = DeltaPageProcessor::new(remote, repo)
        .process_all_pages(Some(&start), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.final_token.unwrap().as_str(), "fresh");
}

#[tokio::test]
async fn test_failed_page_aborts_but_keeps_committed_pages() {
    let (_pool, repo) = repository().await;
    // "next1" is not scripted, so the second request fails.
    let remote = Arc::new(ScriptedRemote::new().with_page(
        None,
        page(vec![delta_file("A1", "a.txt", 1)], Some("next1"), None),
    ));

    let result = DeltaPageProcessor::new(remote, repo.clone())
        .process_all_pages(None, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SyncError::Other(_))));
    assert!(repo.get_remote_item(&rid("A1")).await.unwrap().is_some());
    assert!(repo.get_resumption_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_before_first_page() {
    let (_pool, repo) = repository().await;
    let remote = Arc::new(ScriptedRemote::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = DeltaPageProcessor::new(remote.clone(), repo)
        .process_all_pages(None, &cancel)
        .await;

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn test_single_page_takes_token_from_delta_link() {
    let (_pool, repo) = repository().await;
    let remote = Arc::new(ScriptedRemote::new().with_page(
        Some("t1"),
        page(
            vec![delta_file("A1", "a.txt", 1), delta_file("B1", "b.txt", 1)],
            None,
            Some(&delta_link("t2")),
        ),
    ));

    let token = DeltaToken::new("t1".to_string()).unwrap();
    let outcome = DeltaPageProcessor::new(remote, repo)
        .process_single_page(&token, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.token.unwrap().as_str(), "t2");
    assert_eq!(outcome.items, 2);
    assert!(!outcome.has_more);
}

#[tokio::test]
async fn test_single_page_falls_back_to_next_link() {
    let (_pool, repo) = repository().await;
    let next = delta_link("page2");
    let remote = Arc::new(
        ScriptedRemote::new().with_page(Some("t1"), page(vec![], Some(&next), None)),
    );

    let token = DeltaToken::new("t1".to_string()).unwrap();
    let outcome = DeltaPageProcessor::new(remote, repo)
        .process_single_page(&token, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.token.unwrap().as_str(), "page2");
    assert!(outcome.has_more);
}
