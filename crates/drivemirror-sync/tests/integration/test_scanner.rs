//! Local file scanner tests

use std::sync::Arc;

use chrono::{Duration, Timelike};
use tokio_util::sync::CancellationToken;

use drivemirror_core::domain::{newtypes::LocalFileId, LocalFile, RemoteItem, SyncState};
use drivemirror_core::ports::IStateRepository;
use drivemirror_sync::{LocalFileScanner, ScanOutcome};

use crate::common::*;

#[tokio::test]
async fn test_new_file_is_marked_pending_upload() {
    let (_pool, repo) = repository().await;
    let local = Arc::new(MemoryLocal::new());
    local.put("notes/new.txt", b"fresh", base_time());

    let scanner = LocalFileScanner::new(local.clone(), repo.clone());
    let outcome = scanner.scan(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome,
        ScanOutcome {
            processed: 1,
            new_files: 1,
            modified: 0
        }
    );
    let stored = repo
        .get_local_file_by_path(&rel("notes/new.txt"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, SyncState::PendingUpload);
    assert_eq!(stored.size, 5);

    // A second scan leaves the pending record alone.
    let again = scanner.scan(&CancellationToken::new()).await.unwrap();
    assert_eq!(again.new_files, 0);
    assert_eq!(repo.get_pending_upload_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_file_matching_remote_is_unchanged() {
    let (_pool, repo) = repository().await;
    repo.apply_remote_items(&[RemoteItem::file(rid("R1"), rel("a.txt"), 3, base_time())])
        .await
        .unwrap();
    let local = Arc::new(MemoryLocal::new());
    local.put("a.txt", b"abc", base_time());

    let outcome = LocalFileScanner::new(local, repo.clone())
        .scan(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.modified, 0);
    assert_eq!(repo.get_pending_upload_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_newer_local_write_is_marked_modified() {
    let (_pool, repo) = repository().await;
    repo.apply_remote_items(&[RemoteItem::file(rid("R1"), rel("a.txt"), 3, base_time())])
        .await
        .unwrap();
    let local = Arc::new(MemoryLocal::new());
    local.put("a.txt", b"abc", base_time() + Duration::minutes(1));

    let outcome = LocalFileScanner::new(local, repo.clone())
        .scan(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.modified, 1);
    let stored = repo.get_local_file_by_path(&rel("a.txt")).await.unwrap().unwrap();
    assert_eq!(stored.state, SyncState::PendingUpload);
    assert_eq!(stored.id.as_str(), "R1");
}

#[tokio::test]
async fn test_pending_modified_file_is_not_rewritten_on_rescan() {
    let (_pool, repo) = repository().await;
    repo.apply_remote_items(&[RemoteItem::file(rid("R1"), rel("a.txt"), 3, base_time())])
        .await
        .unwrap();
    let local = Arc::new(MemoryLocal::new());
    local.put("a.txt", b"abcd", base_time() + Duration::minutes(1));
    let scanner = LocalFileScanner::new(local, repo.clone());

    let first = scanner.scan(&CancellationToken::new()).await.unwrap();
    assert_eq!(first.modified, 1);
    let before = repo.get_local_file_by_path(&rel("a.txt")).await.unwrap().unwrap();

    let second = scanner.scan(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        second,
        ScanOutcome {
            processed: 1,
            new_files: 0,
            modified: 0
        }
    );
    let after = repo.get_local_file_by_path(&rel("a.txt")).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.state, SyncState::PendingUpload);
    assert_eq!(repo.get_pending_upload_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_nanosecond_write_times_match_uploaded_record() {
    let (_pool, repo) = repository().await;
    repo.apply_remote_items(&[RemoteItem::file(rid("R1"), rel("a.txt"), 3, base_time())])
        .await
        .unwrap();
    let written = (base_time() + Duration::minutes(2))
        .with_nanosecond(123_456_789)
        .unwrap();
    repo.add_or_update_local_file(&LocalFile::new(
        LocalFileId::from(&rid("R1")),
        rel("a.txt"),
        3,
        written,
        SyncState::Uploaded,
    ))
    .await
    .unwrap();
    let local = Arc::new(MemoryLocal::new());
    local.put("a.txt", b"abc", written);
    let scanner = LocalFileScanner::new(local.clone(), repo.clone());

    let outcome = scanner.scan(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.modified, 0);
    let stored = repo.get_local_file_by_path(&rel("a.txt")).await.unwrap().unwrap();
    assert_eq!(stored.state, SyncState::Uploaded);

    // A write a full microsecond later is still detected.
    local.put("a.txt", b"abc", written + Duration::microseconds(1));
    let outcome = scanner.scan(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.modified, 1);
}

#[tokio::test]
async fn test_size_change_against_downloaded_record_is_modified() {
    let (_pool, repo) = repository().await;
    repo.apply_remote_items(&[RemoteItem::file(rid("R1"), rel("a.txt"), 3, base_time())])
        .await
        .unwrap();
    repo.mark_local_file_state(&rid("R1"), SyncState::Downloaded)
        .await
        .unwrap();
    let local = Arc::new(MemoryLocal::new());
    local.put("a.txt", b"abcdef", base_time());

    let outcome = LocalFileScanner::new(local, repo.clone())
        .scan(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.modified, 1);
    let stored = repo.get_local_file_by_path(&rel("a.txt")).await.unwrap().unwrap();
    assert_eq!(stored.state, SyncState::PendingUpload);
    assert_eq!(stored.size, 6);
}

#[tokio::test]
async fn test_uploaded_file_without_remote_is_marked_again() {
    let (_pool, repo) = repository().await;
    repo.add_or_update_local_file(&LocalFile::new(
        LocalFileId::new("L1".to_string()).unwrap(),
        rel("orphan.txt"),
        2,
        base_time(),
        SyncState::Uploaded,
    ))
    .await
    .unwrap();
    let local = Arc::new(MemoryLocal::new());
    local.put("orphan.txt", b"hi", base_time());

    let outcome = LocalFileScanner::new(local, repo.clone())
        .scan(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.new_files, 1);
    let stored = repo.get_local_file_by_path(&rel("orphan.txt")).await.unwrap().unwrap();
    assert_eq!(stored.id.as_str(), "L1");
    assert_eq!(stored.state, SyncState::PendingUpload);
}

#[tokio::test]
async fn test_cancelled_scan_stops() {
    let (_pool, repo) = repository().await;
    let local = Arc::new(MemoryLocal::new());
    local.put("a.txt", b"a", base_time());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = LocalFileScanner::new(local, repo.clone()).scan(&cancel).await;

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(repo.get_pending_upload_count().await.unwrap(), 0);
}
