//! Soft-delete, clear and deduplication against the in-memory index

mod common;

use chat_archive_search::models::*;
use chat_archive_search::search::*;
use common::{create_test_service, test_config, user_message};
use futures::TryStreamExt;
use serde_json::json;
use std::sync::Arc;

fn maintenance_for(service: &SearchService) -> MaintenanceService {
    MaintenanceService::new(service.backend().clone(), service.config().clone())
}

/// Store a raw copy under an arbitrary id, as older ingestion paths did
async fn put_copy(backend: &Arc<dyn SearchBackend>, id: &str, chat: i64, message: i64, ts: i64) {
    backend
        .put_document(
            id,
            &json!({
                "chatID": chat,
                "messageID": message,
                "senderType": "user",
                "senderID": 7,
                "senderName": "user7",
                "text": format!("copy {}", id),
                "timestamp": ts,
                "isDeleted": false
            }),
            RefreshPolicy::False,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_soft_delete_hides_but_keeps_document() {
    let service = create_test_service().await;
    let maintenance = maintenance_for(&service);
    service
        .upsert(&user_message(10, 1, 7, 100, "要删除的消息"))
        .await
        .unwrap();

    assert_eq!(maintenance.soft_delete(10, 1).await.unwrap(), "10-1");

    let hidden = service.search(&SearchRequest::new("删除")).await.unwrap();
    assert_eq!(hidden.total_hits, 0);
    assert_eq!(service.index_manager().total_documents().await.unwrap(), 1);

    let visible = service
        .search(&SearchRequest::new("删除").including_deleted())
        .await
        .unwrap();
    assert_eq!(visible.total_hits, 1);
    assert!(visible.hits[0].message.is_deleted);
    assert!(visible.hits[0].message.deleted_at.is_some());
}

#[tokio::test]
async fn test_upsert_after_soft_delete_restores_message() {
    let service = create_test_service().await;
    let maintenance = maintenance_for(&service);
    let message = user_message(10, 2, 7, 100, "恢复测试");

    service.upsert(&message).await.unwrap();
    maintenance.soft_delete(10, 2).await.unwrap();
    service.upsert(&message).await.unwrap();

    let page = service.search(&SearchRequest::new("恢复")).await.unwrap();
    assert_eq!(page.total_hits, 1);
    assert!(!page.hits[0].message.is_deleted);
}

#[tokio::test]
async fn test_soft_delete_unknown_message_is_not_found() {
    let service = create_test_service().await;
    let err = maintenance_for(&service).soft_delete(1, 404).await.unwrap_err();
    assert!(matches!(err, SearchError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_by_chat_and_user() {
    let service = create_test_service().await;
    let maintenance = maintenance_for(&service);
    service
        .batch_upsert(&[
            user_message(1, 1, 7, 100, "a"),
            user_message(1, 2, 8, 110, "b"),
            user_message(2, 1, 7, 120, "c"),
            user_message(3, 1, 9, 130, "d"),
        ])
        .await
        .unwrap();

    assert_eq!(maintenance.delete_by_chat(1).await.unwrap(), 2);
    // Already-deleted messages are not counted again
    assert_eq!(maintenance.delete_by_user(7).await.unwrap(), 1);

    let remaining = service.search(&SearchRequest::new("")).await.unwrap();
    assert_eq!(remaining.total_hits, 1);
    assert_eq!(remaining.hits[0].message.chat_id, 3);
    assert_eq!(service.index_manager().total_documents().await.unwrap(), 4);
}

#[tokio::test]
async fn test_clear_removes_everything() {
    let service = create_test_service().await;
    service
        .batch_upsert(&[user_message(1, 1, 7, 100, "a"), user_message(1, 2, 7, 200, "b")])
        .await
        .unwrap();

    assert_eq!(maintenance_for(&service).clear().await.unwrap(), 2);
    assert_eq!(service.index_manager().total_documents().await.unwrap(), 0);
}

#[tokio::test]
async fn test_dedup_keeps_latest_copy_per_message() {
    let service = create_test_service().await;
    let backend = service.backend().clone();

    put_copy(&backend, "legacy-a", 1, 1, 100).await;
    put_copy(&backend, "legacy-b", 1, 1, 300).await;
    put_copy(&backend, "legacy-c", 1, 1, 200).await;
    put_copy(&backend, "legacy-d", 1, 2, 150).await;
    put_copy(&backend, "legacy-e", 1, 2, 50).await;
    put_copy(&backend, "single", 2, 9, 10).await;

    let report = maintenance_for(&service).dedup().await.unwrap();
    assert_eq!(report.groups, 2);
    assert_eq!(report.duplicates_found, 3);
    assert_eq!(report.duplicates_removed, 3);
    assert!(report.errors.is_empty());

    let page = service.search(&SearchRequest::new("")).await.unwrap();
    let mut ids: Vec<String> = page.hits.into_iter().map(|h| h.message.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["legacy-b", "legacy-d", "single"]);

    let response = DedupResponse::from(report);
    assert!(response.success);
    assert_eq!(response.duplicates_removed, 3);
}

#[tokio::test]
async fn test_dedup_is_idempotent() {
    let service = create_test_service().await;
    let backend = service.backend().clone();
    put_copy(&backend, "x", 4, 4, 1).await;
    put_copy(&backend, "y", 4, 4, 2).await;

    let maintenance = maintenance_for(&service);
    assert_eq!(maintenance.dedup().await.unwrap().duplicates_removed, 1);

    let second = maintenance.dedup().await.unwrap();
    assert_eq!(second.duplicates_found, 0);
    assert_eq!(DedupResponse::from(second).message, "no duplicates found");
}

#[tokio::test]
async fn test_dedup_spans_many_pages() {
    let config = SearchConfigBuilder::new()
        .backend(BackendKind::InMemory)
        .dedup_page_size(2)
        .build();
    let service = SearchService::connect(config).await.unwrap();
    let backend = service.backend().clone();

    for message in 1..=7 {
        put_copy(&backend, &format!("{}-old", message), 5, message, 10).await;
        put_copy(&backend, &format!("{}-new", message), 5, message, 20).await;
    }

    let report = maintenance_for(&service).dedup().await.unwrap();
    assert_eq!(report.groups, 7);
    assert_eq!(report.duplicates_removed, 7);
    assert_eq!(service.index_manager().total_documents().await.unwrap(), 7);
}

#[tokio::test]
async fn test_sweep_resumes_from_cursor() {
    let service = SearchService::connect(test_config()).await.unwrap();
    let backend = service.backend().clone();
    for message in 1..=4 {
        put_copy(&backend, &format!("{}-a", message), 6, message, 1).await;
        put_copy(&backend, &format!("{}-b", message), 6, message, 2).await;
    }

    let mut sweep = DuplicateSweep::new(backend.clone(), 2, 10);
    let first = sweep.next_page().await.unwrap().unwrap();
    assert_eq!(first.len(), 2);
    let cursor = sweep.after_key().cloned().unwrap();

    // A fresh sweep picks up where the first one stopped
    let rest: Vec<Vec<DuplicateGroup>> = DuplicateSweep::new(backend, 2, 10)
        .resume_from(cursor)
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    let resumed: Vec<i64> = rest.iter().flatten().map(|g| g.message_id).collect();
    assert_eq!(resumed, vec![3, 4]);
}

#[tokio::test]
async fn test_dedup_removes_copies_beyond_top_hits() {
    let config = SearchConfigBuilder::new()
        .backend(BackendKind::InMemory)
        .dedup_top_hits(3)
        .build();
    let service = SearchService::connect(config).await.unwrap();
    let backend = service.backend().clone();
    for ts in 1..=6 {
        put_copy(&backend, &format!("copy-{}", ts), 1, 1, ts * 10).await;
    }

    let maintenance = maintenance_for(&service);
    let report = maintenance.dedup().await.unwrap();
    assert_eq!(report.duplicates_found, 5);
    assert_eq!(report.duplicates_removed, 5);
    assert!(report.errors.is_empty());
    assert_eq!(service.index_manager().total_documents().await.unwrap(), 1);

    let page = service.search(&SearchRequest::new("")).await.unwrap();
    assert_eq!(page.hits[0].message.id, "copy-6");

    let response = DedupResponse::from(report);
    assert_eq!(response.message, "removed 5 duplicates across 1 groups");

    // A second sweep over the settled index finds nothing
    assert_eq!(maintenance.dedup().await.unwrap().duplicates_found, 0);
}
