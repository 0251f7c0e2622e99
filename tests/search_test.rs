//! Ingestion and query behaviour against the in-memory index

mod common;

use chat_archive_search::models::*;
use chat_archive_search::search::*;
use common::{create_test_service, user_message};

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let service = create_test_service().await;

    let first = user_message(100, 1, 7, 1_700_000_000, "first draft");
    let second = user_message(100, 1, 7, 1_700_000_050, "edited text");

    assert_eq!(service.upsert(&first).await.unwrap(), "100-1");
    assert_eq!(service.upsert(&second).await.unwrap(), "100-1");

    assert_eq!(service.index_manager().total_documents().await.unwrap(), 1);

    let page = service.search(&SearchRequest::new("")).await.unwrap();
    assert_eq!(page.total_hits, 1);
    assert_eq!(page.hits[0].message.timestamp, 1_700_000_050);
}

#[tokio::test]
async fn test_search_returns_only_latest_text() {
    let service = create_test_service().await;

    service
        .upsert(&user_message(100, 2, 7, 1_700_000_000, "旧的内容"))
        .await
        .unwrap();
    service
        .upsert(&user_message(100, 2, 7, 1_700_000_000, "新的消息"))
        .await
        .unwrap();

    let stale = service.search(&SearchRequest::new("旧的")).await.unwrap();
    assert_eq!(stale.total_hits, 0);

    let fresh = service.search(&SearchRequest::new("新的")).await.unwrap();
    assert_eq!(fresh.total_hits, 1);
    assert_eq!(fresh.hits[0].message.text.as_deref(), Some("新的消息"));
}

#[tokio::test]
async fn test_fuzzy_and_exact_cjk_matching() {
    let service = create_test_service().await;
    service
        .upsert(&user_message(100, 1, 7, 1_700_000_000, "你好世界"))
        .await
        .unwrap();

    let fuzzy = service.search(&SearchRequest::new("你好")).await.unwrap();
    assert_eq!(fuzzy.total_hits, 1);
    assert_eq!(fuzzy.hits[0].message.id, "100-1");

    let partial_exact = service
        .search(&SearchRequest::new("你好").exact())
        .await
        .unwrap();
    assert_eq!(partial_exact.total_hits, 0);

    let whole_exact = service
        .search(&SearchRequest::new("你好世界").exact())
        .await
        .unwrap();
    assert_eq!(whole_exact.total_hits, 1);
}

#[tokio::test]
async fn test_exact_match_ignores_case() {
    let service = create_test_service().await;
    service
        .upsert(&user_message(5, 1, 7, 100, "Hello World"))
        .await
        .unwrap();

    let page = service
        .search(&SearchRequest::new("hello world").exact())
        .await
        .unwrap();
    assert_eq!(page.total_hits, 1);
}

#[tokio::test]
async fn test_caption_is_searchable() {
    let service = create_test_service().await;
    let photo = common::user_message(9, 1, 7, 100, "")
        .with_caption(ContentType::Photo, "夕阳下的海滩");
    service.upsert(&photo).await.unwrap();

    let page = service.search(&SearchRequest::new("海滩")).await.unwrap();
    assert_eq!(page.total_hits, 1);
    assert_eq!(page.hits[0].message.content_type, ContentType::Photo);
}

#[tokio::test]
async fn test_pagination_is_newest_first() {
    let service = create_test_service().await;
    let messages: Vec<Message> = (1..=25)
        .map(|i| user_message(1, i, 7, 1_000 + i, &format!("message number {}", i)))
        .collect();
    let response = service.batch_upsert(&messages).await.unwrap();
    assert_eq!(response.indexed_count, 25);

    let first = service
        .search(&SearchRequest::new("").with_page(1, 10))
        .await
        .unwrap();
    assert_eq!(first.total_hits, 25);
    assert_eq!(first.total_pages(), 3);
    let timestamps: Vec<i64> = first.hits.iter().map(|h| h.message.timestamp).collect();
    assert_eq!(timestamps, (1_016..=1_025).rev().collect::<Vec<_>>());

    let last = service
        .search(&SearchRequest::new("").with_page(3, 10))
        .await
        .unwrap();
    let timestamps: Vec<i64> = last.hits.iter().map(|h| h.message.timestamp).collect();
    assert_eq!(timestamps, (1_001..=1_005).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_equal_timestamps_break_ties_by_message_id() {
    let service = create_test_service().await;
    for message_id in [3, 1, 2] {
        service
            .upsert(&user_message(1, message_id, 7, 500, "same second"))
            .await
            .unwrap();
    }

    let page = service.search(&SearchRequest::new("")).await.unwrap();
    let ids: Vec<i64> = page.hits.iter().map(|h| h.message.message_id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_page_beyond_result_window_is_rejected() {
    let service = create_test_service().await;
    let err = service
        .search(&SearchRequest::new("").with_page(1_000, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_blocked_users_are_excluded() {
    let service = create_test_service().await;
    service
        .batch_upsert(&[
            user_message(1, 1, 7, 100, "天气很好"),
            user_message(1, 2, 8, 200, "天气不错"),
            user_message(1, 3, 9, 300, "天气晴朗"),
        ])
        .await
        .unwrap();

    let page = service
        .search(&SearchRequest::new("天气").blocking(vec![7, 9]))
        .await
        .unwrap();
    assert_eq!(page.total_hits, 1);
    assert_eq!(page.hits[0].message.sender_id(), 8);
}

#[tokio::test]
async fn test_filters_by_chat_username_and_type() {
    let service = create_test_service().await;

    let alice = Message::new(
        1,
        1,
        Sender::user(7, "Alice").with_username("Alice_W"),
        100,
    )
    .with_text("周末去爬山")
    .with_chat("Supergroup", Some("登山群".to_string()));
    let bob = Message::new(2, 1, Sender::user(8, "Bob").with_username("bob"), 200)
        .with_text("周末去游泳")
        .with_chat("group", None);
    service.batch_upsert(&[alice, bob]).await.unwrap();

    let by_username = service
        .search(&SearchRequest::new("周末").with_username("@alice_w"))
        .await
        .unwrap();
    assert_eq!(by_username.total_hits, 1);
    assert_eq!(by_username.hits[0].message.chat_id, 1);

    let by_chat = service
        .search(&SearchRequest::new("周末").in_chat(2))
        .await
        .unwrap();
    assert_eq!(by_chat.total_hits, 1);
    assert_eq!(by_chat.hits[0].message.sender_id(), 8);

    let by_type = service
        .search(&SearchRequest::new("").with_chat_type("SUPERGROUP"))
        .await
        .unwrap();
    assert_eq!(by_type.total_hits, 1);
    assert_eq!(by_type.hits[0].message.chat_type.as_deref(), Some("supergroup"));
}

#[tokio::test]
async fn test_time_window_is_inclusive() {
    let service = create_test_service().await;
    for (message_id, ts) in [(1, 100), (2, 200), (3, 300)] {
        service
            .upsert(&user_message(1, message_id, 7, ts, "消息"))
            .await
            .unwrap();
    }

    let mut request = SearchRequest::new("");
    request.from_timestamp = Some(200);
    request.to_timestamp = Some(300);
    let page = service.search(&request).await.unwrap();
    assert_eq!(page.total_hits, 2);

    request.from_timestamp = Some(400);
    let err = service.search(&request).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_batch_rejects_mismatched_id_before_writing() {
    let service = create_test_service().await;

    let good = user_message(1, 1, 7, 100, "ok");
    let mut bad = user_message(1, 2, 7, 100, "wrong id");
    bad.id = "1-99".to_string();

    let err = service.batch_upsert(&[good, bad]).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));
    assert_eq!(service.index_manager().total_documents().await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let service = create_test_service().await;
    let err = service.batch_upsert(&[]).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_legacy_generation_still_finds_mirrored_fields() {
    let config = SearchConfigBuilder::new()
        .backend(BackendKind::InMemory)
        .schema_generation(SchemaGeneration::Legacy)
        .build();
    let service = SearchService::connect(config).await.unwrap();

    let message = Message::new(3, 1, Sender::user(7, "Carol").with_username("carol"), 100)
        .with_text("旧版字段");
    service.upsert(&message).await.unwrap();

    let page = service
        .search(&SearchRequest::new("旧版").in_chat(3).with_username("carol"))
        .await
        .unwrap();
    assert_eq!(page.total_hits, 1);
    assert_eq!(page.hits[0].message.id, "3-1");
    assert_eq!(page.hits[0].message.sender.username(), Some("carol"));
}
