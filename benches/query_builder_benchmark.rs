//! Criterion benchmarks for request compilation and CJK tokenization
//!
//! These benchmarks measure:
//! - Search body construction per schema generation
//! - Bigram tokenization of mixed CJK/latin text
//! - In-memory evaluation of a compiled query

use chat_archive_search::models::{Message, SearchRequest, Sender};
use chat_archive_search::search::{
    bigram_tokens, create_in_memory_backend, QueryBuilder, SchemaGeneration, SearchConfigBuilder,
    BackendKind, SearchService,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn sample_request() -> SearchRequest {
    SearchRequest::new("周末一起去爬山")
        .in_chat(-1_001_234_567_890)
        .with_username("@hiker")
        .with_chat_type("supergroup")
        .blocking(vec![11, 12, 13])
        .with_page(3, 20)
}

/// Benchmark search body construction
fn bench_search_body(c: &mut Criterion) {
    let request = sample_request();
    let mut group = c.benchmark_group("search_body");

    for generation in [
        SchemaGeneration::Legacy,
        SchemaGeneration::Transitional,
        SchemaGeneration::Current,
    ] {
        let builder = QueryBuilder::new(generation, 10_000);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", generation)),
            &request,
            |b, request| b.iter(|| builder.search_body(black_box(request))),
        );
    }

    group.finish();
}

/// Benchmark bigram tokenization
fn bench_bigram_tokens(c: &mut Criterion) {
    let text = "今天的会议改到下午三点 meeting moved to 3pm，请大家准时参加！".repeat(8);
    let mut group = c.benchmark_group("bigram_tokens");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("mixed_text", |b| b.iter(|| bigram_tokens(black_box(&text))));
    group.finish();
}

/// Benchmark a search over a populated in-memory index
fn bench_in_memory_search(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = SearchConfigBuilder::new()
        .backend(BackendKind::InMemory)
        .build();
    let service = SearchService::new(create_in_memory_backend(&config.index), config);

    let messages: Vec<Message> = (1..=1_000)
        .map(|i| {
            Message::new(1, i, Sender::user(i % 50, "bench"), 1_700_000_000 + i)
                .with_text(format!("第{}条消息，周末一起去爬山吧", i))
        })
        .collect();
    runtime.block_on(async {
        for chunk in messages.chunks(250) {
            service.batch_upsert(chunk).await.unwrap();
        }
    });

    let request = SearchRequest::new("爬山").with_page(1, 20);
    c.bench_function("in_memory_search_1k", |b| {
        b.to_async(&runtime)
            .iter(|| async { service.search(black_box(&request)).await.unwrap() })
    });
}

criterion_group!(
    benches,
    bench_search_body,
    bench_bigram_tokens,
    bench_in_memory_search
);
criterion_main!(benches);
