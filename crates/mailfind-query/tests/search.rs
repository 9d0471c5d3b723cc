//! End-to-end scenarios: ingest records into a file-backed store, then
//! query them in every mode.

use std::sync::Arc;

use mailfind_core::{Error, MailStore, RawMessage};
use mailfind_fts::{SearchConfig, SnippetKind};
use mailfind_query::{
    FusionStrategy, HybridConfig, IngestOptions, Indexer, QueryEngine, SearchMode,
};
use mailfind_vector::{EmbeddingConfig, EmbeddingProvider, HashEmbeddingProvider};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: MailStore,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = MailStore::create(dir.path().join("mailfind.redb")).unwrap();
    Fixture { _dir: dir, store }
}

fn hash(dimension: usize) -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashEmbeddingProvider::new(dimension).unwrap())
}

fn indexer(store: &MailStore, provider: Arc<dyn EmbeddingProvider>) -> Indexer {
    Indexer::new(
        store.clone(),
        SearchConfig::default(),
        &EmbeddingConfig::default(),
    )
    .with_provider(Some(provider))
}

fn engine(store: &MailStore, provider: Arc<dyn EmbeddingProvider>) -> QueryEngine {
    QueryEngine::new(store.clone(), SearchConfig::default()).with_provider(Some(provider))
}

fn invoice_records() -> Vec<RawMessage> {
    vec![
        RawMessage::new("m1", "Invoice March", "please find attached the invoice")
            .with_sender("billing@example.com")
            .with_date("Fri, 1 Mar 2024 09:00:00 +0000"),
        RawMessage::new("m2", "Meeting notes", "notes from the march planning meeting")
            .with_sender("alice@example.com")
            .with_date("2024-03-04T10:30:00Z"),
    ]
}

fn ids(results: &[mailfind_query::QueryResult]) -> Vec<&str> {
    results.iter().map(|r| r.message_id.as_str()).collect()
}

#[tokio::test]
async fn invoice_and_march_scenario() {
    let fx = fixture();
    let provider = hash(256);
    let report = indexer(&fx.store, provider.clone())
        .ingest(invoice_records(), IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.indexed, 2);

    let engine = engine(&fx.store, provider);

    let invoice = engine.search("invoice", SearchMode::Lexical, 10).await.unwrap();
    assert_eq!(ids(&invoice), vec!["m1"]);
    assert_eq!(invoice[0].snippet.kind, SnippetKind::Match);

    let march = engine.search("march", SearchMode::Lexical, 10).await.unwrap();
    let mut found = ids(&march);
    found.sort();
    assert_eq!(found, vec!["m1", "m2"]);
    assert!(march[0].fused_score >= march[1].fused_score);

    let hybrid = engine.search("invoice", SearchMode::Hybrid, 10).await.unwrap();
    assert_eq!(hybrid[0].message_id, "m1");
}

#[tokio::test]
async fn get_round_trips_normalized_fields() {
    let fx = fixture();
    let record = RawMessage::new(
        "  <abc@example.com>  ",
        "Quarterly\r\n   report",
        "Line one  \r\nLine two\r\n\r\n",
    )
    .with_date("not a date");

    indexer(&fx.store, hash(64))
        .ingest(vec![record], IngestOptions::default())
        .await
        .unwrap();

    let engine = engine(&fx.store, hash(64));
    let message = engine.show("<abc@example.com>").unwrap();
    assert_eq!(message.subject, "Quarterly report");
    assert_eq!(message.body, "Line one\nLine two");
    assert_eq!(message.date, None);
}

#[tokio::test]
async fn reindexing_never_duplicates() {
    let fx = fixture();
    let provider = hash(128);
    let indexer = indexer(&fx.store, provider.clone());

    indexer
        .ingest(
            vec![RawMessage::new("m1", "Budget", "budget figures for review")],
            IngestOptions::default(),
        )
        .await
        .unwrap();
    let report = indexer
        .ingest(
            vec![RawMessage::new("m1", "Holiday", "holiday schedule for review")],
            IngestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(report.updated, 1);

    let engine = engine(&fx.store, provider);
    assert_eq!(engine.messages().count().unwrap(), 1);
    assert!(
        engine
            .search("budget", SearchMode::Lexical, 10)
            .await
            .unwrap()
            .is_empty()
    );

    let review = engine.search("review", SearchMode::Hybrid, 10).await.unwrap();
    assert_eq!(ids(&review), vec!["m1"]);

    let backends = engine.vectors().backends().unwrap();
    assert_eq!(backends.len(), 1);
    assert_eq!(backends[0].count, 1);
}

#[tokio::test]
async fn record_without_id_is_skipped() {
    let fx = fixture();
    let mut records = invoice_records();
    records.insert(
        1,
        RawMessage {
            subject: Some("Orphan".into()),
            body: Some("no identifier here".into()),
            ..RawMessage::default()
        },
    );

    let report = indexer(&fx.store, hash(64))
        .ingest(records, IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.indexed, 2);
    assert_eq!(report.skip_reasons[0].position, 1);
}

#[tokio::test]
async fn different_backend_dimension_is_a_mismatch() {
    let fx = fixture();
    indexer(&fx.store, hash(64))
        .ingest(invoice_records(), IngestOptions::default())
        .await
        .unwrap();

    let engine = engine(&fx.store, hash(128));
    let err = engine
        .search("invoice", SearchMode::Semantic, 10)
        .await
        .unwrap_err();
    match err {
        Error::BackendMismatch { expected, found } => {
            assert_eq!(expected, "hash:128");
            assert!(found.contains("hash:64"));
        }
        other => panic!("expected BackendMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn hybrid_without_backend_degrades_to_lexical() {
    let fx = fixture();
    indexer(&fx.store, hash(64))
        .ingest(invoice_records(), IngestOptions::default())
        .await
        .unwrap();

    let engine = QueryEngine::new(fx.store.clone(), SearchConfig::default());
    let results = engine.search("invoice", SearchMode::Hybrid, 10).await.unwrap();
    assert_eq!(ids(&results), vec!["m1"]);
    assert_eq!(results[0].semantic_score, None);
}

#[tokio::test]
async fn semantic_only_matches_participate_in_hybrid() {
    let fx = fixture();
    let provider = hash(256);
    let records = vec![
        RawMessage::new("m1", "Budget review", "quarterly budget review meeting"),
        RawMessage::new("m2", "Lunch", "team lunch on friday"),
    ];
    indexer(&fx.store, provider.clone())
        .ingest(records, IngestOptions::default())
        .await
        .unwrap();

    // m2 shares no terms with the query; it can only arrive through the
    // semantic family.
    let engine = engine(&fx.store, provider).with_hybrid(HybridConfig {
        strategy: FusionStrategy::ReciprocalRank { k: 60 },
        ..HybridConfig::default()
    });
    let results = engine.search("budget", SearchMode::Hybrid, 10).await.unwrap();
    assert_eq!(results[0].message_id, "m1");
    assert!(results[0].lexical_score.is_some());
    assert!(results[0].semantic_score.is_some());
    for result in &results[1..] {
        assert_eq!(result.lexical_score, None);
        assert_eq!(result.snippet.kind, SnippetKind::Preview);
    }
}

#[tokio::test]
async fn store_reopens_with_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mailfind.redb");
    {
        let store = MailStore::create(&path).unwrap();
        indexer(&store, hash(64))
            .ingest(invoice_records(), IngestOptions::default())
            .await
            .unwrap();
    }

    let store = MailStore::open(&path).unwrap();
    let engine = engine(&store, hash(64));
    let results = engine.search("meeting", SearchMode::Semantic, 1).await.unwrap();
    assert_eq!(ids(&results), vec!["m2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queries_during_ingest_see_committed_messages() {
    let fx = fixture();
    let provider = hash(64);
    let indexer = Indexer::new(
        fx.store.clone(),
        SearchConfig::default(),
        &EmbeddingConfig {
            batch_size: 2,
            ..EmbeddingConfig::default()
        },
    )
    .with_provider(Some(provider.clone()));

    let records: Vec<RawMessage> = (0..40)
        .map(|i| {
            RawMessage::new(
                format!("m{i}"),
                format!("Budget review {i}"),
                format!("budget figures for quarter {i}"),
            )
        })
        .collect();
    let ingest = tokio::spawn(async move { indexer.ingest(records, IngestOptions::default()).await });

    let engine = engine(&fx.store, provider.clone());
    let mut rounds = 0;
    loop {
        let finished = ingest.is_finished();
        for mode in [SearchMode::Lexical, SearchMode::Semantic, SearchMode::Hybrid] {
            let results = engine.clone().search("budget", mode, 50).await.unwrap();
            for result in &results {
                let message = engine.show(&result.message_id).unwrap();
                assert_eq!(message.message_id, result.message_id);
                assert!(
                    engine
                        .vectors()
                        .get(&result.message_id, provider.name())
                        .unwrap()
                        .is_some(),
                    "{} has no vector in {mode:?} results",
                    result.message_id
                );
            }
        }
        rounds += 1;
        if finished {
            break;
        }
        tokio::task::yield_now().await;
    }

    let report = ingest.await.unwrap().unwrap();
    assert_eq!(report.indexed, 40);
    assert!(rounds >= 1);

    let all = engine.search("budget", SearchMode::Lexical, 50).await.unwrap();
    assert_eq!(all.len(), 40);
}
