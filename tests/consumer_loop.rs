use payment_scoring::config::RetrySettings;
use payment_scoring::domain::parse::TransactionParser;
use payment_scoring::domain::transaction::{DecisionStatus, ReasonCode, ScoredTransaction};
use payment_scoring::model::artifacts::{ClassifierArtifact, LogisticModel, StandardScaler};
use payment_scoring::model::predictor::Predictor;
use payment_scoring::repo::memory_store::InMemoryStore;
use payment_scoring::scoring::types::DecisionPolicy;
use payment_scoring::service::consumer_loop::{ConsumerLoop, LoopState};
use payment_scoring::service::scoring_service::ScoringService;
use payment_scoring::stream::memory::{InMemoryDeadLetters, InMemorySource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn constant_predictor(p: f64) -> Arc<Predictor> {
    Arc::new(
        Predictor::new(
            StandardScaler {
                mean: vec![0.0; 3],
                scale: vec![1.0; 3],
            },
            ClassifierArtifact::Logistic(LogisticModel {
                coefficients: vec![0.0; 3],
                intercept: (p / (1.0 - p)).ln(),
            }),
        )
        .unwrap(),
    )
}

fn retry() -> RetrySettings {
    RetrySettings {
        attempts: 2,
        base_delay: Duration::from_millis(1),
    }
}

fn message(id: &str, customer: &str) -> String {
    format!(
        r#"{{"transaction_id":"{}","customer_id":"{}","amount":42.0,"feature_1":0.1,"feature_2":0.2,"feature_3":0.3}}"#,
        id, customer
    )
}

fn service(store: Arc<InMemoryStore>, batch_size: usize) -> ScoringService<InMemoryStore> {
    ScoringService::new(constant_predictor(0.5), store, DecisionPolicy::default(), batch_size, retry())
}

fn history(customer: &str, n: usize) -> Vec<ScoredTransaction> {
    let now = chrono::Utc::now();
    (0..n)
        .map(|i| ScoredTransaction {
            transaction_id: format!("hist-{}", i),
            customer_id: customer.to_string(),
            amount: 1.0,
            features: vec![0.0; 3],
            score: 0.1,
            prediction: 0,
            status: DecisionStatus::Approved,
            reason: ReasonCode::MlModel,
            created_at: now - chrono::Duration::seconds(5),
            processed_at: now,
        })
        .collect()
}

#[tokio::test]
async fn malformed_message_goes_to_dead_letter_verbatim() {
    let store = Arc::new(InMemoryStore::new());
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let raw = r#"{"transaction_id":"t1"}"#;
    let source = InMemorySource::from_payloads([raw]).cancel_when_drained(cancel.clone());
    let acks = source.ack_log();

    let mut consumer = ConsumerLoop::new(source, dlq.clone(), service(store.clone(), 20));
    let summary = consumer.run(cancel).await.unwrap();

    let entries = dlq.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, raw);
    assert_eq!(entries[0].reason, "VALIDATION_ERROR");
    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(summary.processed, 0);
    assert!(store.records().await.is_empty());
    assert_eq!(store.count_calls(), 0);
    assert_eq!(acks.lock().await.len(), 1);
}

#[tokio::test]
async fn bad_message_does_not_stop_the_pipeline() {
    let store = Arc::new(InMemoryStore::new());
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let source = InMemorySource::from_payloads([
        message("t1", "c1"),
        "not json at all".to_string(),
        message("t2", "c2"),
    ])
    .cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, dlq.clone(), service(store.clone(), 20));
    let summary = consumer.run(cancel).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(dlq.entries().await[0].payload, "not json at all");
    // flushed on shutdown even though the batch never filled
    assert_eq!(store.records().await.len(), 2);
    assert_eq!(consumer.state(), LoopState::Stopped);
}

#[tokio::test]
async fn flushes_once_per_full_batch_and_on_shutdown() {
    let store = Arc::new(InMemoryStore::new());
    let cancel = CancellationToken::new();
    let source = InMemorySource::from_payloads((0..7).map(|i| message(&format!("t{}", i), &format!("c{}", i))))
        .cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, InMemoryDeadLetters::new(), service(store.clone(), 3));
    let summary = consumer.run(cancel).await.unwrap();

    // two full batches plus the shutdown flush of the last record
    assert_eq!(store.insert_calls(), 3);
    assert_eq!(summary.inserted, 7);
    assert_eq!(store.records().await.len(), 7);
}

#[tokio::test]
async fn redelivered_transaction_is_stored_once() {
    let store = Arc::new(InMemoryStore::new());
    let cancel = CancellationToken::new();
    let source = InMemorySource::from_payloads([message("dup", "c1"), message("dup", "c1")])
        .cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, InMemoryDeadLetters::new(), service(store.clone(), 1));
    let summary = consumer.run(cancel).await.unwrap();

    let records = store.records().await;
    assert_eq!(records.iter().filter(|r| r.transaction_id == "dup").count(), 1);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.duplicates, 1);
}

#[tokio::test]
async fn velocity_rule_uses_flushed_history() {
    let store = Arc::new(InMemoryStore::new());
    store.seed(history("busy", 20)).await;
    let mut svc = service(store.clone(), 20);

    let busy = svc.process(&message("b1", "busy"), chrono::Utc::now()).await.unwrap();
    assert_eq!(busy.transaction_id, "b1");
    assert_eq!(busy.model_score, 0.5);
    assert!((busy.decision.final_score - 0.65).abs() < 1e-12);
    assert_eq!(busy.recent_count, 20);
    assert_eq!(busy.decision.reason, ReasonCode::VelocityRule);
    assert_eq!(busy.decision.status, DecisionStatus::Review);

    let quiet = svc.process(&message("q1", "quiet"), chrono::Utc::now()).await.unwrap();
    assert_eq!(quiet.decision.reason, ReasonCode::MlModel);
    assert_eq!(quiet.decision.status, DecisionStatus::Approved);
}

#[tokio::test]
async fn buffered_records_are_not_counted_by_velocity() {
    let store = Arc::new(InMemoryStore::new());
    let mut svc = service(store.clone(), 100);
    for i in 0..15 {
        svc.process(&message(&format!("t{}", i), "c1"), chrono::Utc::now())
            .await
            .unwrap();
    }
    let last = svc.process(&message("t15", "c1"), chrono::Utc::now()).await.unwrap();
    assert_eq!(last.recent_count, 0);
    assert!(last.latency_ms >= 0);
    assert_eq!(svc.buffered(), 16);
}

#[tokio::test]
async fn shape_mismatch_is_dead_lettered() {
    let store = Arc::new(InMemoryStore::new());
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let raw = r#"{"transaction_id":"t1","customer_id":"c1","amount":1,"feature_1":0.1,"feature_2":0.2}"#;
    let source = InMemorySource::from_payloads([raw]).cancel_when_drained(cancel.clone());

    let svc = service(store.clone(), 20).with_parser(TransactionParser::new(2));
    let mut consumer = ConsumerLoop::new(source, dlq.clone(), svc);
    consumer.run(cancel).await.unwrap();

    let entries = dlq.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, "FEATURE_SHAPE_ERROR");
    assert!(store.records().await.is_empty());
}

#[tokio::test]
async fn unavailable_store_routes_message_to_dead_letter() {
    let store = Arc::new(InMemoryStore::new());
    store.set_unavailable(true);
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let source = InMemorySource::from_payloads([message("t1", "c1")]).cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, dlq.clone(), service(store.clone(), 20));
    let summary = consumer.run(cancel).await.unwrap();

    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(dlq.entries().await[0].reason, "STORE_UNAVAILABLE");
    // velocity query attempted once per configured retry
    assert_eq!(store.count_calls(), 2);
}

#[tokio::test]
async fn failed_dead_letter_leaves_message_unacknowledged() {
    let dlq = InMemoryDeadLetters::new();
    dlq.set_failing(true);
    let cancel = CancellationToken::new();
    let source = InMemorySource::from_payloads(["{}"]).cancel_when_drained(cancel.clone());
    let acks = source.ack_log();

    let mut consumer = ConsumerLoop::new(source, dlq, service(Arc::new(InMemoryStore::new()), 20));
    let summary = consumer.run(cancel).await.unwrap();

    assert_eq!(summary.dead_letter_failures, 1);
    assert_eq!(summary.dead_lettered, 0);
    assert!(acks.lock().await.is_empty());
}

#[tokio::test]
async fn transport_error_is_fatal_but_flushes_first() {
    let store = Arc::new(InMemoryStore::new());
    let mut source = InMemorySource::new();
    source.push(message("t1", "c1"));
    source.push_transport_error("connection reset");
    source.push(message("t2", "c1"));

    let mut consumer = ConsumerLoop::new(source, InMemoryDeadLetters::new(), service(store.clone(), 20));
    let result = consumer.run(CancellationToken::new()).await;

    assert!(result.is_err());
    assert_eq!(consumer.state(), LoopState::Stopped);
    let ids: Vec<String> = store.records().await.into_iter().map(|r| r.transaction_id).collect();
    assert_eq!(ids, vec!["t1".to_string()]);
}

#[tokio::test]
async fn cancellation_before_any_message_stops_cleanly() {
    let store = Arc::new(InMemoryStore::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let source = InMemorySource::from_payloads([message("t1", "c1")]);

    let mut consumer = ConsumerLoop::new(source, InMemoryDeadLetters::new(), service(store.clone(), 20));
    let summary = consumer.run(cancel).await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(store.insert_calls(), 0);
    assert_eq!(consumer.state(), LoopState::Stopped);
}

#[tokio::test]
async fn oversized_id_is_dead_lettered_and_later_messages_are_stored() {
    let store = Arc::new(InMemoryStore::new());
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let long_id = "x".repeat(101);
    let payloads = std::iter::once(message(&long_id, "c0"))
        .chain((0..10).map(|i| message(&format!("v{}", i), &format!("c{}", i))));
    let source = InMemorySource::from_payloads(payloads).cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, dlq.clone(), service(store.clone(), 2));
    let summary = consumer.run(cancel).await.unwrap();

    assert_eq!(summary.processed, 10);
    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(dlq.entries().await[0].reason, "VALIDATION_ERROR");
    assert_eq!(summary.inserted, 10);
    assert_eq!(store.records().await.len(), 10);
}

#[tokio::test]
async fn record_refused_by_the_store_does_not_block_the_pipeline() {
    let store = Arc::new(InMemoryStore::new());
    store.refuse("bad").await;
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let payloads = std::iter::once(message("bad", "c0"))
        .chain((0..10).map(|i| message(&format!("v{}", i), &format!("c{}", i))));
    let source = InMemorySource::from_payloads(payloads).cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, dlq.clone(), service(store.clone(), 2));
    let summary = consumer.run(cancel).await.unwrap();

    // "bad" was buffered by an earlier save, so it is dropped rather than dead-lettered
    assert_eq!(summary.processed, 11);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.inserted, 10);
    assert!(dlq.entries().await.is_empty());
    let records = store.records().await;
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.transaction_id != "bad"));
}

#[tokio::test]
async fn refused_record_that_fills_the_batch_is_dead_lettered() {
    let store = Arc::new(InMemoryStore::new());
    store.refuse("bad").await;
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let bad = message("bad", "c1");
    let source =
        InMemorySource::from_payloads([message("t1", "c1"), bad.clone()]).cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, dlq.clone(), service(store.clone(), 2));
    let summary = consumer.run(cancel).await.unwrap();

    let entries = dlq.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, bad);
    assert_eq!(entries[0].reason, "STORE_ERROR");
    assert_eq!(summary.processed, 1);
    let ids: Vec<String> = store.records().await.into_iter().map(|r| r.transaction_id).collect();
    assert_eq!(ids, vec!["t1".to_string()]);
}

#[tokio::test]
async fn dead_lettered_transactions_are_never_persisted_after_a_write_outage() {
    let store = Arc::new(InMemoryStore::new());
    store.set_inserts_unavailable(true);
    let mut svc = service(store.clone(), 2);

    let mut failed = Vec::new();
    for i in 0..50 {
        let id = format!("t{}", i);
        if svc.process(&message(&id, "c1"), chrono::Utc::now()).await.is_err() {
            failed.push(id);
        }
        assert!(svc.buffered() < 2);
    }
    assert_eq!(failed.len(), 49);

    store.set_inserts_unavailable(false);
    svc.flush().await.unwrap();

    let stored: Vec<String> = store.records().await.into_iter().map(|r| r.transaction_id).collect();
    assert_eq!(stored, vec!["t0".to_string()]);
    assert!(failed.iter().all(|id| !stored.contains(id)));
}

#[tokio::test]
async fn write_outage_dead_letters_each_message_that_fills_the_batch() {
    let store = Arc::new(InMemoryStore::new());
    store.set_inserts_unavailable(true);
    let dlq = InMemoryDeadLetters::new();
    let cancel = CancellationToken::new();
    let source = InMemorySource::from_payloads((0..5).map(|i| message(&format!("t{}", i), "c1")))
        .cancel_when_drained(cancel.clone());

    let mut consumer = ConsumerLoop::new(source, dlq.clone(), service(store.clone(), 2));
    let summary = consumer.run(cancel).await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.dead_lettered, 4);
    assert!(dlq.entries().await.iter().all(|e| e.reason == "STORE_UNAVAILABLE"));
    assert!(store.records().await.is_empty());
    assert_eq!(consumer.state(), LoopState::Stopped);
}
