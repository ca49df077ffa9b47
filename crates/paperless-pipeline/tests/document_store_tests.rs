//! Postgres integration tests for the document store and the result writer
//!
//! These tests require Docker. Run with:
//!
//! ```bash
//! cargo test -p paperless-pipeline --test document_store_tests -- --ignored --nocapture
//! ```

mod common;

use common::{init_test_tracing, within, TestPostgres, TestRabbitMq};
use paperless_common::{DocumentId, PipelineMessage, SummaryReadyMessage, RESULT_QUEUE};
use paperless_pipeline::broker::MessageBroker;
use paperless_pipeline::config::WorkerConfig;
use paperless_pipeline::db::{DocumentStore, PgDocumentStore};
use paperless_pipeline::worker::ResultWriter;
use paperless_pipeline::WorkerRunner;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_summary_only_touches_summary() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let store = PgDocumentStore::new(pg.pool().clone());

    let inserted = store.insert("sample.pdf", 2048).await.unwrap();
    assert_eq!(inserted.summary, "");
    let id = DocumentId::new(inserted.id).unwrap();

    assert!(store
        .update_summary(id, "A short greeting addressed to the world.")
        .await
        .unwrap());

    let stored = store.find(id).await.unwrap().unwrap();
    assert_eq!(stored.summary, "A short greeting addressed to the world.");
    assert_eq!(stored.file_name, "sample.pdf");
    assert_eq!(stored.byte_size, 2048);
    assert_eq!(stored.created_at, inserted.created_at);
    assert_eq!(stored.last_modified, inserted.last_modified);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_missing_document_inserts_nothing() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let store = PgDocumentStore::new(pg.pool().clone());

    let missing = DocumentId::new(4242).unwrap();
    assert!(!store.update_summary(missing, "A summary nobody needs.").await.unwrap());
    assert!(store.find(missing).await.unwrap().is_none());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_result_writer_over_rabbitmq() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let rabbit = TestRabbitMq::start().await.expect("Failed to start RabbitMQ");

    let store = Arc::new(PgDocumentStore::new(pg.pool().clone()));
    let document = store.insert("sample.pdf", 2048).await.unwrap();
    let id = DocumentId::new(document.id).unwrap();

    let broker = Arc::new(rabbit.connect().await.unwrap());
    let publisher = rabbit.connect().await.unwrap();
    publisher.declare_durable_queue(RESULT_QUEUE).await.unwrap();

    let ready = SummaryReadyMessage::new(id, "A short greeting addressed to the world.").unwrap();
    publisher
        .publish(RESULT_QUEUE, &ready.encode().unwrap())
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let runner = WorkerRunner::new(
        broker.clone(),
        ResultWriter::new(store.clone()),
        WorkerConfig::default(),
    );
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { runner.run(shutdown).await }
    });

    let mut written = false;
    for _ in 0..100 {
        let stored = store.find(id).await.unwrap().unwrap();
        if stored.summary == ready.summary {
            written = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(written, "summary was not written");

    // The delivery is acked right after the write; a cancel now still
    // lets it finish within the grace period.
    shutdown.cancel();
    let summary = within("runner to stop", task).await.unwrap().unwrap();
    assert_eq!(summary.acked, 1);

    broker.close().await.unwrap();
    publisher.close().await.unwrap();
}
