//! Shared helpers for the pipeline integration tests
//!
//! Two kinds of helpers live here:
//!
//! - in-process fakes for the OCR engine and the summarization service, used
//!   with the in-memory broker, blob store and document store
//! - testcontainers wrappers for Postgres, MinIO and RabbitMQ, used by the
//!   `#[ignore = "requires Docker"]` tests
#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use paperless_pipeline::broker::{AmqpBroker, BrokerConfig};
use paperless_pipeline::extract::{ExtractionError, SourceFormat, TextExtractor};
use paperless_pipeline::storage::{Storage, StorageConfig};
use paperless_pipeline::summarize::{Summarizer, SummarizerError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::rabbitmq::RabbitMq;
use tracing::{debug, info};

pub const TEST_BUCKET: &str = "paperless-test";

pub const MINIO_ACCESS_KEY: &str = "minioadmin";
pub const MINIO_SECRET_KEY: &str = "minioadmin";

/// Initialize tracing for tests. Safe to call from every test.
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,paperless_pipeline=debug,lapin=warn,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Poll `condition` every 10ms until it holds, failing the test after 5s.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Await `future` with a 5s cap.
pub async fn within<T>(what: &str, future: impl Future<Output = T>) -> T {
    match tokio::time::timeout(Duration::from_secs(5), future).await {
        Ok(value) => value,
        Err(_) => panic!("timed out waiting for {}", what),
    }
}

// ============================================================================
// Fakes
// ============================================================================

/// OCR stand-in that answers with fixed text per staged file name.
#[derive(Default)]
pub struct StaticExtractor {
    texts: HashMap<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, file_name: &str, text: &str) -> Self {
        self.texts.insert(file_name.to_string(), text.to_string());
        self
    }

    /// Make every extraction take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for StaticExtractor {
    async fn extract(
        &self,
        source: &Path,
        _format: SourceFormat,
        _work_dir: &Path,
    ) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.texts
            .get(name)
            .cloned()
            .ok_or_else(|| ExtractionError::Ocr(format!("no text configured for {}", name)))
    }
}

/// Summarization stand-in with canned replies keyed by input text.
#[derive(Default)]
pub struct CannedSummarizer {
    replies: HashMap<String, String>,
    calls: AtomicUsize,
}

impl CannedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, text: &str, summary: &str) -> Self {
        self.replies.insert(text.to_string(), summary.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for CannedSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies.get(text).cloned().ok_or(SummarizerError::Status {
            status: 503,
            body: "model overloaded".to_string(),
        })
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the pipeline's migrations applied.
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

// ============================================================================
// MinIO Test Container
// ============================================================================

/// MinIO container with [`TEST_BUCKET`] created.
pub struct TestMinio {
    container: ContainerAsync<GenericImage>,
    storage: Storage,
    client: S3Client,
    endpoint: String,
}

impl TestMinio {
    pub async fn start() -> Result<Self> {
        info!("Starting MinIO test container...");

        let container = GenericImage::new("minio/minio", "latest")
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("MinIO Object Storage Server"))
            .with_env_var("MINIO_ROOT_USER", MINIO_ACCESS_KEY)
            .with_env_var("MINIO_ROOT_PASSWORD", MINIO_SECRET_KEY)
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .context("Failed to start MinIO container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .context("Failed to get container port")?;

        // host:port without scheme, the way MINIO_ENDPOINT is usually set
        let endpoint = format!("{}:{}", host, port);
        debug!("MinIO endpoint: {}", endpoint);

        let storage = Storage::new(StorageConfig::for_minio(endpoint.clone(), TEST_BUCKET));
        storage
            .ensure_bucket()
            .await
            .context("Failed to create test bucket")?;

        // Independent client, standing in for the upload endpoint
        let s3_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(format!("http://{}", endpoint))
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(aws_credential_types::Credentials::new(
                MINIO_ACCESS_KEY,
                MINIO_SECRET_KEY,
                None,
                None,
                "static",
            ))
            .load()
            .await;
        let client = S3Client::from_conf(
            aws_sdk_s3::config::Builder::from(&s3_config)
                .force_path_style(true)
                .build(),
        );

        Ok(Self {
            container,
            storage,
            client,
            endpoint,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn s3_client(&self) -> &S3Client {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// ============================================================================
// RabbitMQ Test Container
// ============================================================================

/// RabbitMQ container using the image's default guest account.
pub struct TestRabbitMq {
    container: ContainerAsync<RabbitMq>,
    config: BrokerConfig,
}

impl TestRabbitMq {
    pub async fn start() -> Result<Self> {
        info!("Starting RabbitMQ test container...");

        let container = RabbitMq::default()
            .start()
            .await
            .context("Failed to start RabbitMQ container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5672.tcp())
            .await
            .context("Failed to get container port")?;

        let mut config = BrokerConfig::new(host.to_string(), "guest", "guest")
            .with_connection_name("paperless-test");
        config.port = port;

        Ok(Self { container, config })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Open a new connection with its own channel.
    pub async fn connect(&self) -> Result<AmqpBroker> {
        AmqpBroker::connect(&self.config)
            .await
            .context("Failed to connect to RabbitMQ")
    }
}
