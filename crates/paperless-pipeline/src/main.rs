//! Paperless Pipeline - worker entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paperless_common::logging::{init_logging, LogConfig};
use paperless_common::DocumentId;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use paperless_pipeline::{
    broker::{AmqpBroker, BrokerConfig, MessageBroker},
    config::{load_dotenv, WorkerConfig},
    db::{self, DbConfig, PgDocumentStore},
    extract::{OcrConfig, TesseractExtractor},
    intake,
    storage::{Storage, StorageConfig},
    summarize::{GeminiConfig, GeminiSummarizer},
    worker::{ExtractionWorker, ResultWriter, SummarizationWorker},
    StageHandler, WorkerRunner,
};

/// Paperless document pipeline workers
#[derive(Parser, Debug)]
#[command(name = "paperless-pipeline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the OCR worker (ocr_queue -> genai_queue)
    Ocr,

    /// Run the summarization worker (genai_queue -> result_queue)
    Genai,

    /// Run the result writer (result_queue -> documents)
    Result,

    /// Publish a document to ocr_queue
    Enqueue {
        /// Document id
        #[arg(long)]
        id: i32,

        /// Blob key of the stored document
        #[arg(long)]
        filename: String,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Ocr => "ocr",
            Command::Genai => "genai",
            Command::Result => "result",
            Command::Enqueue { .. } => "enqueue",
        }
    }
}

#[tokio::main]
async fn main() {
    load_dotenv();
    let cli = Cli::parse();

    let log_config = match stage_log_config(cli.command.name()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid logging configuration: {:#}", e);
            process::exit(1);
        },
    };

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            None
        },
    };

    let stage = cli.command.name();
    let result = execute(cli.command).await;

    if let Err(e) = result {
        error!(stage, error = %format!("{:#}", e), "Worker failed");
        drop(guard);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Stage defaults overlaid with `LOG_*` from the environment.
fn stage_log_config(stage: &str) -> Result<LogConfig> {
    LogConfig::builder()
        .log_file_prefix(format!("paperless-{}", stage))
        .filter_directives("lapin=warn,sqlx=warn,aws_smithy_runtime=warn,hyper_util=warn")
        .build()
        .merge_env()
}

async fn execute(command: Command) -> Result<()> {
    match command {
        Command::Ocr => {
            let broker_config = BrokerConfig::from_env()?.with_connection_name("paperless-ocr");
            let storage_config = StorageConfig::from_env()?;
            let ocr_config = OcrConfig::from_env()?;
            let worker_config = WorkerConfig::from_env()?;

            if let Some(dir) = &ocr_config.staging_dir {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create staging dir {}", dir.display()))?;
            }

            let broker = Arc::new(AmqpBroker::connect(&broker_config).await?);
            let storage = Arc::new(Storage::new(storage_config));
            let extractor = Arc::new(TesseractExtractor::new(ocr_config.clone()));

            let mut handler = ExtractionWorker::new(storage, extractor, broker.clone());
            if let Some(dir) = ocr_config.staging_dir {
                handler = handler.with_staging_root(dir);
            }

            serve(broker, handler, worker_config).await
        },

        Command::Genai => {
            let broker_config = BrokerConfig::from_env()?.with_connection_name("paperless-genai");
            let gemini_config = GeminiConfig::from_env()?;
            let worker_config = WorkerConfig::from_env()?;

            let summarizer = Arc::new(GeminiSummarizer::new(gemini_config)?);
            let broker = Arc::new(AmqpBroker::connect(&broker_config).await?);

            let handler = SummarizationWorker::new(summarizer, broker.clone());
            serve(broker, handler, worker_config).await
        },

        Command::Result => {
            let broker_config = BrokerConfig::from_env()?.with_connection_name("paperless-result");
            let db_config = DbConfig::from_env()?;
            let worker_config = WorkerConfig::from_env()?;

            let pool = db::create_pool(&db_config)
                .await
                .context("Failed to connect to database")?;
            if db_config.run_migrations {
                db::run_migrations(&pool).await?;
            }

            let broker = Arc::new(AmqpBroker::connect(&broker_config).await?);
            let handler = ResultWriter::new(Arc::new(PgDocumentStore::new(pool.clone())));

            let result = serve(broker, handler, worker_config).await;
            pool.close().await;
            result
        },

        Command::Enqueue { id, filename } => {
            let broker_config = BrokerConfig::from_env()?.with_connection_name("paperless-intake");
            let id = DocumentId::new(id)?;

            let broker = AmqpBroker::connect(&broker_config).await?;
            let result = intake::enqueue_document(&broker, id, &filename).await;
            close_broker(&broker).await;

            result?;
            Ok(())
        },
    }
}

/// Run one stage until a shutdown signal, then close the broker.
async fn serve<H: StageHandler>(
    broker: Arc<AmqpBroker>,
    handler: H,
    config: WorkerConfig,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signal_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let runner = WorkerRunner::new(broker.clone(), handler, config);
    let worker_id = runner.worker_id();
    let result = runner.run(shutdown).await;

    signal_task.abort();
    close_broker(broker.as_ref()).await;

    let summary = result.context("Consume loop failed")?;
    info!(
        %worker_id,
        acked = summary.acked,
        discarded = summary.discarded,
        requeued = summary.requeued,
        abandoned = summary.abandoned,
        "Worker shut down gracefully"
    );

    Ok(())
}

async fn close_broker(broker: &dyn MessageBroker) {
    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close broker connection");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
