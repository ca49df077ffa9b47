//! Consume loop shared by the three pipeline stages
//!
//! A [`WorkerRunner`] pulls deliveries from its stage's input queue one at a
//! time, hands the parsed message to a [`StageHandler`] and settles the
//! delivery according to the outcome:
//!
//! - success: the handler has already published its follow-on message, so
//!   the delivery is acked
//! - malformed, not found, or a processing failure: nack, without requeue
//!   unless the retry policy allows one more attempt
//!
//! On shutdown the runner stops taking deliveries. An in-flight message gets
//! the configured grace period to finish; after that it is abandoned unacked
//! and the broker hands it to another consumer.

use async_trait::async_trait;
use futures::StreamExt;
use paperless_common::PipelineMessage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::broker::{BrokerError, Delivery, MessageBroker};
use crate::config::WorkerConfig;
use crate::error::{settle, ProcessingFailure, Settlement, StageError};

pub mod genai;
pub mod ocr;
pub mod result;

pub use genai::SummarizationWorker;
pub use ocr::ExtractionWorker;
pub use result::ResultWriter;

/// One pipeline stage's unit of work.
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    /// Message consumed from the stage's input queue.
    type Input: PipelineMessage + Send + 'static;

    /// Name used in logs, e.g. "ocr".
    const STAGE: &'static str;

    /// Queue this stage publishes to, if any. Declared before consuming.
    fn output_queue(&self) -> Option<&'static str>;

    /// Process one validated message. Returning `Ok` means every side effect,
    /// including the follow-on publish, has completed.
    async fn process(&self, message: Self::Input) -> Result<(), StageError>;
}

/// Publish a follow-on message. Encoding and broker failures are
/// processing failures of the current delivery.
pub async fn publish_message<M>(broker: &dyn MessageBroker, message: &M) -> Result<(), ProcessingFailure>
where
    M: PipelineMessage + Sync,
{
    let body = message.encode()?;
    broker.publish(M::QUEUE, &body).await?;
    Ok(())
}

/// Counters for one run of the consume loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub acked: u64,
    pub discarded: u64,
    pub requeued: u64,
    /// Deliveries left unacked because the grace period ran out.
    pub abandoned: u64,
}

pub struct WorkerRunner<H: StageHandler> {
    worker_id: Uuid,
    broker: Arc<dyn MessageBroker>,
    handler: H,
    config: WorkerConfig,
}

impl<H: StageHandler> WorkerRunner<H> {
    pub fn new(broker: Arc<dyn MessageBroker>, handler: H, config: WorkerConfig) -> Self {
        Self {
            worker_id: Uuid::new_v4(),
            broker,
            handler,
            config,
        }
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    /// Declare queues and consume until `shutdown` is cancelled or the
    /// delivery stream ends.
    ///
    /// Broker errors while consuming or settling are returned: the channel
    /// is unusable at that point and the process should exit. The caller
    /// owns closing the broker.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunSummary, BrokerError> {
        let queue = H::Input::QUEUE;

        self.broker.declare_durable_queue(queue).await?;
        if let Some(output) = self.handler.output_queue() {
            self.broker.declare_durable_queue(output).await?;
        }

        let mut deliveries = self.broker.consume(queue, self.config.prefetch).await?;
        let mut summary = RunSummary::default();

        info!(
            worker_id = %self.worker_id,
            stage = H::STAGE,
            queue,
            "Worker started"
        );

        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(stage = H::STAGE, "Shutdown requested, no longer taking deliveries");
                    break;
                },
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => return Err(e),
                    None => {
                        warn!(stage = H::STAGE, "Delivery stream ended");
                        break;
                    },
                },
            };

            let span = info_span!(
                "delivery",
                stage = H::STAGE,
                delivery_tag = delivery.tag,
                redelivered = delivery.redelivered
            );

            let finished = self
                .handle_delivery(delivery, &shutdown, &mut summary)
                .instrument(span)
                .await?;

            if !finished {
                break;
            }
        }

        info!(
            stage = H::STAGE,
            acked = summary.acked,
            discarded = summary.discarded,
            requeued = summary.requeued,
            abandoned = summary.abandoned,
            "Worker stopped"
        );

        Ok(summary)
    }

    /// Returns `false` when the delivery was abandoned on shutdown.
    async fn handle_delivery(
        &self,
        delivery: Delivery,
        shutdown: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<bool, BrokerError> {
        let work = self.process_body(&delivery.body);
        tokio::pin!(work);

        let outcome = tokio::select! {
            outcome = &mut work => outcome,
            _ = shutdown.cancelled() => {
                info!(
                    grace_secs = self.config.shutdown_timeout.as_secs(),
                    "Shutdown requested, waiting for in-flight message"
                );
                match tokio::time::timeout(self.config.shutdown_timeout, &mut work).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("Grace period elapsed, abandoning in-flight message unacked");
                        summary.abandoned += 1;
                        return Ok(false);
                    },
                }
            },
        };

        log_outcome(&outcome);

        match settle(&outcome, self.config.retry_policy, delivery.redelivered) {
            Settlement::Ack => {
                self.broker.ack(delivery.tag).await?;
                summary.acked += 1;
            },
            Settlement::Discard => {
                self.broker.nack(delivery.tag, false).await?;
                summary.discarded += 1;
            },
            Settlement::Requeue => {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_delay) => {},
                    _ = shutdown.cancelled() => {},
                }
                self.broker.nack(delivery.tag, true).await?;
                summary.requeued += 1;
                info!("Requeued for one more attempt");
            },
        }

        Ok(true)
    }

    async fn process_body(&self, body: &[u8]) -> Result<(), StageError> {
        let message = H::Input::parse(body)?;
        let document_id = message.document_id();
        self.handler
            .process(message)
            .instrument(info_span!("document", document_id = %document_id))
            .await
    }
}

fn log_outcome(outcome: &Result<(), StageError>) {
    match outcome {
        Ok(()) => info!("Message processed"),
        Err(StageError::Malformed(reason)) => {
            error!(error = %reason, reason = reason.kind(), "Discarding malformed message");
        },
        Err(StageError::Processing(failure)) => {
            error!(error = %failure, class = failure.class(), "Processing failed");
        },
        Err(StageError::NotFound(id)) => {
            warn!(document_id = %id, "Document no longer exists, discarding");
        },
    }
}
