//! Summarization stage: `genai_queue` -> `result_queue`

use async_trait::async_trait;
use paperless_common::{SummaryReadyMessage, TextExtractedMessage, RESULT_QUEUE};
use std::sync::Arc;
use tracing::info;

use super::{publish_message, StageHandler};
use crate::broker::MessageBroker;
use crate::error::{ProcessingFailure, StageError};
use crate::summarize::Summarizer;

pub struct SummarizationWorker {
    summarizer: Arc<dyn Summarizer>,
    broker: Arc<dyn MessageBroker>,
}

impl SummarizationWorker {
    pub fn new(summarizer: Arc<dyn Summarizer>, broker: Arc<dyn MessageBroker>) -> Self {
        Self { summarizer, broker }
    }
}

#[async_trait]
impl StageHandler for SummarizationWorker {
    type Input = TextExtractedMessage;

    const STAGE: &'static str = "genai";

    fn output_queue(&self) -> Option<&'static str> {
        Some(RESULT_QUEUE)
    }

    async fn process(&self, message: TextExtractedMessage) -> Result<(), StageError> {
        let candidate = self
            .summarizer
            .summarize(&message.text)
            .await
            .map_err(ProcessingFailure::from)?;

        // Quality gate: a short candidate is a failed generation, not a summary.
        let summary = SummaryReadyMessage::new(message.id, candidate)
            .map_err(ProcessingFailure::QualityGate)?;

        publish_message(self.broker.as_ref(), &summary).await?;

        info!(
            document_id = %message.id,
            summary_chars = summary.summary.chars().count(),
            "Summary forwarded"
        );
        Ok(())
    }
}
