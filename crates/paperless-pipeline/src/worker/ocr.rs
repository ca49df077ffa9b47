//! Extraction stage: `ocr_queue` -> `genai_queue`

use async_trait::async_trait;
use paperless_common::{DocumentReadyMessage, TextExtractedMessage, GENAI_QUEUE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, instrument};

use super::{publish_message, StageHandler};
use crate::broker::MessageBroker;
use crate::error::{ProcessingFailure, StageError};
use crate::extract::{SourceFormat, TextExtractor};
use crate::storage::BlobStore;

pub struct ExtractionWorker {
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    broker: Arc<dyn MessageBroker>,
    staging_root: Option<PathBuf>,
}

impl ExtractionWorker {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        Self {
            blobs,
            extractor,
            broker,
            staging_root: None,
        }
    }

    /// Create per-message staging directories under `root` instead of the
    /// system temp dir.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    fn staging_dir(&self) -> Result<TempDir, ProcessingFailure> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("paperless-ocr-");
        let dir = match &self.staging_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(ProcessingFailure::Staging)
    }

    #[instrument(skip(self, message), fields(filename = %message.filename))]
    async fn extract_text(&self, message: &DocumentReadyMessage) -> Result<String, ProcessingFailure> {
        let format = SourceFormat::detect(&message.filename)?;

        // Removed on drop, whichever way this function is left.
        let staging = self.staging_dir()?;

        let bytes = self.blobs.fetch(&message.filename).await?;
        let local = staging.path().join(staged_file_name(&message.filename));
        tokio::fs::write(&local, &bytes)
            .await
            .map_err(ProcessingFailure::Staging)?;

        debug!(bytes = bytes.len(), path = %local.display(), "Staged document");

        let text = self
            .extractor
            .extract(&local, format, staging.path())
            .await?;

        Ok(text)
    }
}

/// Last path segment of the blob key, so keys with prefixes stay inside the
/// staging directory.
fn staged_file_name(key: &str) -> PathBuf {
    Path::new(key)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("document"))
}

#[async_trait]
impl StageHandler for ExtractionWorker {
    type Input = DocumentReadyMessage;

    const STAGE: &'static str = "ocr";

    fn output_queue(&self) -> Option<&'static str> {
        Some(GENAI_QUEUE)
    }

    async fn process(&self, message: DocumentReadyMessage) -> Result<(), StageError> {
        let text = self.extract_text(&message).await?;

        if text.trim().is_empty() {
            return Err(ProcessingFailure::EmptyText.into());
        }

        let chars = text.chars().count();
        let extracted =
            TextExtractedMessage::new(message.id, text).map_err(|_| ProcessingFailure::EmptyText)?;
        publish_message(self.broker.as_ref(), &extracted).await?;

        info!(document_id = %message.id, chars, "Extracted text forwarded");
        Ok(())
    }
}
