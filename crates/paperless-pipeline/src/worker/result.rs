//! Result stage: `result_queue` -> document metadata

use async_trait::async_trait;
use paperless_common::SummaryReadyMessage;
use std::sync::Arc;
use tracing::info;

use super::StageHandler;
use crate::db::DocumentStore;
use crate::error::{ProcessingFailure, StageError};

/// Pipeline sink. Writes the summary onto the document and publishes nothing.
pub struct ResultWriter {
    documents: Arc<dyn DocumentStore>,
}

impl ResultWriter {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl StageHandler for ResultWriter {
    type Input = SummaryReadyMessage;

    const STAGE: &'static str = "result";

    fn output_queue(&self) -> Option<&'static str> {
        None
    }

    async fn process(&self, message: SummaryReadyMessage) -> Result<(), StageError> {
        let updated = self
            .documents
            .update_summary(message.id, &message.summary)
            .await
            .map_err(ProcessingFailure::from)?;

        if !updated {
            return Err(StageError::NotFound(message.id));
        }

        info!(document_id = %message.id, "Summary stored");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::{Document, MemoryDocumentStore};

    #[tokio::test]
    async fn test_writes_summary_only() {
        let store = MemoryDocumentStore::new();
        let id = store.insert("sample.pdf", 1234).unwrap();
        let before = store.get(id).unwrap();
        let writer = ResultWriter::new(Arc::new(store.clone()));

        let message =
            SummaryReadyMessage::new(id, "This document is a short greeting sample.").unwrap();
        writer.process(message).await.unwrap();

        let after = store.get(id).unwrap();
        assert_eq!(after.summary, "This document is a short greeting sample.");
        assert_eq!(
            Document { summary: String::new(), ..after },
            before
        );
    }

    #[tokio::test]
    async fn test_deleted_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let id = store.insert("deleted.pdf", 1).unwrap();
        store.remove(id);
        let writer = ResultWriter::new(Arc::new(store));

        let message = SummaryReadyMessage::new(id, "A summary that arrived too late.").unwrap();
        let err = writer.process(message).await.unwrap_err();
        assert!(matches!(err, StageError::NotFound(missing) if missing == id));
    }
}
