//! Pipeline intake
//!
//! Publishing a [`DocumentReadyMessage`] is how a document enters the
//! pipeline. The upload endpoint does this once the blob is stored and the
//! metadata row exists; operators do it by hand to re-drive a document that
//! stalled after a discarded failure.

use paperless_common::{DocumentId, DocumentReadyMessage, OCR_QUEUE};
use tracing::{info, instrument};

use crate::broker::MessageBroker;
use crate::error::{ProcessingFailure, StageError};
use crate::worker::publish_message;

#[instrument(skip(broker))]
pub async fn enqueue_document(
    broker: &dyn MessageBroker,
    id: DocumentId,
    filename: &str,
) -> Result<DocumentReadyMessage, StageError> {
    let message = DocumentReadyMessage::new(id, filename)?;

    broker
        .declare_durable_queue(OCR_QUEUE)
        .await
        .map_err(ProcessingFailure::from)?;
    publish_message(broker, &message).await?;

    info!(document_id = %id, queue = OCR_QUEUE, "Document enqueued");
    Ok(message)
}
