//! Stage outcomes and how they settle a delivery

use paperless_common::{DocumentId, MalformedMessage};
use thiserror::Error;

use crate::broker::BrokerError;
use crate::config::RetryPolicy;
use crate::db::DbError;
use crate::extract::ExtractionError;
use crate::storage::BlobError;
use crate::summarize::SummarizerError;

/// A well-formed message whose unit of work could not be completed.
#[derive(Error, Debug)]
pub enum ProcessingFailure {
    #[error("Fetching document failed: {0}")]
    Fetch(#[from] BlobError),

    #[error("Staging document failed: {0}")]
    Staging(#[source] std::io::Error),

    #[error("Text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Extraction produced no text")]
    EmptyText,

    #[error("Summarization failed: {0}")]
    Summarization(#[from] SummarizerError),

    #[error("Summary rejected: {0}")]
    QualityGate(#[source] MalformedMessage),

    #[error("Encoding follow-on message failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Publishing follow-on message failed: {0}")]
    Publish(#[from] BrokerError),

    #[error("Writing summary failed: {0}")]
    Database(#[from] DbError),
}

impl ProcessingFailure {
    /// Whether retrying the same input could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(BlobError::Transport { .. }) => true,
            Self::Fetch(BlobError::NotFound { .. }) => false,
            Self::Staging(_) => true,
            Self::Extraction(ExtractionError::Io(_)) => true,
            Self::Extraction(_) => false,
            Self::EmptyText => false,
            Self::Summarization(e) => e.is_transient(),
            Self::QualityGate(_) => false,
            Self::Encode(_) => false,
            Self::Publish(_) => true,
            Self::Database(_) => true,
        }
    }

    pub fn class(&self) -> &'static str {
        if self.is_transient() {
            "transient"
        } else {
            "permanent"
        }
    }
}

/// Why a delivery was not acknowledged.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] MalformedMessage),

    #[error(transparent)]
    Processing(#[from] ProcessingFailure),

    #[error("Document {0} does not exist")]
    NotFound(DocumentId),
}

impl StageError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Processing(_) => "processing_failure",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// Final disposition of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    /// Nack without requeue. The message is gone from this queue.
    Discard,
    /// Nack with requeue for another attempt.
    Requeue,
}

/// Decide how a handled delivery is settled.
///
/// Success acks. Under [`RetryPolicy::Discard`] every failure is discarded.
/// Under [`RetryPolicy::RequeueTransient`] a transient processing failure on
/// a first delivery is requeued once; a redelivered message is discarded.
pub fn settle(outcome: &Result<(), StageError>, policy: RetryPolicy, redelivered: bool) -> Settlement {
    match outcome {
        Ok(()) => Settlement::Ack,
        Err(StageError::Processing(failure))
            if policy == RetryPolicy::RequeueTransient && failure.is_transient() && !redelivered =>
        {
            Settlement::Requeue
        },
        Err(_) => Settlement::Discard,
    }
}
