//! Error types for message contracts

use thiserror::Error;

/// Reason a queue payload was rejected.
///
/// A malformed message is never retried: the consumer discards it
/// (nack without requeue) and nothing is forwarded downstream.
#[derive(Error, Debug)]
pub enum MalformedMessage {
    /// Body is not JSON, is not an object, misses a field or a field has
    /// the wrong primitive type.
    #[error("Undecodable message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid document id '{0}': expected a positive integer encoded as a string")]
    InvalidId(String),

    #[error("Field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("Summary has {actual} characters, at least {minimum} are required")]
    SummaryTooShort { actual: usize, minimum: usize },
}

impl MalformedMessage {
    /// Short machine-friendly label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::InvalidId(_) => "invalid_id",
            Self::EmptyField(_) => "empty_field",
            Self::SummaryTooShort { .. } => "summary_too_short",
        }
    }
}
