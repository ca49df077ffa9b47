//! Summary generation
//!
//! A [`Summarizer`] turns extracted text into a candidate summary. It does
//! not judge quality: the summarization worker applies the length gate.

use async_trait::async_trait;
use thiserror::Error;

pub mod gemini;

pub use gemini::{GeminiConfig, GeminiSummarizer};

#[derive(Error, Debug)]
pub enum SummarizerError {
    /// Connection failure or request timeout.
    #[error("Summarizer request failed: {0}")]
    Http(String),

    #[error("Summarizer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Summarizer API error: {0}")]
    Api(String),

    #[error("Unexpected summarizer response: {0}")]
    Decode(String),

    #[error("Summarizer returned an empty summary")]
    Empty,
}

impl SummarizerError {
    /// Whether the same request might succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Api(_) | Self::Decode(_) | Self::Empty => false,
        }
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizerError>;
}
