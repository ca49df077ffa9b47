//! Paperless Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared contracts and utilities for the Paperless document pipeline.
//!
//! # Overview
//!
//! This crate is the single source of truth for everything that crosses a
//! process boundary between pipeline stages:
//!
//! - **Messages**: the three queue payloads and their validation rules
//! - **Error Handling**: the `MalformedMessage` rejection type
//! - **Logging**: tracing subscriber setup shared by every worker binary
//!
//! Producers outside the pipeline (the upload endpoint) depend on this crate
//! so that what they publish is exactly what the workers accept.
//!
//! # Example
//!
//! ```no_run
//! use paperless_common::messages::{DocumentId, DocumentReadyMessage, PipelineMessage};
//!
//! let body = br#"{"id":"7","filename":"sample.pdf"}"#;
//! let message = DocumentReadyMessage::parse(body)?;
//! assert_eq!(message.id, DocumentId::new(7)?);
//! # Ok::<(), paperless_common::MalformedMessage>(())
//! ```

pub mod error;
pub mod logging;
pub mod messages;

// Re-export commonly used types
pub use error::MalformedMessage;
pub use messages::{
    DocumentId, DocumentReadyMessage, PipelineMessage, SummaryReadyMessage, TextExtractedMessage,
    GENAI_QUEUE, MIN_SUMMARY_CHARS, OCR_QUEUE, RESULT_QUEUE,
};
