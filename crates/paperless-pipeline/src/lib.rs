//! Paperless Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Asynchronous document processing for Paperless: OCR, summarization and
//! write-back, chained through three durable queues.
//!
//! ```text
//! upload ──> ocr_queue ──> [ocr] ──> genai_queue ──> [genai] ──> result_queue ──> [result] ──> documents
//! ```
//!
//! # Modules
//!
//! - [`broker`]: durable-queue abstraction, RabbitMQ and in-memory backends
//! - [`storage`]: read access to uploaded document bytes (MinIO/S3)
//! - [`extract`]: OCR via Tesseract, with Ghostscript for PDFs
//! - [`summarize`]: summary generation via Gemini
//! - [`db`]: document metadata in Postgres
//! - [`worker`]: the consume loop and the three stage handlers
//! - [`intake`]: putting a document into the pipeline
//!
//! Each stage handler only sees trait objects for its collaborators, so the
//! whole pipeline runs in-process against the in-memory backends in tests.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod intake;
pub mod storage;
pub mod summarize;
pub mod worker;

pub use error::{ProcessingFailure, Settlement, StageError};
pub use worker::{RunSummary, StageHandler, WorkerRunner};
