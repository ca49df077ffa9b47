//! Queue message contracts
//!
//! The pipeline moves a document through three durable queues. Each queue
//! carries exactly one payload shape, encoded as a flat JSON object of
//! strings (UTF-8):
//!
//! | Queue          | Payload                                   |
//! |----------------|-------------------------------------------|
//! | `ocr_queue`    | `{"id":"<int>","filename":"<string>"}`    |
//! | `genai_queue`  | `{"id":"<int>","text":"<string>"}`        |
//! | `result_queue` | `{"id":"<int>","summary":"<string>"}`     |
//!
//! Parsing is strict: a missing field, a non-string field, an id that is not
//! a positive integer, or a blank textual field all yield
//! [`MalformedMessage`]. Unknown extra fields are ignored.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::MalformedMessage;

/// Intake queue, fed by the upload endpoint.
pub const OCR_QUEUE: &str = "ocr_queue";

/// Extracted text, consumed by the summarization stage.
pub const GENAI_QUEUE: &str = "genai_queue";

/// Finished summaries, consumed by the result writer.
pub const RESULT_QUEUE: &str = "result_queue";

/// Shortest summary, in characters of the candidate exactly as returned,
/// that is accepted as a real summary.
pub const MIN_SUMMARY_CHARS: usize = 15;

/// Identifier of a persisted document.
///
/// Travels on the wire as a decimal string (`"7"`), never as a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(i32);

impl DocumentId {
    pub fn new(value: i32) -> Result<Self, MalformedMessage> {
        if value <= 0 {
            return Err(MalformedMessage::InvalidId(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl std::str::FromStr for DocumentId {
    type Err = MalformedMessage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<i32>()
            .map_err(|_| MalformedMessage::InvalidId(s.to_string()))?;
        Self::new(value).map_err(|_| MalformedMessage::InvalidId(s.to_string()))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Common surface of the three pipeline payloads.
pub trait PipelineMessage: Sized + Serialize {
    /// Queue this message is published to.
    const QUEUE: &'static str;

    /// Decode and validate a raw delivery body.
    fn parse(body: &[u8]) -> Result<Self, MalformedMessage>;

    /// Check the payload invariants of an already-built message.
    fn validate(&self) -> Result<(), MalformedMessage>;

    fn document_id(&self) -> DocumentId;

    /// Encode to the wire representation.
    fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), MalformedMessage> {
    if value.trim().is_empty() {
        return Err(MalformedMessage::EmptyField(field));
    }
    Ok(())
}

/// Length used by the summary quality gate.
pub fn summary_length(summary: &str) -> usize {
    summary.chars().count()
}

/// A document's bytes are stored and its metadata row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReadyMessage {
    pub id: DocumentId,
    /// Blob store key of the uploaded file.
    pub filename: String,
}

/// Verbatim OCR output for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextExtractedMessage {
    pub id: DocumentId,
    pub text: String,
}

/// Generated summary for a document, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReadyMessage {
    pub id: DocumentId,
    pub summary: String,
}

#[derive(Deserialize)]
struct DocumentReadyWire {
    id: String,
    filename: String,
}

#[derive(Deserialize)]
struct TextExtractedWire {
    id: String,
    text: String,
}

#[derive(Deserialize)]
struct SummaryReadyWire {
    id: String,
    summary: String,
}

impl DocumentReadyMessage {
    pub fn new(id: DocumentId, filename: impl Into<String>) -> Result<Self, MalformedMessage> {
        let message = Self {
            id,
            filename: filename.into(),
        };
        message.validate()?;
        Ok(message)
    }
}

impl PipelineMessage for DocumentReadyMessage {
    const QUEUE: &'static str = OCR_QUEUE;

    fn parse(body: &[u8]) -> Result<Self, MalformedMessage> {
        let wire: DocumentReadyWire = serde_json::from_slice(body)?;
        Self::new(wire.id.parse()?, wire.filename)
    }

    fn validate(&self) -> Result<(), MalformedMessage> {
        require_text("filename", &self.filename)
    }

    fn document_id(&self) -> DocumentId {
        self.id
    }
}

impl TextExtractedMessage {
    pub fn new(id: DocumentId, text: impl Into<String>) -> Result<Self, MalformedMessage> {
        let message = Self {
            id,
            text: text.into(),
        };
        message.validate()?;
        Ok(message)
    }
}

impl PipelineMessage for TextExtractedMessage {
    const QUEUE: &'static str = GENAI_QUEUE;

    fn parse(body: &[u8]) -> Result<Self, MalformedMessage> {
        let wire: TextExtractedWire = serde_json::from_slice(body)?;
        Self::new(wire.id.parse()?, wire.text)
    }

    fn validate(&self) -> Result<(), MalformedMessage> {
        require_text("text", &self.text)
    }

    fn document_id(&self) -> DocumentId {
        self.id
    }
}

impl SummaryReadyMessage {
    pub fn new(id: DocumentId, summary: impl Into<String>) -> Result<Self, MalformedMessage> {
        let message = Self {
            id,
            summary: summary.into(),
        };
        message.validate()?;
        Ok(message)
    }
}

impl PipelineMessage for SummaryReadyMessage {
    const QUEUE: &'static str = RESULT_QUEUE;

    fn parse(body: &[u8]) -> Result<Self, MalformedMessage> {
        let wire: SummaryReadyWire = serde_json::from_slice(body)?;
        Self::new(wire.id.parse()?, wire.summary)
    }

    fn validate(&self) -> Result<(), MalformedMessage> {
        require_text("summary", &self.summary)?;
        let actual = summary_length(&self.summary);
        if actual < MIN_SUMMARY_CHARS {
            return Err(MalformedMessage::SummaryTooShort {
                actual,
                minimum: MIN_SUMMARY_CHARS,
            });
        }
        Ok(())
    }

    fn document_id(&self) -> DocumentId {
        self.id
    }
}
