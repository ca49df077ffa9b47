//! Text extraction from stored documents
//!
//! Images are OCR'd directly. PDFs are first rasterized page by page and
//! every page image is OCR'd in order.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::{optional, parse_or, ConfigResult};

pub mod tesseract;

pub use tesseract::TesseractExtractor;

pub const DEFAULT_OCR_LANGUAGE: &str = "eng";
pub const DEFAULT_OCR_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_OCR_MAX_PAGES: u32 = 10;
pub const DEFAULT_OCR_RASTER_DPI: u32 = 300;

/// Extensions accepted for OCR, lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pbm", "pgm", "ppm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Tesseract reads the file as is.
    Image,
    /// Needs rasterizing before OCR.
    Pdf,
}

impl SourceFormat {
    /// Detect the format from a filename's extension, case-insensitively.
    pub fn detect(filename: &str) -> Result<Self, ExtractionError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if extension == "pdf" {
            Ok(Self::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Ok(Self::Image)
        } else {
            Err(ExtractionError::UnsupportedFormat(filename.to_string()))
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported document format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {seconds}s")]
    Timeout { program: String, seconds: u64 },

    /// Rasterizing a paginated document failed or produced no pages.
    #[error("Document conversion failed: {0}")]
    Conversion(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a staged document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// `source` is a local copy of the document. Intermediate files go into
    /// `work_dir`, which the caller removes afterwards.
    async fn extract(
        &self,
        source: &Path,
        format: SourceFormat,
        work_dir: &Path,
    ) -> Result<String, ExtractionError>;
}

/// OCR settings
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub language: String,
    pub timeout: Duration,
    pub max_pages: u32,
    pub raster_dpi: u32,
    /// Parent for per-message staging directories. System temp dir when unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_OCR_LANGUAGE.to_string(),
            timeout: Duration::from_secs(DEFAULT_OCR_TIMEOUT_SECS),
            max_pages: DEFAULT_OCR_MAX_PAGES,
            raster_dpi: DEFAULT_OCR_RASTER_DPI,
            staging_dir: None,
        }
    }
}

impl OcrConfig {
    pub fn from_env() -> ConfigResult<Self> {
        let staging_dir = optional("OCR_STAGING_DIR", "");
        Ok(Self {
            language: optional("OCR_LANGUAGE", DEFAULT_OCR_LANGUAGE),
            timeout: Duration::from_secs(parse_or("OCR_TIMEOUT_SECS", DEFAULT_OCR_TIMEOUT_SECS)?),
            max_pages: parse_or("OCR_MAX_PAGES", DEFAULT_OCR_MAX_PAGES)?.max(1),
            raster_dpi: parse_or("OCR_RASTER_DPI", DEFAULT_OCR_RASTER_DPI)?,
            staging_dir: (!staging_dir.is_empty()).then(|| PathBuf::from(staging_dir)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_detect_formats() {
        assert_eq!(SourceFormat::detect("sample.pdf").unwrap(), SourceFormat::Pdf);
        assert_eq!(SourceFormat::detect("SCAN.PDF").unwrap(), SourceFormat::Pdf);
        assert_eq!(SourceFormat::detect("receipt.JPeG").unwrap(), SourceFormat::Image);
        assert_eq!(SourceFormat::detect("uploads/2024/page.tiff").unwrap(), SourceFormat::Image);
        assert_eq!(SourceFormat::detect("fax.pbm").unwrap(), SourceFormat::Image);
    }

    #[test]
    fn test_detect_rejects_unknown() {
        for name in ["notes.docx", "archive.tar.gz", "README", "image.png.exe"] {
            assert!(
                matches!(
                    SourceFormat::detect(name),
                    Err(ExtractionError::UnsupportedFormat(_))
                ),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    #[serial]
    fn test_ocr_config_from_env() {
        for name in ["OCR_LANGUAGE", "OCR_TIMEOUT_SECS", "OCR_MAX_PAGES", "OCR_RASTER_DPI", "OCR_STAGING_DIR"] {
            std::env::remove_var(name);
        }

        let defaults = OcrConfig::from_env().unwrap();
        assert_eq!(defaults.language, "eng");
        assert_eq!(defaults.max_pages, 10);
        assert_eq!(defaults.raster_dpi, 300);
        assert!(defaults.staging_dir.is_none());

        std::env::set_var("OCR_LANGUAGE", "deu+eng");
        std::env::set_var("OCR_MAX_PAGES", "0");
        std::env::set_var("OCR_STAGING_DIR", "/var/tmp/ocr");
        let config = OcrConfig::from_env().unwrap();
        assert_eq!(config.language, "deu+eng");
        assert_eq!(config.max_pages, 1);
        assert_eq!(config.staging_dir, Some(PathBuf::from("/var/tmp/ocr")));

        for name in ["OCR_LANGUAGE", "OCR_MAX_PAGES", "OCR_STAGING_DIR"] {
            std::env::remove_var(name);
        }
    }
}
