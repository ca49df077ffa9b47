//! Tesseract OCR with Ghostscript rasterization for PDFs
//!
//! Both tools run as child processes with a timeout and are killed if the
//! future is dropped, so an abandoned message on shutdown does not leave a
//! stray `gs` behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::{ExtractionError, OcrConfig, SourceFormat, TextExtractor};

const STDERR_PREVIEW_CHARS: usize = 400;

/// Prefix of the page images Ghostscript writes into the work directory.
const PAGE_PREFIX: &str = "page-";

pub struct TesseractExtractor {
    config: OcrConfig,
    tesseract_bin: String,
    ghostscript_bin: String,
}

impl TesseractExtractor {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            config,
            tesseract_bin: "tesseract".to_string(),
            ghostscript_bin: "gs".to_string(),
        }
    }

    pub fn with_binaries(mut self, tesseract: impl Into<String>, ghostscript: impl Into<String>) -> Self {
        self.tesseract_bin = tesseract.into();
        self.ghostscript_bin = ghostscript.into();
        self
    }

    fn ghostscript_args(&self, source: &Path, work_dir: &Path) -> Vec<String> {
        let pattern = work_dir.join(format!("{}%03d.png", PAGE_PREFIX));
        vec![
            "-dNOPAUSE".to_string(),
            "-dBATCH".to_string(),
            "-dSAFER".to_string(),
            "-dQUIET".to_string(),
            "-sDEVICE=png16m".to_string(),
            format!("-r{}", self.config.raster_dpi),
            "-dFirstPage=1".to_string(),
            format!("-dLastPage={}", self.config.max_pages),
            format!("-sOutputFile={}", pattern.display()),
            source.display().to_string(),
        ]
    }

    fn tesseract_args(&self, image: &Path) -> Vec<String> {
        vec![
            image.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
            "-c".to_string(),
            "page_separator=".to_string(),
        ]
    }

    #[instrument(skip(self, work_dir))]
    async fn rasterize(&self, source: &Path, work_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
        let output = self
            .run(&self.ghostscript_bin, &self.ghostscript_args(source, work_dir))
            .await?;

        if !output.status.success() {
            return Err(ExtractionError::Conversion(format!(
                "{} exited with {}: {}",
                self.ghostscript_bin,
                output.status,
                stderr_preview(&output)
            )));
        }

        let pages = list_pages(work_dir).await?;
        if pages.is_empty() {
            return Err(ExtractionError::Conversion(
                "rasterizer produced no pages".to_string(),
            ));
        }

        debug!(pages = pages.len(), "Rasterized document");
        Ok(pages)
    }

    #[instrument(skip(self))]
    async fn ocr_image(&self, image: &Path) -> Result<String, ExtractionError> {
        let output = self
            .run(&self.tesseract_bin, &self.tesseract_args(image))
            .await?;

        if !output.status.success() {
            return Err(ExtractionError::Ocr(format!(
                "{} exited with {}: {}",
                self.tesseract_bin,
                output.status,
                stderr_preview(&output)
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| ExtractionError::Ocr(format!("non UTF-8 output: {}", e)))
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<Output, ExtractionError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|source| ExtractionError::Spawn {
            program: program.to_string(),
            source,
        })?;

        match timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ExtractionError::Timeout {
                program: program.to_string(),
                seconds: self.config.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract(
        &self,
        source: &Path,
        format: SourceFormat,
        work_dir: &Path,
    ) -> Result<String, ExtractionError> {
        match format {
            SourceFormat::Image => self.ocr_image(source).await,
            SourceFormat::Pdf => {
                let pages = self.rasterize(source, work_dir).await?;
                let mut texts = Vec::with_capacity(pages.len());
                for page in &pages {
                    texts.push(self.ocr_image(page).await?);
                }
                Ok(join_pages(&texts))
            },
        }
    }
}

/// Page images in page order.
async fn list_pages(work_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(PAGE_PREFIX) && name.ends_with(".png") {
            pages.push(entry.path());
        }
    }
    // Zero-padded names sort numerically up to 999 pages.
    pages.sort();
    Ok(pages)
}

/// Join per-page text with a blank line, dropping trailing whitespace of
/// each page.
fn join_pages(texts: &[String]) -> String {
    texts
        .iter()
        .map(|t| t.trim_end())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn stderr_preview(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.chars().count() > STDERR_PREVIEW_CHARS {
        let preview: String = trimmed.chars().take(STDERR_PREVIEW_CHARS).collect();
        format!("{}...", preview)
    } else {
        trimmed.to_string()
    }
}
