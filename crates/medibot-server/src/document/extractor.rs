use anyhow::{anyhow, Context, Result};
use lopdf::Document as PdfDocument;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::OcrConfig;

/// Turns an uploaded image or PDF into plain text
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracted text, trimmed. Failures are logged and yield an empty string.
    async fn extract_text(&self, path: &Path) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Image,
    Pdf,
}

impl FileKind {
    fn detect(path: &Path) -> FileKind {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => FileKind::Pdf,
            "jpg" | "jpeg" | "png" | "bmp" | "tiff" | "tif" => FileKind::Image,
            _ => match infer::get_from_path(path) {
                Ok(Some(kind)) if kind.mime_type() == "application/pdf" => FileKind::Pdf,
                // Anything else gets an OCR attempt
                _ => FileKind::Image,
            },
        }
    }
}

/// Tesseract CLI for images, lopdf for PDFs
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    binary: String,
}

impl TesseractExtractor {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_bin.clone(),
        }
    }

    async fn try_extract(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(anyhow!("File not found: {:?}", path));
        }

        let kind = FileKind::detect(path);
        debug!("Extracting text from {:?} as {:?}", path, kind);

        match kind {
            FileKind::Pdf => {
                let owned: PathBuf = path.to_path_buf();
                tokio::task::spawn_blocking(move || parse_pdf(&owned))
                    .await
                    .context("PDF extraction task panicked")?
            }
            FileKind::Image => self.ocr_image(path).await,
        }
    }

    /// `tesseract <image> stdout --oem 3 --psm 6`
    async fn ocr_image(&self, path: &Path) -> Result<String> {
        let output = tokio::process::Command::new(&self.binary)
            .arg(path)
            .arg("stdout")
            .args(["--oem", "3", "--psm", "6"])
            .output()
            .await
            .with_context(|| format!("Failed to run OCR. Is {} installed and in PATH?", self.binary))?;

        if !output.status.success() {
            let err = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed ({}): {}", output.status, err.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract_text(&self, path: &Path) -> String {
        match self.try_extract(path).await {
            Ok(text) => {
                let text = text.trim().to_string();
                debug!("Extracted {} chars from {:?}", text.len(), path);
                text
            }
            Err(e) => {
                warn!("Text extraction failed for {:?}: {:#}", path, e);
                String::new()
            }
        }
    }
}

fn parse_pdf(path: &Path) -> Result<String> {
    let doc = PdfDocument::load(path).context("Failed to load PDF file")?;

    let mut pages = Vec::new();
    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => warn!("Failed to extract text from page {}: {}", page_num, e),
        }
    }

    Ok(pages.join("\n"))
}
