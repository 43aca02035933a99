//! fundproof OCR - Optical Character Recognition for uploaded documents
//!
//! Turns an uploaded JPEG, PNG or PDF into text:
//! - `format` sniffs the upload format
//! - `pdf` rasterizes the first page of a PDF
//! - `preprocess` binarizes and sharpens the page image
//! - `TesseractEngine` runs the trilingual OCR model
//! - `OcrPipeline` chains the steps and cleans up temporary files

use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use fundproof_core::OcrConfig;
use thiserror::Error;

pub mod format;
pub mod pdf;
pub mod pipeline;
pub mod preprocess;

pub use format::SourceFormat;
pub use pdf::PdfRasterizer;
pub use pipeline::{DocumentTextSource, OcrPipeline};
pub use preprocess::{ImagePreprocessor, PreprocessConfig, ProcessedImage};

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Image processing failed: {0}")]
    ImageProcessingFailed(String),

    #[error("PDF rendering failed: {0}")]
    PdfRenderFailed(String),

    #[error("OCR execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OcrError {
    /// Whether retrying the same input may succeed.
    ///
    /// Infra failures (file access, missing or crashing engine) are
    /// transient; bad input is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EngineNotAvailable(_) | Self::ExecutionFailed(_) => true,
            Self::IoError(e) => !matches!(e.kind(), ErrorKind::InvalidData),
            Self::UnsupportedFormat(_) | Self::ImageProcessingFailed(_) | Self::PdfRenderFailed(_) => {
                false
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, OcrError>;

/// OCR result for a single page
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Extracted text content, trimmed
    pub text: String,
    /// Page number
    pub page: u32,
    /// Language models used
    pub language: Option<String>,
}

impl OcrResult {
    /// Create a new OCR result
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page: 1,
            language: None,
        }
    }

    /// Set detected language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// True when OCR found nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Trait for OCR engines
pub trait OcrEngine: Send + Sync {
    /// Extract text from a preprocessed image file
    fn extract_text(&self, image_path: &Path) -> Result<OcrResult>;

    /// Check if the engine is available on the system
    fn is_available(&self) -> bool;

    /// Get the engine name
    fn name(&self) -> &str;
}

// ============================================================================
// Tesseract OCR Engine
// ============================================================================

/// Tesseract OCR engine configuration
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Language code(s) for OCR (e.g., "kaz+rus+eng")
    pub language: String,
    /// Page segmentation mode (PSM)
    pub psm: Option<u8>,
    /// OCR engine mode (OEM)
    pub oem: Option<u8>,
    /// Path to tesseract executable
    pub executable_path: Option<String>,
    /// Additional tesseract arguments
    pub extra_args: Vec<String>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            language: "kaz+rus+eng".to_string(),
            psm: None,
            oem: None,
            executable_path: None,
            extra_args: Vec::new(),
        }
    }
}

impl TesseractConfig {
    /// Build from the application OCR section
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            psm: config.psm,
            executable_path: config.tesseract_path.clone(),
            ..Default::default()
        }
    }

    /// Set language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set page segmentation mode
    pub fn with_psm(mut self, psm: u8) -> Self {
        self.psm = Some(psm);
        self
    }

    /// Set OCR engine mode
    pub fn with_oem(mut self, oem: u8) -> Self {
        self.oem = Some(oem);
        self
    }
}

/// Tesseract OCR engine wrapper
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    /// Create a new Tesseract engine with default config
    pub fn new() -> Self {
        Self {
            config: TesseractConfig::default(),
        }
    }

    /// Create with custom config
    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn executable(&self) -> &str {
        self.config
            .executable_path
            .as_deref()
            .unwrap_or("tesseract")
    }

    fn build_args(&self, image_path: &Path) -> Vec<String> {
        let mut args = vec![
            image_path.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
        ];

        if let Some(psm) = self.config.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }

        if let Some(oem) = self.config.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }

        args.extend(self.config.extra_args.clone());
        args
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractEngine {
    fn extract_text(&self, image_path: &Path) -> Result<OcrResult> {
        let args = self.build_args(image_path);

        let output = Command::new(self.executable())
            .args(&args)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => OcrError::EngineNotAvailable(format!(
                    "{} is not installed or not in PATH",
                    self.executable()
                )),
                _ => OcrError::ExecutionFailed(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ExecutionFailed(format!(
                "Tesseract failed: {stderr}"
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(chars = text.chars().count(), "tesseract finished");

        Ok(OcrResult::new(text).with_language(self.config.language.clone()))
    }

    fn is_available(&self) -> bool {
        Command::new(self.executable())
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

// ============================================================================
// Tests
// ============================================================================
