//! PDF first-page rasterization via poppler's `pdftoppm`
//!
//! Multi-page documents are evaluated by their first page only.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::{OcrError, Result};

/// Rendered page image, removed together with its directory on drop
#[derive(Debug)]
pub struct RenderedPage {
    _dir: TempDir,
    path: PathBuf,
}

impl RenderedPage {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Renders the first page of a PDF to PNG
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    executable_path: Option<String>,
    dpi: u32,
    work_dir: Option<PathBuf>,
}

impl PdfRasterizer {
    pub fn new() -> Self {
        Self {
            executable_path: None,
            dpi: 300,
            work_dir: None,
        }
    }

    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    fn executable(&self) -> &str {
        self.executable_path.as_deref().unwrap_or("pdftoppm")
    }

    fn build_args(&self, pdf: &Path, out_prefix: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            "1".to_string(),
            "-l".to_string(),
            "1".to_string(),
            "-r".to_string(),
            self.dpi.to_string(),
            "-png".to_string(),
            "-singlefile".to_string(),
            pdf.display().to_string(),
            out_prefix.display().to_string(),
        ]
    }

    /// Render page 1 of `pdf` into a temporary PNG
    pub fn render_first_page(&self, pdf: &Path) -> Result<RenderedPage> {
        let dir = match &self.work_dir {
            Some(base) => tempfile::Builder::new().prefix("fundproof-pdf-").tempdir_in(base)?,
            None => tempfile::Builder::new().prefix("fundproof-pdf-").tempdir()?,
        };
        let prefix = dir.path().join("page");

        let output = Command::new(self.executable())
            .args(self.build_args(pdf, &prefix))
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
            return Err(OcrError::PdfRenderFailed(stderr.trim().to_string()));
        }

        let path = prefix.with_extension("png");
        if !path.exists() {
            return Err(OcrError::PdfRenderFailed(format!(
                "no page image produced for {}",
                pdf.display()
            )));
        }

        tracing::debug!(pdf = %pdf.display(), dpi = self.dpi, "rendered first PDF page");
        Ok(RenderedPage { _dir: dir, path })
    }
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self::new()
    }
}
