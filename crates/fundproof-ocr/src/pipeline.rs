//! File-to-text pipeline: preprocessing followed by OCR

use std::path::Path;
use std::sync::Arc;

use fundproof_core::OcrConfig;

use crate::preprocess::ImagePreprocessor;
use crate::{OcrEngine, Result, TesseractConfig, TesseractEngine};

/// Anything that can turn a stored upload into trimmed text.
///
/// An empty string means the document was read but nothing legible was
/// found; an `Err` means reading itself failed.
pub trait DocumentTextSource: Send + Sync {
    fn read_text(&self, source: &Path) -> Result<String>;
}

/// Preprocess an upload, OCR the resulting image, drop the artifact
pub struct OcrPipeline {
    preprocessor: ImagePreprocessor,
    engine: Arc<dyn OcrEngine>,
}

impl OcrPipeline {
    pub fn new(preprocessor: ImagePreprocessor, engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            preprocessor,
            engine,
        }
    }

    /// Tesseract-backed pipeline built from the application config
    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            ImagePreprocessor::from_config(config),
            Arc::new(TesseractEngine::with_config(TesseractConfig::from_config(
                config,
            ))),
        )
    }

    pub fn engine(&self) -> &dyn OcrEngine {
        self.engine.as_ref()
    }
}

impl DocumentTextSource for OcrPipeline {
    fn read_text(&self, source: &Path) -> Result<String> {
        // `processed` removes its file when it goes out of scope, on
        // success and on every error path alike.
        let processed = self.preprocessor.preprocess(source)?;
        let result = self.engine.extract_text(processed.path())?;

        tracing::debug!(
            source = %source.display(),
            engine = self.engine.name(),
            chars = result.text.chars().count(),
            "OCR complete"
        );

        Ok(result.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OcrError, OcrResult};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Engine that records the path it was handed and returns fixed text
    struct RecordingEngine {
        text: String,
        fail: bool,
        seen: Mutex<Option<PathBuf>>,
    }

    impl OcrEngine for RecordingEngine {
        fn extract_text(&self, image_path: &Path) -> Result<OcrResult> {
            assert!(image_path.exists());
            *self.seen.lock().unwrap() = Some(image_path.to_path_buf());
            if self.fail {
                return Err(OcrError::ExecutionFailed("engine crashed".into()));
            }
            Ok(OcrResult::new(self.text.clone()))
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn upload(dir: &Path) -> PathBuf {
        let path = dir.join("upload.png");
        RgbImage::from_pixel(16, 16, Rgb([250, 250, 250]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn test_pipeline_trims_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(RecordingEngine {
            text: "  Удостоверение личности \n".into(),
            fail: false,
            seen: Mutex::new(None),
        });
        let pipeline = OcrPipeline::new(ImagePreprocessor::new(), engine.clone());

        let text = pipeline.read_text(&upload(dir.path())).unwrap();
        assert_eq!(text, "Удостоверение личности");

        let artifact = engine.seen.lock().unwrap().clone().unwrap();
        assert!(!artifact.exists());
    }

    #[test]
    fn test_pipeline_cleans_up_on_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(RecordingEngine {
            text: String::new(),
            fail: true,
            seen: Mutex::new(None),
        });
        let pipeline = OcrPipeline::new(ImagePreprocessor::new(), engine.clone());

        let err = pipeline.read_text(&upload(dir.path())).unwrap_err();
        assert!(err.is_transient());

        let artifact = engine.seen.lock().unwrap().clone().unwrap();
        assert!(!artifact.exists());
    }

    #[test]
    #[ignore = "requires tesseract with kaz, rus and eng models"]
    fn test_tesseract_on_blank_page() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = OcrPipeline::from_config(&OcrConfig::default());
        let text = pipeline.read_text(&upload(dir.path())).unwrap();
        assert!(text.is_empty());
    }
}
