//! Upload format detection

use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::ImageFormat;

use crate::{OcrError, Result};

/// Formats accepted for verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Pdf,
}

impl SourceFormat {
    /// Detect the format from the leading bytes of a file.
    ///
    /// The extension is ignored; uploads are frequently misnamed.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = [0u8; 8];
        let mut file = File::open(path)?;
        let n = file.read(&mut header)?;

        Self::from_magic(&header[..n]).ok_or_else(|| {
            OcrError::UnsupportedFormat(format!(
                "{} (expected JPEG, PNG or PDF)",
                path.display()
            ))
        })
    }

    /// Match known signatures
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if bytes.starts_with(b"%PDF-") {
            Some(Self::Pdf)
        } else {
            None
        }
    }

    /// Decoder format for raster inputs
    pub fn image_format(&self) -> Option<ImageFormat> {
        match self {
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Png => Some(ImageFormat::Png),
            Self::Pdf => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_magic_detection() {
        assert_eq!(SourceFormat::from_magic(b"%PDF-1.7\n"), Some(SourceFormat::Pdf));
        assert_eq!(
            SourceFormat::from_magic(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(SourceFormat::Jpeg)
        );
        assert_eq!(
            SourceFormat::from_magic(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(SourceFormat::Png)
        );
        assert_eq!(SourceFormat::from_magic(b"GIF89a"), None);
        assert_eq!(SourceFormat::from_magic(b""), None);
    }

    #[test]
    fn test_detect_ignores_extension() {
        let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(b"%PDF-1.4 fake").unwrap();

        assert_eq!(SourceFormat::detect(file.path()).unwrap(), SourceFormat::Pdf);
    }

    #[test]
    fn test_detect_rejects_unknown() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        let err = SourceFormat::detect(file.path()).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_detect_missing_file() {
        let err = SourceFormat::detect(Path::new("/nonexistent/upload.png")).unwrap_err();
        assert!(matches!(err, OcrError::IoError(_)));
    }
}
