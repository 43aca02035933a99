//! Image preprocessing for OCR
//!
//! Converts an upload into a single clean binary page image:
//! 1. Rasterize page 1 if the upload is a PDF
//! 2. Grayscale
//! 3. Median blur (3x3) against speckle noise
//! 4. Adaptive Gaussian threshold (block 31, C 10) against uneven lighting
//! 5. 3x3 sharpening (center 5, four neighbours -1) to crispen glyph edges
//!
//! The result is written to a temporary PNG that is deleted when the
//! returned [`ProcessedImage`] is dropped.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fundproof_core::OcrConfig;
use image::{GrayImage, ImageFormat, Luma};
use imageproc::filter::{filter3x3, median_filter};
use tempfile::TempPath;

use crate::format::SourceFormat;
use crate::pdf::PdfRasterizer;
use crate::{OcrError, Result};

/// Filter parameters
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Median filter aperture (odd)
    pub median_kernel: u32,
    /// Adaptive threshold neighbourhood (odd)
    pub threshold_block_size: u32,
    /// Constant subtracted from the weighted local mean
    pub threshold_c: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            median_kernel: 3,
            threshold_block_size: 31,
            threshold_c: 10.0,
        }
    }
}

/// Preprocessed page image; the backing file is removed on drop
#[derive(Debug)]
pub struct ProcessedImage {
    path: TempPath,
    width: u32,
    height: u32,
}

impl ProcessedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Normalizes uploads into OCR-ready binary images
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
    rasterizer: PdfRasterizer,
    work_dir: Option<PathBuf>,
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the application OCR section
    pub fn from_config(config: &OcrConfig) -> Self {
        let mut rasterizer = PdfRasterizer::new().with_dpi(config.pdf_dpi);
        if let Some(path) = &config.pdftoppm_path {
            rasterizer = rasterizer.with_executable(path.clone());
        }
        if let Some(dir) = &config.work_dir {
            rasterizer = rasterizer.with_work_dir(dir.clone());
        }

        Self {
            config: PreprocessConfig::default(),
            rasterizer,
            work_dir: config.work_dir.clone(),
        }
    }

    pub fn with_config(mut self, config: PreprocessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: PdfRasterizer) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Preprocess an uploaded file into a temporary binary PNG
    pub fn preprocess(&self, source: &Path) -> Result<ProcessedImage> {
        let format = SourceFormat::detect(source)?;

        let gray = match format {
            SourceFormat::Pdf => {
                let page = self.rasterizer.render_first_page(source)?;
                load_gray(page.path(), ImageFormat::Png)?
            }
            raster => {
                let fmt = raster
                    .image_format()
                    .ok_or_else(|| OcrError::UnsupportedFormat(format!("{raster:?}")))?;
                load_gray(source, fmt)?
            }
        };

        let processed = self.process(&gray);
        self.write_temp(&processed)
    }

    /// Run the filter chain on a grayscale image
    pub fn process(&self, gray: &GrayImage) -> GrayImage {
        let blurred = median_blur(gray, self.config.median_kernel);
        let binary = adaptive_threshold_gaussian(
            &blurred,
            self.config.threshold_block_size,
            self.config.threshold_c,
        );
        sharpen(&binary)
    }

    fn write_temp(&self, image: &GrayImage) -> Result<ProcessedImage> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("fundproof-processed-").suffix(".png");
            b
        };
        let mut file = match &self.work_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        {
            let mut writer = BufWriter::new(file.as_file_mut());
            image
                .write_to(&mut writer, ImageFormat::Png)
                .map_err(|e| OcrError::ImageProcessingFailed(format!("PNG encode: {e}")))?;
            writer.flush()?;
        }

        Ok(ProcessedImage {
            path: file.into_temp_path(),
            width: image.width(),
            height: image.height(),
        })
    }
}

fn load_gray(path: &Path, format: ImageFormat) -> Result<GrayImage> {
    let bytes = std::fs::read(path)?;
    let image = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| OcrError::ImageProcessingFailed(format!("{}: {e}", path.display())))?;
    Ok(image.to_luma8())
}

/// Clamp a signed coordinate into `0..len` (replicated border)
#[inline]
fn clamp_index(i: i64, len: u32) -> u32 {
    i.clamp(0, len as i64 - 1) as u32
}

/// Median filter with a square `kernel x kernel` aperture, replicated border
pub fn median_blur(img: &GrayImage, kernel: u32) -> GrayImage {
    if img.width() == 0 || img.height() == 0 || kernel <= 1 {
        return img.clone();
    }
    let radius = kernel / 2;
    median_filter(img, radius, radius)
}

/// 1-D Gaussian weights for an odd aperture, sigma derived from the size
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let r = (size / 2) as i32;
    let weights: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel becomes white (255) when it is brighter than the weighted mean
/// of its `block_size` neighbourhood minus `c`, black (0) otherwise.
pub fn adaptive_threshold_gaussian(img: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let block_size = if block_size % 2 == 0 {
        block_size + 1
    } else {
        block_size.max(3)
    };
    let kernel = gaussian_kernel(block_size);
    let r = (block_size / 2) as i64;

    // Separable convolution: horizontal pass, then vertical
    let mut horizontal = vec![0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp_index(x as i64 + k as i64 - r, w);
                acc += weight * img.get_pixel(sx, y).0[0] as f32;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut mean = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp_index(y as i64 + k as i64 - r, h);
                mean += weight * horizontal[(sy * w + x) as usize];
            }
            let value = img.get_pixel(x, y).0[0] as f32;
            let level = if value > mean.round() - c { 255 } else { 0 };
            out.put_pixel(x, y, Luma([level]));
        }
    }

    out
}

const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Sharpen with the kernel `[0,-1,0; -1,5,-1; 0,-1,0]`, saturating to 0..=255
pub fn sharpen(img: &GrayImage) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    filter3x3::<_, f32, u8>(img, &SHARPEN_KERNEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use proptest::prelude::*;

    fn save_rgb(path: &Path, img: &RgbImage, format: ImageFormat) {
        img.save_with_format(path, format).unwrap();
    }

    /// White page with a dark block standing in for printed text
    fn synthetic_page(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (20..40).contains(&x) && (20..30).contains(&y) {
                Rgb([10, 10, 10])
            } else {
                Rgb([235, 235, 235])
            }
        })
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel(31);
        assert_eq!(kernel.len(), 31);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(kernel[15] > kernel[0]);
        assert!((kernel[0] - kernel[30]).abs() < 1e-6);
    }

    #[test]
    fn test_median_removes_isolated_speck() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([200]));
        img.put_pixel(4, 4, Luma([0]));

        let out = median_blur(&img, 3);
        assert_eq!(out.get_pixel(4, 4).0[0], 200);
    }

    #[test]
    fn test_threshold_separates_text_from_background() {
        let gray = image::DynamicImage::ImageRgb8(synthetic_page(64, 48)).to_luma8();
        let binary = adaptive_threshold_gaussian(&gray, 31, 10.0);

        assert_eq!(binary.get_pixel(30, 25).0[0], 0);
        assert_eq!(binary.get_pixel(5, 5).0[0], 255);
    }

    #[test]
    fn test_threshold_flat_image_is_white() {
        let gray = GrayImage::from_pixel(20, 20, Luma([90]));
        let binary = adaptive_threshold_gaussian(&gray, 31, 10.0);
        assert!(binary.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_sharpen_keeps_flat_regions() {
        let img = GrayImage::from_pixel(5, 5, Luma([255]));
        let out = sharpen(&img);
        assert!(out.pixels().all(|p| p.0[0] == 255));

        let mut dot = GrayImage::from_pixel(5, 5, Luma([0]));
        dot.put_pixel(2, 2, Luma([40]));
        let out = sharpen(&dot);
        assert_eq!(out.get_pixel(2, 2).0[0], 200);
        assert_eq!(out.get_pixel(1, 2).0[0], 0);
    }

    #[test]
    fn test_filters_accept_empty_image() {
        let empty = GrayImage::new(0, 0);
        assert_eq!(median_blur(&empty, 3).dimensions(), (0, 0));
        assert_eq!(sharpen(&empty).dimensions(), (0, 0));
    }

    #[test]
    fn test_median_wider_aperture() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([180]));
        for y in 3..=5 {
            for x in 3..=5 {
                img.put_pixel(x, y, Luma([0]));
            }
        }

        // A 3x3 blot survives a 3x3 median but not a 5x5 one
        assert_eq!(median_blur(&img, 3).get_pixel(4, 4).0[0], 0);
        assert_eq!(median_blur(&img, 5).get_pixel(4, 4).0[0], 180);
    }

    #[test]
    fn test_preprocess_png_writes_temp_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("id.png");
        save_rgb(&source, &synthetic_page(64, 48), ImageFormat::Png);

        let preprocessor = ImagePreprocessor::new();
        let processed = preprocessor.preprocess(&source).unwrap();
        let artifact = processed.path().to_path_buf();

        assert!(artifact.exists());
        assert_eq!(processed.dimensions(), (64, 48));

        let written = image::open(&artifact).unwrap().to_luma8();
        assert!(written.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));

        drop(processed);
        assert!(!artifact.exists());
    }

    #[test]
    fn test_preprocess_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scan.jpeg");
        save_rgb(&source, &synthetic_page(48, 48), ImageFormat::Jpeg);

        let processed = ImagePreprocessor::new().preprocess(&source).unwrap();
        assert_eq!(processed.dimensions(), (48, 48));
    }

    #[test]
    fn test_preprocess_rejects_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "plain text upload").unwrap();

        let err = ImagePreprocessor::new().preprocess(&source).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_preprocess_corrupt_png() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.png");
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(b"garbage");
        std::fs::write(&source, bytes).unwrap();

        let err = ImagePreprocessor::new().preprocess(&source).unwrap_err();
        assert!(matches!(err, OcrError::ImageProcessingFailed(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_preprocess_artifacts_in_work_dir() {
        let work = tempfile::tempdir().unwrap();
        let source = work.path().join("upload.png");
        save_rgb(&source, &synthetic_page(32, 32), ImageFormat::Png);

        let config = OcrConfig {
            work_dir: Some(work.path().to_path_buf()),
            ..Default::default()
        };
        let processed = ImagePreprocessor::from_config(&config)
            .preprocess(&source)
            .unwrap();
        assert!(processed.path().starts_with(work.path()));
    }

    proptest! {
        #[test]
        fn prop_threshold_output_is_binary(
            pixels in prop::collection::vec(any::<u8>(), 64),
        ) {
            let img = GrayImage::from_raw(8, 8, pixels).unwrap();
            let out = adaptive_threshold_gaussian(&img, 31, 10.0);
            prop_assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        }

        #[test]
        fn prop_median_stays_within_input_range(
            pixels in prop::collection::vec(any::<u8>(), 36),
        ) {
            let min = *pixels.iter().min().unwrap();
            let max = *pixels.iter().max().unwrap();
            let img = GrayImage::from_raw(6, 6, pixels).unwrap();
            let out = median_blur(&img, 3);
            prop_assert!(out.pixels().all(|p| p.0[0] >= min && p.0[0] <= max));
        }
    }
}
