//! Pre-OCR normalization of images and PDFs

use crate::error::{ConsentLexError, Result};
use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;

/// Bytes to submit for OCR and their media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Grayscale the image and shrink it to fit `max_dimension`, re-encoded as PNG.
///
/// Returns `None` when the result would not improve on the original.
pub fn optimize_image(bytes: &[u8], max_dimension: u32) -> Result<Option<Optimized>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ConsentLexError::Extraction(format!("image could not be decoded: {e}")))?;
    let (width, height) = (img.width(), img.height());

    let mut gray = img.grayscale();
    let resized = max_dimension > 0 && width.max(height) > max_dimension;
    if resized {
        gray = gray.resize(max_dimension, max_dimension, FilterType::Triangle);
    }

    let mut out = Cursor::new(Vec::new());
    gray.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ConsentLexError::Extraction(format!("image could not be re-encoded: {e}")))?;
    let out = out.into_inner();

    tracing::debug!(
        width,
        height,
        new_width = gray.width(),
        new_height = gray.height(),
        before = bytes.len(),
        after = out.len(),
        "image optimized"
    );

    if resized || out.len() < bytes.len() {
        Ok(Some(Optimized {
            bytes: out,
            media_type: "image/png".to_string(),
        }))
    } else {
        Ok(None)
    }
}

/// Re-save a PDF with compressed streams and unused objects dropped.
///
/// Returns `None` when the result is not smaller.
pub fn optimize_pdf(bytes: &[u8]) -> Result<Option<Optimized>> {
    let mut doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ConsentLexError::Extraction(format!("PDF could not be parsed: {e}")))?;
    doc.prune_objects();
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ConsentLexError::Extraction(format!("PDF could not be re-saved: {e}")))?;

    tracing::debug!(before = bytes.len(), after = out.len(), "PDF optimized");
    if out.len() < bytes.len() {
        Ok(Some(Optimized {
            bytes: out,
            media_type: "application/pdf".to_string(),
        }))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_large_image_is_downscaled_to_grayscale() {
        let original = png(400, 100);
        let optimized = optimize_image(&original, 200).unwrap().unwrap();
        assert_eq!(optimized.media_type, "image/png");

        let decoded = image::load_from_memory(&optimized.bytes).unwrap();
        assert_eq!(decoded.width(), 200);
        assert_eq!(decoded.height(), 50);
        assert_eq!(decoded.color(), ColorType::L8);
    }

    #[test]
    fn test_undecodable_image_is_error() {
        assert!(optimize_image(b"\x89PNG\r\n\x1a\nbroken", 100).is_err());
    }

    #[test]
    fn test_pdf_garbage_is_error() {
        assert!(optimize_pdf(b"garbage, not a document").is_err());
    }
}
