//! Page rasterisation and pixmap encoding

use std::io::Cursor;

use image::{DynamicImage, RgbImage, RgbaImage};
use mupdf::{Colorspace, Matrix, Page, Pixmap};

use super::safe::page_rect;
use crate::document::{DocumentError, ImageFormat, Rect, Result};

/// Encode a MuPDF pixmap, returning `(bytes, width, height)`.
///
/// Rows are read through the pixmap stride, which may be wider than
/// `width * n`.
pub fn encode_pixmap(pixmap: &Pixmap, format: ImageFormat) -> Result<(Vec<u8>, u32, u32)> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let n = pixmap.n() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();

    if width == 0 || height == 0 || n < 3 {
        return Err(DocumentError::Image(format!(
            "unsupported pixmap {}x{} with {} components",
            width, height, n
        )));
    }

    let row_bytes = width as usize * n;
    if row_bytes > stride || samples.len() < stride * height as usize {
        return Err(DocumentError::Image("pixmap buffer shorter than stride".into()));
    }

    let has_alpha = n >= 4;
    let channels = if has_alpha { 4 } else { 3 };
    let mut buffer = Vec::with_capacity(width as usize * height as usize * channels);
    for row in samples.chunks(stride).take(height as usize) {
        for px in row[..row_bytes].chunks_exact(n) {
            buffer.extend_from_slice(&px[..channels]);
        }
    }

    let image = if has_alpha {
        RgbaImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8)
    }
    .ok_or_else(|| DocumentError::Image("failed to create image buffer".into()))?;

    let data = encode_image(image, format)?;
    Ok((data, width, height))
}

/// Encode a decoded image. JPEG has no alpha channel, so it gets RGB.
pub fn encode_image(image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    match format {
        ImageFormat::Png => {
            image.write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)?;
        }
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Jpeg)?;
        }
    }
    Ok(output)
}

/// Rasterise `page` at `scale`, returning `(bytes, width, height)`
pub fn rasterize(page: &Page, scale: f32, format: ImageFormat) -> Result<(Vec<u8>, u32, u32)> {
    let matrix = Matrix::new_scale(scale, scale);
    let pixmap = page
        .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
        .map_err(|e| DocumentError::Render(e.to_string()))?;
    encode_pixmap(&pixmap, format)
}

/// Scale that fits the page into `width` x `height` without distortion
pub fn fit_scale(page: &Rect, width: u32, height: u32) -> Result<f32> {
    if width == 0 || height == 0 {
        return Err(DocumentError::Render("thumbnail box is empty".into()));
    }
    if page.is_empty() {
        return Err(DocumentError::Render("page has no area".into()));
    }
    Ok((width as f32 / page.width).min(height as f32 / page.height))
}

/// Thumbnail rasterised into the box
pub fn rasterize_fit(
    page: &Page,
    width: u32,
    height: u32,
    format: ImageFormat,
) -> Result<(Vec<u8>, u32, u32)> {
    let bounds = page_rect(page)?;
    let scale = fit_scale(&bounds, width, height)?;
    rasterize(page, scale, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_image_formats() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 128])));
        let png = encode_image(img.clone(), ImageFormat::Png).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        let jpeg = encode_image(img, ImageFormat::Jpeg).unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn test_fit_scale_preserves_aspect() {
        let letter = Rect::new(0.0, 0.0, 612.0, 792.0);
        let s = fit_scale(&letter, 128, 128).unwrap();
        assert!((s - 128.0 / 792.0).abs() < 1e-6);
        assert!(612.0 * s <= 128.0);
        assert!(fit_scale(&letter, 0, 10).is_err());
    }
}
