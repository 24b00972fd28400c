// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image preparation for the vision model: bound, convert, base64

use base64::{engine::general_purpose, Engine as _};
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::Result;

/// Longest side sent to the provider unless configured otherwise
pub const MAX_IMAGE_DIMENSION: u32 = 1920;

/// MIME type used when the extension gives no usable hint
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// Extensions accepted as input photographs
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "webp"];

/// Check whether a path looks like a photograph we accept
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Base64 image ready to be inlined in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub encoded_data: String,
    pub mime_type: String,
}

impl ImagePayload {
    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.encoded_data)
    }
}

/// Turns an image file into an [`ImagePayload`]
pub trait PayloadEncoder: Send + Sync {
    fn encode(&self, path: &Path) -> Result<ImagePayload>;
}

/// Default encoder backed by the `image` crate
#[derive(Debug, Clone)]
pub struct ImageEncoder {
    max_dimension: u32,
}

impl ImageEncoder {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    /// Pick the MIME type and output format from the file extension.
    ///
    /// Anything that does not map to a format we can write goes out as JPEG.
    pub fn target_format(path: &Path) -> (String, ImageFormat) {
        mime_guess::from_path(path)
            .first_raw()
            .and_then(|mime| format_for_mime(mime).map(|format| (mime.to_string(), format)))
            .unwrap_or_else(|| (FALLBACK_MIME_TYPE.to_string(), ImageFormat::Jpeg))
    }

    /// Downsample so neither side exceeds the bound; smaller images pass through
    pub fn fit(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width <= self.max_dimension && height <= self.max_dimension {
            return img;
        }

        let resized = img.resize(
            self.max_dimension,
            self.max_dimension,
            image::imageops::FilterType::Triangle,
        );
        debug!(
            "Resized image {}x{} -> {}x{}",
            width,
            height,
            resized.width(),
            resized.height()
        );
        resized
    }
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::new(MAX_IMAGE_DIMENSION)
    }
}

impl PayloadEncoder for ImageEncoder {
    fn encode(&self, path: &Path) -> Result<ImagePayload> {
        let img = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(image::ImageError::IoError)?
            .decode()?;

        let (mime_type, format) = Self::target_format(path);
        let img = normalize_color(self.fit(img), format);

        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format)?;
        let bytes = buffer.into_inner();

        debug!("Encoded {:?} as {} ({} bytes)", path, mime_type, bytes.len());

        Ok(ImagePayload {
            encoded_data: general_purpose::STANDARD.encode(&bytes),
            mime_type,
        })
    }
}

fn format_for_mime(mime: &str) -> Option<ImageFormat> {
    match mime {
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/bmp" => Some(ImageFormat::Bmp),
        "image/tiff" => Some(ImageFormat::Tiff),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Convert to a colour layout the target encoder accepts.
///
/// JPEG has no alpha or palette, so everything but L8/RGB8 becomes RGB8.
fn normalize_color(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    let color = img.color();
    match format {
        ImageFormat::Jpeg => match color {
            ColorType::L8 | ColorType::Rgb8 => img,
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        ImageFormat::WebP => match color {
            ColorType::Rgb8 | ColorType::Rgba8 => img,
            c if c.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        ImageFormat::Bmp => match color {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => img,
            c if c.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        _ => img,
    }
}
