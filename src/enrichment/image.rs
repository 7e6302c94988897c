//! Image validation for fetched artwork.
//!
//! Every image a provider proposes is downloaded and checked here before the
//! URL is applied or queued for review. Checks run cheapest first: declared
//! content type, size, sniffed format, dimensions, full decode.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};
use tracing::debug;

use super::domain::{EnrichmentError, ImageKind, ImageRejection};

/// Default limit for artwork
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
/// Limit for profile pictures
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Facts about an image that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

/// Validates downloaded image bytes against a size limit.
#[derive(Debug, Clone, Copy)]
pub struct ImageValidator {
    max_bytes: usize,
}

impl ImageValidator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Covers, backgrounds
    pub fn general() -> Self {
        Self::new(MAX_IMAGE_BYTES)
    }

    /// Profile pictures
    pub fn avatar() -> Self {
        Self::new(MAX_AVATAR_BYTES)
    }

    /// Validator for an image kind
    pub fn for_kind(kind: ImageKind) -> Self {
        match kind {
            ImageKind::Profile => Self::avatar(),
            ImageKind::Background | ImageKind::Cover => Self::general(),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn validate(
        &self,
        bytes: &[u8],
        declared_mime: &str,
    ) -> Result<ValidatedImage, EnrichmentError> {
        let mime_type = normalize_mime(declared_mime);
        if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
            debug!(mime = %declared_mime, "Rejecting image content type");
            return Err(EnrichmentError::image(ImageRejection::InvalidContentType));
        }

        if bytes.len() > self.max_bytes {
            debug!(size = bytes.len(), max = self.max_bytes, "Rejecting oversized image");
            return Err(EnrichmentError::image(ImageRejection::FileTooLarge));
        }

        let format = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.format())
            .ok_or(EnrichmentError::image(ImageRejection::InvalidImage))?;

        // The bytes decide, not the header: a PNG served as image/jpeg is fine,
        // a GIF served as image/png is not.
        let sniffed_mime = match format {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            other => {
                debug!(format = ?other, "Rejecting unsupported image format");
                return Err(EnrichmentError::image(ImageRejection::InvalidContentType));
            }
        };

        let (width, height) = reader(bytes, format)
            .into_dimensions()
            .map_err(|_| EnrichmentError::image(ImageRejection::InvalidDimensions))?;
        if width == 0 || height == 0 {
            return Err(EnrichmentError::image(ImageRejection::InvalidDimensions));
        }

        reader(bytes, format)
            .decode()
            .map_err(|_| EnrichmentError::image(ImageRejection::InvalidImage))?;

        Ok(ValidatedImage {
            mime_type: sniffed_mime.to_string(),
            width,
            height,
            size_bytes: bytes.len(),
        })
    }
}

fn reader(bytes: &[u8], format: ImageFormat) -> ImageReader<Cursor<&[u8]>> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    reader.set_format(format);
    reader
}

/// Lowercase, drop parameters, fold `image/jpg` into `image/jpeg`
fn normalize_mime(mime: &str) -> String {
    let base = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::traits::mocks::tiny_png;

    fn rejection(result: Result<ValidatedImage, EnrichmentError>) -> ImageRejection {
        match result {
            Err(EnrichmentError::ImageProcessing { reason }) => reason,
            other => panic!("expected image rejection, got {:?}", other),
        }
    }

    fn tiny_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 6, image::Rgb([10, 120, 200]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_valid_png() {
        let validated = ImageValidator::general()
            .validate(&tiny_png(), "image/png")
            .unwrap();
        assert_eq!(validated.mime_type, "image/png");
        assert_eq!((validated.width, validated.height), (4, 4));
    }

    #[test]
    fn test_valid_jpeg_with_charset_param() {
        let validated = ImageValidator::general()
            .validate(&tiny_jpeg(), "image/JPG; charset=binary")
            .unwrap();
        assert_eq!(validated.mime_type, "image/jpeg");
        assert_eq!(validated.width, 8);
    }

    #[test]
    fn test_rejects_disallowed_content_type() {
        let result = ImageValidator::general().validate(&tiny_png(), "image/gif");
        assert_eq!(rejection(result), ImageRejection::InvalidContentType);

        let result = ImageValidator::general().validate(&tiny_png(), "text/html");
        assert_eq!(rejection(result), ImageRejection::InvalidContentType);
    }

    #[test]
    fn test_rejects_15mb_jpeg() {
        let mut bytes = tiny_jpeg();
        bytes.resize(15 * 1024 * 1024, 0);
        let result = ImageValidator::general().validate(&bytes, "image/jpeg");
        assert_eq!(rejection(result), ImageRejection::FileTooLarge);
    }

    #[test]
    fn test_avatar_limit_is_lower() {
        let mut bytes = tiny_png();
        bytes.resize(6 * 1024 * 1024, 0);
        assert_eq!(
            rejection(ImageValidator::avatar().validate(&bytes, "image/png")),
            ImageRejection::FileTooLarge
        );
        assert_eq!(ImageValidator::for_kind(ImageKind::Cover).max_bytes(), MAX_IMAGE_BYTES);
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let result = ImageValidator::general().validate(b"<html>not found</html>", "image/png");
        assert_eq!(rejection(result), ImageRejection::InvalidImage);
    }

    #[test]
    fn test_rejects_truncated_header() {
        // PNG signature and nothing else
        let bytes = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let result = ImageValidator::general().validate(&bytes, "image/png");
        assert_eq!(rejection(result), ImageRejection::InvalidDimensions);
    }

    #[test]
    fn test_rejects_gif_served_as_png() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        let result = ImageValidator::general().validate(gif, "image/png");
        assert_eq!(rejection(result), ImageRejection::InvalidContentType);
    }
}
