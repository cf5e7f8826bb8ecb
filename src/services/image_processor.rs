// src/services/image_processor.rs
use crate::errors::StudioError;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use image::{GenericImageView, ImageFormat as ImgFormat};

const MAX_DIMENSION: u32 = 4096;
pub const UPLOAD_MAX_EDGE: u32 = 2048;

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDataUrl {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A file ready to be offered as a download.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), StudioError> {
        let img = image::load_from_memory(data)
            .map_err(|e| StudioError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        let (width, height) = img.dimensions();

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(StudioError::ImageProcessing(format!(
                "Image dimensions exceed {}x{}",
                MAX_DIMENSION, MAX_DIMENSION
            )));
        }
        if width == 0 || height == 0 {
            return Err(StudioError::ImageProcessing("Image is empty".to_string()));
        }

        Ok((width, height))
    }

    pub fn resize_if_needed(&self, data: &[u8], max_size: u32) -> Result<Vec<u8>, StudioError> {
        let img = image::load_from_memory(data)
            .map_err(|e| StudioError::ImageProcessing(format!("Failed to load image: {}", e)))?;

        let (width, height) = img.dimensions();

        if width <= max_size && height <= max_size {
            return Ok(data.to_vec());
        }

        let ratio = (max_size as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);

        let mut output = Vec::new();
        resized
            .write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Png)
            .map_err(|e| {
                StudioError::ImageProcessing(format!("Failed to encode resized image: {}", e))
            })?;

        Ok(output)
    }

    /// Validates an uploaded file, shrinks it if needed and returns a data URL.
    pub fn prepare_upload(&self, data: &[u8]) -> Result<String, StudioError> {
        self.validate_image(data)?;
        let processed = self.resize_if_needed(data, UPLOAD_MAX_EDGE)?;
        let mime_type = image::guess_format(&processed)
            .map(|f| mime_for_format(f).to_string())
            .unwrap_or_else(|_| "image/png".to_string());
        Ok(encode_data_url(&mime_type, &processed))
    }

    /// Intrinsic width / height of the image inside a data URL.
    pub fn aspect_ratio(&self, data_url: &str) -> Result<f64, StudioError> {
        let decoded = decode_data_url(data_url)?;
        let (width, height) = self.validate_image(&decoded.data)?;
        Ok(f64::from(width) / f64::from(height))
    }
}

pub fn encode_data_url(mime_type: &str, data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(data)
    )
}

pub fn decode_data_url(url: &str) -> Result<DecodedDataUrl, StudioError> {
    let (mime_type, payload) = split_data_url(url)?;
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };
    let data = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| StudioError::Validation(format!("Malformed data URL payload: {}", e)))?;
    if data.is_empty() {
        return Err(StudioError::Validation("Data URL is empty".to_string()));
    }
    Ok(DecodedDataUrl {
        mime_type: mime_type.to_string(),
        data,
    })
}

/// Splits a data URL into `(mime_type, base64 payload)` without decoding.
pub fn split_data_url(url: &str) -> Result<(&str, &str), StudioError> {
    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| StudioError::Validation("Not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| StudioError::Validation("Data URL has no payload".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| StudioError::Validation("Data URL is not base64 encoded".to_string()))?;
    Ok((mime_type, payload))
}

pub fn export(data_url: &str, prefix: &str, now: DateTime<Utc>) -> Result<ExportedFile, StudioError> {
    let decoded = decode_data_url(data_url)?;
    let prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let prefix = if prefix.is_empty() { "artboard".to_string() } else { prefix };
    let filename = format!(
        "{}-{}.{}",
        prefix,
        now.format("%Y%m%d-%H%M%S"),
        extension_for_mime(&decoded.mime_type)
    );
    Ok(ExportedFile {
        filename,
        mime_type: decoded.mime_type,
        data: decoded.data,
    })
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

fn mime_for_format(format: ImgFormat) -> &'static str {
    match format {
        ImgFormat::Jpeg => "image/jpeg",
        ImgFormat::WebP => "image/webp",
        ImgFormat::Gif => "image/gif",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255])))
            .write_to(&mut std::io::Cursor::new(&mut out), ImgFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn export_generates_timestamped_filename() {
        let url = encode_data_url("image/png", &png(2, 2));
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let file = export(&url, "poster", now).unwrap();
        assert_eq!(file.filename, "poster-20240305-140709.png");
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.data, png(2, 2));
    }

    #[test]
    fn malformed_data_urls_are_validation_errors() {
        for url in [
            "https://example.com/a.png",
            "data:image/png;base64",
            "data:image/png,plain",
            "data:image/png;base64,@@@",
            "data:image/png;base64,",
        ] {
            assert!(
                matches!(export(url, "x", Utc::now()), Err(StudioError::Validation(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn export_sanitizes_prefix() {
        let url = encode_data_url("image/jpeg", &[1, 2, 3]);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let file = export(&url, "../../", now).unwrap();
        assert_eq!(file.filename, "artboard-20240101-000000.jpg");
    }

    #[test]
    fn aspect_ratio_reads_intrinsic_size() {
        let processor = ImageProcessor::new();
        let url = encode_data_url("image/png", &png(40, 20));
        assert_eq!(processor.aspect_ratio(&url).unwrap(), 2.0);
    }

    #[test]
    fn large_uploads_are_downscaled() {
        let processor = ImageProcessor::new();
        let url = processor.prepare_upload(&png(3000, 1500)).unwrap();
        let decoded = decode_data_url(&url).unwrap();
        let (w, h) = processor.validate_image(&decoded.data).unwrap();
        assert!((2040..=UPLOAD_MAX_EDGE).contains(&w), "width {w}");
        assert!(h <= 1024 && h >= 1016, "height {h}");
    }

    #[test]
    fn garbage_upload_is_rejected() {
        let processor = ImageProcessor::new();
        assert!(matches!(
            processor.prepare_upload(b"not an image"),
            Err(StudioError::ImageProcessing(_))
        ));
    }
}
