// src/layout/mask.rs

use super::geometry::{CANVAS_EXTENT, FALLBACK_CANVAS_RATIO, LayoutElement, canvas_ratio_in_band};
use crate::errors::StudioError;
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, ImageFormat as ImgFormat, Rgba, RgbaImage};

pub const DEFAULT_MASK_WIDTH: u32 = 1024;
/// Upper bound on either mask dimension.
pub const MAX_MASK_EDGE: u32 = 4096;
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone, PartialEq)]
pub struct MaskImage {
    pixels: RgbaImage,
}

impl MaskImage {
    #[cfg(test)]
    pub(crate) fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[cfg(test)]
    pub(crate) fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[cfg(test)]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    #[cfg(test)]
    pub(crate) fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, StudioError> {
        let mut output = Vec::new();
        DynamicImage::ImageRgba8(self.pixels.clone())
            .write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Png)
            .map_err(|e| StudioError::ImageProcessing(format!("Failed to encode mask: {}", e)))?;
        Ok(output)
    }

    pub fn to_data_url(&self) -> Result<String, StudioError> {
        let png = self.to_png()?;
        Ok(format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(png)
        ))
    }
}

/// Paints each element as an opaque rectangle over a black canvas, in
/// sequence order, so later elements cover earlier ones.
pub fn rasterize(elements: &[LayoutElement], canvas_ratio: f64, target_width: u32) -> MaskImage {
    let width = target_width.clamp(1, MAX_MASK_EDGE);
    let ratio = canvas_ratio_in_band(canvas_ratio).unwrap_or(FALLBACK_CANVAS_RATIO);
    let height = ((f64::from(width) / ratio).round() as u32).clamp(1, MAX_MASK_EDGE);

    let mut pixels = RgbaImage::from_pixel(width, height, BACKGROUND);
    for element in elements {
        let color = parse_color(&element.color)
            .or_else(|| parse_color(element.kind.theme().color))
            .unwrap_or(Rgba([255, 255, 255, 255]));

        let x0 = to_pixels(element.rect.x, width);
        let x1 = to_pixels(element.rect.right(), width);
        let y0 = to_pixels(element.rect.y, height);
        let y1 = to_pixels(element.rect.bottom(), height);

        for y in y0..y1 {
            for x in x0..x1 {
                pixels.put_pixel(x, y, color);
            }
        }
    }

    MaskImage { pixels }
}

fn to_pixels(percent: f64, dimension: u32) -> u32 {
    let px = (percent / CANVAS_EXTENT * f64::from(dimension)).round();
    px.clamp(0.0, f64::from(dimension)) as u32
}

/// Parses `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)` and `rgba(..)`. Alpha is
/// dropped: mask colors are always opaque.
pub fn parse_color(raw: &str) -> Option<Rgba<u8>> {
    let value = raw.trim().to_ascii_lowercase();

    if let Some(hex) = value.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    rgb[i] = v * 16 + v;
                }
                Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
            }
            6 | 8 => Some(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            ])),
            _ => None,
        };
    }

    let args = value
        .strip_prefix("rgba(")
        .or_else(|| value.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
    };
    Some(Rgba([
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        255,
    ]))
}
