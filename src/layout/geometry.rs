// src/layout/geometry.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub const CANVAS_EXTENT: f64 = 100.0;
pub const MIN_SIZE: f64 = 5.0;
pub const FALLBACK_CANVAS_RATIO: f64 = 16.0 / 9.0;
const FALLBACK_CANVAS: &str = "16:9";
pub const MIN_CANVAS_RATIO: f64 = 0.25;
pub const MAX_CANVAS_RATIO: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Translates the rect, stopping at the canvas edges.
    pub fn moved_by(self, dx: f64, dy: f64) -> Self {
        let rect = clamp_rect(self);
        clamp_rect(Self {
            x: (rect.x + finite_or(dx, 0.0)).clamp(0.0, CANVAS_EXTENT - rect.width),
            y: (rect.y + finite_or(dy, 0.0)).clamp(0.0, CANVAS_EXTENT - rect.height),
            ..rect
        })
    }

    /// Grows the far edges by the given deltas. When `lock` carries
    /// `(canvas_ratio, image_ratio)` the height is derived from the width.
    pub fn resized_by(self, dx: f64, dy: f64, lock: Option<(f64, f64)>) -> Self {
        let rect = clamp_rect(self);
        let resized = Self {
            width: (rect.width + finite_or(dx, 0.0)).clamp(MIN_SIZE, CANVAS_EXTENT - rect.x),
            height: (rect.height + finite_or(dy, 0.0)).clamp(MIN_SIZE, CANVAS_EXTENT - rect.y),
            ..rect
        };
        match lock {
            Some((canvas_ratio, image_ratio)) => resized.with_aspect_lock(canvas_ratio, image_ratio),
            None => clamp_rect(resized),
        }
    }

    /// Recomputes the height from the width so the pixel aspect matches
    /// `image_ratio` on a canvas of `canvas_ratio`. When the derived height
    /// does not fit, height is capped and width follows it instead.
    pub fn with_aspect_lock(self, canvas_ratio: f64, image_ratio: f64) -> Self {
        if !valid_ratio(canvas_ratio) || !valid_ratio(image_ratio) {
            return clamp_rect(self);
        }
        let rect = clamp_rect(self);
        let mut width = rect.width;
        let mut height = locked_height(width, canvas_ratio, image_ratio);

        let max_height = CANVAS_EXTENT - rect.y;
        if height > max_height {
            height = max_height;
            width = height * image_ratio / canvas_ratio;
        }
        if height < MIN_SIZE {
            height = MIN_SIZE;
            width = height * image_ratio / canvas_ratio;
        }
        clamp_rect(Self {
            width,
            height,
            ..rect
        })
    }
}

/// Height (in percent) that keeps an image of `image_ratio` undistorted when
/// it is `width` percent wide on a canvas of `canvas_ratio`.
pub fn locked_height(width: f64, canvas_ratio: f64, image_ratio: f64) -> f64 {
    (width * canvas_ratio) / image_ratio
}

/// Clips a rect into the canvas, never below the minimum visible size.
pub fn clamp_rect(rect: Rect) -> Rect {
    let x = finite_or(rect.x, 0.0).clamp(0.0, CANVAS_EXTENT - MIN_SIZE);
    let y = finite_or(rect.y, 0.0).clamp(0.0, CANVAS_EXTENT - MIN_SIZE);
    Rect {
        x,
        y,
        width: finite_or(rect.width, MIN_SIZE).clamp(MIN_SIZE, CANVAS_EXTENT - x),
        height: finite_or(rect.height, MIN_SIZE).clamp(MIN_SIZE, CANVAS_EXTENT - y),
    }
}

/// Parses `"W:H"` into `W / H`, falling back to 16:9 on anything malformed
/// or outside the supported band.
pub fn parse_canvas_ratio(ratio: &str) -> f64 {
    checked_canvas_ratio(ratio).unwrap_or(FALLBACK_CANVAS_RATIO)
}

fn checked_canvas_ratio(ratio: &str) -> Option<f64> {
    let (w, h) = ratio.split_once(':')?;
    let w = w.trim().parse::<f64>().ok().filter(|v| valid_ratio(*v))?;
    let h = h.trim().parse::<f64>().ok().filter(|v| valid_ratio(*v))?;
    canvas_ratio_in_band(w / h)
}

/// `ratio` when it lies within 1:4 ..= 4:1.
pub fn canvas_ratio_in_band(ratio: f64) -> Option<f64> {
    (ratio.is_finite() && (MIN_CANVAS_RATIO..=MAX_CANVAS_RATIO).contains(&ratio)).then_some(ratio)
}

fn valid_ratio(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Subject,
    Text,
    Decor,
    Logo,
}

/// Presentation theme for an element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementTheme {
    pub label: &'static str,
    pub color: &'static str,
}

impl ElementKind {
    pub fn theme(self) -> ElementTheme {
        match self {
            ElementKind::Subject => ElementTheme {
                label: "Subject",
                color: "#3b82f6",
            },
            ElementKind::Text => ElementTheme {
                label: "Text",
                color: "#ef4444",
            },
            ElementKind::Decor => ElementTheme {
                label: "Decor",
                color: "#22c55e",
            },
            ElementKind::Logo => ElementTheme {
                label: "Logo",
                color: "#eab308",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutElement {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub color: String,
    pub rect: Rect,
    #[serde(rename = "imageRatio", default, skip_serializing_if = "Option::is_none")]
    pub image_ratio: Option<f64>,
    /// Attached reference image (data URL). Shared between history snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Arc<str>>,
}

impl LayoutElement {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ElementKind, rect: Rect) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            color: kind.theme().color.to_string(),
            rect: clamp_rect(rect),
            image_ratio: None,
            image: None,
        }
    }

    /// `(canvas_ratio, image_ratio)` when this element's aspect is locked.
    pub fn aspect_lock(&self, canvas_ratio: f64) -> Option<(f64, f64)> {
        self.image_ratio
            .filter(|r| valid_ratio(*r))
            .map(|r| (canvas_ratio, r))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSuggestion {
    pub canvas_ratio: String,
    #[serde(default)]
    pub elements: Vec<LayoutElement>,
}

impl LayoutSuggestion {
    /// Brings a suggestion from the AI in line with the canvas invariant and
    /// fills in missing colors and duplicate ids.
    pub fn normalized(mut self) -> Self {
        if checked_canvas_ratio(&self.canvas_ratio).is_none() {
            self.canvas_ratio = FALLBACK_CANVAS.to_string();
        }
        let taken: HashSet<String> = self.elements.iter().map(|e| e.id.clone()).collect();
        let mut seen = HashSet::new();
        for (index, element) in self.elements.iter_mut().enumerate() {
            element.rect = clamp_rect(element.rect);
            if element.color.trim().is_empty() {
                element.color = element.kind.theme().color.to_string();
            }
            if element.id.trim().is_empty() || !seen.insert(element.id.clone()) {
                let id = (index + 1..)
                    .map(|n| format!("element-{}", n))
                    .find(|id| !taken.contains(id) && !seen.contains(id))
                    .unwrap_or_default();
                seen.insert(id.clone());
                element.id = id;
            }
        }
        self
    }
}
