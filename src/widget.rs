//! Info widget layout
//!
//! The widget is a rounded card drawn over the photo. Its content decides
//! the card size; the layout decides where the card goes. Whatever the
//! layout says, the card always lands fully inside the canvas.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Panel canvas size
pub const CANVAS_WIDTH: u32 = 800;
pub const CANVAS_HEIGHT: u32 = 480;

/// Distance from the canvas edge for anchored placement, before scaling
const EDGE_MARGIN: f32 = 20.0;

/// Gap left to the far edge when a requested position overflows
const OVERFLOW_MARGIN: i64 = 5;

const MIN_SCALE: f32 = 0.25;
const MAX_SCALE: f32 = 3.0;
const DEFAULT_OPACITY: f32 = 0.85;

/// Layout preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutKind {
    /// Bottom-right card
    #[serde(rename = "type_B")]
    TypeB,
    /// Card at explicit `x`/`y`
    #[serde(rename = "custom")]
    Custom,
    /// Top-right card; unknown presets fall back here
    #[default]
    #[serde(rename = "type_A", other)]
    TypeA,
}

/// Vertical anchor for the preset layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Anchor {
    #[serde(rename = "bottom")]
    Bottom,
    #[default]
    #[serde(rename = "top", other)]
    Top,
}

/// Layout section of the config document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSpec {
    #[serde(rename = "type")]
    pub kind: LayoutKind,
    /// Scale factor applied to every widget dimension
    #[serde(deserialize_with = "lenient_scale")]
    pub widget_size: f32,
    /// Card background opacity in [0, 1]
    #[serde(deserialize_with = "lenient_opacity")]
    pub opacity: f32,
    pub position: Anchor,
    #[serde(
        deserialize_with = "lenient_opt_f32",
        skip_serializing_if = "Option::is_none"
    )]
    pub x: Option<f32>,
    #[serde(
        deserialize_with = "lenient_opt_f32",
        skip_serializing_if = "Option::is_none"
    )]
    pub y: Option<f32>,
    /// Admin-layer keys this crate does not read (e.g. `font_size`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for LayoutSpec {
    fn default() -> Self {
        Self {
            kind: LayoutKind::TypeA,
            widget_size: 1.0,
            opacity: DEFAULT_OPACITY,
            position: Anchor::Top,
            x: None,
            y: None,
            extra: Map::new(),
        }
    }
}

impl LayoutSpec {
    /// Effective scale, clamped to a range that keeps the card drawable
    pub fn scale(&self) -> f32 {
        if self.widget_size.is_finite() {
            self.widget_size.clamp(MIN_SCALE, MAX_SCALE)
        } else {
            1.0
        }
    }

    /// Effective card opacity
    pub fn opacity(&self) -> f32 {
        if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            DEFAULT_OPACITY
        }
    }

    fn anchored_bottom(&self) -> bool {
        self.kind == LayoutKind::TypeB || self.position == Anchor::Bottom
    }
}

/// Final on-canvas rectangle of the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct WidgetBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl WidgetBox {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Place a card of the given content size on the canvas.
///
/// Presets anchor to the right edge, top or bottom. Custom layouts use the
/// requested origin. Any overflow is pulled back inside, and a card larger
/// than the canvas is shrunk to fit.
pub fn place_widget(layout: &LayoutSpec, width: u32, height: u32, canvas: (u32, u32)) -> WidgetBox {
    let (canvas_w, canvas_h) = canvas;
    let width = width.min(canvas_w);
    let height = height.min(canvas_h);
    let margin = (EDGE_MARGIN * layout.scale()) as i64;

    let mut x = canvas_w as i64 - width as i64 - margin;
    let mut y = margin;

    if layout.kind == LayoutKind::Custom {
        if let Some(requested) = layout.x {
            x = requested as i64;
        }
        if let Some(requested) = layout.y {
            y = requested as i64;
        }
    } else if layout.anchored_bottom() {
        y = canvas_h as i64 - height as i64 - margin;
    }

    WidgetBox {
        x: clamp_axis(x, width, canvas_w),
        y: clamp_axis(y, height, canvas_h),
        width,
        height,
    }
}

/// `size` must not exceed `extent`
fn clamp_axis(origin: i64, size: u32, extent: u32) -> u32 {
    let mut origin = origin;
    if origin.saturating_add(size as i64) > extent as i64 {
        origin = extent as i64 - size as i64 - OVERFLOW_MARGIN;
    }
    origin.max(0) as u32
}

/// `1.5` or `"1.5"`; the admin form posts numbers as strings
fn number(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|n| n as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A value that is not a number falls back to the field default, so one bad
/// form field never invalidates the whole document
fn lenient_scale<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value).unwrap_or(1.0))
}

fn lenient_opacity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value).unwrap_or(DEFAULT_OPACITY))
}

/// `null`, `""` and unparsable text mean unset
fn lenient_opt_f32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value))
}
