//! Frame compositor for the 800x480 panel
//!
//! - Load the photo (neutral placeholder if missing or corrupt)
//! - Resize to cover the canvas, center crop
//! - Enhance contrast, sharpness and color
//! - Draw the info widget on a translucent rounded card
//! - Alpha-composite the card over the photo
//!
//! Output depends only on the inputs; the render time is passed in.

use crate::airkorea::DustSnapshot;
use crate::config::FramePaths;
use crate::kma::{Condition, WeatherSnapshot};
use crate::text::{self, FontSet};
use crate::widget::{place_widget, LayoutSpec, WidgetBox, CANVAS_HEIGHT, CANVAS_WIDTH};
use chrono::NaiveDateTime;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::Path;

/// Shown when there is no usable photo
const PLACEHOLDER: Rgb<u8> = Rgb([200, 200, 200]);

const CONTRAST: f32 = 1.2;
const SHARPNESS: f32 = 1.5;
const SATURATION: f32 = 1.1;

/// Widget metrics at scale 1.0
const CARD_WIDTH: f32 = 200.0;
const PADDING: f32 = 15.0;
const LINE_SPACING: f32 = 5.0;
const CORNER_RADIUS: f32 = 20.0;
const ICON_SIZE: f32 = 50.0;
const DOT_RADIUS: f32 = 4.0;
const LARGE_FONT: f32 = 40.0;
const MEDIUM_FONT: f32 = 18.0;
const SMALL_FONT: f32 = 14.0;
/// Extra gap under the dust row
const DUST_ROW_GAP: u32 = 10;

const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const DESCRIPTION_INK: Rgba<u8> = Rgba([60, 60, 60, 255]);
const RAIN_INK: Rgba<u8> = Rgba([0, 0, 200, 255]);
const TIME_INK: Rgba<u8> = Rgba([100, 100, 100, 255]);
const NO_DUST_DOT: Rgba<u8> = Rgba([100, 100, 100, 255]);

/// Weather icons keyed by condition
pub struct WeatherIcons {
    icons: HashMap<Condition, RgbaImage>,
}

impl WeatherIcons {
    /// Load whichever condition icons exist in `dir`
    pub fn load(dir: &Path) -> Self {
        let mut icons = HashMap::new();
        for condition in Condition::ALL {
            let path = dir.join(condition.icon_file());
            if !path.is_file() {
                continue;
            }
            match image::open(&path) {
                Ok(icon) => {
                    icons.insert(condition, icon.to_rgba8());
                }
                Err(e) => tracing::warn!("Failed to load icon {}: {}", path.display(), e),
            }
        }
        tracing::debug!("Loaded {} weather icons", icons.len());
        Self { icons }
    }

    pub fn none() -> Self {
        Self {
            icons: HashMap::new(),
        }
    }

    fn get(&self, condition: Condition) -> Option<&RgbaImage> {
        self.icons
            .get(&condition)
            .or_else(|| self.icons.get(&Condition::Unknown))
    }
}

/// Fonts and icons, loaded once at startup
pub struct Assets {
    pub fonts: FontSet,
    pub icons: WeatherIcons,
}

impl Assets {
    pub fn load(paths: &FramePaths) -> Self {
        Self {
            fonts: FontSet::load(&paths.font_candidates()),
            icons: WeatherIcons::load(&paths.icons_dir()),
        }
    }

    pub fn none() -> Self {
        Self {
            fonts: FontSet::none(),
            icons: WeatherIcons::none(),
        }
    }
}

/// A composed frame and where its widget landed
pub struct Composition {
    pub image: RgbImage,
    pub widget: WidgetBox,
}

/// Compose the final panel image
pub fn compose(
    photo: Option<&Path>,
    weather: Option<&WeatherSnapshot>,
    dust: Option<&DustSnapshot>,
    layout: &LayoutSpec,
    location_name: &str,
    rendered_at: NaiveDateTime,
    assets: &Assets,
) -> Composition {
    let source = photo.and_then(load_photo);
    let base = match source {
        Some(img) => resize_cover(&img, CANVAS_WIDTH, CANVAS_HEIGHT),
        None => RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, PLACEHOLDER),
    };
    let base = enhance(&base);

    let metrics = Metrics::new(layout.scale());
    let content = WidgetContent::new(weather, dust, location_name, rendered_at, assets, &metrics);
    let height = content.height(&assets.fonts, &metrics);
    let widget = place_widget(layout, metrics.card_width, height, (CANVAS_WIDTH, CANVAS_HEIGHT));

    let card = draw_card(&content, &assets.fonts, &metrics, widget, layout.opacity());

    let mut canvas = DynamicImage::ImageRgb8(base).to_rgba8();
    image::imageops::overlay(&mut canvas, &card, widget.x as i64, widget.y as i64);

    Composition {
        image: DynamicImage::ImageRgba8(canvas).to_rgb8(),
        widget,
    }
}

fn load_photo(path: &Path) -> Option<DynamicImage> {
    let decoded = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| e.to_string())
        .and_then(|reader| reader.decode().map_err(|e| e.to_string()));

    match decoded {
        Ok(img) if img.width() > 0 && img.height() > 0 => Some(img),
        Ok(_) => {
            tracing::warn!("Photo {} is empty, using placeholder", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to load photo {}: {}, using placeholder", path.display(), e);
            None
        }
    }
}

/// Resize image to cover the target area and center crop the overflow.
/// Returns an image of exactly target_width x target_height
pub fn resize_cover(img: &DynamicImage, target_width: u32, target_height: u32) -> RgbImage {
    let (src_width, src_height) = img.dimensions();

    // Larger of the two scales so both dimensions are covered
    let scale_x = target_width as f32 / src_width as f32;
    let scale_y = target_height as f32 / src_height as f32;
    let scale = scale_x.max(scale_y);

    let new_width = ((src_width as f32 * scale).round() as u32).max(target_width);
    let new_height = ((src_height as f32 * scale).round() as u32).max(target_height);

    let resized = img
        .resize_exact(new_width, new_height, FilterType::Lanczos3)
        .to_rgb8();

    let crop_x = (new_width - target_width) / 2;
    let crop_y = (new_height - target_height) / 2;

    image::imageops::crop_imm(&resized, crop_x, crop_y, target_width, target_height).to_image()
}

/// Photo enhancement pass: contrast, then sharpness, then color
pub fn enhance(img: &RgbImage) -> RgbImage {
    let img = adjust_contrast(img, CONTRAST);
    let img = adjust_sharpness(&img, SHARPNESS);
    adjust_saturation(&img, SATURATION)
}

/// ITU-R 601-2 luma in 16-bit fixed point
#[inline]
fn luma(p: &Rgb<u8>) -> u8 {
    ((p[0] as u32 * 19595 + p[1] as u32 * 38470 + p[2] as u32 * 7471 + 0x8000) >> 16) as u8
}

/// Interpolate from `degenerate` toward (and past) `original`
#[inline]
fn extrapolate(degenerate: f32, original: u8, factor: f32) -> u8 {
    (degenerate + factor * (original as f32 - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Stretch channels away from the mean luma
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = img.pixels().len() as u64;
    if count == 0 {
        return img.clone();
    }
    let sum: u64 = img.pixels().map(|p| luma(p) as u64).sum();
    let mean = (sum as f64 / count as f64 + 0.5).floor() as f32;

    let mut out = img.clone();
    for p in out.pixels_mut() {
        for c in 0..3 {
            p[c] = extrapolate(mean, p[c], factor);
        }
    }
    out
}

/// Push channels away from the pixel's own gray level
pub fn adjust_saturation(img: &RgbImage, factor: f32) -> RgbImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let gray = luma(p) as f32;
        for c in 0..3 {
            p[c] = extrapolate(gray, p[c], factor);
        }
    }
    out
}

/// Push interior pixels away from a 3x3 smoothed copy; borders are kept
pub fn adjust_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    const KERNEL: [[f32; 3]; 3] = [[1.0, 1.0, 1.0], [1.0, 5.0, 1.0], [1.0, 1.0, 1.0]];
    const KERNEL_SUM: f32 = 13.0;

    let (width, height) = img.dimensions();
    let mut out = img.clone();
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0.0f32; 3];
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let p = img.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for c in 0..3 {
                        acc[c] += p[c] as f32 * weight;
                    }
                }
            }

            let original = img.get_pixel(x, y);
            let target = out.get_pixel_mut(x, y);
            for c in 0..3 {
                let smooth = (acc[c] / KERNEL_SUM).round();
                target[c] = extrapolate(smooth, original[c], factor);
            }
        }
    }
    out
}

/// Widget dimensions for one scale factor
struct Metrics {
    card_width: u32,
    padding: u32,
    line_spacing: u32,
    corner_radius: f32,
    icon_size: u32,
    dot_radius: f32,
    large: f32,
    medium: f32,
    small: f32,
}

impl Metrics {
    fn new(scale: f32) -> Self {
        Self {
            card_width: (CARD_WIDTH * scale) as u32,
            padding: (PADDING * scale) as u32,
            line_spacing: (LINE_SPACING * scale) as u32,
            corner_radius: (CORNER_RADIUS * scale).floor(),
            icon_size: ((ICON_SIZE * scale) as u32).max(1),
            dot_radius: (DOT_RADIUS * scale).max(2.0),
            large: LARGE_FONT * scale,
            medium: MEDIUM_FONT * scale,
            small: SMALL_FONT * scale,
        }
    }

    fn inner_width(&self) -> u32 {
        self.card_width.saturating_sub(2 * self.padding)
    }
}

/// Rows of the widget, resolved to text
struct WidgetContent {
    icon: Option<RgbaImage>,
    temperature: String,
    description: String,
    description_size: f32,
    rain: Option<String>,
    dust_label: String,
    dust_dot: Rgba<u8>,
    timestamp: String,
}

impl WidgetContent {
    fn new(
        weather: Option<&WeatherSnapshot>,
        dust: Option<&DustSnapshot>,
        location_name: &str,
        rendered_at: NaiveDateTime,
        assets: &Assets,
        metrics: &Metrics,
    ) -> Self {
        let fonts = &assets.fonts;
        let condition = weather.map(|w| w.condition).unwrap_or(Condition::Unknown);

        let icon = weather.and_then(|_| assets.icons.get(condition)).map(|icon| {
            image::imageops::resize(icon, metrics.icon_size, metrics.icon_size, FilterType::Lanczos3)
        });

        let temperature = match weather.and_then(|w| w.temperature) {
            Some(t) => format!("{}°", t.trunc() as i32),
            None => "--°".to_string(),
        };

        let description = condition.label().to_string();
        let description_size = fonts.fit_size(
            &description,
            metrics.inner_width(),
            &[metrics.medium, metrics.small],
        );

        let rain = weather.and_then(|w| match &w.rain_forecast {
            Some(forecast) => Some(format!("{} {:.1}mm", forecast.type_label(), forecast.amount_mm)),
            None if w.current_rain_mm > 0.0 => Some(format!("강수 {:.1}mm", w.current_rain_mm)),
            None => None,
        });

        let (dust_label, dust_dot) = match dust {
            Some(d) => {
                let grade = d.grade();
                (format!("미세먼지 {}", grade.label()), grade.color())
            }
            None => ("미세먼지 정보 없음".to_string(), NO_DUST_DOT),
        };

        let time = rendered_at.format("%m/%d %H:%M").to_string();
        let timestamp = match location_name.split_whitespace().last() {
            Some(place) => {
                let with_place = format!("{} · {}", time, place);
                if fonts.text_width(&with_place, metrics.small) <= metrics.inner_width() {
                    with_place
                } else {
                    time
                }
            }
            None => time,
        };

        Self {
            icon,
            temperature,
            description,
            description_size,
            rain,
            dust_label,
            dust_dot,
            timestamp,
        }
    }

    fn first_row_height(&self, fonts: &FontSet, metrics: &Metrics) -> u32 {
        let temp_h = fonts.text_height(&self.temperature, metrics.large);
        match &self.icon {
            Some(icon) => icon.height().max(temp_h),
            None => temp_h,
        }
    }

    /// Card height for these rows
    fn height(&self, fonts: &FontSet, metrics: &Metrics) -> u32 {
        let ls = metrics.line_spacing;
        let mut height = metrics.padding;
        height += self.first_row_height(fonts, metrics) + ls;
        height += fonts.text_height(&self.description, self.description_size) + 2 * ls;
        if let Some(rain) = &self.rain {
            height += fonts.text_height(rain, metrics.medium) + ls;
        }
        height += fonts.text_height(&self.dust_label, metrics.medium) + ls + DUST_ROW_GAP;
        height += fonts.text_height(&self.timestamp, metrics.small);
        height + metrics.padding
    }
}

/// Render the card in its own coordinates
fn draw_card(
    content: &WidgetContent,
    fonts: &FontSet,
    metrics: &Metrics,
    widget: WidgetBox,
    opacity: f32,
) -> RgbaImage {
    let mut card = RgbaImage::new(widget.width, widget.height);
    let alpha = (255.0 * opacity) as u8;
    fill_rounded_rect(&mut card, metrics.corner_radius, Rgba([255, 255, 255, alpha]));

    let ls = metrics.line_spacing as i32;
    let x = metrics.padding as i32;
    let mut y = metrics.padding as i32;

    // Icon + temperature
    let temp_h = fonts.text_height(&content.temperature, metrics.large) as i32;
    match &content.icon {
        Some(icon) => {
            paste(&mut card, icon, x, y);
            let icon_h = icon.height() as i32;
            let temp_x = x + icon.width() as i32 + 10;
            let temp_y = y + (icon_h - temp_h) / 2 - 5;
            fonts.draw(&mut card, &content.temperature, metrics.large, temp_x, temp_y, INK);
        }
        None => fonts.draw(&mut card, &content.temperature, metrics.large, x, y, INK),
    }
    y += content.first_row_height(fonts, metrics) as i32 + ls;

    fonts.draw(
        &mut card,
        &content.description,
        content.description_size,
        x + 5,
        y,
        DESCRIPTION_INK,
    );
    y += fonts.text_height(&content.description, content.description_size) as i32 + 2 * ls;

    if let Some(rain) = &content.rain {
        fonts.draw(&mut card, rain, metrics.medium, x + 5, y, RAIN_INK);
        y += fonts.text_height(rain, metrics.medium) as i32 + ls;
    }

    let dot_center = (x as f32 + 5.0 + metrics.dot_radius, y as f32 + 10.0);
    fill_circle(&mut card, dot_center, metrics.dot_radius, content.dust_dot);
    fonts.draw(&mut card, &content.dust_label, metrics.medium, x + 20, y, INK);
    y += fonts.text_height(&content.dust_label, metrics.medium) as i32 + ls + DUST_ROW_GAP as i32;

    fonts.draw(&mut card, &content.timestamp, metrics.small, x + 5, y, TIME_INK);

    card
}

/// Fill the whole image with a rounded rectangle, corners left transparent
fn fill_rounded_rect(img: &mut RgbaImage, radius: f32, color: Rgba<u8>) {
    let (width, height) = img.dimensions();
    let radius = radius.min(width as f32 / 2.0).min(height as f32 / 2.0).max(0.0);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        // Distance into the corner region, zero along the straight edges
        let dx = (radius - px).max(px - (width as f32 - radius)).max(0.0);
        let dy = (radius - py).max(py - (height as f32 - radius)).max(0.0);
        if dx * dx + dy * dy <= radius * radius {
            *pixel = color;
        }
    }
}

fn fill_circle(img: &mut RgbaImage, center: (f32, f32), radius: f32, color: Rgba<u8>) {
    let (cx, cy) = center;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        if dx * dx + dy * dy <= radius * radius {
            *pixel = color;
        }
    }
}

/// Paste `src` at (`x`, `y`) using its own alpha as the mask
fn paste(dst: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    let (width, height) = dst.dimensions();
    for (sx, sy, p) in src.enumerate_pixels() {
        let (dx, dy) = (x + sx as i32, y + sy as i32);
        if dx < 0 || dy < 0 || dx as u32 >= width || dy as u32 >= height {
            continue;
        }
        let target = dst.get_pixel_mut(dx as u32, dy as u32);
        *target = text::blend(*target, Rgba([p[0], p[1], p[2], 255]), p[3] as f32 / 255.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kma::RainForecast;
    use crate::widget::LayoutKind;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn weather() -> WeatherSnapshot {
        WeatherSnapshot {
            temperature: Some(21.7),
            condition: Condition::Rain,
            rain_forecast: Some(RainForecast {
                amount_mm: 2.5,
                start: "13:00".to_string(),
                end: "14:00".to_string(),
                type_code: 1,
            }),
            current_rain_mm: 0.0,
        }
    }

    fn dust() -> DustSnapshot {
        DustSnapshot {
            pm10: 20,
            pm25: 40,
            observed_at: String::new(),
        }
    }

    #[test]
    fn test_resize_cover_dimensions() {
        let wide = DynamicImage::ImageRgb8(RgbImage::from_pixel(1600, 600, Rgb([10, 20, 30])));
        let tall = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 900, Rgb([10, 20, 30])));
        let tiny = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([10, 20, 30])));

        for img in [wide, tall, tiny] {
            let out = resize_cover(&img, CANVAS_WIDTH, CANVAS_HEIGHT);
            assert_eq!(out.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        }
    }

    #[test]
    fn test_enhance_keeps_flat_gray() {
        let img = RgbImage::from_pixel(8, 8, PLACEHOLDER);
        assert_eq!(enhance(&img), img);
    }

    #[test]
    fn test_contrast_stretches_from_mean() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([200, 200, 200]));

        let out = adjust_contrast(&img, CONTRAST);
        // mean luma 150
        assert_eq!(out.get_pixel(0, 0), &Rgb([90, 90, 90]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([210, 210, 210]));
    }

    #[test]
    fn test_sharpness_keeps_border() {
        let mut img = RgbImage::from_pixel(5, 5, Rgb([0, 0, 0]));
        img.put_pixel(2, 2, Rgb([130, 130, 130]));
        img.put_pixel(0, 0, Rgb([77, 77, 77]));

        let out = adjust_sharpness(&img, SHARPNESS);
        assert_eq!(out.get_pixel(0, 0), &Rgb([77, 77, 77]));
        // smoothed center: 130 * 5 / 13 = 50; 50 + 1.5 * (130 - 50) = 170
        assert_eq!(out.get_pixel(2, 2), &Rgb([170, 170, 170]));
    }

    #[test]
    fn test_missing_photo_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("broken.jpg");
        std::fs::write(&corrupt, b"not really a jpeg").unwrap();

        let gone = dir.path().join("gone.jpg");

        let assets = Assets::none();
        let layout = LayoutSpec::default();
        for photo in [None, Some(corrupt.as_path()), Some(gone.as_path())] {
            let frame = compose(photo, None, None, &layout, "고덕동", noon(), &assets);
            assert_eq!(frame.image.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
            // top-left is far from the top-right widget
            assert_eq!(frame.image.get_pixel(0, 0), &PLACEHOLDER);
        }
    }

    #[test]
    fn test_compose_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.png");
        let mut img = RgbImage::new(320, 240);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
        img.save(&photo).unwrap();

        let assets = Assets::none();
        let layout = LayoutSpec::default();
        let w = weather();
        let d = dust();

        let first = compose(Some(photo.as_path()), Some(&w), Some(&d), &layout, "경기도 평택시 고덕동", noon(), &assets);
        let second = compose(Some(photo.as_path()), Some(&w), Some(&d), &layout, "경기도 평택시 고덕동", noon(), &assets);

        assert_eq!(first.widget, second.widget);
        assert_eq!(first.image.as_raw(), second.image.as_raw());
    }

    #[test]
    fn test_widget_stays_inside_canvas() {
        let assets = Assets::none();
        let w = weather();
        let d = dust();

        let layouts = [
            LayoutSpec::default(),
            LayoutSpec {
                kind: LayoutKind::TypeB,
                widget_size: 3.0,
                ..LayoutSpec::default()
            },
            LayoutSpec {
                kind: LayoutKind::Custom,
                x: Some(10_000.0),
                y: Some(-500.0),
                widget_size: 2.0,
                ..LayoutSpec::default()
            },
            LayoutSpec {
                kind: LayoutKind::Custom,
                x: Some(-1.0),
                y: Some(479.0),
                widget_size: 0.01,
                ..LayoutSpec::default()
            },
        ];

        for layout in &layouts {
            let frame = compose(None, Some(&w), Some(&d), layout, "고덕동", noon(), &assets);
            assert!(frame.widget.right() <= CANVAS_WIDTH, "{:?}", frame.widget);
            assert!(frame.widget.bottom() <= CANVAS_HEIGHT, "{:?}", frame.widget);
        }
    }

    #[test]
    fn test_card_is_translucent_white() {
        let assets = Assets::none();
        let frame = compose(None, None, None, &LayoutSpec::default(), "", noon(), &assets);
        let widget = frame.widget;

        // left padding, halfway down: inside the card, clear of every row
        let inside = frame.image.get_pixel(widget.x + 2, widget.y + widget.height / 2);
        assert!(inside[0] > 240, "{:?}", inside);

        // corner pixel falls outside the rounded rect
        assert_eq!(frame.image.get_pixel(widget.x, widget.y), &PLACEHOLDER);
    }

    #[test]
    fn test_rows_drive_height() {
        let assets = Assets::none();
        let metrics = Metrics::new(1.0);
        let with_rain = WidgetContent::new(Some(&weather()), Some(&dust()), "", noon(), &assets, &metrics);
        let mut dry_weather = weather();
        dry_weather.rain_forecast = None;
        let dry = WidgetContent::new(Some(&dry_weather), Some(&dust()), "", noon(), &assets, &metrics);

        assert_eq!(with_rain.rain.as_deref(), Some("비 2.5mm"));
        assert_eq!(dry.rain, None);
        assert_eq!(with_rain.temperature, "21°");
        assert_eq!(with_rain.dust_label, "미세먼지 나쁨");
        assert!(with_rain.height(&assets.fonts, &metrics) > dry.height(&assets.fonts, &metrics));

        let empty = WidgetContent::new(None, None, "", noon(), &assets, &metrics);
        assert_eq!(empty.temperature, "--°");
        assert_eq!(empty.dust_label, "미세먼지 정보 없음");
        assert_eq!(empty.timestamp, "05/01 12:00");
    }
}
