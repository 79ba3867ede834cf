//! Panel capability: accept a composed frame, report success or failure
//!
//! Drivers are blocking; callers run them on the blocking pool.

pub mod epd;
#[cfg(feature = "hardware")]
pub mod linux;

use crate::config::FramePaths;
use crate::palette::Palette;
use image::RgbImage;
use png::{BitDepth, ColorType, Encoder};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("SPI bus error: {0}")]
    Bus(String),

    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("Panel still busy after {0:?}")]
    BusyTimeout(Duration),

    #[error("Frame is {actual:?}, panel needs {expected:?}")]
    Size {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Display unavailable: {0}")]
    Unavailable(String),
}

/// A color panel that can show one full frame at a time
pub trait DisplayDriver: Send {
    /// Wake and configure the panel
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Quantize `image` to `palette` and show it
    fn display(&mut self, image: &RgbImage, palette: &Palette) -> Result<(), DisplayError>;

    /// Put the panel into its lowest-power state
    fn sleep(&mut self) -> Result<(), DisplayError>;
}

/// Accepts every frame and shows nothing
#[derive(Debug, Default)]
pub struct MockDisplay;

impl DisplayDriver for MockDisplay {
    fn init(&mut self) -> Result<(), DisplayError> {
        tracing::debug!("Mock display init");
        Ok(())
    }

    fn display(&mut self, image: &RgbImage, _palette: &Palette) -> Result<(), DisplayError> {
        tracing::info!(
            "Mock display accepted {}x{} frame",
            image.width(),
            image.height()
        );
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// Writes each dithered frame as an indexed PNG, for benches without a panel
pub struct FileDisplay {
    path: PathBuf,
}

impl FileDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DisplayDriver for FileDisplay {
    fn init(&mut self) -> Result<(), DisplayError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn display(&mut self, image: &RgbImage, palette: &Palette) -> Result<(), DisplayError> {
        let indexed = palette.dither(image);
        let png = encode_indexed_png(&indexed, image.width(), image.height(), palette)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, png)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::info!("Wrote panel frame to {}", self.path.display());
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// Stands in for a panel that could not be opened; every call fails
pub struct UnavailableDisplay {
    reason: String,
}

impl UnavailableDisplay {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail(&self) -> Result<(), DisplayError> {
        Err(DisplayError::Unavailable(self.reason.clone()))
    }
}

impl DisplayDriver for UnavailableDisplay {
    fn init(&mut self) -> Result<(), DisplayError> {
        self.fail()
    }

    fn display(&mut self, _image: &RgbImage, _palette: &Palette) -> Result<(), DisplayError> {
        self.fail()
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.fail()
    }
}

/// Encode palette indices as an 8-bit indexed PNG
pub fn encode_indexed_png(
    indexed: &[u8],
    width: u32,
    height: u32,
    palette: &Palette,
) -> Result<Vec<u8>, DisplayError> {
    let mut output = Vec::new();

    {
        let mut encoder = Encoder::new(&mut output, width, height);
        encoder.set_color(ColorType::Indexed);
        encoder.set_depth(BitDepth::Eight);
        encoder.set_palette(palette.png_palette());

        let mut writer = encoder.write_header()?;
        writer.write_image_data(indexed)?;
    }

    Ok(output)
}

/// Which driver to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Mock,
    File,
    Epd,
}

impl DisplayKind {
    /// From `FRAME_DISPLAY` (mock | file | epd), defaulting to mock
    pub fn from_env() -> Self {
        match std::env::var("FRAME_DISPLAY")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "file" => DisplayKind::File,
            "epd" => DisplayKind::Epd,
            _ => DisplayKind::Mock,
        }
    }
}

/// Build the configured driver
pub fn open(kind: DisplayKind, paths: &FramePaths) -> Box<dyn DisplayDriver> {
    tracing::info!("Display driver: {:?}", kind);
    match kind {
        DisplayKind::Mock => Box::new(MockDisplay),
        DisplayKind::File => Box::new(FileDisplay::new(paths.panel_dump_file())),
        DisplayKind::Epd => open_panel(),
    }
}

#[cfg(feature = "hardware")]
fn open_panel() -> Box<dyn DisplayDriver> {
    match linux::open_waveshare() {
        Ok(panel) => Box::new(panel),
        Err(e) => {
            tracing::error!("Failed to open e-paper panel: {}", e);
            Box::new(UnavailableDisplay::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn open_panel() -> Box<dyn DisplayDriver> {
    tracing::error!("Built without the `hardware` feature, panel output disabled");
    Box::new(UnavailableDisplay::new("built without the `hardware` feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_display_writes_indexed_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static").join("panel.png");
        let mut display = FileDisplay::new(&path);
        let frame = RgbImage::from_pixel(40, 20, image::Rgb([0, 0, 255]));

        display.init().unwrap();
        display.display(&frame, &Palette::acep7()).unwrap();
        display.sleep().unwrap();

        let decoder = png::Decoder::new(std::fs::File::open(&path).unwrap());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (40, 20));
        assert_eq!(info.color_type, ColorType::Indexed);
        assert_eq!(info.palette.as_ref().unwrap().len(), 7 * 3);
    }

    #[test]
    fn test_unavailable_display_always_fails() {
        let mut display = UnavailableDisplay::new("no panel");
        let frame = RgbImage::new(2, 2);

        assert!(display.init().is_err());
        assert!(matches!(
            display.display(&frame, &Palette::acep7()),
            Err(DisplayError::Unavailable(_))
        ));
    }
}
