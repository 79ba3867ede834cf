//! 7-color palette for the Waveshare 7.3" ACeP panel
//!
//! Uses OKLab color space for perceptually uniform color matching and
//! error diffusion.

/// RGB color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to OKLab color space
    pub fn to_oklab(&self) -> Oklab {
        Oklab::from_rgb(self.r, self.g, self.b)
    }
}

/// OKLab color representation for perceptually uniform operations
#[derive(Debug, Clone, Copy)]
pub struct Oklab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl Oklab {
    /// Convert sRGB byte to linear
    #[inline]
    fn srgb_to_linear(c: u8) -> f32 {
        let c = c as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    /// Convert from RGB to OKLab
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let r = Self::srgb_to_linear(r);
        let g = Self::srgb_to_linear(g);
        let b = Self::srgb_to_linear(b);

        let l = 0.4122214708 * r + 0.5363325363 * g + 0.0514459929 * b;
        let m = 0.2119034982 * r + 0.6806995451 * g + 0.1073969566 * b;
        let s = 0.0883024619 * r + 0.2817188376 * g + 0.6299787005 * b;

        let l_ = l.cbrt();
        let m_ = m.cbrt();
        let s_ = s.cbrt();

        Self {
            l: 0.2104542553 * l_ + 0.7936177850 * m_ - 0.0040720468 * s_,
            a: 1.9779984951 * l_ - 2.4285922050 * m_ + 0.4505937099 * s_,
            b: 0.0259040371 * l_ + 0.7827717662 * m_ - 0.8086757660 * s_,
        }
    }

    /// Squared distance to another OKLab color
    #[inline]
    pub fn distance_squared(&self, other: &Oklab) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        dl * dl + da * da + db * db
    }
}

/// Colors the panel can show, valued by their 4-bit hardware code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PanelColor {
    Black = 0,
    White = 1,
    Green = 2,
    Blue = 3,
    Red = 4,
    Yellow = 5,
    Orange = 6,
}

impl PanelColor {
    /// Nibble sent to the controller for this color
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// An ordered set of panel colors with their on-screen RGB approximations
#[derive(Debug, Clone)]
pub struct Palette {
    entries: Vec<(PanelColor, Rgb)>,
    /// Precomputed OKLab values for each entry
    oklab: Vec<Oklab>,
}

impl Palette {
    pub fn new(entries: Vec<(PanelColor, Rgb)>) -> Self {
        let oklab = entries.iter().map(|(_, rgb)| rgb.to_oklab()).collect();
        Self { entries, oklab }
    }

    /// Nominal 7-color ACeP palette
    pub fn acep7() -> Self {
        Self::new(vec![
            (PanelColor::Black, Rgb::new(0, 0, 0)),
            (PanelColor::White, Rgb::new(255, 255, 255)),
            (PanelColor::Red, Rgb::new(255, 0, 0)),
            (PanelColor::Green, Rgb::new(0, 255, 0)),
            (PanelColor::Blue, Rgb::new(0, 0, 255)),
            (PanelColor::Yellow, Rgb::new(255, 255, 0)),
            (PanelColor::Orange, Rgb::new(255, 165, 0)),
        ])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn color(&self, index: u8) -> PanelColor {
        self.entries[index as usize].0
    }

    /// Find nearest palette entry using OKLab perceptual distance
    #[inline]
    pub fn nearest(&self, color: &Oklab) -> u8 {
        let mut best_index = 0;
        let mut best_dist = f32::MAX;

        for (i, p) in self.oklab.iter().enumerate() {
            let dist = color.distance_squared(p);
            if dist < best_dist {
                best_dist = dist;
                best_index = i;
            }
        }

        best_index as u8
    }

    /// PNG palette bytes (RGB triplets) in entry order
    pub fn png_palette(&self) -> Vec<u8> {
        self.entries
            .iter()
            .flat_map(|(_, rgb)| [rgb.r, rgb.g, rgb.b])
            .collect()
    }

    /// Quantize an RGB image to palette entry indices with Sierra Lite
    /// error diffusion, carried out entirely in OKLab space.
    pub fn dither(&self, img: &image::RgbImage) -> Vec<u8> {
        let (width, height) = img.dimensions();
        let mut indexed = vec![0u8; (width * height) as usize];
        if self.is_empty() {
            return indexed;
        }

        // Working buffer in OKLab space for error accumulation
        let mut buffer: Vec<Oklab> = img
            .pixels()
            .map(|p| Oklab::from_rgb(p[0], p[1], p[2]))
            .collect();

        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize;
                let current = buffer[idx];

                let palette_idx = self.nearest(&current);
                indexed[idx] = palette_idx;
                let target = &self.oklab[palette_idx as usize];

                let err_l = current.l - target.l;
                let err_a = current.a - target.a;
                let err_b = current.b - target.b;

                //       * 2/4
                //   1/4 1/4
                let mut spread = |i: usize, weight: f32| {
                    buffer[i].l += err_l * weight;
                    buffer[i].a += err_a * weight;
                    buffer[i].b += err_b * weight;
                };

                if x + 1 < width {
                    spread(idx + 1, 0.5);
                }

                if y + 1 < height {
                    if x > 0 {
                        spread(idx + width as usize - 1, 0.25);
                    }
                    spread(idx + width as usize, 0.25);
                }
            }
        }

        indexed
    }

    /// Pack palette entry indices into the panel's 4bpp frame format:
    /// two pixels per byte, first pixel in the high nibble.
    pub fn pack_4bpp(&self, indexed: &[u8]) -> Vec<u8> {
        indexed
            .chunks(2)
            .map(|pair| {
                let hi = self.color(pair[0]).code();
                let lo = pair
                    .get(1)
                    .map(|&i| self.color(i).code())
                    .unwrap_or(PanelColor::White.code());
                (hi << 4) | lo
            })
            .collect()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::acep7()
    }
}
