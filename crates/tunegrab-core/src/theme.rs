//! Accent colour derived from a thumbnail.
//!
//! Works on an already-decoded RGBA8 buffer (e.g. the thumbnail scaled to
//! 64x64): average every 4th pixel, then brighten slightly.

/// Brightness boost applied to the averaged colour.
const VIBRANCY_BOOST: f64 = 1.05;
/// Sample one pixel out of this many.
const PIXEL_STRIDE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Dominant colour of an RGBA8 buffer; `None` if it holds no complete pixel.
///
/// ```
/// use tunegrab_core::theme::{dominant_color, Accent};
///
/// // A 4x4 thumbnail in a single colour.
/// let pixels = [200u8, 100, 50, 255].repeat(16);
/// let accent = Accent::new(dominant_color(&pixels).unwrap());
/// assert_eq!(accent.css(), "rgb(210, 105, 53)");
/// assert_eq!(accent.chart_fill(), "rgba(210,105,53,0.15)");
/// ```
pub fn dominant_color(rgba: &[u8]) -> Option<Rgb> {
    let (mut r, mut g, mut b, mut count) = (0u64, 0u64, 0u64, 0u64);
    for px in rgba.chunks_exact(4).step_by(PIXEL_STRIDE) {
        r += u64::from(px[0]);
        g += u64::from(px[1]);
        b += u64::from(px[2]);
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let channel = |sum: u64| {
        let avg = (sum as f64 / count as f64).round();
        (avg * VIBRANCY_BOOST).round().min(255.0) as u8
    };
    Some(Rgb {
        r: channel(r),
        g: channel(g),
        b: channel(b),
    })
}

/// CSS-ready theme values built from an accent colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accent {
    pub color: Rgb,
}

impl Accent {
    pub fn new(color: Rgb) -> Self {
        Self { color }
    }

    /// Line colour for the speed chart, `rgb(r, g, b)`.
    pub fn css(&self) -> String {
        let Rgb { r, g, b } = self.color;
        format!("rgb({r}, {g}, {b})")
    }

    /// Translucent fill under the speed chart line.
    pub fn chart_fill(&self) -> String {
        let Rgb { r, g, b } = self.color;
        format!("rgba({r},{g},{b},0.15)")
    }

    /// Page background: a faint tint fading to the base colour.
    pub fn background(&self) -> String {
        let Rgb { r, g, b } = self.color;
        format!("linear-gradient(180deg, rgba({r},{g},{b},0.10), #f7faf9)")
    }
}
