//! Monospace font loading for PNG captures.
//!
//! Tries a compile-time list of common system monospace fonts and falls
//! back to an embedded DejaVu Sans Mono, so rasterization always works
//! regardless of what the host has installed. Loaded once at server
//! startup and shared read-only across capture handlers.

use anyhow::{anyhow, Result};
use fontdue::{Font, FontSettings, Metrics};

/// Candidate system fonts, tried in order before the embedded fallback.
const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/truetype/ubuntu/UbuntuMono-R.ttf",
    "/usr/share/fonts/truetype/freefont/FreeMono.ttf",
];

/// Embedded fallback face.
const EMBEDDED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

/// Rasterization size in pixels.
const FONT_SIZE_PX: f32 = 12.0;

/// Extra vertical leading added below each line, in pixels.
const CELL_LEADING_PX: u32 = 2;

/// A loaded monospace face plus the fixed cell metrics derived from it.
///
/// Cell width is the advance of a reference glyph (`W`); since the face is
/// monospaced every printable glyph shares it. Cell height is the font's
/// line height rounded up plus a small leading.
pub struct FontBook {
    font: Font,
    cell_width: u32,
    cell_height: u32,
    ascent: i32,
}

impl FontBook {
    /// Load the first usable candidate font, or the embedded fallback.
    pub fn load() -> Result<Self> {
        for path in FONT_PATHS {
            if let Ok(data) = std::fs::read(path) {
                if let Ok(book) = Self::from_bytes(&data) {
                    log::info!("Loaded font: {path}");
                    return Ok(book);
                }
                log::warn!("Unusable font file, skipping: {path}");
            }
        }
        log::info!("No system font found, using embedded DejaVu Sans Mono");
        Self::from_bytes(EMBEDDED_FONT)
    }

    /// Build a font book from raw TTF/OTF bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| anyhow!("failed to parse font: {e}"))?;

        let line = font
            .horizontal_line_metrics(FONT_SIZE_PX)
            .ok_or_else(|| anyhow!("font has no horizontal line metrics"))?;

        let reference = font.metrics('W', FONT_SIZE_PX);
        let cell_width = reference.advance_width.ceil() as u32;
        let cell_height = line.new_line_size.ceil() as u32 + CELL_LEADING_PX;
        let ascent = line.ascent.ceil() as i32;

        if cell_width == 0 || cell_height == 0 {
            return Err(anyhow!("font produced a degenerate cell size"));
        }

        Ok(Self {
            font,
            cell_width,
            cell_height,
            ascent,
        })
    }

    /// Cell width in pixels.
    pub fn cell_width(&self) -> u32 {
        self.cell_width
    }

    /// Cell height in pixels.
    pub fn cell_height(&self) -> u32 {
        self.cell_height
    }

    /// Baseline offset from the top of a cell, in pixels.
    pub fn ascent(&self) -> i32 {
        self.ascent
    }

    /// Whether the face has a real glyph for `c`.
    ///
    /// Missing glyphs are skipped by the renderer rather than drawn as
    /// replacement boxes.
    pub fn has_glyph(&self, c: char) -> bool {
        self.font.lookup_glyph_index(c) != 0
    }

    /// Rasterize `c` to a coverage bitmap.
    pub fn rasterize(&self, c: char) -> (Metrics, Vec<u8>) {
        self.font.rasterize(c, FONT_SIZE_PX)
    }
}
