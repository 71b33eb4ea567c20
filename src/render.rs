//! Screen snapshot rendering.
//!
//! Both renderers are pure functions of the emulator state at call time.
//! The caller holds the session lock for the full render, which is what
//! makes a capture an atomic snapshot against in-flight child output.

use std::io::Cursor;

use anyhow::{Context, Result};
use fontdue::Metrics;
use image::{ImageFormat, Rgb, RgbImage};

use crate::emulator::Emulator;
use crate::font::FontBook;

/// Default foreground for cells that don't set one.
const DEFAULT_FG: [u8; 3] = [255, 255, 255];

/// Scrape the grid to plain text.
///
/// Row-major: every cell contributes its contents, or a single space when
/// empty, and every row is terminated with a newline — so the output holds
/// exactly `rows` newlines and trailing spaces are preserved.
pub fn render_text(emu: &Emulator) -> String {
    let (rows, cols) = emu.size();
    let mut out = String::with_capacity((cols as usize + 1) * rows as usize);
    for row in 0..rows {
        for col in 0..cols {
            match emu.cell(row, col) {
                Ok(cell) if !cell.contents.is_empty() => out.push_str(&cell.contents),
                _ => out.push(' '),
            }
        }
        out.push('\n');
    }
    out
}

/// Rasterize the grid to PNG bytes.
///
/// The image is `cols·cellW × rows·cellH`, black ground, with per-cell
/// background fills for any non-black background and glyphs drawn in the
/// cell's foreground (white when default). Glyphs the face doesn't carry
/// are skipped entirely so missing symbols never render as boxes.
///
/// # Errors
///
/// Fails only if PNG encoding fails; no partial image is returned.
pub fn render_png(emu: &Emulator, fonts: &FontBook) -> Result<Vec<u8>> {
    let (rows, cols) = emu.size();
    let cell_w = fonts.cell_width();
    let cell_h = fonts.cell_height();
    let mut img = RgbImage::new(u32::from(cols) * cell_w, u32::from(rows) * cell_h);

    for row in 0..rows {
        for col in 0..cols {
            let Ok(cell) = emu.cell(row, col) else {
                continue;
            };
            let x0 = u32::from(col) * cell_w;
            let y0 = u32::from(row) * cell_h;

            if let Some(bg) = cell.bg {
                if bg != [0, 0, 0] {
                    fill_rect(&mut img, x0, y0, cell_w, cell_h, bg);
                }
            }

            if cell.contents.is_empty() {
                continue;
            }
            let fg = cell.fg.unwrap_or(DEFAULT_FG);
            let baseline = y0 as i32 + fonts.ascent();
            let mut pen_x = x0 as i32;
            for ch in cell.contents.chars() {
                if !fonts.has_glyph(ch) {
                    continue;
                }
                let (metrics, bitmap) = fonts.rasterize(ch);
                let gx = pen_x + metrics.xmin;
                let gy = baseline - metrics.ymin - metrics.height as i32;
                blend_glyph(&mut img, gx, gy, &metrics, &bitmap, fg);
                pen_x += metrics.advance_width.ceil() as i32;
            }
        }
    }

    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(out)
}

/// Fill one cell rectangle with a solid color.
fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 3]) {
    for y in y0..(y0 + h).min(img.height()) {
        for x in x0..(x0 + w).min(img.width()) {
            img.put_pixel(x, y, Rgb(color));
        }
    }
}

/// Alpha-blend a coverage bitmap onto the image, clipped to its bounds.
fn blend_glyph(
    img: &mut RgbImage,
    gx: i32,
    gy: i32,
    metrics: &Metrics,
    bitmap: &[u8],
    fg: [u8; 3],
) {
    let (img_w, img_h) = (img.width() as i32, img.height() as i32);
    for by in 0..metrics.height as i32 {
        for bx in 0..metrics.width as i32 {
            let x = gx + bx;
            let y = gy + by;
            if x < 0 || y < 0 || x >= img_w || y >= img_h {
                continue;
            }
            let cov = u32::from(bitmap[by as usize * metrics.width + bx as usize]);
            if cov == 0 {
                continue;
            }
            let under = img.get_pixel(x as u32, y as u32).0;
            let mix = |f: u8, u: u8| ((u32::from(f) * cov + u32::from(u) * (255 - cov)) / 255) as u8;
            img.put_pixel(
                x as u32,
                y as u32,
                Rgb([mix(fg[0], under[0]), mix(fg[1], under[1]), mix(fg[2], under[2])]),
            );
        }
    }
}
