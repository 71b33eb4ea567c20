//! Terminal emulator adapter.
//!
//! Wraps a [`vt100::Parser`] behind the three operations the rest of the
//! crate needs: feed raw child output, read the grid size, and read one
//! cell. The parser is a streaming state machine, so escape sequences and
//! UTF-8 characters split across read batches are carried over between
//! [`Emulator::process`] calls.
//!
//! This type has no interior locking. The owning session serializes all
//! access through its state mutex; reads concurrent with writes are a
//! caller bug, not something this layer defends against.

use anyhow::{bail, Result};
use vt100::Parser;

/// One cell of the emulated screen, resolved for rendering.
///
/// Colors are `None` when the cell uses the terminal default; indexed
/// colors are already resolved to RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSnapshot {
    /// The cell's character content. Empty for blank cells; may hold more
    /// than one `char` when combining marks are present.
    pub contents: String,
    /// Foreground color, if the cell sets one.
    pub fg: Option<[u8; 3]>,
    /// Background color, if the cell sets one.
    pub bg: Option<[u8; 3]>,
}

/// Fixed-size terminal screen fed by raw pty output.
pub struct Emulator {
    parser: Parser,
}

impl Emulator {
    /// Create an emulator with a fixed `rows` × `cols` grid.
    ///
    /// Scrollback is disabled: captures are defined over the live screen
    /// only, and the grid size never changes after construction.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            parser: Parser::new(rows, cols, 0),
        }
    }

    /// Apply raw bytes from the child to the screen.
    pub fn process(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    /// Grid size as `(rows, cols)`.
    pub fn size(&self) -> (u16, u16) {
        self.parser.screen().size()
    }

    /// Read the cell at `row`, `col`.
    ///
    /// # Errors
    ///
    /// Returns an error when the coordinates fall outside the grid.
    pub fn cell(&self, row: u16, col: u16) -> Result<CellSnapshot> {
        let Some(cell) = self.parser.screen().cell(row, col) else {
            let (rows, cols) = self.size();
            bail!("cell ({row}, {col}) outside {rows}x{cols} grid");
        };
        Ok(CellSnapshot {
            contents: cell.contents(),
            fg: resolve_color(cell.fgcolor()),
            bg: resolve_color(cell.bgcolor()),
        })
    }
}

/// Resolve a vt100 color to RGB; `Default` maps to `None`.
fn resolve_color(color: vt100::Color) -> Option<[u8; 3]> {
    match color {
        vt100::Color::Default => None,
        vt100::Color::Idx(i) => Some(indexed_color(i)),
        vt100::Color::Rgb(r, g, b) => Some([r, g, b]),
    }
}

/// Convert an xterm-256 indexed color to RGB.
fn indexed_color(idx: u8) -> [u8; 3] {
    match idx {
        // Standard colors (0-7)
        0 => [0, 0, 0],       // Black
        1 => [205, 49, 49],   // Red
        2 => [13, 188, 121],  // Green
        3 => [229, 229, 16],  // Yellow
        4 => [36, 114, 200],  // Blue
        5 => [188, 63, 188],  // Magenta
        6 => [17, 168, 205],  // Cyan
        7 => [229, 229, 229], // White

        // Bright colors (8-15)
        8 => [102, 102, 102],  // Bright Black
        9 => [241, 76, 76],    // Bright Red
        10 => [35, 209, 139],  // Bright Green
        11 => [245, 245, 67],  // Bright Yellow
        12 => [59, 142, 234],  // Bright Blue
        13 => [214, 112, 214], // Bright Magenta
        14 => [41, 184, 219],  // Bright Cyan
        15 => [255, 255, 255], // Bright White

        // 216 color cube (16-231)
        16..=231 => {
            let idx = idx - 16;
            let r = (idx / 36) % 6;
            let g = (idx / 6) % 6;
            let b = idx % 6;
            let to_val = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
            [to_val(r), to_val(g), to_val(b)]
        }

        // Grayscale ramp (232-255)
        232..=255 => {
            let gray = 8 + (idx - 232) * 10;
            [gray, gray, gray]
        }
    }
}
