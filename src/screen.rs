//! Full-screen redraw

use std::io::Write;

use crate::{Result, ScreenGeometry, TermError};

/// Erase the whole screen
pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J";

/// Cursor to row 1, column 1
pub const CURSOR_HOME: &[u8] = b"\x1b[H";

/// Glyph drawn at the start of every empty row
pub const DEFAULT_PLACEHOLDER: &str = "~";

// output post-processing is off in raw mode, so the CR is explicit
const LINE_BREAK: &[u8] = b"\r\n";

/// Paints frames straight to the terminal
#[derive(Debug, Clone)]
pub struct ScreenRenderer {
    placeholder: String,
}

impl Default for ScreenRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER)
    }
}

impl ScreenRenderer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
        }
    }

    /// Clear, home, draw one placeholder row per screen row, home again.
    pub fn refresh<W: Write>(&self, out: &mut W, geometry: ScreenGeometry) -> Result<()> {
        out.write_all(CLEAR_SCREEN).map_err(TermError::write)?;
        out.write_all(CURSOR_HOME).map_err(TermError::write)?;
        self.draw_rows(out, geometry.rows)?;
        out.write_all(CURSOR_HOME).map_err(TermError::write)?;
        out.flush().map_err(TermError::write)
    }

    fn draw_rows<W: Write>(&self, out: &mut W, rows: u16) -> Result<()> {
        for _ in 0..rows {
            out.write_all(self.placeholder.as_bytes())
                .and_then(|()| out.write_all(LINE_BREAK))
                .map_err(TermError::write)?;
        }
        Ok(())
    }
}

/// Blank the screen and park the cursor at the top left
pub fn clear_and_home<W: Write>(out: &mut W) -> Result<()> {
    out.write_all(CLEAR_SCREEN)
        .and_then(|()| out.write_all(CURSOR_HOME))
        .and_then(|()| out.flush())
        .map_err(TermError::write)
}
