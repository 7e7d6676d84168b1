//! Core types shared by the terminal components

use std::fmt;

/// Quit key: Ctrl-Q
pub const QUIT_KEY: u8 = ctrl_key(b'q');

/// Map a letter to the byte the terminal sends for Ctrl+letter.
///
/// The terminal strips bits 5 and 6 of the key when Ctrl is held, so
/// `ctrl_key(b'q')` is `0x11`.
pub const fn ctrl_key(k: u8) -> u8 {
    k & 0x1f
}

/// Visible size of the terminal, in character cells.
///
/// Both dimensions are at least 1. Values go stale when the terminal is
/// resized; there is no resize tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub rows: u16,
    pub columns: u16,
}

impl ScreenGeometry {
    /// Build a geometry, rejecting a zero dimension
    pub fn new(rows: u16, columns: u16) -> Option<Self> {
        if rows == 0 || columns == 0 {
            None
        } else {
            Some(Self { rows, columns })
        }
    }
}

impl fmt::Display for ScreenGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

/// What the main loop does after a keypress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Render again and wait for the next key
    Continue,
    /// Clear the screen, restore the terminal, exit 0
    Quit,
}

impl KeyAction {
    /// Classify a raw input byte
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            QUIT_KEY => Self::Quit,
            _ => Self::Continue,
        }
    }
}
