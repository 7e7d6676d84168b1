//! Tilde - raw-mode terminal substrate
//!
//! Puts the controlling terminal into raw mode, works out the screen size,
//! and runs a full-screen redraw loop until Ctrl-Q.

pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod logging;
pub mod raw_mode;
pub mod screen;
pub mod terminal;
pub mod types;

pub use error::{Fatal, Result, TermError};
pub use types::{KeyAction, ScreenGeometry};
