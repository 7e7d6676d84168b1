//! Terminal size discovery
//!
//! The direct window-size query is tried first. When it is missing or
//! reports zero columns, the cursor is pushed to the bottom-right corner and
//! the terminal is asked where it ended up:
//!
//! ```text
//! -> ESC [ 999 C  ESC [ 999 B  ESC [ 6 n
//! <- ESC [ <rows> ; <cols> R
//! ```

use std::io::{self, Read, Write};

use rustix::fd::{AsFd, OwnedFd};
use rustix::termios;

use crate::input::KeyReader;
use crate::{Result, ScreenGeometry, TermError};

/// Cursor forward 999, then down 999; the terminal clamps both to its edge
pub const CURSOR_TO_BOTTOM_RIGHT: &[u8] = b"\x1b[999C\x1b[999B";

/// Device status report: ask for the cursor position
pub const REQUEST_CURSOR_POSITION: &[u8] = b"\x1b[6n";

const ESC: u8 = 0x1b;

/// Source for the direct size query, as `(columns, rows)`
pub trait WindowSize {
    fn window_size(&self) -> io::Result<(u16, u16)>;
}

impl<F> WindowSize for F
where
    F: Fn() -> io::Result<(u16, u16)>,
{
    fn window_size(&self) -> io::Result<(u16, u16)> {
        self()
    }
}

/// Direct query through the terminal driver (TIOCGWINSZ) on one fd
#[derive(Debug)]
pub struct DriverWindowSize {
    fd: OwnedFd,
}

impl DriverWindowSize {
    /// Query the terminal behind `fd`
    pub fn for_fd<Fd: AsFd>(fd: Fd) -> Result<Self> {
        let fd = fd
            .as_fd()
            .try_clone_to_owned()
            .map_err(|source| TermError::Io { op: "dup", source })?;
        Ok(Self { fd })
    }
}

impl WindowSize for DriverWindowSize {
    fn window_size(&self) -> io::Result<(u16, u16)> {
        let ws = termios::tcgetwinsize(&self.fd).map_err(io::Error::from)?;
        Ok((ws.ws_col, ws.ws_row))
    }
}

/// Which strategies [`GeometryProbe::probe`] uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeStrategy {
    /// Direct query, cursor probe if that fails
    #[default]
    DirectFirst,
    /// Skip the direct query, always use the cursor probe
    CursorOnly,
}

/// Works out the screen size
#[derive(Debug)]
pub struct GeometryProbe<S> {
    direct: S,
    strategy: ProbeStrategy,
}

impl GeometryProbe<DriverWindowSize> {
    /// Probe that asks the driver about `fd` first
    pub fn driver<Fd: AsFd>(fd: Fd, strategy: ProbeStrategy) -> Result<Self> {
        Ok(Self::new(DriverWindowSize::for_fd(fd)?, strategy))
    }
}

impl<S: WindowSize> GeometryProbe<S> {
    pub fn new(direct: S, strategy: ProbeStrategy) -> Self {
        Self { direct, strategy }
    }

    /// Determine the terminal size.
    pub fn probe<R: Read, W: Write>(
        &self,
        input: &mut KeyReader<R>,
        output: &mut W,
    ) -> Result<ScreenGeometry> {
        if self.strategy == ProbeStrategy::DirectFirst {
            if let Some(geometry) = self.query_direct() {
                tracing::debug!(%geometry, "window size from driver");
                return Ok(geometry);
            }
        }

        let geometry = probe_cursor(input, output)?;
        tracing::debug!(%geometry, "window size from cursor probe");
        Ok(geometry)
    }

    fn query_direct(&self) -> Option<ScreenGeometry> {
        match self.direct.window_size() {
            Ok((columns, rows)) => {
                let geometry = ScreenGeometry::new(rows, columns);
                if geometry.is_none() {
                    tracing::warn!(columns, rows, "driver reported empty window size");
                }
                geometry
            }
            Err(e) => {
                tracing::debug!(error = %e, "window size query unavailable");
                None
            }
        }
    }
}

/// Move the cursor to the far corner and read back its position
pub fn probe_cursor<R: Read, W: Write>(
    input: &mut KeyReader<R>,
    output: &mut W,
) -> Result<ScreenGeometry> {
    output
        .write_all(CURSOR_TO_BOTTOM_RIGHT)
        .and_then(|()| output.write_all(REQUEST_CURSOR_POSITION))
        .and_then(|()| output.flush())
        .map_err(TermError::write)?;

    let response = input.read_response(b'R')?;
    CursorReportParser::parse(&response)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    Escape,
    Row,
    Column,
    Done,
}

/// Parser for `ESC [ <rows> ; <cols> R`, fed one byte at a time
#[derive(Debug, Clone)]
pub struct CursorReportParser {
    state: ParseState,
    current: u16,
    digits: usize,
    rows: u16,
}

impl Default for CursorReportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorReportParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Start,
            current: 0,
            digits: 0,
            rows: 0,
        }
    }

    /// Parse a complete reply
    pub fn parse(bytes: &[u8]) -> Result<ScreenGeometry> {
        let mut parser = Self::new();
        let mut result = None;
        for &byte in bytes {
            if result.is_some() {
                return Err(malformed("trailing bytes after report"));
            }
            result = parser.feed(byte)?;
        }
        result.ok_or_else(|| malformed("truncated cursor position report"))
    }

    /// Advance by one byte; returns the geometry once `R` is consumed.
    pub fn feed(&mut self, byte: u8) -> Result<Option<ScreenGeometry>> {
        match (self.state, byte) {
            (ParseState::Start, ESC) => self.state = ParseState::Escape,
            (ParseState::Escape, b'[') => self.state = ParseState::Row,
            (ParseState::Row | ParseState::Column, b'0'..=b'9') => self.push_digit(byte)?,
            (ParseState::Row, b';') if self.digits > 0 => {
                self.rows = self.take_number();
                self.state = ParseState::Column;
            }
            (ParseState::Column, b'R') if self.digits > 0 => {
                let columns = self.take_number();
                self.state = ParseState::Done;
                return ScreenGeometry::new(self.rows, columns)
                    .map(Some)
                    .ok_or_else(|| malformed("cursor report has a zero dimension"));
            }
            (state, byte) => {
                return Err(TermError::Geometry(format!(
                    "unexpected byte {byte:#04x} in cursor position report ({state:?})"
                )));
            }
        }
        Ok(None)
    }

    fn push_digit(&mut self, byte: u8) -> Result<()> {
        self.current = self
            .current
            .checked_mul(10)
            .and_then(|n| n.checked_add(u16::from(byte - b'0')))
            .ok_or_else(|| malformed("cursor position out of range"))?;
        self.digits += 1;
        Ok(())
    }

    fn take_number(&mut self) -> u16 {
        self.digits = 0;
        std::mem::take(&mut self.current)
    }
}

fn malformed(msg: &str) -> TermError {
    TermError::Geometry(msg.to_string())
}
