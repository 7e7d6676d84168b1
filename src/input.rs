//! Single-byte key reads on a raw-mode terminal

use std::io::{self, Read};

use crate::{Result, TermError};

/// Upper bound on a terminal reply read by [`KeyReader::read_response`]
pub const MAX_RESPONSE_LEN: usize = 32;

/// Reads keys one byte at a time.
///
/// In raw mode each `read` returns after the VTIME interval with zero bytes
/// if nothing was typed. [`read_key`](Self::read_key) hides that and keeps
/// polling until a byte shows up.
#[derive(Debug)]
pub struct KeyReader<R> {
    input: R,
}

impl<R: Read> KeyReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Wait for the next byte.
    pub fn read_key(&mut self) -> Result<u8> {
        loop {
            if let Some(byte) = self.poll_byte()? {
                return Ok(byte);
            }
        }
    }

    /// One poll interval: `Some(byte)` or `None` if the interval elapsed.
    pub fn poll_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.input.read(&mut buf) {
            Ok(1) => {
                tracing::trace!(byte = buf[0], "key");
                Ok(Some(buf[0]))
            }
            Ok(_) => Ok(None),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(TermError::read(e)),
        }
    }

    /// Collect a terminal reply up to and including `terminator`.
    ///
    /// Stops early on the first empty poll or after [`MAX_RESPONSE_LEN`]
    /// bytes, returning what was read so far.
    pub fn read_response(&mut self, terminator: u8) -> Result<Vec<u8>> {
        let mut response = Vec::with_capacity(MAX_RESPONSE_LEN);
        while response.len() < MAX_RESPONSE_LEN {
            let Some(byte) = self.poll_byte()? else {
                break;
            };
            response.push(byte);
            if byte == terminator {
                break;
            }
        }
        Ok(response)
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }
}
