//! Raw mode lifecycle for the controlling terminal
//!
//! Cooked mode buffers input a line at a time, echoes it, and turns Ctrl-C,
//! Ctrl-Z, Ctrl-S and friends into signals or flow control. Raw mode turns
//! all of that off so every byte reaches the program as typed.
//!
//! [`RawModeController`] is the only code that writes terminal attributes.
//! [`RawModeGuard`] ties a successful [`RawModeController::enter`] to exactly
//! one [`RawModeController::exit`], run when the guard goes out of scope if
//! nobody restored explicitly.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};

use rustix::fd::{AsFd, BorrowedFd};
use rustix::termios::{
    self, ControlModes, InputModes, LocalModes, OptionalActions, OutputModes, SpecialCodeIndex,
    Termios,
};

use crate::{Result, TermError};

/// Default read timeout in tenths of a second (VTIME)
pub const DEFAULT_POLL_INTERVAL_DS: u8 = 1;

/// Either stdin (when it is a tty) or `/dev/tty` (when stdin is redirected)
pub enum TerminalFd {
    Stdin(io::Stdin),
    DevTty(File),
}

impl TerminalFd {
    /// Find the controlling terminal
    pub fn open() -> Result<Self> {
        let stdin = io::stdin();
        if termios::isatty(&stdin) {
            return Ok(Self::Stdin(stdin));
        }
        File::options()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .map(Self::DevTty)
            .map_err(|source| TermError::Io {
                op: "open /dev/tty",
                source,
            })
    }
}

impl AsFd for TerminalFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Self::Stdin(stdin) => stdin.as_fd(),
            Self::DevTty(file) => file.as_fd(),
        }
    }
}

// straight to the fd; std's stdin buffer would hold bytes past the one asked for
impl Read for TerminalFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        rustix::io::read(self.as_fd(), buf).map_err(io::Error::from)
    }
}

impl fmt::Debug for TerminalFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin(_) => f.write_str("TerminalFd::Stdin"),
            Self::DevTty(_) => f.write_str("TerminalFd::DevTty"),
        }
    }
}

/// Terminal attributes as they were before raw mode was entered.
///
/// Captured once, never modified, handed back to the driver on restore.
pub struct TerminalState {
    termios: Termios,
}

impl TerminalState {
    /// Read the current attributes of `fd`
    pub fn capture<Fd: AsFd>(fd: Fd) -> Result<Self> {
        let termios =
            termios::tcgetattr(fd).map_err(|e| TermError::TerminalQuery(io::Error::from(e)))?;
        Ok(Self { termios })
    }

    /// The captured attributes
    pub fn termios(&self) -> &Termios {
        &self.termios
    }

    /// Attribute set derived from this snapshot with raw mode applied
    pub fn raw(&self, poll_interval_ds: u8) -> Termios {
        let mut raw = self.termios.clone();
        make_raw(&mut raw, poll_interval_ds);
        raw
    }
}

impl fmt::Debug for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalState")
            .field("input_modes", &self.termios.input_modes)
            .field("output_modes", &self.termios.output_modes)
            .field("control_modes", &self.termios.control_modes)
            .field("local_modes", &self.termios.local_modes)
            .finish_non_exhaustive()
    }
}

/// Flip the flags raw mode needs.
///
/// Reads return after `poll_interval_ds` tenths of a second with zero bytes
/// when nothing was typed (VMIN=0).
pub fn make_raw(t: &mut Termios, poll_interval_ds: u8) {
    // no break-to-SIGINT, no CR->NL, no parity check, no 8th-bit strip, no Ctrl-S/Ctrl-Q
    t.input_modes.remove(
        InputModes::BRKINT
            | InputModes::ICRNL
            | InputModes::INPCK
            | InputModes::ISTRIP
            | InputModes::IXON,
    );
    // no "\n" -> "\r\n" on output
    t.output_modes.remove(OutputModes::OPOST);
    t.control_modes.insert(ControlModes::CS8);
    // no echo, no line buffering, no Ctrl-V, no Ctrl-C/Ctrl-Z signals
    t.local_modes.remove(
        LocalModes::ECHO | LocalModes::ICANON | LocalModes::IEXTEN | LocalModes::ISIG,
    );
    t.special_codes[SpecialCodeIndex::VMIN] = 0;
    t.special_codes[SpecialCodeIndex::VTIME] = poll_interval_ds;
}

/// Lifecycle of the one snapshot a controller takes
#[derive(Debug)]
enum Snapshot {
    Never,
    Held(TerminalState),
    Restored,
}

/// Enters and leaves raw mode on one terminal, once
pub struct RawModeController<Fd: AsFd> {
    fd: Fd,
    original: Snapshot,
    poll_interval_ds: u8,
}

impl<Fd: AsFd> RawModeController<Fd> {
    pub fn new(fd: Fd) -> Self {
        Self {
            fd,
            original: Snapshot::Never,
            poll_interval_ds: DEFAULT_POLL_INTERVAL_DS,
        }
    }

    /// Read timeout in tenths of a second, clamped to at least 1
    pub fn with_poll_interval(mut self, poll_interval_ds: u8) -> Self {
        self.poll_interval_ds = poll_interval_ds.max(1);
        self
    }

    /// Snapshot the current attributes and install raw mode.
    ///
    /// Only the first call on a controller takes a snapshot; any later call,
    /// including one after [`exit`](Self::exit), fails with `AlreadyActive`.
    pub fn enter(&mut self) -> Result<()> {
        if !matches!(self.original, Snapshot::Never) {
            return Err(TermError::AlreadyActive);
        }

        let original = TerminalState::capture(&self.fd)?;
        let raw = original.raw(self.poll_interval_ds);

        termios::tcsetattr(&self.fd, OptionalActions::Flush, &raw)
            .map_err(|e| TermError::TerminalApply(io::Error::from(e)))?;

        tracing::debug!(poll_interval_ds = self.poll_interval_ds, "entered raw mode");
        self.original = Snapshot::Held(original);
        Ok(())
    }

    /// Reinstall the snapshot taken by [`enter`](Self::enter).
    ///
    /// The snapshot is consumed, so a second call is a no-op.
    pub fn exit(&mut self) -> Result<()> {
        let Snapshot::Held(original) = std::mem::replace(&mut self.original, Snapshot::Restored)
        else {
            return Ok(());
        };

        termios::tcsetattr(&self.fd, OptionalActions::Flush, original.termios())
            .map_err(|e| TermError::TerminalApply(io::Error::from(e)))?;

        tracing::debug!("left raw mode");
        Ok(())
    }

    /// Whether a snapshot is held (raw mode entered and not yet exited)
    pub fn is_raw(&self) -> bool {
        matches!(self.original, Snapshot::Held(_))
    }

    pub fn fd(&self) -> &Fd {
        &self.fd
    }

    pub fn fd_mut(&mut self) -> &mut Fd {
        &mut self.fd
    }
}

impl<Fd: AsFd> fmt::Debug for RawModeController<Fd> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawModeController")
            .field("original", &self.original)
            .field("poll_interval_ds", &self.poll_interval_ds)
            .finish_non_exhaustive()
    }
}

/// Keeps the terminal in raw mode for as long as it lives.
///
/// Dropping the guard restores the terminal. A restore failure during drop
/// is logged and printed to stderr.
pub struct RawModeGuard<Fd: AsFd> {
    controller: RawModeController<Fd>,
}

impl<Fd: AsFd> RawModeGuard<Fd> {
    /// Enter raw mode on `fd`
    pub fn enter(fd: Fd, poll_interval_ds: u8) -> Result<Self> {
        let mut controller = RawModeController::new(fd).with_poll_interval(poll_interval_ds);
        controller.enter()?;
        Ok(Self { controller })
    }

    /// Restore now and report the outcome
    pub fn restore(mut self) -> Result<()> {
        self.controller.exit()
    }

    pub fn fd(&self) -> &Fd {
        self.controller.fd()
    }

    pub fn fd_mut(&mut self) -> &mut Fd {
        self.controller.fd_mut()
    }
}

impl<Fd: AsFd> Drop for RawModeGuard<Fd> {
    fn drop(&mut self) {
        if let Err(e) = self.controller.exit() {
            tracing::error!(error = %e, "failed to restore terminal");
            eprint!("{}", restore_failure_line(&e));
        }
    }
}

// OPOST may still be off when the restore failed, so the CR is explicit
fn restore_failure_line(e: &TermError) -> String {
    format!("tilde: {e}\r\n")
}

impl<Fd: AsFd> fmt::Debug for RawModeGuard<Fd> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawModeGuard")
            .field("controller", &self.controller)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::{open_pty, same_attrs};
    use super::*;

    #[test]
    fn enter_sets_raw_flags() {
        let (_master, tty) = open_pty();
        let mut controller = RawModeController::new(&tty);
        controller.enter().unwrap();

        let t = termios::tcgetattr(&tty).unwrap();
        assert!(!t.local_modes.intersects(
            LocalModes::ECHO | LocalModes::ICANON | LocalModes::IEXTEN | LocalModes::ISIG
        ));
        assert!(!t.input_modes.intersects(
            InputModes::BRKINT
                | InputModes::ICRNL
                | InputModes::INPCK
                | InputModes::ISTRIP
                | InputModes::IXON
        ));
        assert!(!t.output_modes.contains(OutputModes::OPOST));
        assert!(t.control_modes.contains(ControlModes::CS8));
        assert_eq!(t.special_codes[SpecialCodeIndex::VMIN], 0);
        assert_eq!(t.special_codes[SpecialCodeIndex::VTIME], 1);

        controller.exit().unwrap();
    }

    #[test]
    fn exit_restores_original_attributes() {
        let (_master, tty) = open_pty();
        let before = termios::tcgetattr(&tty).unwrap();

        let mut controller = RawModeController::new(&tty).with_poll_interval(3);
        controller.enter().unwrap();
        assert!(controller.is_raw());
        assert!(!same_attrs(&before, &termios::tcgetattr(&tty).unwrap()));

        controller.exit().unwrap();
        assert!(!controller.is_raw());
        assert!(same_attrs(&before, &termios::tcgetattr(&tty).unwrap()));
    }

    #[test]
    fn second_exit_is_noop() {
        let (_master, tty) = open_pty();
        let mut controller = RawModeController::new(&tty);
        controller.enter().unwrap();
        controller.exit().unwrap();

        // if exit ran twice it would reapply the snapshot over this change
        let mut changed = termios::tcgetattr(&tty).unwrap();
        changed.local_modes.toggle(LocalModes::ECHO);
        termios::tcsetattr(&tty, OptionalActions::Now, &changed).unwrap();

        controller.exit().unwrap();
        let after = termios::tcgetattr(&tty).unwrap();
        assert_eq!(
            after.local_modes.contains(LocalModes::ECHO),
            changed.local_modes.contains(LocalModes::ECHO)
        );
    }

    #[test]
    fn enter_twice_is_rejected() {
        let (_master, tty) = open_pty();
        let mut controller = RawModeController::new(&tty);
        controller.enter().unwrap();
        assert!(matches!(controller.enter(), Err(TermError::AlreadyActive)));
        controller.exit().unwrap();
    }

    #[test]
    fn enter_after_exit_is_rejected() {
        let (_master, tty) = open_pty();
        let before = termios::tcgetattr(&tty).unwrap();

        let mut controller = RawModeController::new(&tty);
        controller.enter().unwrap();
        controller.exit().unwrap();

        assert!(matches!(controller.enter(), Err(TermError::AlreadyActive)));
        assert!(!controller.is_raw());
        assert!(same_attrs(&before, &termios::tcgetattr(&tty).unwrap()));
    }

    #[test]
    fn restore_failure_line_ends_with_crlf() {
        let e = TermError::TerminalApply(io::Error::other("bad fd"));
        assert_eq!(restore_failure_line(&e), "tilde: tcsetattr: bad fd\r\n");
    }

    #[test]
    fn guard_restores_on_drop() {
        let (_master, tty) = open_pty();
        let before = termios::tcgetattr(&tty).unwrap();
        {
            let _guard = RawModeGuard::enter(&tty, DEFAULT_POLL_INTERVAL_DS).unwrap();
            let during = termios::tcgetattr(&tty).unwrap();
            assert!(!during.local_modes.contains(LocalModes::ICANON));
        }
        assert!(same_attrs(&before, &termios::tcgetattr(&tty).unwrap()));
    }

    #[test]
    fn guard_restore_then_drop_restores_once() {
        let (_master, tty) = open_pty();
        let before = termios::tcgetattr(&tty).unwrap();
        let guard = RawModeGuard::enter(&tty, DEFAULT_POLL_INTERVAL_DS).unwrap();
        guard.restore().unwrap();
        assert!(same_attrs(&before, &termios::tcgetattr(&tty).unwrap()));
    }

    #[test]
    fn capture_on_non_tty_fails_with_query_error() {
        let file = tempfile::tempfile().unwrap();
        let err = TerminalState::capture(&file).unwrap_err();
        assert!(matches!(err, TermError::TerminalQuery(_)));
    }
}
