//! The process-wide terminal context and the redraw loop
//!
//! ```text
//! acquire -> probe -> [refresh -> read key]* -> Ctrl-Q -> clear -> restore
//! ```

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use rustix::fd::AsFd;

use crate::config::Config;
use crate::geometry::{GeometryProbe, ProbeStrategy};
use crate::input::KeyReader;
use crate::raw_mode::{RawModeGuard, TerminalFd};
use crate::screen::{clear_and_home, ScreenRenderer};
use crate::{Fatal, KeyAction, Result, ScreenGeometry, TermError};

// set once, never cleared: one context per process lifetime
static CONTEXT_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Proof that this is the only terminal context the process will ever have
#[derive(Debug)]
struct ContextClaim(());

impl ContextClaim {
    fn take() -> Result<Self> {
        CONTEXT_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(()))
            .map_err(|_| TermError::AlreadyActive)
    }
}

/// Raw mode plus screen size for the controlling terminal.
///
/// Created at most once per process. The terminal is restored by
/// [`shutdown`](Self::shutdown), or on drop if that never happens.
#[derive(Debug)]
pub struct TerminalContext<Fd: AsFd = TerminalFd> {
    guard: RawModeGuard<Fd>,
    geometry: Option<ScreenGeometry>,
    _claim: ContextClaim,
}

impl TerminalContext<TerminalFd> {
    /// Put the controlling terminal into raw mode
    pub fn acquire(poll_interval_ds: u8) -> Result<Self> {
        Self::with_fd(TerminalFd::open()?, poll_interval_ds)
    }
}

impl<Fd: AsFd + Read> TerminalContext<Fd> {
    /// Put `fd` into raw mode and claim the process-wide slot
    pub fn with_fd(fd: Fd, poll_interval_ds: u8) -> Result<Self> {
        let claim = ContextClaim::take()?;
        let guard = RawModeGuard::enter(fd, poll_interval_ds)?;
        Ok(Self {
            guard,
            geometry: None,
            _claim: claim,
        })
    }

    /// Probe the screen size of this context's terminal and remember it
    pub fn probe_geometry<W: Write>(
        &mut self,
        strategy: ProbeStrategy,
        out: &mut W,
    ) -> Result<ScreenGeometry> {
        let probe = GeometryProbe::driver(self.guard.fd(), strategy)?;
        let geometry = probe.probe(&mut KeyReader::new(self.guard.fd_mut()), out)?;
        self.geometry = Some(geometry);
        Ok(geometry)
    }

    pub fn geometry(&self) -> Option<ScreenGeometry> {
        self.geometry
    }

    /// Key reader over the terminal's input side
    pub fn keys(&mut self) -> KeyReader<&mut Fd> {
        KeyReader::new(self.guard.fd_mut())
    }

    /// Restore the original terminal attributes
    pub fn shutdown(self) -> Result<()> {
        let Self { guard, .. } = self;
        guard.restore()
    }
}

/// Redraw loop: one frame, one key, repeat until Ctrl-Q
#[derive(Debug, Clone)]
pub struct Editor {
    renderer: ScreenRenderer,
    geometry: ScreenGeometry,
}

impl Editor {
    pub fn new(renderer: ScreenRenderer, geometry: ScreenGeometry) -> Self {
        Self { renderer, geometry }
    }

    /// Run until the quit key; the screen is cleared on the way out.
    pub fn run<R: Read, W: Write>(&self, keys: &mut KeyReader<R>, out: &mut W) -> Result<()> {
        loop {
            self.renderer.refresh(out, self.geometry)?;
            if self.process_keypress(keys, out)? == KeyAction::Quit {
                tracing::debug!("quit requested");
                return Ok(());
            }
        }
    }

    /// Wait for one key and act on it
    pub fn process_keypress<R: Read, W: Write>(
        &self,
        keys: &mut KeyReader<R>,
        out: &mut W,
    ) -> Result<KeyAction> {
        let action = KeyAction::from_byte(keys.read_key()?);
        if action == KeyAction::Quit {
            clear_and_home(out)?;
        }
        Ok(action)
    }
}

/// Enter raw mode on the controlling terminal, run the editor, restore.
pub fn run(config: &Config) -> Result<(), Fatal> {
    let mut context = TerminalContext::acquire(config.poll_interval_ds)?;
    let mut out = io::stdout();
    let result = drive(&mut context, config, &mut out);
    finish(result, context.shutdown())
}

fn drive<Fd: AsFd + Read, W: Write>(
    context: &mut TerminalContext<Fd>,
    config: &Config,
    out: &mut W,
) -> Result<()> {
    let geometry = context.probe_geometry(config.probe_strategy(), out)?;
    tracing::info!(%geometry, "terminal ready");

    let editor = Editor::new(ScreenRenderer::new(config.placeholder.as_str()), geometry);
    editor.run(&mut context.keys(), out)
}

fn finish(result: Result<()>, restored: Result<()>) -> Result<(), Fatal> {
    match (result, restored) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(restore)) => Err(restore.into()),
        (Err(cause), Ok(())) => Err(cause.into()),
        (Err(cause), Err(restore)) => Err(Fatal {
            cause,
            restore: Some(restore),
        }),
    }
}

/// Clear the screen, home the cursor, then describe what went wrong
pub fn report_fatal<W: Write, E: Write>(
    out: &mut W,
    err: &mut E,
    fatal: &Fatal,
) -> io::Result<()> {
    if let Err(e) = clear_and_home(out) {
        tracing::warn!(error = %e, "could not clear screen");
    }
    tracing::error!(error = %fatal.cause, "fatal");
    writeln!(err, "tilde: {}", fatal.cause)?;
    if let Some(restore) = &fatal.restore {
        tracing::error!(error = %restore, "restore failed");
        writeln!(err, "tilde: {restore}")?;
    }
    err.flush()
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use rustix::termios::{self, LocalModes};

    use super::*;
    use crate::input::test_utils::{ScriptedInput, Step};
    use crate::raw_mode::test_utils::{open_pty, same_attrs};
    use crate::screen::{CLEAR_SCREEN, CURSOR_HOME};
    use crate::types::QUIT_KEY;

    const FRAME_3: &[u8] = b"\x1b[2J\x1b[H~\r\n~\r\n~\r\n\x1b[H";

    fn editor() -> Editor {
        Editor::new(
            ScreenRenderer::default(),
            ScreenGeometry { rows: 3, columns: 10 },
        )
    }

    #[test]
    fn quit_key_ends_loop_without_another_frame() {
        let mut keys = KeyReader::new(ScriptedInput::new(vec![
            Step::Bytes(b"ab".to_vec()),
            Step::Timeout,
            Step::Bytes(vec![QUIT_KEY]),
        ]));
        let mut out = Vec::new();

        editor().run(&mut keys, &mut out).unwrap();

        let mut expected = FRAME_3.repeat(3);
        expected.extend_from_slice(CLEAR_SCREEN);
        expected.extend_from_slice(CURSOR_HOME);
        assert_eq!(out, expected);
    }

    #[test]
    fn plain_q_does_not_quit() {
        let mut keys = KeyReader::new(ScriptedInput::bytes(b"q"));
        let action = editor().process_keypress(&mut keys, &mut Vec::new()).unwrap();
        assert_eq!(action, KeyAction::Continue);
    }

    #[test]
    fn read_error_stops_loop() {
        let mut keys = KeyReader::new(ScriptedInput::new(vec![Step::Fail(
            io::ErrorKind::PermissionDenied,
        )]));
        let mut out = Vec::new();

        let err = editor().run(&mut keys, &mut out).unwrap_err();
        assert!(matches!(err, TermError::Io { op: "read", .. }));
        assert_eq!(out, FRAME_3);
    }

    #[test]
    fn fatal_report_clears_then_explains() {
        let fatal = Fatal::from(TermError::Geometry("no reply".to_string()));
        let mut out = Vec::new();
        let mut err = Vec::new();

        report_fatal(&mut out, &mut err, &fatal).unwrap();
        assert_eq!(out, b"\x1b[2J\x1b[H");
        assert_eq!(String::from_utf8(err).unwrap(), "tilde: window size: no reply\n");
    }

    #[test]
    fn fatal_report_includes_restore_failure() {
        let fatal = Fatal {
            cause: TermError::read(io::Error::other("gone")),
            restore: Some(TermError::TerminalApply(io::Error::other("bad fd"))),
        };
        let mut err = Vec::new();

        report_fatal(&mut Vec::new(), &mut err, &fatal).unwrap();
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "tilde: read: gone\ntilde: tcsetattr: bad fd\n"
        );
    }

    #[test]
    fn finish_keeps_both_failures() {
        let fatal = finish(
            Err(TermError::Geometry("x".to_string())),
            Err(TermError::TerminalApply(io::Error::other("y"))),
        )
        .unwrap_err();
        assert!(matches!(fatal.cause, TermError::Geometry(_)));
        assert!(matches!(fatal.restore, Some(TermError::TerminalApply(_))));

        assert!(finish(Ok(()), Ok(())).is_ok());
    }

    // the only test that creates a context: the claim never comes back
    #[test]
    fn context_is_exclusive_probes_and_restores() {
        let (master, tty) = open_pty();
        let before = termios::tcgetattr(&tty).unwrap();

        let mut context = TerminalContext::with_fd(&tty, 1).unwrap();
        assert!(matches!(
            TerminalContext::with_fd(&tty, 1),
            Err(TermError::AlreadyActive)
        ));
        assert!(!termios::tcgetattr(&tty)
            .unwrap()
            .local_modes
            .contains(LocalModes::ICANON));

        // the terminal's reply to the position request
        let mut master = File::from(master);
        master.write_all(b"\x1b[40;120R").unwrap();

        // a fresh pty reports 0x0 to TIOCGWINSZ, so the cursor fallback has to run
        let mut out = Vec::new();
        let geometry = context
            .probe_geometry(ProbeStrategy::DirectFirst, &mut out)
            .unwrap();
        assert_eq!(geometry, ScreenGeometry { rows: 40, columns: 120 });
        assert_eq!(context.geometry(), Some(geometry));
        assert_eq!(out, b"\x1b[999C\x1b[999B\x1b[6n");

        context.shutdown().unwrap();
        assert!(same_attrs(&before, &termios::tcgetattr(&tty).unwrap()));

        // torn down once, never created again
        assert!(matches!(
            TerminalContext::with_fd(&tty, 1),
            Err(TermError::AlreadyActive)
        ));
    }
}
