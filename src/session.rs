//! PTY session management.
//!
//! A [`Session`] owns one child process attached to a pty, the emulator fed
//! by its output, and the input history driving it. Exactly one reader
//! thread per session consumes the pty master and is the sole writer into
//! the emulator; every other access goes through the same state mutex, so
//! captures taken under that lock are atomic snapshots.
//!
//! Lifecycle: `starting → running → exited`. The reader thread observes
//! end-of-stream, reaps the child, records the exit code, and only then
//! fires the completion signal — in that order — so any number of waiters
//! can block on the signal and then read a stable exit code.

// Rust guideline compliant 2026-02

use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::watch;

use crate::constants::PTY_READ_BUF;
use crate::emulator::Emulator;
use crate::font::FontBook;
use crate::render;

/// Everything guarded by the session's single state mutex.
struct SessionState {
    emulator: Emulator,
    input_history: Vec<String>,
    exited: bool,
    exit_code: i32,
    killed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// One child process under a pty, plus its emulated screen.
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    /// Master-side writer for keystroke injection. Taken on kill so later
    /// writes fail instead of going to a dead pty.
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    /// Master pty handle. Dropped on kill, which gives the reader EOF.
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    /// Kill handle cloned off the child before the reader thread took it.
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    /// Completion signal: flips from `false` to `true` exactly once, after
    /// the exit code has been recorded.
    exit_rx: watch::Receiver<bool>,
}

impl Session {
    /// Fork and exec `argv` on a fresh pty of `rows` × `cols`.
    ///
    /// The child inherits this process's environment with
    /// `TERM=xterm-256color` added, and gets the pty slave as its
    /// controlling terminal. The reader thread is running by the time this
    /// returns.
    ///
    /// # Errors
    ///
    /// Fails on empty `argv` or when the pty or the exec cannot be set up;
    /// no partial session is left behind in that case.
    pub fn spawn(argv: &[String], rows: u16, cols: u16) -> Result<Self> {
        let Some(program) = argv.first() else {
            bail!("no command specified");
        };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(program);
        for arg in &argv[1..] {
            cmd.arg(arg);
        }
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {program}"))?;
        let killer = child.clone_killer();

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        let writer = pair
            .master
            .take_writer()
            .context("Failed to take PTY writer")?;

        let state = Arc::new(Mutex::new(SessionState {
            emulator: Emulator::new(rows, cols),
            input_history: Vec::new(),
            exited: false,
            exit_code: 0,
            killed: false,
        }));

        let (exit_tx, exit_rx) = watch::channel(false);
        spawn_reader_thread(reader, child, Arc::clone(&state), exit_tx);

        log::info!("Session spawned: {program} ({rows}x{cols})");

        Ok(Self {
            state,
            writer: Mutex::new(Some(writer)),
            master: Mutex::new(Some(pair.master)),
            killer: Mutex::new(killer),
            exit_rx,
        })
    }

    /// Write raw bytes to the pty master.
    ///
    /// The whole payload goes out in one write call, so bytes of a single
    /// request are never interleaved with a concurrent writer's.
    ///
    /// # Errors
    ///
    /// Fails once the session has been killed, or on a pty write error.
    pub fn write_input(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().expect("writer lock poisoned");
        let writer = guard.as_mut().ok_or_else(|| anyhow!("pty is closed"))?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Append an entry to the input history.
    ///
    /// Called after the corresponding pty write succeeded; history only
    /// ever grows and entries are stored verbatim.
    pub fn record_input(&self, text: &str) {
        let mut st = self.state.lock().expect("session state lock poisoned");
        st.input_history.push(text.to_string());
    }

    /// Snapshot of the input history.
    pub fn history(&self) -> Vec<String> {
        let st = self.state.lock().expect("session state lock poisoned");
        st.input_history.clone()
    }

    /// Whether the child has exited and been reaped.
    pub fn is_exited(&self) -> bool {
        let st = self.state.lock().expect("session state lock poisoned");
        st.exited
    }

    /// Block until the child has exited, then return its exit code.
    ///
    /// Does not hold the session lock while blocked; any number of
    /// concurrent waiters observe the same code. A waiter arriving after
    /// the child already exited returns immediately.
    pub async fn await_exit(&self) -> Result<i32> {
        let mut rx = self.exit_rx.clone();
        rx.wait_for(|fired| *fired)
            .await
            .map_err(|_| anyhow!("session reader terminated without signaling"))?;
        let st = self.state.lock().expect("session state lock poisoned");
        Ok(st.exit_code)
    }

    /// Capture the screen as text, atomically against child output.
    ///
    /// # Errors
    ///
    /// Fails after [`Session::kill`].
    pub fn capture_text(&self) -> Result<String> {
        let st = self.state.lock().expect("session state lock poisoned");
        if st.killed {
            bail!("session is closed");
        }
        Ok(render::render_text(&st.emulator))
    }

    /// Capture the screen as PNG bytes, atomically against child output.
    ///
    /// # Errors
    ///
    /// Fails after [`Session::kill`] or when rendering fails.
    pub fn capture_png(&self, fonts: &FontBook) -> Result<Vec<u8>> {
        let st = self.state.lock().expect("session state lock poisoned");
        if st.killed {
            bail!("session is closed");
        }
        render::render_png(&st.emulator, fonts)
    }

    /// Terminate the session: best-effort kill of the child, then close
    /// the pty master so the reader thread sees EOF and reaps.
    ///
    /// Safe to call when the child has already exited, and idempotent.
    pub fn kill(&self) {
        let already_exited = {
            let mut st = self.state.lock().expect("session state lock poisoned");
            st.killed = true;
            st.exited
        };
        if !already_exited {
            let mut killer = self.killer.lock().expect("killer lock poisoned");
            if let Err(e) = killer.kill() {
                // Child may have exited between the check and the signal
                log::warn!("Failed to kill child: {e}");
            }
        }
        self.writer.lock().expect("writer lock poisoned").take();
        self.master.lock().expect("master lock poisoned").take();
        log::info!("Session killed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Don't leave an orphaned child behind if the owner never killed us
        let master_open = self
            .master
            .lock()
            .map(|master| master.is_some())
            .unwrap_or(false);
        if master_open {
            self.kill();
        }
    }
}

/// Start the per-session reader thread.
///
/// Reads the pty master in [`PTY_READ_BUF`]-sized batches and applies each
/// batch to the emulator under the state lock. On end-of-stream (or a read
/// error, which is how Linux reports a hung-up pty) it reaps the child,
/// records the exit code, and fires the completion signal.
fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    state: Arc<Mutex<SessionState>>,
    exit_tx: watch::Sender<bool>,
) {
    thread::spawn(move || {
        log::debug!("PTY reader thread started");
        let mut buf = [0u8; PTY_READ_BUF];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let mut st = state.lock().expect("session state lock poisoned");
                    st.emulator.process(&buf[..n]);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("PTY read ended: {e}");
                    break;
                }
            }
        }

        let exit_code = match child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(e) => {
                log::warn!("Failed to reap child: {e}");
                -1
            }
        };
        log::info!("Child exited with code {exit_code}");

        {
            let mut st = state.lock().expect("session state lock poisoned");
            st.exited = true;
            st.exit_code = exit_code;
        }
        // Fire the completion signal only after the code is recorded
        let _ = exit_tx.send(true);
        log::debug!("PTY reader thread exiting");
    });
}
