//! Daemon lifecycle control
//!
//! `monkeyd daemon start` forks a detached copy of the current executable
//! running the hidden `run-daemon` command; the child adopts the PID file
//! once it is up and writes its log next to it. Everything lives under a
//! single state directory so the PID-file and log conventions cannot
//! drift apart. Stop is SIGTERM with a bounded grace period, then
//! SIGKILL.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

/// Runtime state directory; the PID file and the daemon log live here.
pub fn state_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("monkeyd")
}

/// Log file written by the detached daemon process.
pub fn log_path() -> PathBuf {
    state_dir().join("monkeyd.log")
}

/// How long a stopping daemon gets before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);

enum Shutdown {
    Graceful,
    Forced,
}

/// The daemon's PID file.
///
/// Liveness is the file's only meaning: reading it never yields a dead
/// process, and a stale entry (left by a crash) is deleted on sight.
pub struct PidFile {
    path: PathBuf,
}

impl Default for PidFile {
    fn default() -> Self {
        Self {
            path: state_dir().join("monkeyd.pid"),
        }
    }
}

impl PidFile {
    /// The PID file at its standard location.
    pub fn new() -> Self {
        Self::default()
    }

    /// A PID file at an explicit location (tests).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The live daemon's PID, if one is running.
    pub fn live_pid(&self) -> Option<u32> {
        let text = fs::read_to_string(&self.path).ok()?;
        let pid: u32 = text.trim().parse().ok()?;
        if process_alive(pid) {
            Some(pid)
        } else {
            debug!(pid, "discarding stale PID file");
            let _ = fs::remove_file(&self.path);
            None
        }
    }

    fn record(&self, pid: u32) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("creating state directory")?;
        }
        fs::write(&self.path, format!("{pid}\n")).context("writing PID file")?;
        debug!(pid, path = %self.path.display(), "PID recorded");
        Ok(())
    }

    /// Fork a detached daemon process and record its PID.
    pub fn spawn_daemon(&self) -> Result<u32> {
        if let Some(pid) = self.live_pid() {
            return Err(eyre!("daemon already running with PID {pid}"));
        }

        let exe = std::env::current_exe().context("locating current executable")?;
        let child = Command::new(exe)
            .arg("run-daemon")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawning daemon process")?;

        let pid = child.id();
        self.record(pid)?;
        info!(pid, "daemon spawned");
        Ok(pid)
    }

    /// Claim the PID file for the current process. Called by the daemon
    /// itself once it is up, so the file always names the process that
    /// actually serves.
    pub fn adopt(&self) -> Result<()> {
        let pid = std::process::id();
        self.record(pid)?;
        info!(pid, "daemon registered");
        Ok(())
    }

    /// Stop the running daemon: SIGTERM, then poll with backoff for up to
    /// [`STOP_GRACE`], then SIGKILL. Returns the PID that was stopped.
    pub fn stop_daemon(&self) -> Result<u32> {
        let pid = self.live_pid().ok_or_else(|| eyre!("daemon is not running"))?;

        info!(pid, "stopping daemon");
        send_signal(pid, Shutdown::Graceful)?;

        let deadline = Instant::now() + STOP_GRACE;
        let mut pause = Duration::from_millis(25);
        while process_alive(pid) {
            if Instant::now() >= deadline {
                warn!(pid, "daemon ignored SIGTERM, killing");
                send_signal(pid, Shutdown::Forced)?;
                std::thread::sleep(Duration::from_millis(100));
                break;
            }
            std::thread::sleep(pause);
            pause = (pause * 2).min(Duration::from_millis(250));
        }

        let _ = fs::remove_file(&self.path);
        info!(pid, "daemon stopped");
        Ok(pid)
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, how: Shutdown) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let signal = match how {
        Shutdown::Graceful => Signal::SIGTERM,
        Shutdown::Forced => Signal::SIGKILL,
    };
    kill(Pid::from_raw(pid as i32), signal).context("signalling daemon")
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Signal 0 probes for existence without delivering anything.
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _how: Shutdown) -> Result<()> {
    Err(eyre!("daemon control requires a unix platform"))
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}
