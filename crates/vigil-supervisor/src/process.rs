//! OS-facing half of the supervisor: spawning the inference process,
//! signalling it, and the pid file used to find orphans after a restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::config::ProcessSpec;
use crate::error::SupervisorError;

const ORPHAN_POLL: Duration = Duration::from_millis(50);

/// Records the pid of the managed process so a restarted supervisor can
/// find a child it lost track of.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, pid: u32) -> Result<(), SupervisorError> {
        std::fs::write(&self.path, format!("{pid}\n"))
            .map_err(|e| SupervisorError::pid_file(&self.path, e))
    }

    /// Returns `None` when there is no pid file or its content is not a pid.
    pub fn read(&self) -> Result<Option<u32>, SupervisorError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SupervisorError::pid_file(&self.path, e)),
        };
        match content.trim().parse() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                tracing::warn!(path = %self.path.display(), "Ignoring malformed pid file");
                Ok(None)
            }
        }
    }

    pub fn remove(&self) -> Result<(), SupervisorError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SupervisorError::pid_file(&self.path, e)),
        }
    }
}

pub fn spawn(spec: &ProcessSpec) -> Result<Child, SupervisorError> {
    Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            program: spec.program.clone(),
            source,
        })
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> Result<(), SupervisorError> {
    let raw = libc::pid_t::try_from(pid)
        .map_err(|_| SupervisorError::signal(pid, "pid out of range"))?;
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(raw, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(SupervisorError::signal(
            pid,
            std::io::Error::last_os_error().to_string(),
        ))
    }
}

/// Whether a process with this pid exists. A zombie still counts.
#[cfg(unix)]
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks that the pid exists.
    let rc = unsafe { libc::kill(raw, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
#[must_use]
pub fn is_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    if let Some(pid) = child.id()
        && let Err(e) = send_signal(pid, libc::SIGTERM)
    {
        tracing::warn!(pid, error = %e, "Failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "Failed to request process exit");
    }
}

/// Asks the child to exit, then kills it if it is still running after
/// `grace`. Returns the exit status of the reaped child.
pub async fn terminate(child: &mut Child, grace: Duration) -> Result<ExitStatus, SupervisorError> {
    if let Some(status) = child.try_wait().map_err(SupervisorError::Wait)? {
        return Ok(status);
    }

    request_exit(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status.map_err(SupervisorError::Wait),
        Err(_) => {
            tracing::warn!(
                pid = child.id(),
                grace_ms = grace.as_millis(),
                "Process ignored termination request, killing"
            );
            child.kill().await.map_err(SupervisorError::Wait)?;
            child.wait().await.map_err(SupervisorError::Wait)
        }
    }
}

/// Terminates a process left behind by a previous supervisor run.
///
/// Returns the pid that was signalled, if any. The pid file is removed in
/// every case.
#[cfg(unix)]
pub async fn reconcile_orphan(
    pid_file: &PidFile,
    grace: Duration,
) -> Result<Option<u32>, SupervisorError> {
    let Some(pid) = pid_file.read()? else {
        return Ok(None);
    };
    if pid <= 1 || pid == std::process::id() || !is_alive(pid) {
        tracing::info!(pid, path = %pid_file.path().display(), "Removing stale pid file");
        pid_file.remove()?;
        return Ok(None);
    }

    tracing::warn!(pid, "Terminating orphaned inference process");
    if let Err(e) = send_signal(pid, libc::SIGTERM)
        && is_alive(pid)
    {
        return Err(e);
    }

    let deadline = Instant::now() + grace;
    while is_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(ORPHAN_POLL).await;
    }
    if is_alive(pid) {
        tracing::warn!(pid, "Orphan survived the grace period, killing");
        if let Err(e) = send_signal(pid, libc::SIGKILL)
            && is_alive(pid)
        {
            return Err(e);
        }
    }

    pid_file.remove()?;
    Ok(Some(pid))
}

#[cfg(not(unix))]
pub async fn reconcile_orphan(
    pid_file: &PidFile,
    _grace: Duration,
) -> Result<Option<u32>, SupervisorError> {
    pid_file.remove()?;
    Ok(None)
}
