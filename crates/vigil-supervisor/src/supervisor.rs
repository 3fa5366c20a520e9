use std::time::Duration;

use tokio::process::Child;
use tokio::time::Instant;
use vigil_core::{Action, EdgeMessage, HeartbeatPayload, ProcessState, SupervisorHealth, Timestamp};

use crate::config::{ProcessSpec, SupervisorConfig};
use crate::error::SupervisorError;
use crate::process::{self, PidFile};

/// Lifecycle of the single inference process on an edge node.
///
/// `Idle -> Launching` on start, `Launching -> Running` once the child is
/// still alive at the next heartbeat tick, and back to `Idle` on stop, on
/// exit, or when the spawn fails. An unexpected exit is reported as a crash
/// and is never restarted without a new start command.
#[derive(Debug)]
pub struct ProcessSupervisor {
    spec: ProcessSpec,
    stop_grace: Duration,
    pid_file: PidFile,
    state: ProcessState,
    child: Option<Child>,
    created: Instant,
    crash_count: u32,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(spec: ProcessSpec, stop_grace: Duration, pid_file: PidFile) -> Self {
        Self {
            spec,
            stop_grace,
            pid_file,
            state: ProcessState::Idle,
            child: None,
            created: Instant::now(),
            crash_count: 0,
        }
    }

    #[must_use]
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(
            config.process.clone(),
            config.stop_grace,
            PidFile::new(&config.pid_file),
        )
    }

    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    #[must_use]
    pub fn health(&self) -> SupervisorHealth {
        SupervisorHealth {
            uptime_ms: u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX),
            crash_count: self.crash_count,
            pid: self.pid(),
        }
    }

    #[must_use]
    pub fn heartbeat(&self) -> HeartbeatPayload {
        HeartbeatPayload::new(self.state, self.health()).with_sent_time(Timestamp::now())
    }

    /// Kills any process a previous run left behind. Must complete before
    /// the first start command is handled.
    pub async fn reconcile(&self) -> Result<Option<u32>, SupervisorError> {
        process::reconcile_orphan(&self.pid_file, self.stop_grace).await
    }

    /// Promotes a launched child that is still alive to `Running`.
    pub fn tick(&mut self) {
        if self.state != ProcessState::Launching {
            return;
        }
        if let Some(child) = self.child.as_mut()
            && matches!(child.try_wait(), Ok(None))
        {
            tracing::info!(pid = child.id(), "Inference process running");
            self.state = ProcessState::Running;
        }
    }

    /// Applies a command and returns the report owed to the controller.
    pub async fn apply(&mut self, action: Action) -> Option<EdgeMessage> {
        match action {
            Action::Start => self.start().await,
            Action::Stop => Some(self.stop().await),
        }
    }

    /// Launches the inference process. A child whose pid cannot be recorded
    /// is terminated again, since a later restart could not find it.
    pub async fn start(&mut self) -> Option<EdgeMessage> {
        if self.state != ProcessState::Idle {
            tracing::warn!(state = %self.state, pid = self.pid(), "Start ignored, process already alive");
            return None;
        }

        self.state = ProcessState::Launching;
        let mut child = match process::spawn(&self.spec) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(error = %e, "Failed to launch inference process");
                return Some(self.launch_failed(e.to_string()));
            }
        };

        if let Some(pid) = child.id()
            && let Err(e) = self.pid_file.write(pid)
        {
            tracing::error!(pid, error = %e, "Failed to record pid, terminating inference process");
            if let Err(kill) = process::terminate(&mut child, self.stop_grace).await {
                tracing::error!(pid, error = %kill, "Failed to stop unrecorded inference process");
            }
            return Some(self.launch_failed(e.to_string()));
        }

        tracing::info!(program = %self.spec.program, pid = child.id(), "Inference process launched");
        self.child = Some(child);
        None
    }

    /// Stops the child if there is one. Always acknowledges with `Stopped`.
    pub async fn stop(&mut self) -> EdgeMessage {
        let Some(mut child) = self.child.take() else {
            tracing::info!("Stop requested while idle");
            self.state = ProcessState::Idle;
            return EdgeMessage::Stopped;
        };

        match process::terminate(&mut child, self.stop_grace).await {
            Ok(status) => tracing::info!(%status, "Inference process stopped"),
            Err(e) => tracing::error!(error = %e, "Failed to stop inference process cleanly"),
        }
        self.reaped();
        EdgeMessage::Stopped
    }

    /// Resolves when the child exits on its own; pending while idle.
    ///
    /// Cancel safe: the child stays in place until it has been reaped.
    pub async fn exited(&mut self) -> EdgeMessage {
        let Some(child) = self.child.as_mut() else {
            return std::future::pending().await;
        };
        let reason = match child.wait().await {
            Ok(status) => format!("process exited unexpectedly: {status}"),
            Err(e) => format!("lost track of process: {e}"),
        };
        tracing::error!(%reason, "Inference process crashed");
        self.crash_count += 1;
        self.reaped();
        EdgeMessage::Crashed { reason }
    }

    fn launch_failed(&mut self, reason: String) -> EdgeMessage {
        self.crash_count += 1;
        self.state = ProcessState::Idle;
        EdgeMessage::Crashed { reason }
    }

    fn reaped(&mut self) {
        self.child = None;
        self.state = ProcessState::Idle;
        if let Err(e) = self.pid_file.remove() {
            tracing::warn!(error = %e, "Failed to remove pid file");
        }
    }
}
