use std::{
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use tokio::{
    net::TcpStream,
    process::{Child, Command},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TunnelCommand;
use crate::{
    constants::{READY_POLL_INTERVAL, STOP_GRACE_PERIOD},
    error::{TunnelError, TunnelResult},
    signal,
};

/// Lifecycle of a tunnel process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Spawning,
    Ready,
    Active,
    Stopped,
}

/// Cloneable request to tear a tunnel down, shared with the proxy side
#[derive(Debug, Clone, Default)]
pub struct TunnelStopper {
    token: CancellationToken,
}

impl TunnelStopper {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// A running external tunnel process and the local port it forwards
///
/// The process leads its own process group so that helpers it spawns
/// (session-manager-plugin, ssh control processes) are torn down with it.
pub struct TunnelHandle {
    child: Child,
    pid: u32,
    local_port: u16,
    remote_target: String,
    state: TunnelState,
    stopper: TunnelStopper,
    /// Set once the whole group has been killed, not just the leader reaped
    group_released: bool,
}

impl TunnelHandle {
    /// Launch `command` in a new process group
    pub fn start(
        command: &TunnelCommand,
        local_port: u16,
        remote_target: impl Into<String>,
    ) -> TunnelResult<Self> {
        let remote_target = remote_target.into();
        debug!("Spawning tunnel: {} {:?}", command.program, command.args);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| TunnelError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        signal::track(pid);

        info!(
            "Tunnel process {} started for {} on localhost:{}",
            pid, remote_target, local_port
        );

        Ok(Self {
            child,
            pid,
            local_port,
            remote_target,
            state: TunnelState::Spawning,
            stopper: TunnelStopper::default(),
            group_released: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_target(&self) -> &str {
        &self.remote_target
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    pub fn stopper(&self) -> TunnelStopper {
        self.stopper.clone()
    }

    /// A client is attached to the tunnel
    pub fn mark_active(&mut self) {
        if self.state == TunnelState::Ready {
            self.state = TunnelState::Active;
        }
    }

    pub fn is_running(&mut self) -> bool {
        self.state != TunnelState::Stopped && matches!(self.child.try_wait(), Ok(None))
    }

    /// Poll the local port until it accepts connections
    ///
    /// Fails early with [`TunnelError::Exited`] if the process dies first.
    pub async fn wait_ready(&mut self, limit: Duration) -> TunnelResult<()> {
        let started = Instant::now();

        loop {
            let exited = self.child.try_wait().map_err(|e| self.process_error(e))?;
            if let Some(status) = exited {
                self.leader_exited();
                return Err(exit_error(status));
            }

            if TcpStream::connect(("127.0.0.1", self.local_port)).await.is_ok() {
                debug!("Local port {} is accepting connections", self.local_port);
                self.state = TunnelState::Ready;
                return Ok(());
            }

            if started.elapsed() >= limit {
                return Err(TunnelError::Timeout {
                    port: self.local_port,
                    waited_secs: limit.as_secs(),
                });
            }

            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Wait until the process exits or a stop is requested
    ///
    /// A clean exit and a stop request both return `Ok`. Helpers the process
    /// left behind stay tracked until [`stop`](Self::stop) or drop.
    pub async fn wait(&mut self) -> TunnelResult<()> {
        if self.state == TunnelState::Stopped {
            return Ok(());
        }

        let token = self.stopper.token.clone();
        tokio::select! {
            status = self.child.wait() => {
                let status = status.map_err(|e| self.process_error(e))?;
                self.leader_exited();
                if status.success() {
                    info!("Tunnel to {} closed", self.remote_target);
                    Ok(())
                } else {
                    Err(exit_error(status))
                }
            }
            _ = token.cancelled() => {
                debug!("Stop requested for tunnel process {}", self.pid);
                Ok(())
            }
        }
    }

    /// Terminate the whole process group; safe to call more than once
    ///
    /// The group is signalled even when the leader already exited. SIGTERM
    /// first, then SIGKILL once the leader is gone or the grace period runs
    /// out.
    pub async fn stop(&mut self) -> TunnelResult<()> {
        if self.group_released {
            return Ok(());
        }

        self.terminate().await?;

        self.group_released = true;
        signal::untrack(self.pid);
        self.leader_exited();
        info!("Tunnel to {} stopped", self.remote_target);
        Ok(())
    }

    #[cfg(unix)]
    async fn terminate(&mut self) -> TunnelResult<()> {
        use nix::sys::signal::Signal;

        self.signal_group(Signal::SIGTERM)?;

        let leader_running = self
            .child
            .try_wait()
            .map_err(|e| self.process_error(e))?
            .is_none();
        if leader_running && timeout(STOP_GRACE_PERIOD, self.child.wait()).await.is_err() {
            warn!(
                "Tunnel process {} ignored SIGTERM for {}s, killing",
                self.pid,
                STOP_GRACE_PERIOD.as_secs()
            );
        }

        // Whatever is left in the group gets no further grace.
        self.signal_group(Signal::SIGKILL)?;
        self.child.wait().await.map_err(|e| self.process_error(e))?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) -> TunnelResult<()> {
        let exited = self.child.try_wait().map_err(|e| self.process_error(e))?;
        if exited.is_none() {
            self.child.kill().await.map_err(|e| TunnelError::Stop {
                pid: self.pid,
                message: e.to_string(),
            })?;
        }
        let _ = timeout(STOP_GRACE_PERIOD, self.child.wait()).await;
        Ok(())
    }

    #[cfg(unix)]
    fn signal_group(&self, sig: nix::sys::signal::Signal) -> TunnelResult<()> {
        use nix::{errno::Errno, sys::signal::killpg, unistd::Pid};

        let Ok(pgid) = i32::try_from(self.pid) else {
            return Ok(());
        };
        match killpg(Pid::from_raw(pgid), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(TunnelError::Stop {
                pid: self.pid,
                message: e.to_string(),
            }),
        }
    }

    fn process_error(&self, source: std::io::Error) -> TunnelError {
        TunnelError::Process {
            pid: self.pid,
            source,
        }
    }

    fn leader_exited(&mut self) {
        self.state = TunnelState::Stopped;
        self.stopper.stop();
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        if self.group_released {
            return;
        }

        #[cfg(unix)]
        {
            let _ = self.signal_group(nix::sys::signal::Signal::SIGKILL);
        }
        signal::untrack(self.pid);
    }
}

fn exit_error(status: ExitStatus) -> TunnelError {
    TunnelError::Exited {
        code: status.code(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use serial_test::serial;
    use tokio::net::TcpListener;

    use super::*;
    use crate::tunnel::allocate;

    fn sh(script: &str) -> TunnelCommand {
        TunnelCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    #[serial]
    async fn test_ready_when_port_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut handle = TunnelHandle::start(&sh("sleep 30"), port, "test").unwrap();
        handle.wait_ready(Duration::from_secs(5)).await.unwrap();
        assert_eq!(handle.state(), TunnelState::Ready);

        handle.mark_active();
        assert_eq!(handle.state(), TunnelState::Active);

        handle.stop().await.unwrap();
        assert_eq!(handle.state(), TunnelState::Stopped);
    }

    #[tokio::test]
    #[serial]
    async fn test_early_exit_is_reported() {
        let port = allocate(40000, 41000).unwrap();
        let mut handle = TunnelHandle::start(&sh("exit 3"), port, "test").unwrap();

        let err = handle.wait_ready(Duration::from_secs(5)).await.unwrap_err();

        assert!(matches!(err, TunnelError::Exited { code: Some(3) }));
        assert_eq!(handle.state(), TunnelState::Stopped);
        assert!(handle.stopper().is_stopped());
    }

    #[tokio::test]
    #[serial]
    async fn test_timeout_keeps_process_running() {
        let port = allocate(41000, 42000).unwrap();
        let mut handle = TunnelHandle::start(&sh("sleep 30"), port, "test").unwrap();

        let err = handle
            .wait_ready(Duration::from_millis(300))
            .await
            .unwrap_err();

        assert!(matches!(err, TunnelError::Timeout { .. }));
        assert!(handle.is_running());
        handle.stop().await.unwrap();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_is_idempotent() {
        let mut handle = TunnelHandle::start(&sh("sleep 30"), 1, "test").unwrap();

        handle.stop().await.unwrap();
        handle.stop().await.unwrap();

        assert_eq!(handle.state(), TunnelState::Stopped);
    }

    #[tokio::test]
    #[serial]
    async fn test_wait_returns_on_stop_request() {
        let mut handle = TunnelHandle::start(&sh("sleep 30"), 1, "test").unwrap();
        let stopper = handle.stopper();

        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            stopper.stop();
        });

        timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn test_wait_reports_failed_exit() {
        let mut handle = TunnelHandle::start(&sh("exit 7"), 1, "test").unwrap();

        let err = handle.wait().await.unwrap_err();

        assert!(matches!(err, TunnelError::Exited { code: Some(7) }));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _enter = runtime.enter();

        let err = TunnelHandle::start(&TunnelCommand::new("/nonexistent/tunnel-tool"), 1, "t")
            .err()
            .unwrap();

        assert!(matches!(err, TunnelError::Spawn { .. }));
    }
}
