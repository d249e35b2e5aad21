use std::{path::PathBuf, process::Stdio, time::Duration};

use tokio::{process::Command, time::sleep};
use tracing::{debug, info, warn};

use super::{TunnelCommand, TunnelStopper};
use crate::{
    constants::{SSH_CONNECT_ATTEMPTS, SSH_CONNECT_TIMEOUT_SECS, SSH_RETRY_DELAY},
    error::{TunnelError, TunnelResult},
};

/// Exit status ssh reports for its own failures (connection refused, reset)
const SSH_ERROR_EXIT: i32 = 255;

/// Interactive ssh session over a tunnel's local port
///
/// The tunnel endpoint may accept connections before the far side is able to
/// carry SSH, so connection failures are retried a bounded number of times
/// while the tunnel is still up.
#[derive(Debug, Clone)]
pub struct SshClient {
    local_port: u16,
    user: Option<String>,
    identity_file: Option<PathBuf>,
    remote_command: Option<String>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl SshClient {
    pub fn new(local_port: u16) -> Self {
        Self {
            local_port,
            user: None,
            identity_file: None,
            remote_command: None,
            max_attempts: SSH_CONNECT_ATTEMPTS,
            retry_delay: SSH_RETRY_DELAY,
        }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_identity_file(mut self, identity_file: Option<PathBuf>) -> Self {
        self.identity_file = identity_file;
        self
    }

    /// Run `command` in the remote home directory instead of a login shell
    pub fn with_remote_command(mut self, command: Option<String>) -> Self {
        self.remote_command = command;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// `ssh -p <port> [-i key] [user@]localhost ...`
    ///
    /// Host keys are not recorded: the key seen on a tunnel port belongs to
    /// whichever VM the tunnel happens to reach.
    pub fn command(&self) -> TunnelCommand {
        let destination = match &self.user {
            Some(user) => format!("{user}@localhost"),
            None => "localhost".to_string(),
        };

        let mut command = TunnelCommand::new("ssh")
            .arg("-p")
            .arg(self.local_port.to_string());
        if let Some(identity) = &self.identity_file {
            command = command.arg("-i").arg(identity.to_string_lossy());
        }
        command = command.arg(destination).args([
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "StrictHostKeyChecking=no",
        ]);
        if cfg!(not(windows)) {
            command = command
                .arg("-o")
                .arg(format!("ConnectTimeout={SSH_CONNECT_TIMEOUT_SECS}"));
        }
        if let Some(remote) = &self.remote_command {
            command = command.arg(format!("cd $HOME && {remote}"));
        }
        command
    }

    /// Run the session to its end, then request the tunnel stop
    pub async fn run(&self, stopper: &TunnelStopper) -> TunnelResult<()> {
        let result = self.run_command(&self.command(), stopper).await;
        stopper.stop();
        result
    }

    async fn run_command(
        &self,
        command: &TunnelCommand,
        stopper: &TunnelStopper,
    ) -> TunnelResult<()> {
        let mut attempt = 1;

        loop {
            debug!("Running ssh client (attempt {}): {:?}", attempt, command.args);
            let status = Command::new(&command.program)
                .args(&command.args)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|source| TunnelError::Spawn {
                    program: command.program.clone(),
                    source,
                })?;

            if status.success() {
                info!("SSH session on port {} finished", self.local_port);
                return Ok(());
            }

            let code = status.code();
            let retryable = code == Some(SSH_ERROR_EXIT) && !stopper.is_stopped();
            if !retryable || attempt >= self.max_attempts {
                return Err(TunnelError::ClientExited { code });
            }

            warn!(
                "SSH connection attempt {}/{} through port {} failed, retrying",
                attempt, self.max_attempts, self.local_port
            );
            sleep(self.retry_delay).await;
            attempt += 1;
        }
    }
}
