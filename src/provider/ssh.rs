use std::path::PathBuf;

use super::require;
use crate::{error::TunnelResult, tunnel::TunnelCommand};

/// A host reached with plain SSH local port forwarding
#[derive(Debug, Clone)]
pub struct SshTarget {
    /// `user@host` or a host alias from the SSH config
    pub destination: String,
    /// Host the remote end connects to, as seen from `destination`
    pub remote_host: String,
    pub remote_port: u16,
    pub identity_file: Option<PathBuf>,
    pub ssh_port: Option<u16>,
}

impl SshTarget {
    pub fn tunnel_command(&self, local_port: u16) -> TunnelResult<TunnelCommand> {
        require(&self.destination, "SSH destination")?;
        require(&self.remote_host, "remote host")?;

        let mut command = TunnelCommand::new("ssh")
            .arg("-N")
            .arg("-L")
            .arg(format!(
                "{local_port}:{}:{}",
                self.remote_host, self.remote_port
            ))
            .args(["-o", "ExitOnForwardFailure=yes"]);

        if let Some(identity) = &self.identity_file {
            command = command.arg("-i").arg(identity.to_string_lossy());
        }
        if let Some(port) = self.ssh_port {
            command = command.arg("-p").arg(port.to_string());
        }

        Ok(command.arg(&self.destination))
    }

    pub fn remote_target(&self) -> String {
        format!(
            "ssh:{}:{}:{}",
            self.destination, self.remote_host, self.remote_port
        )
    }
}
