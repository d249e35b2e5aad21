pub mod aws;
pub mod azure;
pub mod gcp;
pub mod ssh;

use self::{aws::AwsTarget, azure::AzureTarget, gcp::GcpTarget, ssh::SshTarget};
use crate::{error::TunnelResult, tunnel::TunnelCommand};

/// Where a tunnel leads, one variant per supported way of reaching a VM
///
/// Each variant wraps a provider-specific target that knows how to build
/// its own tunnel command.
#[derive(Debug, Clone)]
pub enum Provider {
    Aws(AwsTarget),
    Gcp(GcpTarget),
    Azure(AzureTarget),
    Ssh(SshTarget),
}

impl Provider {
    /// Command that forwards `local_port` on this machine to the target
    pub fn tunnel_command(&self, local_port: u16) -> TunnelResult<TunnelCommand> {
        match self {
            Self::Aws(target) => target.tunnel_command(local_port),
            Self::Gcp(target) => target.tunnel_command(local_port),
            Self::Azure(target) => target.tunnel_command(local_port),
            Self::Ssh(target) => target.tunnel_command(local_port),
        }
    }

    /// Human-readable description of the remote end
    pub fn remote_target(&self) -> String {
        match self {
            Self::Aws(target) => target.remote_target(),
            Self::Gcp(target) => target.remote_target(),
            Self::Azure(target) => target.remote_target(),
            Self::Ssh(target) => target.remote_target(),
        }
    }
}

/// Vendor CLI name, with the Windows launcher suffix where one is needed
pub(crate) fn vendor_cli(name: &str, windows_suffix: &str) -> String {
    if cfg!(windows) {
        format!("{name}{windows_suffix}")
    } else {
        name.to_string()
    }
}

pub(crate) fn require(value: &str, what: &str) -> TunnelResult<()> {
    if value.trim().is_empty() {
        return Err(crate::error::TunnelError::InvalidTarget(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_reaches_variant() {
        let provider = Provider::Gcp(GcpTarget {
            instance: "vm-1".to_string(),
            zone: "europe-west1-b".to_string(),
            project: None,
            remote_port: 22,
        });

        let command = provider.tunnel_command(44500).unwrap();
        assert!(command.args.contains(&"start-iap-tunnel".to_string()));
        assert_eq!(provider.remote_target(), "gcp:vm-1:22");
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("  ", "instance").is_err());
        assert!(require("i-0abc", "instance").is_ok());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_vendor_cli_plain_on_unix() {
        assert_eq!(vendor_cli("az", ".cmd"), "az");
    }
}
