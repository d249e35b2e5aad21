use super::{require, vendor_cli};
use crate::{error::TunnelResult, session::Session, tunnel::TunnelCommand};

/// SSM document that forwards a remote port to a local one
const PORT_FORWARDING_DOCUMENT: &str = "AWS-StartPortForwardingSession";

/// An EC2 instance reached through SSM Session Manager
#[derive(Debug, Clone)]
pub struct AwsTarget {
    pub instance_id: String,
    pub remote_port: u16,
    pub session: Session,
}

impl AwsTarget {
    pub fn tunnel_command(&self, local_port: u16) -> TunnelResult<TunnelCommand> {
        require(&self.instance_id, "instance id")?;

        Ok(TunnelCommand::new(vendor_cli("aws", ".exe"))
            .args(["ssm", "start-session", "--target"])
            .arg(&self.instance_id)
            .args(["--document-name", PORT_FORWARDING_DOCUMENT, "--parameters"])
            .arg(format!(
                "portNumber={},localPortNumber={}",
                self.remote_port, local_port
            ))
            .envs(self.session.env()))
    }

    pub fn remote_target(&self) -> String {
        format!("aws:{}:{}", self.instance_id, self.remote_port)
    }
}
