use super::{require, vendor_cli};
use crate::{error::TunnelResult, tunnel::TunnelCommand};

/// A Compute Engine instance reached through an IAP TCP tunnel
#[derive(Debug, Clone)]
pub struct GcpTarget {
    pub instance: String,
    pub zone: String,
    pub project: Option<String>,
    pub remote_port: u16,
}

impl GcpTarget {
    pub fn tunnel_command(&self, local_port: u16) -> TunnelResult<TunnelCommand> {
        require(&self.instance, "instance name")?;
        require(&self.zone, "zone")?;

        let mut command = TunnelCommand::new(vendor_cli("gcloud", ".cmd"))
            .args(["compute", "start-iap-tunnel"])
            .arg(&self.instance)
            .arg(self.remote_port.to_string())
            .arg(format!("--local-host-port=localhost:{local_port}"))
            .arg(format!("--zone={}", self.zone));

        if let Some(project) = &self.project {
            command = command.arg(format!("--project={project}"));
        }

        Ok(command)
    }

    pub fn remote_target(&self) -> String {
        format!("gcp:{}:{}", self.instance, self.remote_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_command_with_project() {
        let target = GcpTarget {
            instance: "dev-vm".to_string(),
            zone: "us-central1-a".to_string(),
            project: Some("my-project".to_string()),
            remote_port: 22,
        };

        let command = target.tunnel_command(44600).unwrap();
        assert_eq!(
            command.args,
            vec![
                "compute",
                "start-iap-tunnel",
                "dev-vm",
                "22",
                "--local-host-port=localhost:44600",
                "--zone=us-central1-a",
                "--project=my-project",
            ]
        );
        assert!(command.env.is_empty());
    }

    #[test]
    fn test_zone_is_required() {
        let target = GcpTarget {
            instance: "dev-vm".to_string(),
            zone: String::new(),
            project: None,
            remote_port: 22,
        };
        assert!(target.tunnel_command(44600).is_err());
    }
}
