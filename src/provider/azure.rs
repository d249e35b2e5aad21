use super::{require, vendor_cli};
use crate::{error::TunnelResult, tunnel::TunnelCommand};

/// An Azure VM reached through a Bastion host tunnel
#[derive(Debug, Clone)]
pub struct AzureTarget {
    pub vm_name: String,
    pub resource_group: String,
    pub subscription: String,
    /// Bastion host name; defaults to `<resource-group>-vpc-bastion`
    pub bastion: Option<String>,
    pub remote_port: u16,
}

impl AzureTarget {
    pub fn bastion_name(&self) -> String {
        self.bastion
            .clone()
            .unwrap_or_else(|| format!("{}-vpc-bastion", self.resource_group))
    }

    pub fn target_resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
            self.subscription, self.resource_group, self.vm_name
        )
    }

    pub fn tunnel_command(&self, local_port: u16) -> TunnelResult<TunnelCommand> {
        require(&self.vm_name, "VM name")?;
        require(&self.resource_group, "resource group")?;
        require(&self.subscription, "subscription")?;

        Ok(TunnelCommand::new(vendor_cli("az", ".cmd"))
            .args(["network", "bastion", "tunnel", "--port"])
            .arg(local_port.to_string())
            .arg("--resource-port")
            .arg(self.remote_port.to_string())
            .arg("--name")
            .arg(self.bastion_name())
            .arg("--resource-group")
            .arg(&self.resource_group)
            .arg("--target-resource-id")
            .arg(self.target_resource_id())
            .arg("--only-show-errors"))
    }

    pub fn remote_target(&self) -> String {
        format!("azure:{}:{}", self.vm_name, self.remote_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> AzureTarget {
        AzureTarget {
            vm_name: "devbox".to_string(),
            resource_group: "dev-rg".to_string(),
            subscription: "0000-1111".to_string(),
            bastion: None,
            remote_port: 22,
        }
    }

    #[test]
    fn test_default_bastion_name() {
        assert_eq!(target().bastion_name(), "dev-rg-vpc-bastion");
    }

    #[test]
    fn test_tunnel_command() {
        let command = target().tunnel_command(44700).unwrap();
        assert_eq!(
            command.args,
            vec![
                "network",
                "bastion",
                "tunnel",
                "--port",
                "44700",
                "--resource-port",
                "22",
                "--name",
                "dev-rg-vpc-bastion",
                "--resource-group",
                "dev-rg",
                "--target-resource-id",
                "/subscriptions/0000-1111/resourceGroups/dev-rg/providers/Microsoft.Compute/virtualMachines/devbox",
                "--only-show-errors",
            ]
        );
    }
}
