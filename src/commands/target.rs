use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::{
    commands::credential_cache,
    constants::{DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, DEFAULT_READY_TIMEOUT},
    provider::{
        Provider, aws::AwsTarget, azure::AzureTarget, gcp::GcpTarget, ssh::SshTarget,
    },
    session::Session,
    tunnel::TunnelOptions,
};

/// Where to open the tunnel to
#[derive(Debug, Clone, Subcommand)]
pub enum TargetCommand {
    #[command(about = "EC2 instance through SSM Session Manager")]
    Aws(AwsArgs),
    #[command(about = "Compute Engine instance through IAP")]
    Gcp(GcpArgs),
    #[command(about = "Azure VM through a Bastion host")]
    Azure(AzureArgs),
    #[command(about = "Any host through SSH local port forwarding")]
    Ssh(SshArgs),
}

#[derive(Debug, Clone, Args)]
pub struct AwsArgs {
    #[arg(help = "EC2 instance id")]
    pub instance_id: String,

    #[arg(short = 'r', long, default_value_t = 22, help = "Port on the instance")]
    pub remote_port: u16,
}

#[derive(Debug, Clone, Args)]
pub struct GcpArgs {
    #[arg(help = "Instance name")]
    pub instance: String,

    #[arg(short = 'z', long, help = "Instance zone")]
    pub zone: String,

    #[arg(long, help = "Project id (defaults to the gcloud configuration)")]
    pub project: Option<String>,

    #[arg(short = 'r', long, default_value_t = 22, help = "Port on the instance")]
    pub remote_port: u16,
}

#[derive(Debug, Clone, Args)]
pub struct AzureArgs {
    #[arg(help = "VM name")]
    pub vm_name: String,

    #[arg(short = 'g', long, help = "Resource group of the VM")]
    pub resource_group: String,

    #[arg(short = 's', long, help = "Subscription id")]
    pub subscription: String,

    #[arg(long, help = "Bastion host name (defaults to <resource-group>-vpc-bastion)")]
    pub bastion: Option<String>,

    #[arg(short = 'r', long, default_value_t = 22, help = "Port on the VM")]
    pub remote_port: u16,
}

#[derive(Debug, Clone, Args)]
pub struct SshArgs {
    #[arg(help = "SSH destination (user@host or config alias)")]
    pub destination: String,

    #[arg(
        long,
        default_value = "localhost",
        help = "Host to forward to, as seen from the destination"
    )]
    pub remote_host: String,

    #[arg(short = 'r', long, default_value_t = 22, help = "Port on the remote host")]
    pub remote_port: u16,

    #[arg(short = 'i', long, help = "Identity file")]
    pub identity_file: Option<PathBuf>,

    #[arg(long, help = "SSH port of the destination")]
    pub ssh_port: Option<u16>,
}

/// Local port range and readiness knobs shared by `tunnel`, `proxy` and `ssh`
#[derive(Debug, Clone, Args)]
pub struct TunnelArgs {
    #[arg(long, global = true, default_value_t = DEFAULT_PORT_RANGE_START, help = "First local port to try")]
    pub port_start: u16,

    #[arg(long, global = true, default_value_t = DEFAULT_PORT_RANGE_END, help = "Last local port to try")]
    pub port_end: u16,

    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_READY_TIMEOUT.as_secs(),
        help = "Seconds to wait for the tunnel to accept connections"
    )]
    pub ready_timeout: u64,
}

impl TunnelArgs {
    pub fn options(&self) -> TunnelOptions {
        TunnelOptions {
            port_range: (self.port_start, self.port_end),
            ready_timeout: Duration::from_secs(self.ready_timeout),
        }
    }
}

impl TargetCommand {
    /// Resolve into a provider, fetching AWS credentials when the target needs them
    pub async fn into_provider(self, profile: &str) -> Result<Provider> {
        let provider = match self {
            Self::Aws(args) => {
                let cache = credential_cache()?;
                let credential = cache
                    .get(profile)
                    .await
                    .with_context(|| format!("Failed to get credentials for profile '{profile}'"))?;
                Provider::Aws(AwsTarget {
                    instance_id: args.instance_id,
                    remote_port: args.remote_port,
                    session: Session::new(profile, credential),
                })
            }
            Self::Gcp(args) => Provider::Gcp(GcpTarget {
                instance: args.instance,
                zone: args.zone,
                project: args.project,
                remote_port: args.remote_port,
            }),
            Self::Azure(args) => Provider::Azure(AzureTarget {
                vm_name: args.vm_name,
                resource_group: args.resource_group,
                subscription: args.subscription,
                bastion: args.bastion,
                remote_port: args.remote_port,
            }),
            Self::Ssh(args) => Provider::Ssh(SshTarget {
                destination: args.destination,
                remote_host: args.remote_host,
                remote_port: args.remote_port,
                identity_file: args.identity_file,
                ssh_port: args.ssh_port,
            }),
        };

        Ok(provider)
    }
}
