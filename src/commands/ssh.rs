use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{TargetCommand, TunnelArgs};
use crate::{
    signal::SignalGuard,
    tunnel::{self, SshClient},
};

/// Open a tunnel to port 22 of the target and run an ssh session through it
#[derive(Debug, Clone, Args)]
pub struct SshCommand {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    #[arg(short = 'l', long = "login", help = "Remote user name (default: ssh's own choice)")]
    pub login: Option<String>,

    #[arg(long = "key", help = "Private key handed to ssh -i")]
    pub key: Option<PathBuf>,

    #[arg(short = 'c', long = "command", help = "Run this command instead of a login shell")]
    pub remote_command: Option<String>,

    #[command(subcommand)]
    pub target: TargetCommand,
}

impl SshCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let options = self.tunnel.options();
        let provider = self.target.into_provider(profile).await?;

        let _guard = SignalGuard::install().context("Failed to install signal handlers")?;
        let mut handle = tunnel::open(&provider, &options)
            .await
            .context("Failed to open tunnel")?;
        handle.mark_active();

        let stopper = handle.stopper();
        let client = SshClient::new(handle.local_port())
            .with_user(self.login)
            .with_identity_file(self.key)
            .with_remote_command(self.remote_command);

        let (connector, executor) = tokio::join!(handle.wait(), client.run(&stopper));

        handle.stop().await.context("Failed to stop tunnel")?;

        executor.context("SSH session failed")?;
        connector.context("Tunnel process failed")?;

        info!("SSH session finished");
        Ok(())
    }
}
