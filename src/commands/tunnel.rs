use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{TargetCommand, TunnelArgs};
use crate::{signal::SignalGuard, tunnel};

/// Keep a port-forward open until it dies or the user interrupts
#[derive(Debug, Clone, Args)]
pub struct OpenTunnelCommand {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    #[command(subcommand)]
    pub target: TargetCommand,
}

impl OpenTunnelCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let options = self.tunnel.options();
        let provider = self.target.into_provider(profile).await?;

        let _guard = SignalGuard::install().context("Failed to install signal handlers")?;
        let mut handle = tunnel::open(&provider, &options)
            .await
            .context("Failed to open tunnel")?;

        eprintln!(
            "Forwarding localhost:{} to {} (Ctrl+C to stop)",
            handle.local_port(),
            handle.remote_target()
        );
        println!("{}", handle.local_port());

        let result = handle.wait().await;
        handle.stop().await.context("Failed to stop tunnel")?;
        info!("Tunnel session finished");

        result.context("Tunnel process failed")
    }
}
