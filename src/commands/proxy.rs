use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{stdin, stdout};
use tracing::{debug, info};

use super::{TargetCommand, TunnelArgs};
use crate::{
    signal::SignalGuard,
    tunnel::{self, ByteProxy},
};

/// Relay stdin/stdout through a freshly opened tunnel
///
/// Meant for SSH `ProxyCommand`: nothing but tunnel bytes is written to
/// stdout.
#[derive(Debug, Clone, Args)]
pub struct ProxyCommand {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    #[command(subcommand)]
    pub target: TargetCommand,
}

impl ProxyCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let options = self.tunnel.options();
        let provider = self.target.into_provider(profile).await?;

        let _guard = SignalGuard::install().context("Failed to install signal handlers")?;
        let mut handle = tunnel::open(&provider, &options)
            .await
            .context("Failed to open tunnel")?;
        handle.mark_active();

        let proxy = ByteProxy::new("127.0.0.1", handle.local_port()).with_stopper(handle.stopper());

        // Connector and executor only meet through the stop request.
        let (connector, executor) = tokio::join!(handle.wait(), proxy.run(stdin(), stdout()));

        handle.stop().await.context("Failed to stop tunnel")?;

        let stats = executor.context("Proxy session failed")?;
        debug!("Proxy relayed {} bytes up, {} bytes down", stats.sent, stats.received);
        connector.context("Tunnel process failed")?;

        info!("Proxy session finished");
        Ok(())
    }
}
