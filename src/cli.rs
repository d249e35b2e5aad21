use std::future::Future;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use crate::{
    commands::{
        ClearCommand, CompletionsCommand, CredentialsCommand, OpenTunnelCommand, OutputFormat,
        ProxyCommand, SshCommand,
    },
    constants::DEFAULT_PROFILE,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "clvm", version, about = "Reach cloud VMs through local tunnels with cached AWS credentials", long_about = None, arg_required_else_help = false)]
pub struct Cli {
    #[arg(
        short = 'p',
        long,
        global = true,
        default_value = DEFAULT_PROFILE,
        help = "AWS profile name"
    )]
    pub profile: String,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Print valid AWS credentials for the profile, refreshing them if needed")]
    Credentials(CredentialsCommand),
    #[command(about = "Remove the cached credentials of the profile")]
    Clear(ClearCommand),
    #[command(about = "Open a port-forwarding tunnel and keep it up until interrupted")]
    Tunnel(OpenTunnelCommand),
    #[command(about = "Relay stdin/stdout through a tunnel (for SSH ProxyCommand)")]
    Proxy(ProxyCommand),
    #[command(about = "Open a tunnel and run an interactive ssh session through it")]
    Ssh(SshCommand),
    #[command(about = "Generate shell completion scripts for clvm")]
    Completions(CompletionsCommand),
}

impl Cli {
    /// Run the selected command to completion on its own runtime
    pub fn run(self) -> Result<()> {
        block_on_detached(self.execute())?
    }

    pub async fn execute(self) -> Result<()> {
        let profile = self.profile;
        let command = self.command.unwrap_or(Commands::Credentials(CredentialsCommand {
            format: OutputFormat::Exports,
        }));

        match command {
            Commands::Credentials(cmd) => cmd.execute(&profile).await,
            Commands::Clear(cmd) => cmd.execute(&profile).await,
            Commands::Tunnel(cmd) => cmd.execute(&profile).await,
            Commands::Proxy(cmd) => cmd.execute(&profile).await,
            Commands::Ssh(cmd) => cmd.execute(&profile).await,
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}

/// Drive `future` on a fresh runtime, then drop the runtime without joining
/// its blocking pool
///
/// A stdin read still parked on a blocking thread (the proxy's local side)
/// must not keep the process alive once the command has returned.
pub(crate) fn block_on_detached<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}
