use std::time::Duration;

use tracing::{info, warn};

pub mod client;
pub mod port;
pub mod process;
pub mod proxy;

pub use client::SshClient;
pub use port::allocate;
pub use process::{TunnelHandle, TunnelState, TunnelStopper};
pub use proxy::{ByteProxy, ProxyStats};

use crate::{
    constants::{DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, DEFAULT_READY_TIMEOUT},
    error::{TunnelError, TunnelResult},
    provider::Provider,
};

/// Program, arguments and extra environment of an external tunnel process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl TunnelCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }
}

/// Knobs for bringing a tunnel up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelOptions {
    pub port_range: (u16, u16),
    pub ready_timeout: Duration,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            port_range: (DEFAULT_PORT_RANGE_START, DEFAULT_PORT_RANGE_END),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

/// Allocate a local port, launch the provider's tunnel on it and wait for it
///
/// A tunnel that is slow to come up only produces a warning: the vendor tool
/// may still finish establishing it.
pub async fn open(provider: &Provider, options: &TunnelOptions) -> TunnelResult<TunnelHandle> {
    let (start, end) = options.port_range;
    let local_port = allocate(start, end)?;
    let command = provider.tunnel_command(local_port)?;

    let mut handle = TunnelHandle::start(&command, local_port, provider.remote_target())?;

    match handle.wait_ready(options.ready_timeout).await {
        Ok(()) => info!(
            "Tunnel to {} listening on localhost:{}",
            handle.remote_target(),
            local_port
        ),
        Err(e @ TunnelError::Timeout { .. }) => warn!("{}; continuing anyway", e),
        Err(e) => {
            handle.stop().await.ok();
            return Err(e);
        }
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let command = TunnelCommand::new("tool")
            .arg("a")
            .args(["b", "c"])
            .arg(String::from("d"))
            .envs([("K".to_string(), "V".to_string())]);

        assert_eq!(command.program, "tool");
        assert_eq!(command.args, vec!["a", "b", "c", "d"]);
        assert_eq!(command.env, vec![("K".to_string(), "V".to_string())]);
    }

    #[test]
    fn test_default_options() {
        let options = TunnelOptions::default();
        assert_eq!(options.port_range, (44500, 45500));
        assert_eq!(options.ready_timeout, DEFAULT_READY_TIMEOUT);
    }
}
