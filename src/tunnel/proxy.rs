use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;

use super::TunnelStopper;
use crate::{constants::PROXY_BUFFER_SIZE, error::TunnelResult};

/// Bytes moved in each direction by one proxy session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    /// Local input to remote
    pub sent: u64,
    /// Remote to local output
    pub received: u64,
}

/// Relays a local byte stream (usually stdin/stdout) through a TCP endpoint
pub struct ByteProxy {
    remote_host: String,
    remote_port: u16,
    stopper: Option<TunnelStopper>,
}

impl ByteProxy {
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            stopper: None,
        }
    }

    /// Request a tunnel stop once the proxy session ends, however it ends
    pub fn with_stopper(mut self, stopper: TunnelStopper) -> Self {
        self.stopper = Some(stopper);
        self
    }

    pub async fn run<R, W>(&self, local_in: R, local_out: W) -> TunnelResult<ProxyStats>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.connect_and_pump(local_in, local_out).await;

        if let Some(stopper) = &self.stopper {
            stopper.stop();
        }

        result
    }

    async fn connect_and_pump<R, W>(&self, local_in: R, local_out: W) -> TunnelResult<ProxyStats>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let remote = TcpStream::connect((self.remote_host.as_str(), self.remote_port)).await?;
        remote.set_nodelay(true)?;
        debug!(
            "Proxy connected to {}:{}",
            self.remote_host, self.remote_port
        );

        let stats = pump(local_in, local_out, remote).await?;
        debug!(
            "Proxy finished: {} bytes sent, {} bytes received",
            stats.sent, stats.received
        );
        Ok(stats)
    }
}

/// Copy bytes both ways until the remote side closes
///
/// End of local input half-closes the remote write side; the session keeps
/// draining the remote until it hangs up.
pub async fn pump<R, W, S>(mut local_in: R, mut local_out: W, remote: S) -> TunnelResult<ProxyStats>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite,
{
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);
    let mut upstream = [0u8; PROXY_BUFFER_SIZE];
    let mut downstream = [0u8; PROXY_BUFFER_SIZE];
    let mut stats = ProxyStats::default();
    let mut local_open = true;

    loop {
        tokio::select! {
            read = local_in.read(&mut upstream), if local_open => {
                let n = read?;
                if n == 0 {
                    debug!("Local input closed");
                    local_open = false;
                    remote_write.shutdown().await?;
                    continue;
                }
                remote_write.write_all(&upstream[..n]).await?;
                stats.sent += n as u64;
            }
            read = remote_read.read(&mut downstream) => {
                let n = read?;
                if n == 0 {
                    debug!("Remote closed the connection");
                    break;
                }
                local_out.write_all(&downstream[..n]).await?;
                local_out.flush().await?;
                stats.received += n as u64;
            }
        }
    }

    local_out.flush().await?;
    Ok(stats)
}
