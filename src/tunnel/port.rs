use std::net::{Ipv4Addr, TcpListener};

use tracing::{debug, trace};

use crate::error::{TunnelError, TunnelResult};

/// First port in `start..=end` that can be bound on 127.0.0.1
///
/// The trial listener is closed before returning, so another process may
/// still grab the port before the tunnel binds it.
pub fn allocate(start: u16, end: u16) -> TunnelResult<u16> {
    // Port 0 would make the OS pick an arbitrary port.
    for port in start.max(1)..=end {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                drop(listener);
                debug!("Allocated local port {}", port);
                return Ok(port);
            }
            Err(e) => trace!("Port {} unavailable: {}", port, e),
        }
    }

    Err(TunnelError::NoFreePort { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> u16 {
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_single_port_range_when_free() {
        let port = free_port();
        assert_eq!(allocate(port, port).unwrap(), port);
    }

    #[test]
    fn test_single_port_range_when_taken() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = allocate(port, port).unwrap_err();
        assert!(matches!(err, TunnelError::NoFreePort { start, end } if start == port && end == port));
    }

    #[test]
    fn test_skips_taken_port() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        if port == u16::MAX {
            return;
        }

        let allocated = allocate(port, port.saturating_add(50)).unwrap();
        assert!(allocated > port);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        assert!(matches!(
            allocate(5000, 4000),
            Err(TunnelError::NoFreePort { .. })
        ));
    }
}
