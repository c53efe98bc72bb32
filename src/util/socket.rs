//! Socket utilities and tuning

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

/// Create a non-blocking listening TCP socket
///
/// The returned listener is ready for `tokio::net::TcpListener::from_std`.
pub fn create_tcp_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Enable address reuse
    socket.set_reuse_address(true)?;

    // Non-blocking mode
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    Ok(socket.into())
}

/// Apply per-connection options to an accepted stream
pub fn tune_stream(stream: &TcpStream) {
    // Disable Nagle's algorithm; chunks are already sized by the engine
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_binds_ephemeral_port() {
        let listener = create_tcp_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_listener_rejects_port_in_use() {
        let first = create_tcp_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let addr = first.local_addr().unwrap();

        // SO_REUSEADDR does not allow two active listeners on one port
        assert!(create_tcp_listener(addr, 16).is_err());
    }
}
