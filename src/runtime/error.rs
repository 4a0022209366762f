//! Errors reported by the event loop.

use std::io;
use std::net::SocketAddr;

/// Server setup and event loop errors.
///
/// Setup failures carry the underlying OS error. Per-connection I/O errors
/// never surface here: they are logged and contained to their connection.
#[derive(Debug)]
pub enum ServerError {
    /// The server options are unusable.
    InvalidOptions(&'static str),
    /// The bind host could not be resolved.
    Resolve(String, io::Error),
    /// Creating or configuring the listening socket failed.
    Socket(io::Error),
    /// Binding the listening socket failed.
    Bind(SocketAddr, io::Error),
    /// Listening on the bound socket failed.
    Listen(SocketAddr, io::Error),
    /// The readiness polling facility failed. Fatal to the event loop.
    Poll(io::Error),
    /// The server was already stopped and its listening socket released.
    Stopped,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InvalidOptions(msg) => write!(f, "Invalid server options: {}", msg),
            ServerError::Resolve(host, e) => write!(f, "Failed to resolve '{}': {}", host, e),
            ServerError::Socket(e) => write!(f, "Socket error: {}", e),
            ServerError::Bind(addr, e) => write!(f, "Bind error on {}: {}", addr, e),
            ServerError::Listen(addr, e) => write!(f, "Listen error on {}: {}", addr, e),
            ServerError::Poll(e) => write!(f, "Poll error: {}", e),
            ServerError::Stopped => write!(f, "Server is stopped"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Resolve(_, e)
            | ServerError::Socket(e)
            | ServerError::Bind(_, e)
            | ServerError::Listen(_, e)
            | ServerError::Poll(e) => Some(e),
            ServerError::InvalidOptions(_) | ServerError::Stopped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_includes_os_error() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let err = ServerError::Bind(
            addr,
            io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        );
        assert_eq!(err.to_string(), "Bind error on 127.0.0.1:9999: address in use");
        assert!(err.source().is_some());
        assert!(ServerError::Stopped.source().is_none());
    }
}
