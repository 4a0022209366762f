//! Echo listener.
//!
//! Sends every byte a client writes straight back to it. Inbound bytes are
//! appended to a per-connection pending buffer and the connection is marked
//! writable; the event loop then pulls from that buffer whenever the socket
//! can take more, and write interest lapses once it is drained.
//!
//! A client that keeps sending without reading its echo makes the pending
//! buffer grow. Past `max_pending` bytes the connection is closed.

use crate::runtime::{Connection, Listener};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Default cap on unsent bytes per connection.
pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

const INITIAL_CAPACITY: usize = 4096;

/// Per-connection echo state.
#[derive(Debug, Default)]
pub struct EchoConnection {
    /// Received bytes not yet written back.
    pending: BytesMut,
}

impl EchoConnection {
    /// Bytes waiting to be echoed.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// Listener that echoes inbound bytes.
#[derive(Debug)]
pub struct EchoListener {
    max_pending: usize,
    accepted: u64,
    closed: u64,
}

impl EchoListener {
    /// Create an echo listener that closes clients with more than
    /// `max_pending` unsent bytes.
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending,
            accepted: 0,
            closed: 0,
        }
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Connections closed so far.
    pub fn closed(&self) -> u64 {
        self.closed
    }
}

impl Default for EchoListener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

impl Listener for EchoListener {
    type Context = EchoConnection;

    fn connection_accepted(&mut self, peer: SocketAddr) -> Option<EchoConnection> {
        self.accepted += 1;
        debug!(peer = %peer, "Echo connection accepted");
        Some(EchoConnection {
            pending: BytesMut::with_capacity(INITIAL_CAPACITY),
        })
    }

    fn data_read(&mut self, conn: &mut Connection<EchoConnection>, data: &[u8]) {
        let pending = conn.context().pending.len();
        if pending + data.len() > self.max_pending {
            warn!(
                conn_id = conn.id().as_usize(),
                pending,
                incoming = data.len(),
                max_pending = self.max_pending,
                "Echo backlog exceeded, closing"
            );
            conn.close();
            return;
        }

        conn.context_mut().pending.extend_from_slice(data);
        conn.set_writable();
    }

    fn connection_closed(&mut self, conn: &mut Connection<EchoConnection>) {
        self.closed += 1;
        debug!(
            conn_id = conn.id().as_usize(),
            unsent = conn.context().pending.len(),
            "Echo connection closed"
        );
    }

    fn write_data_requested<'a>(&mut self, conn: &'a mut Connection<EchoConnection>) -> &'a [u8] {
        &conn.context_mut().pending
    }

    fn data_written(&mut self, conn: &mut Connection<EchoConnection>, written: usize) {
        conn.context_mut().pending.advance(written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ConnectionId;

    fn accept(listener: &mut EchoListener) -> Connection<EchoConnection> {
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let context = listener.connection_accepted(peer).unwrap();
        Connection::new(ConnectionId(0), peer, context)
    }

    #[test]
    fn test_echo_ping() {
        let mut listener = EchoListener::default();
        let mut conn = accept(&mut listener);
        assert!(!conn.is_writable());

        listener.data_read(&mut conn, b"ping");
        assert!(conn.is_writable());
        assert_eq!(listener.write_data_requested(&mut conn), b"ping");

        listener.data_written(&mut conn, 4);
        assert!(listener.write_data_requested(&mut conn).is_empty());
        assert_eq!(listener.accepted(), 1);
    }

    #[test]
    fn test_echo_partial_write() {
        let mut listener = EchoListener::default();
        let mut conn = accept(&mut listener);

        listener.data_read(&mut conn, b"hello ");
        listener.data_read(&mut conn, b"world");
        assert_eq!(conn.context().pending(), b"hello world");

        listener.data_written(&mut conn, 3);
        assert_eq!(listener.write_data_requested(&mut conn), b"lo world");

        listener.data_written(&mut conn, 8);
        assert!(conn.context().pending().is_empty());
    }

    #[test]
    fn test_echo_backlog_limit() {
        let mut listener = EchoListener::new(8);
        let mut conn = accept(&mut listener);

        listener.data_read(&mut conn, b"12345678");
        assert!(conn.is_writable());

        listener.data_read(&mut conn, b"9");
        assert!(conn.is_closing());
        assert_eq!(conn.context().pending(), b"12345678");

        listener.connection_closed(&mut conn);
        assert_eq!(listener.closed(), 1);
    }
}
