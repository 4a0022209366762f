//! The listener contract: the application side of the event loop.

use crate::runtime::Connection;
use std::net::SocketAddr;

/// Receives connection lifecycle events from a [`Server`](super::Server).
///
/// All callbacks run on the event loop thread and must not block; a blocking
/// callback stalls every connection of the server. The event loop never
/// interprets payload bytes, so any framing is the listener's business.
pub trait Listener {
    /// Per-connection state created on accept and owned by the connection.
    type Context;

    /// Called when a connection was accepted.
    ///
    /// Returning `None` refuses the connection: the socket is closed
    /// immediately and no other callback is made for it.
    fn connection_accepted(&mut self, peer: SocketAddr) -> Option<Self::Context>;

    /// Called with the bytes of one non-blocking read.
    ///
    /// `data` points into the connection's read buffer and is only valid for
    /// the duration of the call. Reads carry no message boundaries.
    fn data_read(&mut self, conn: &mut Connection<Self::Context>, data: &[u8]);

    /// Called once when the connection is torn down, whatever the cause.
    fn connection_closed(&mut self, conn: &mut Connection<Self::Context>);

    /// Called on every writable dispatch while write interest is active.
    ///
    /// Returns the bytes currently available to send. An empty slice means
    /// nothing to send and clears write interest until the listener calls
    /// [`Connection::set_writable`] again.
    fn write_data_requested<'a>(&mut self, conn: &'a mut Connection<Self::Context>) -> &'a [u8];

    /// Called after a write with the number of bytes the socket accepted.
    ///
    /// `written` never exceeds the length of the slice most recently returned
    /// by [`write_data_requested`](Self::write_data_requested); the listener
    /// must discard exactly that many bytes from its outbound data.
    fn data_written(&mut self, conn: &mut Connection<Self::Context>, written: usize);
}
