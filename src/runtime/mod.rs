//! Single-threaded readiness-based runtime.
//!
//! One thread owns a `mio::Poll` (epoll on Linux, kqueue on macOS), the
//! listening socket and every accepted connection, and invokes the
//! [`Listener`] callbacks synchronously from its dispatch loop.
//!
//! Building blocks:
//! - `BufferPool`: bounded pool of fixed-size per-connection read buffers
//! - `Connection`: per-connection state machine handed to the listener
//! - `Server`: the reactor that accepts, reads, writes and tears down

mod buffer;
mod connection;
mod error;
mod event_loop;
mod listener;

pub(crate) use buffer::BufferPool;
pub(crate) use connection::ConnectionRegistry;
pub use connection::{ConnState, Connection, ConnectionId};
pub use error::ServerError;
pub use event_loop::{
    Server, ServerOptions, ShutdownHandle, ACCEPT_BACKOFF, DEFAULT_BACKLOG,
    DEFAULT_EVENTS_CAPACITY, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE,
};
pub use listener::Listener;
