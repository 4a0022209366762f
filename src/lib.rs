//! lew: a single-threaded, event-driven TCP server core.
//!
//! A [`Server`] multiplexes its listening socket and every accepted
//! connection on one readiness poll and reports connection lifecycle events
//! to a [`Listener`]:
//!
//! - `connection_accepted`: create per-connection context (or refuse)
//! - `data_read`: bytes from one non-blocking read
//! - `write_data_requested` / `data_written`: pull-based writes while the
//!   connection is marked writable
//! - `connection_closed`: exactly once per torn-down connection
//!
//! The core never frames or buffers payload. Outbound data stays with the
//! listener, which is asked for it only while the socket can take it.
//!
//! ```rust,no_run
//! use lew::echo::EchoListener;
//! use lew::Server;
//!
//! let mut server = Server::start(None, 9999, EchoListener::default())?;
//! server.run()?;
//! # Ok::<(), lew::ServerError>(())
//! ```

pub mod echo;
pub mod runtime;

pub use runtime::{
    ConnState, Connection, ConnectionId, Listener, Server, ServerError, ServerOptions,
    ShutdownHandle,
};
