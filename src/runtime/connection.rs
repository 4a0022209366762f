//! Connection state machine for accepted TCP connections.
//!
//! A [`Connection`] is the handle a [`Listener`](super::Listener) sees in
//! every callback. It owns the listener's per-connection context and records
//! what the listener asked for (write interest, close); the event loop applies
//! those requests to the poll registration right after the callback returns.

use slab::Slab;
use std::fmt;
use std::net::SocketAddr;

/// Identifier of a connection within its server.
///
/// Identifiers are slot indices and are reused after a connection is torn
/// down, so they are only unique among live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) usize);

impl ConnectionId {
    /// Get the raw slot index.
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Open with write interest dormant. Only read readiness is watched.
    Reading,
    /// Open with write interest active. The listener is queried for outbound
    /// data on every writable dispatch.
    Writing,
    /// Close requested or observed. The connection is torn down as soon as
    /// the current callback returns.
    Closing,
}

/// A single client connection as seen by the listener.
#[derive(Debug)]
pub struct Connection<C> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    state: ConnState,
    context: C,
}

impl<C> Connection<C> {
    /// Create a new connection with write interest dormant.
    pub(crate) fn new(id: ConnectionId, peer_addr: SocketAddr, context: C) -> Self {
        Self {
            id,
            peer_addr,
            state: ConnState::Reading,
            context,
        }
    }

    /// Identifier of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Current state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Context value returned by `connection_accepted`.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Mutable access to the context value.
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Ask to be queried for outbound data whenever the socket is writable.
    ///
    /// Has no effect on a closing connection.
    pub fn set_writable(&mut self) {
        if self.state == ConnState::Reading {
            self.state = ConnState::Writing;
        }
    }

    /// Stop being queried for outbound data.
    ///
    /// The event loop does this on its own once the listener offers nothing to
    /// send.
    pub fn clear_writable(&mut self) {
        if self.state == ConnState::Writing {
            self.state = ConnState::Reading;
        }
    }

    /// Whether write interest is active.
    pub fn is_writable(&self) -> bool {
        self.state == ConnState::Writing
    }

    /// Close the connection once the current callback returns.
    pub fn close(&mut self) {
        self.state = ConnState::Closing;
    }

    /// Whether the connection is closing.
    pub fn is_closing(&self) -> bool {
        self.state == ConnState::Closing
    }
}

/// Registry of live connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations, and enforces the
/// configured connection limit.
pub(crate) struct ConnectionRegistry<T> {
    connections: Slab<T>,
    max_connections: usize,
}

impl<T> ConnectionRegistry<T> {
    /// Create a new registry with specified maximum capacity.
    pub(crate) fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::new(),
            max_connections,
        }
    }

    /// Identifier the next inserted entry will receive.
    pub(crate) fn next_id(&self) -> ConnectionId {
        ConnectionId(self.connections.vacant_key())
    }

    /// Whether the registry is at capacity.
    pub(crate) fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }

    /// Insert a new entry into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub(crate) fn insert(&mut self, entry: T) -> Option<ConnectionId> {
        if self.is_full() {
            return None;
        }
        Some(ConnectionId(self.connections.insert(entry)))
    }

    /// Get a mutable reference to an entry.
    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut T> {
        self.connections.get_mut(id.0)
    }

    /// Remove an entry from the registry.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<T> {
        self.connections.try_remove(id.0)
    }

    /// Number of live connections.
    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    /// Maximum number of connections allowed.
    pub(crate) fn capacity(&self) -> usize {
        self.max_connections
    }

    /// Identifiers of all live connections.
    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|(k, _)| ConnectionId(k)).collect()
    }
}
