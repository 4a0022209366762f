//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready, then we
//! perform non-blocking accept/read/write syscalls and hand the results to
//! the [`Listener`]. Uses epoll on Linux, kqueue on macOS.
//!
//! ## Readiness cache
//!
//! mio reports readiness edge-triggered, but the dispatch rules here are
//! level-triggered: each ready socket gets exactly one accept, read or write
//! per loop iteration, and a socket that is still ready afterwards must be
//! served again on the next iteration. Every socket therefore caches its last
//! reported readiness, which is only cleared when an operation returns
//! `WouldBlock`. Connections with cached readiness are kept in a ready queue,
//! and while that queue is non-empty the poll does not block.
//!
//! An accept that fails for lack of resources (EMFILE, ENOBUFS, ...) leaves
//! the backlog untouched, so no new listener event will arrive. The listener
//! is then retried after [`ACCEPT_BACKOFF`] instead of waiting for an edge.

use crate::runtime::{
    BufferPool, Connection, ConnectionId, ConnectionRegistry, Listener, ServerError,
};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);

/// Delay before retrying an accept that failed for lack of resources.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 9999;
/// Listen backlog used when none is configured.
pub const DEFAULT_BACKLOG: u32 = 32;
/// Capacity of each connection's read buffer, i.e. the largest single read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;
/// Connection limit used when none is configured.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;
/// Number of readiness events fetched per poll.
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// Options for binding a [`Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Host to bind to. `None` or an empty string binds the wildcard address.
    pub host: Option<String>,
    /// Port to bind to. Port 0 picks an ephemeral port.
    pub port: u16,
    /// Listen backlog.
    pub backlog: u32,
    /// Capacity of each connection's read buffer. Must be positive.
    pub read_buffer_size: usize,
    /// Maximum number of simultaneously open connections.
    pub max_connections: usize,
    /// Number of readiness events fetched per poll.
    pub events_capacity: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}

/// Cached readiness of one socket.
#[derive(Debug, Default, Clone, Copy)]
struct Readiness {
    readable: bool,
    writable: bool,
}

/// What to do with the listening socket after a failed accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptRetry {
    /// Backlog drained. Wait for the next listener event.
    Drained,
    /// Transient failure. Try again on the next iteration.
    Immediate,
    /// Out of resources. Try again after [`ACCEPT_BACKOFF`].
    Backoff,
}

/// Classify an accept error.
fn accept_retry(kind: io::ErrorKind) -> AcceptRetry {
    match kind {
        io::ErrorKind::WouldBlock => AcceptRetry::Drained,
        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted => AcceptRetry::Immediate,
        _ => AcceptRetry::Backoff,
    }
}

/// Why a connection is being torn down.
#[derive(Debug)]
enum CloseReason {
    /// Zero-length read: orderly shutdown by the peer.
    PeerClosed,
    /// The listener called `Connection::close`.
    Requested,
    /// Non-retryable read, write or registration error.
    Error(io::Error),
    /// The server is stopping.
    Shutdown,
}

/// Per-connection state for the mio backend.
///
/// The stream and read buffer live next to the listener-facing
/// [`Connection`] so the listener can borrow the connection while the loop
/// reads into or writes from the socket.
struct MioConnection<C> {
    stream: TcpStream,
    /// Leased buffer in the server's `BufferPool`.
    read_buf_idx: usize,
    /// Whether WRITABLE is part of the current registration.
    write_registered: bool,
    ready: Readiness,
    /// Whether the connection sits in the ready queue.
    queued: bool,
    conn: Connection<C>,
}

impl<C> MioConnection<C> {
    /// Whether the cached readiness asks for another dispatch.
    fn wants_dispatch(&self) -> bool {
        self.ready.readable || (self.ready.writable && self.conn.is_writable())
    }
}

/// Cloneable handle that stops a running [`Server`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Ask the server to stop after the current dispatch.
    ///
    /// The server then closes every connection and releases its listening
    /// socket before [`Server::run`] returns.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop");
        }
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// A single-threaded TCP server driving one [`Listener`].
pub struct Server<L: Listener> {
    poll: Poll,
    events: Events,
    /// Listening socket. `None` once the server is stopped.
    socket: Option<TcpListener>,
    local_addr: SocketAddr,
    /// Cached readiness of the listening socket.
    accept_ready: bool,
    /// Accept failed for lack of resources; retry after a backoff.
    accept_backoff: bool,
    listener: L,
    connections: ConnectionRegistry<MioConnection<L::Context>>,
    buffers: BufferPool,
    ready_queue: VecDeque<ConnectionId>,
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl<L: Listener> Server<L> {
    /// Bind `host:port` with default options.
    ///
    /// `None` or an empty host binds the wildcard address. The server does
    /// not process events until [`run`](Self::run) is called.
    pub fn start(host: Option<&str>, port: u16, listener: L) -> Result<Self, ServerError> {
        let options = ServerOptions {
            host: host.map(str::to_owned),
            port,
            ..ServerOptions::default()
        };
        Self::bind(options, listener)
    }

    /// Create the listening socket and register it for read readiness.
    pub fn bind(options: ServerOptions, listener: L) -> Result<Self, ServerError> {
        if options.read_buffer_size == 0 {
            return Err(ServerError::InvalidOptions("read buffer size must be positive"));
        }
        if options.events_capacity == 0 {
            return Err(ServerError::InvalidOptions("events capacity must be positive"));
        }

        let addr = resolve(options.host.as_deref(), options.port)?;
        let mut socket = TcpListener::from_std(create_listener(addr, options.backlog)?);
        let local_addr = socket.local_addr().map_err(ServerError::Socket)?;

        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut socket, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::Poll)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(ServerError::Poll)?;

        info!(
            addr = %local_addr,
            backlog = options.backlog,
            read_buffer_size = options.read_buffer_size,
            max_connections = options.max_connections,
            "Server listening"
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(options.events_capacity),
            socket: Some(socket),
            local_addr,
            accept_ready: false,
            accept_backoff: false,
            listener,
            connections: ConnectionRegistry::new(options.max_connections),
            buffers: BufferPool::new(options.max_connections, options.read_buffer_size),
            ready_queue: VecDeque::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(waker),
        })
    }

    /// Address the listening socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The listener driven by this server.
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Mutable access to the listener between loop iterations.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Handle for stopping the server from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Whether the server was stopped and its listening socket released.
    pub fn is_stopped(&self) -> bool {
        self.socket.is_none()
    }

    /// Run the dispatch loop until a [`ShutdownHandle`] stops it.
    ///
    /// Returns an error only when the polling facility fails; per-connection
    /// errors are contained to their connection.
    pub fn run(&mut self) -> Result<(), ServerError> {
        if self.is_stopped() {
            return Err(ServerError::Stopped);
        }

        info!(addr = %self.local_addr, "Event loop started");
        while !self.shutdown.load(Ordering::Acquire) {
            self.run_once(None)?;
        }
        self.stop();
        Ok(())
    }

    /// Run a single loop iteration: wait up to `timeout` for readiness, then
    /// dispatch each ready registration once.
    ///
    /// `None` waits indefinitely. The wait is skipped when sockets are still
    /// ready from the previous iteration.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<(), ServerError> {
        if self.is_stopped() {
            return Err(ServerError::Stopped);
        }

        let timeout = if self.accept_ready || !self.ready_queue.is_empty() {
            Some(Duration::ZERO)
        } else if self.accept_backoff {
            Some(timeout.map_or(ACCEPT_BACKOFF, |t| t.min(ACCEPT_BACKOFF)))
        } else {
            timeout
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                error!(error = %e, "Poll failed");
                return Err(ServerError::Poll(e));
            }
        }

        if self.accept_backoff {
            self.accept_backoff = false;
            self.accept_ready = true;
        }

        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => self.accept_ready = true,
                WAKER_TOKEN => trace!("Event loop woken"),
                Token(key) => {
                    let id = ConnectionId(key);
                    let Some(entry) = self.connections.get_mut(id) else {
                        continue;
                    };
                    // Hang-up and error conditions surface through the read path.
                    if event.is_readable() || event.is_read_closed() || event.is_error() {
                        entry.ready.readable = true;
                    }
                    if event.is_writable() || event.is_write_closed() {
                        entry.ready.writable = true;
                    }
                    if !entry.queued {
                        entry.queued = true;
                        self.ready_queue.push_back(id);
                    }
                }
            }
        }

        self.dispatch();
        Ok(())
    }

    /// Close every connection and release the listening socket.
    ///
    /// Each open connection receives its `connection_closed` callback.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        for id in self.connections.ids() {
            self.close_connection(id, CloseReason::Shutdown);
        }
        debug_assert_eq!(self.buffers.in_use(), 0);
        self.ready_queue.clear();
        self.accept_ready = false;
        self.accept_backoff = false;

        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = self.poll.registry().deregister(&mut socket) {
                debug!(error = %e, "Failed to deregister listening socket");
            }
            info!(addr = %self.local_addr, "Server stopped");
        }
    }

    fn dispatch(&mut self) {
        if self.accept_ready {
            self.accept_connection();
        }

        // Connections re-queued during this pass wait for the next iteration.
        let pending = self.ready_queue.len();
        for _ in 0..pending {
            let Some(id) = self.ready_queue.pop_front() else {
                break;
            };
            self.dispatch_connection(id);
        }
    }

    /// Accept one pending connection.
    fn accept_connection(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            self.accept_ready = false;
            return;
        };

        let (stream, peer) = match socket.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                match accept_retry(e.kind()) {
                    AcceptRetry::Drained => self.accept_ready = false,
                    AcceptRetry::Immediate => debug!(error = %e, "Transient accept error"),
                    AcceptRetry::Backoff => {
                        error!(error = %e, "Accept error, backing off");
                        self.accept_ready = false;
                        self.accept_backoff = true;
                    }
                }
                return;
            }
        };

        if self.connections.is_full() {
            warn!(
                peer = %peer,
                max_connections = self.connections.capacity(),
                "Connection limit reached, closing connection"
            );
            return;
        }

        let Some(read_buf_idx) = self.buffers.alloc() else {
            warn!(peer = %peer, "Read buffer pool exhausted, closing connection");
            return;
        };

        let Some(context) = self.listener.connection_accepted(peer) else {
            debug!(peer = %peer, "Listener refused connection, closing");
            self.buffers.free(read_buf_idx);
            return;
        };

        let id = self.connections.next_id();
        let mut entry = MioConnection {
            stream,
            read_buf_idx,
            write_registered: false,
            ready: Readiness::default(),
            queued: false,
            conn: Connection::new(id, peer, context),
        };

        if let Err(e) =
            self.poll
                .registry()
                .register(&mut entry.stream, Token(id.0), Interest::READABLE)
        {
            warn!(peer = %peer, error = %e, "Failed to register connection");
            entry.conn.close();
            self.listener.connection_closed(&mut entry.conn);
            self.buffers.free(read_buf_idx);
            return;
        }

        let inserted = self.connections.insert(entry);
        debug_assert_eq!(inserted, Some(id));
        debug!(conn_id = id.as_usize(), peer = %peer, "Accepted connection");
    }

    fn dispatch_connection(&mut self, id: ConnectionId) {
        match self.connections.get_mut(id) {
            Some(entry) => entry.queued = false,
            None => return,
        }

        let outcome = self
            .handle_readable(id)
            .and_then(|()| self.handle_writable(id))
            .and_then(|()| self.update_registration(id));

        if let Err(reason) = outcome {
            self.close_connection(id, reason);
        }
    }

    /// Perform one read if the connection is readable.
    fn handle_readable(&mut self, id: ConnectionId) -> Result<(), CloseReason> {
        let Some(entry) = self.connections.get_mut(id) else {
            return Ok(());
        };
        if !entry.ready.readable {
            return Ok(());
        }

        let read_buf = self.buffers.get_mut(entry.read_buf_idx);
        let n = match entry.stream.read(read_buf) {
            Ok(0) => {
                entry.ready.readable = false;
                return Err(CloseReason::PeerClosed);
            }
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                entry.ready.readable = false;
                return Ok(());
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(CloseReason::Error(e)),
        };

        trace!(conn_id = id.as_usize(), bytes = n, "Read");
        let data = &self.buffers.get(entry.read_buf_idx)[..n];
        self.listener.data_read(&mut entry.conn, data);

        if entry.conn.is_closing() {
            return Err(CloseReason::Requested);
        }
        Ok(())
    }

    /// Query the listener and perform one write if the connection is writable
    /// and has write interest.
    fn handle_writable(&mut self, id: ConnectionId) -> Result<(), CloseReason> {
        let Some(entry) = self.connections.get_mut(id) else {
            return Ok(());
        };
        if !(entry.ready.writable && entry.conn.is_writable()) {
            return Ok(());
        }

        let data = self.listener.write_data_requested(&mut entry.conn);
        if data.is_empty() {
            trace!(conn_id = id.as_usize(), "Nothing to write, clearing write interest");
            entry.conn.clear_writable();
            return Ok(());
        }

        let offered = data.len();
        match entry.stream.write(data) {
            Ok(0) => Err(CloseReason::Error(io::Error::new(
                io::ErrorKind::WriteZero,
                "write returned 0",
            ))),
            Ok(n) => {
                debug_assert!(n <= offered);
                trace!(conn_id = id.as_usize(), bytes = n, offered, "Wrote");
                self.listener.data_written(&mut entry.conn, n);
                if entry.conn.is_closing() {
                    return Err(CloseReason::Requested);
                }
                Ok(())
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                entry.ready.writable = false;
                Ok(())
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(CloseReason::Error(e)),
        }
    }

    /// Apply the listener's requests to the poll registration and re-queue the
    /// connection if it is still ready.
    fn update_registration(&mut self, id: ConnectionId) -> Result<(), CloseReason> {
        let Some(entry) = self.connections.get_mut(id) else {
            return Ok(());
        };
        if entry.conn.is_closing() {
            return Err(CloseReason::Requested);
        }

        sync_interest(self.poll.registry(), id, entry).map_err(CloseReason::Error)?;

        if entry.wants_dispatch() && !entry.queued {
            entry.queued = true;
            self.ready_queue.push_back(id);
        }
        Ok(())
    }

    /// Tear a connection down: deregister it, notify the listener once, then
    /// close the socket and return its read buffer.
    fn close_connection(&mut self, id: ConnectionId, reason: CloseReason) {
        let Some(mut entry) = self.connections.remove(id) else {
            return;
        };

        if let Err(e) = self.poll.registry().deregister(&mut entry.stream) {
            debug!(conn_id = id.as_usize(), error = %e, "Failed to deregister connection");
        }

        let peer = entry.conn.peer_addr();
        match &reason {
            CloseReason::PeerClosed => {
                debug!(conn_id = id.as_usize(), peer = %peer, "Connection closed by peer")
            }
            CloseReason::Requested => {
                debug!(conn_id = id.as_usize(), peer = %peer, "Connection closed by listener")
            }
            CloseReason::Error(e) => {
                warn!(conn_id = id.as_usize(), peer = %peer, error = %e, "Connection error, closing")
            }
            CloseReason::Shutdown => {
                debug!(conn_id = id.as_usize(), peer = %peer, "Connection closed on shutdown")
            }
        }

        entry.conn.close();
        self.listener.connection_closed(&mut entry.conn);
        self.buffers.free(entry.read_buf_idx);
    }
}

/// Reregister a connection when its write interest changed.
fn sync_interest<C>(
    registry: &Registry,
    id: ConnectionId,
    entry: &mut MioConnection<C>,
) -> io::Result<()> {
    let want_write = entry.conn.is_writable();
    if want_write == entry.write_registered {
        return Ok(());
    }

    let interest = if want_write {
        Interest::READABLE | Interest::WRITABLE
    } else {
        Interest::READABLE
    };
    registry.reregister(&mut entry.stream, Token(id.0), interest)?;
    entry.write_registered = want_write;
    Ok(())
}

/// Resolve the bind address. No host means the IPv4 wildcard.
fn resolve(host: Option<&str>, port: u16) -> Result<SocketAddr, ServerError> {
    let host = match host {
        Some(host) if !host.is_empty() => host,
        _ => return Ok(SocketAddr::from(([0, 0, 0, 0], port))),
    };

    (host, port)
        .to_socket_addrs()
        .map_err(|e| ServerError::Resolve(host.to_string(), e))?
        .next()
        .ok_or_else(|| {
            ServerError::Resolve(
                host.to_string(),
                io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            )
        })
}

/// Create a non-blocking TCP listener with the given backlog.
fn create_listener(addr: SocketAddr, backlog: u32) -> Result<std::net::TcpListener, ServerError> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(ServerError::Socket)?;

    socket.set_reuse_address(true).map_err(ServerError::Socket)?;
    socket.set_nonblocking(true).map_err(ServerError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::Bind(addr, e))?;
    let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
    socket
        .listen(backlog)
        .map_err(|e| ServerError::Listen(addr, e))?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Refuse {
        accepted: usize,
    }

    impl Listener for Refuse {
        type Context = ();

        fn connection_accepted(&mut self, _peer: SocketAddr) -> Option<()> {
            self.accepted += 1;
            None
        }

        fn data_read(&mut self, _conn: &mut Connection<()>, _data: &[u8]) {}

        fn connection_closed(&mut self, _conn: &mut Connection<()>) {}

        fn write_data_requested<'a>(&mut self, _conn: &'a mut Connection<()>) -> &'a [u8] {
            &[]
        }

        fn data_written(&mut self, _conn: &mut Connection<()>, _written: usize) {}
    }

    fn local_options() -> ServerOptions {
        ServerOptions {
            host: Some("127.0.0.1".to_string()),
            port: 0,
            ..ServerOptions::default()
        }
    }

    #[test]
    fn test_default_options() {
        let options = ServerOptions::default();
        assert_eq!(options.host, None);
        assert_eq!(options.port, 9999);
        assert_eq!(options.backlog, 32);
        assert_eq!(options.read_buffer_size, 8192);
        assert_eq!(options.max_connections, 1024);
    }

    #[test]
    fn test_resolve_wildcard() {
        let addr = resolve(None, 9999).unwrap();
        assert_eq!(addr, "0.0.0.0:9999".parse::<SocketAddr>().unwrap());

        let addr = resolve(Some(""), 80).unwrap();
        assert_eq!(addr, "0.0.0.0:80".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_resolve_literal() {
        let addr = resolve(Some("127.0.0.1"), 11211).unwrap();
        assert_eq!(addr, "127.0.0.1:11211".parse::<SocketAddr>().unwrap());

        let addr = resolve(Some("::1"), 11211).unwrap();
        assert_eq!(addr, "[::1]:11211".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_resolve_failure() {
        let err = resolve(Some("definitely not a host name"), 1).unwrap_err();
        assert!(matches!(err, ServerError::Resolve(..)));
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let server = Server::bind(local_options(), Refuse::default()).unwrap();
        let addr = server.local_addr();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(server.connection_count(), 0);
        assert!(!server.is_stopped());
    }

    #[test]
    fn test_bind_address_in_use() {
        let first = Server::bind(local_options(), Refuse::default()).unwrap();
        let options = ServerOptions {
            port: first.local_addr().port(),
            ..local_options()
        };
        let err = Server::bind(options, Refuse::default()).err().unwrap();
        assert!(matches!(err, ServerError::Bind(..)), "unexpected: {err}");
    }

    #[test]
    fn test_bind_rejects_zero_read_buffer() {
        let options = ServerOptions {
            read_buffer_size: 0,
            ..local_options()
        };
        let err = Server::bind(options, Refuse::default()).err().unwrap();
        assert!(matches!(err, ServerError::InvalidOptions(_)));
    }

    #[test]
    fn test_stop_is_terminal() {
        let mut server = Server::bind(local_options(), Refuse::default()).unwrap();
        server.stop();
        assert!(server.is_stopped());
        assert!(matches!(server.run(), Err(ServerError::Stopped)));
        assert!(matches!(
            server.run_once(Some(Duration::ZERO)),
            Err(ServerError::Stopped)
        ));
    }

    #[test]
    fn test_accept_retry_classification() {
        assert_eq!(accept_retry(io::ErrorKind::WouldBlock), AcceptRetry::Drained);
        assert_eq!(accept_retry(io::ErrorKind::Interrupted), AcceptRetry::Immediate);
        assert_eq!(
            accept_retry(io::ErrorKind::ConnectionAborted),
            AcceptRetry::Immediate
        );
        // EMFILE / ENFILE / ENOBUFS
        assert_eq!(accept_retry(io::ErrorKind::Other), AcceptRetry::Backoff);
        assert_eq!(accept_retry(io::ErrorKind::OutOfMemory), AcceptRetry::Backoff);
    }

    #[test]
    fn test_accept_backoff_retries_backlog() {
        let mut server = Server::bind(local_options(), Refuse::default()).unwrap();
        let _client = std::net::TcpStream::connect(server.local_addr()).unwrap();

        // Swallow the listener edge without accepting, as a failed accept would
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            assert!(std::time::Instant::now() < deadline, "no listener event");
            server
                .poll
                .poll(&mut server.events, Some(Duration::from_millis(10)))
                .unwrap();
            if server.events.iter().any(|e| e.token() == LISTENER_TOKEN) {
                break;
            }
        }
        server.accept_backoff = true;

        // No new edge will arrive; the backoff alone must bring the accept back
        server.run_once(None).unwrap();
        assert_eq!(server.listener().accepted, 1);
        assert!(!server.accept_backoff);
    }

    #[test]
    fn test_shutdown_handle_before_run() {
        let mut server = Server::bind(local_options(), Refuse::default()).unwrap();
        let handle = server.shutdown_handle();
        assert!(!handle.is_shutdown());

        handle.shutdown();
        assert!(handle.is_shutdown());

        // Loop exits immediately and releases the socket
        server.run().unwrap();
        assert!(server.is_stopped());
    }
}
