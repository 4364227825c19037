use crate::error::{Error, Result};
use crate::index::SpatialIndex;
use crate::network::{Connection, FileEvent, FlushStatus, Multiplexer, ReadStatus, Readiness};
use crate::{config::Config, signal};
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token};
use nix::sys::socket::{
    bind, listen, setsockopt, socket, sockopt, AddressFamily, Backlog, SockFlag, SockType,
    SockaddrStorage,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER: Token = Token(0);

/// Result of taking one connection off the listen queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Registered and ready to be served
    Connection(SocketAddr),
    /// Closed straight away because `max_connections` was reached
    Rejected(SocketAddr),
}

/// Flag shared with whoever may stop the run loop (e.g. a Ctrl-C handler)
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("Initiating server shutdown");
        self.0.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Single-threaded bounding-box query server
///
/// One thread owns the listener, the multiplexer and every connection. Each
/// call to [`Server::poll`] waits once and dispatches the ready batch.
pub struct Server<I> {
    config: Config,
    index: I,
    listener: TcpListener,
    local_addr: SocketAddr,
    mux: Multiplexer,
    files: HashMap<Token, FileEvent>,
    connections: usize,
    ready: Vec<Readiness>,
    next_token: usize,
    shutdown: ShutdownHandle,
}

impl<I: SpatialIndex> Server<I> {
    /// Bind, listen and register the listener
    ///
    /// On failure everything acquired so far is released before returning.
    pub fn start(config: Config, index: I) -> Result<Self> {
        Self::open(config, index).map_err(|e| {
            error!("Failed to start server: {}", e);
            e
        })
    }

    fn open(config: Config, index: I) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        signal::ignore_sigpipe();

        let addr = config.socket_addr()?;
        let mut listener = TcpListener::from_std(bind_listener(addr, config.backlog)?);
        let local_addr = listener.local_addr()?;

        let mut mux = Multiplexer::new(config.max_events)?;
        mux.register(&mut listener, LISTENER, Interest::READABLE)?;

        let mut files = HashMap::new();
        files.insert(LISTENER, FileEvent::Listener);

        info!("Server listening on {}", local_addr);

        Ok(Self {
            ready: Vec::with_capacity(config.max_events),
            config,
            index,
            listener,
            local_addr,
            mux,
            files,
            connections: 0,
            next_token: LISTENER.0,
            shutdown: ShutdownHandle::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Number of open client connections
    pub fn connection_count(&self) -> usize {
        self.connections
    }

    /// Number of descriptors registered with the multiplexer, listener included
    pub fn registrations(&self) -> usize {
        self.mux.registrations()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until the shutdown flag is raised
    ///
    /// Returns `Err` only when the multiplexer fails; the caller decides
    /// whether that ends the process.
    pub fn run(&mut self) -> Result<()> {
        let timeout = self.config.poll_timeout();

        while !self.shutdown.is_shutdown() {
            self.poll(Some(timeout))?;
        }

        self.close_all();
        info!("Server on {} stopped", self.local_addr);
        Ok(())
    }

    /// Wait once and dispatch every ready event
    ///
    /// `None` blocks until something is ready. Returns the number of events
    /// handled; an interrupted wait handles none. A wait failure is returned
    /// unlogged for the caller to report.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let mut ready = std::mem::take(&mut self.ready);

        let n = match self.mux.wait(timeout, &mut ready) {
            Ok(n) => n,
            Err(e) => {
                self.ready = ready;
                return Err(e);
            }
        };

        for event in ready.iter() {
            self.dispatch(*event);
        }

        self.ready = ready;
        Ok(n)
    }

    /// Take one connection off the listen queue
    ///
    /// `Ok(None)` means nothing is pending. If any step after the accept fails
    /// the socket is closed and nothing stays registered.
    pub fn accept(&mut self) -> Result<Option<Accepted>> {
        let (stream, addr) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.admit(stream, addr).map(Some)
    }

    /// Register an accepted socket; on failure it is dropped and closed
    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) -> Result<Accepted> {
        if self.connections >= self.config.max_connections {
            warn!(
                "Rejecting {}: connection limit of {} reached",
                addr, self.config.max_connections
            );
            return Ok(Accepted::Rejected(addr));
        }

        stream.set_nodelay(self.config.tcp_nodelay)?;

        let token = self.next_token();
        let mut conn = Connection::new(stream, addr, self.config.max_response_ids);
        let interest = conn.interest();
        self.mux.register(conn.stream_mut(), token, interest)?;
        self.files.insert(token, FileEvent::Connection(conn));
        self.connections += 1;

        info!("Client {} connected", addr);
        Ok(Accepted::Connection(addr))
    }

    /// Close every client connection, leaving the listener registered
    pub fn close_all(&mut self) {
        let tokens: Vec<Token> = self
            .files
            .iter()
            .filter(|(_, f)| matches!(f, FileEvent::Connection(_)))
            .map(|(t, _)| *t)
            .collect();

        for token in tokens {
            self.close(token, "server shutdown");
        }
    }

    fn next_token(&mut self) -> Token {
        loop {
            self.next_token = self.next_token.wrapping_add(1);
            let token = Token(self.next_token);
            if token != LISTENER && !self.files.contains_key(&token) {
                return token;
            }
        }
    }

    fn dispatch(&mut self, event: Readiness) {
        let is_listener = match self.files.get(&event.token) {
            Some(FileEvent::Listener) => true,
            Some(FileEvent::Connection(_)) => false,
            None => {
                // Closed earlier in this batch
                trace!("Dropping event for stale token {:?}", event.token);
                return;
            }
        };

        if is_listener {
            if event.readable {
                self.accept_pending();
            }
            return;
        }

        if event.hangup || event.error {
            self.close(event.token, "hangup");
            return;
        }

        match self.service(event) {
            Ok(true) => {}
            Ok(false) => self.close(event.token, "peer closed"),
            Err(e) => {
                if e.is_disconnect() {
                    debug!("Connection error: {}", e);
                } else {
                    warn!("Failed to serve client, closing it: {}", e);
                }
                self.close(event.token, "error");
            }
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.accept() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to accept client connection: {}", e);
                    // Re-arm so the next wait reports whatever is still queued
                    let listener = &mut self.listener;
                    if let Err(e) = self.mux.reregister(listener, LISTENER, Interest::READABLE) {
                        error!("Failed to re-arm listener: {}", e);
                    }
                    break;
                }
            }
        }
    }

    /// Handle read/write readiness; `Ok(false)` means the connection is done
    fn service(&mut self, event: Readiness) -> Result<bool> {
        let Some(conn) = self
            .files
            .get_mut(&event.token)
            .and_then(FileEvent::as_connection_mut)
        else {
            return Ok(true);
        };

        if event.readable && !conn.has_pending_writes() {
            match conn.read_request()? {
                ReadStatus::Idle => {}
                ReadStatus::Closed => return Ok(false),
                ReadStatus::Request(bbox) => {
                    let count = conn.answer(&self.index, &bbox)?;
                    debug!(
                        "Client {} queried ({}, {}, {}, {}): {} ids",
                        conn.addr(),
                        bbox.min_x,
                        bbox.min_y,
                        bbox.max_x,
                        bbox.max_y,
                        count
                    );
                }
            }
        }

        if event.writable && conn.flush()? == FlushStatus::Partial {
            trace!("Partial write to {}", conn.addr());
        }

        if conn.peer_closed() && !conn.has_pending_writes() {
            return Ok(false);
        }

        let desired = conn.desired_interest();
        if desired != conn.interest() {
            self.mux.reregister(conn.stream_mut(), event.token, desired)?;
            conn.set_interest(desired);
        }

        Ok(true)
    }

    fn close(&mut self, token: Token, reason: &str) {
        if token == LISTENER {
            return;
        }

        if let Some(mut conn) = self.files.remove(&token).and_then(FileEvent::into_connection) {
            self.connections -= 1;
            if let Err(e) = self.mux.deregister(conn.stream_mut()) {
                debug!("Failed to deregister {}: {}", conn.addr(), e);
            }
            info!(
                "Client {} disconnected ({}, {} requests)",
                conn.addr(),
                reason,
                conn.requests_served()
            );
        }
    }
}

/// Create the listening socket with `SO_REUSEADDR` and an explicit backlog
fn bind_listener(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener> {
    let family = if addr.is_ipv4() {
        AddressFamily::Inet
    } else {
        AddressFamily::Inet6
    };

    let fd = socket(family, SockType::Stream, SockFlag::empty(), None)?;
    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    bind(fd.as_raw_fd(), &SockaddrStorage::from(addr))?;
    listen(&fd, Backlog::new(backlog)?)?;

    let listener = std::net::TcpListener::from(fd);
    listener.set_nonblocking(true)?;
    Ok(listener)
}
