//! ListenerRegistry: dynamic TCP listeners, one client per port.
//!
//! Each listener runs an accept loop in its own task. An accepted connection
//! becomes the port's only session; whoever was connected before is closed
//! first ("last writer wins"):
//!
//! ```text
//! accept(peer) ──► remove + close old session on port
//!              ──► install new session (fresh serial)
//!              ──► RegistryChanged
//!              ──► spawn session reader
//! ```
//!
//! Removing a listener aborts its accept task and waits for it, so the
//! socket is released before `remove_listener` returns, then closes the
//! session on that port and raises `RegistryChanged` once.
//!
//! Errors that belong to a single incoming connection (reset, aborted) are
//! skipped. Any other `accept` error is retried after a back-off; once
//! [`MAX_ACCEPT_FAILURES`] of them happen in a row the listener retires
//! itself: the port leaves the registry, its session is closed, and
//! observers get `PortUnavailable` followed by `RegistryChanged`.

use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gm_core::{ClientSession, SequenceCounter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::events::{ConsoleEvent, EventHub};
use crate::application::manage_sessions::{SessionEntry, SharedState};
use crate::infrastructure::network::session_reader::{run_reader, ReaderContext};
use crate::infrastructure::network::tcp_sink::TcpLineSink;
use crate::infrastructure::network::{ListenerError, PORT_UNAVAILABLE};

/// Pause after a failed `accept` so a persistent error cannot spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Consecutive listener-level `accept` failures before the port is given up.
pub const MAX_ACCEPT_FAILURES: u32 = 50;

/// Where an accept loop takes its connections from.
#[async_trait]
pub(crate) trait AcceptSource: Send + 'static {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl AcceptSource for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// True for errors caused by one pending connection rather than the socket.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

#[derive(Debug, Clone, Copy)]
struct AcceptPolicy {
    backoff: Duration,
    max_failures: u32,
}

impl Default for AcceptPolicy {
    fn default() -> Self {
        Self {
            backoff: ACCEPT_BACKOFF,
            max_failures: MAX_ACCEPT_FAILURES,
        }
    }
}

/// One running accept task. `generation` tells it apart from a later
/// listener on the same port.
struct ActiveListener {
    generation: u64,
    task: JoinHandle<()>,
}

type ListenerMap = Arc<Mutex<BTreeMap<u16, ActiveListener>>>;

pub struct ListenerRegistry {
    state: SharedState,
    events: EventHub,
    bind_address: IpAddr,
    listeners: ListenerMap,
    serials: Arc<SequenceCounter>,
    generations: SequenceCounter,
    policy: AcceptPolicy,
}

impl ListenerRegistry {
    pub fn new(state: SharedState, events: EventHub, bind_address: IpAddr) -> Self {
        Self {
            state,
            events,
            bind_address,
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            serials: Arc::new(SequenceCounter::starting_at(1)),
            generations: SequenceCounter::starting_at(1),
            policy: AcceptPolicy::default(),
        }
    }

    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }

    /// Binds `port` and starts accepting. Returns the bound port, which
    /// differs from `port` only when `port` is 0.
    ///
    /// # Errors
    ///
    /// [`ListenerError::PortInUse`] if this registry already listens on the
    /// port, [`ListenerError::Bind`] if the OS refuses the bind.
    pub async fn add_listener(&self, port: u16) -> Result<u16, ListenerError> {
        let mut listeners = self.listeners.lock().await;
        if port != 0 && listeners.contains_key(&port) {
            return Err(ListenerError::PortInUse(port));
        }

        let addr = SocketAddr::new(self.bind_address, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let bound = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?
            .port();

        self.spawn_acceptor(&mut listeners, bound, listener);
        drop(listeners);

        info!(port = bound, bind = %self.bind_address, "listener added");
        self.events.emit(ConsoleEvent::RegistryChanged);
        Ok(bound)
    }

    /// Stops listening on `port` and closes its session.
    ///
    /// Returns `false` (and emits nothing) if the port was not listening.
    pub async fn remove_listener(&self, port: u16) -> bool {
        let Some(active) = self.listeners.lock().await.remove(&port) else {
            debug!(port, "remove requested for port that is not listening");
            return false;
        };
        active.task.abort();
        // The listener socket is dropped with the task.
        let _ = active.task.await;

        let evicted = self.state.lock().await.sessions.remove_port(port);
        if let Some(entry) = evicted {
            info!(port, session = %entry.session.id, "closing session of removed listener");
            entry.sink.close().await;
        }

        info!(port, "listener removed");
        self.events.emit(ConsoleEvent::RegistryChanged);
        true
    }

    /// Ports currently listening, ascending.
    pub async fn list_ports(&self) -> Vec<u16> {
        self.listeners.lock().await.keys().copied().collect()
    }

    pub async fn is_listening(&self, port: u16) -> bool {
        self.listeners.lock().await.contains_key(&port)
    }

    /// Removes every listener.
    pub async fn shutdown(&self) {
        for port in self.list_ports().await {
            self.remove_listener(port).await;
        }
    }

    fn acceptor(&self, port: u16, generation: u64) -> Acceptor {
        Acceptor {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            serials: Arc::clone(&self.serials),
            listeners: Arc::clone(&self.listeners),
            port,
            generation,
            policy: self.policy,
        }
    }

    fn spawn_acceptor<A: AcceptSource>(
        &self,
        listeners: &mut BTreeMap<u16, ActiveListener>,
        port: u16,
        source: A,
    ) {
        let generation = self.generations.next();
        let task = tokio::spawn(self.acceptor(port, generation).run(source));
        listeners.insert(port, ActiveListener { generation, task });
    }
}

/// State moved into one listener's accept task.
struct Acceptor {
    state: SharedState,
    events: EventHub,
    serials: Arc<SequenceCounter>,
    listeners: ListenerMap,
    port: u16,
    generation: u64,
    policy: AcceptPolicy,
}

impl Acceptor {
    async fn run<A: AcceptSource>(self, mut source: A) {
        let mut failures = 0;
        loop {
            match source.accept().await {
                Ok((stream, peer)) => {
                    failures = 0;
                    self.install(stream, peer).await;
                }
                Err(e) if is_connection_error(&e) => {
                    debug!(port = self.port, error = %e, "pending connection failed");
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.policy.max_failures {
                        self.retire(&e).await;
                        return;
                    }
                    warn!(port = self.port, error = %e, failures, "accept failed");
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }

    async fn install(&self, stream: TcpStream, peer: SocketAddr) {
        let session_id = peer.to_string();
        let serial = self.serials.next();
        if let Err(e) = stream.set_nodelay(true) {
            debug!(session = %session_id, error = %e, "could not disable Nagle");
        }
        let (read_half, write_half) = stream.into_split();
        let sink = Arc::new(TcpLineSink::new(write_half));
        let closed = sink.closed_signal();

        let previous = self.state.lock().await.sessions.remove_port(self.port);
        if let Some(old) = previous {
            info!(
                port = self.port,
                old = %old.session.id,
                new = %session_id,
                "evicting previous client"
            );
            old.sink.close().await;
        }

        let stray = self.state.lock().await.sessions.install(SessionEntry::new(
            ClientSession::new(session_id.clone(), self.port),
            serial,
            sink,
        ));
        if let Some(stray) = stray {
            stray.sink.close().await;
        }

        info!(port = self.port, session = %session_id, "client connected");
        self.events.emit(ConsoleEvent::RegistryChanged);

        let ctx = ReaderContext {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            port: self.port,
            serial,
            session_id,
        };
        tokio::spawn(run_reader(read_half, ctx, closed));
    }

    /// Takes this listener out of the registry after it stopped accepting
    /// for good. Does nothing if the operator already removed it.
    async fn retire(&self, cause: &io::Error) {
        let retired = {
            let mut listeners = self.listeners.lock().await;
            let current = listeners
                .get(&self.port)
                .is_some_and(|active| active.generation == self.generation);
            if current {
                listeners.remove(&self.port)
            } else {
                None
            }
        };
        if retired.is_none() {
            return;
        }

        let evicted = self.state.lock().await.sessions.remove_port(self.port);
        if let Some(entry) = evicted {
            entry.sink.close().await;
        }

        error!(port = self.port, error = %cause, "{PORT_UNAVAILABLE}");
        self.events.emit(ConsoleEvent::PortUnavailable { port: self.port });
        self.events.emit(ConsoleEvent::RegistryChanged);
    }
}
