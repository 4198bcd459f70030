// src/server/mod.rs

//! The multi-session link server: an accept loop, a guarded session
//! registry, and one receive-loop task per connected client.

mod session;

pub use session::ClientSession;

use crate::config::ServerConfig;
use crate::core::LinkError;
use crate::core::events::{EventBus, LinkEvent};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Bounded wait for the accept task to finish during `stop()`.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns an accepted socket into a session.
///
/// This is the server's only extensibility seam: substituting a factory
/// changes how sessions are configured without touching accept-loop logic.
pub trait SessionFactory: Send + Sync {
    fn make_session(
        &self,
        stream: TcpStream,
        peer: String,
        events: EventBus,
    ) -> Arc<ClientSession>;
}

/// The default factory, applying the server's receive timeout and buffer size.
struct DefaultSessionFactory {
    recv_timeout: Duration,
    buffer_size: usize,
}

impl SessionFactory for DefaultSessionFactory {
    fn make_session(
        &self,
        stream: TcpStream,
        peer: String,
        events: EventBus,
    ) -> Arc<ClientSession> {
        Arc::new(ClientSession::new(
            stream,
            peer,
            self.recv_timeout,
            self.buffer_size,
            events,
        ))
    }
}

/// Run state owned by one server instance.
///
/// Invariant: `running == true` implies the accept task holds a bound,
/// listening socket.
#[derive(Default)]
struct RunState {
    running: bool,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    accept_handle: Option<JoinHandle<()>>,
}

struct Shared {
    config: ServerConfig,
    events: EventBus,
    sessions: DashMap<String, Arc<ClientSession>>,
    factory: Arc<dyn SessionFactory>,
    run: Mutex<RunState>,
}

/// A TCP server that accepts line-oriented telemetry/control clients.
///
/// Lifecycle: Stopped → Running → Stopped, driven by the idempotent
/// `start()`/`stop()` pair. Every fallible public operation returns a
/// boolean and reports the underlying failure on the event bus. The
/// handle is cheap to clone; clones control the same server.
#[derive(Clone)]
pub struct LinkServer {
    shared: Arc<Shared>,
}

impl LinkServer {
    pub fn new(config: ServerConfig) -> Self {
        let factory = Arc::new(DefaultSessionFactory {
            recv_timeout: config.recv_timeout,
            buffer_size: config.buffer_size,
        });
        Self::with_factory(config, factory)
    }

    /// Builds a server whose sessions come from the given factory.
    pub fn with_factory(config: ServerConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                events: EventBus::new(),
                sessions: DashMap::new(),
                factory,
                run: Mutex::new(RunState::default()),
            }),
        }
    }

    /// Provides a new receiver subscribed to this server's events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.shared.run.lock().await.running
    }

    /// The address actually bound, available while running. This differs
    /// from the configured address when the config asks for port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.run.lock().await.local_addr
    }

    /// The number of currently registered sessions.
    pub fn client_count(&self) -> usize {
        self.shared.sessions.len()
    }

    /// Binds the listener and spawns the accept loop. Idempotent: returns
    /// `true` immediately when already running. On a bind failure the
    /// classified error is published and the server stays stopped.
    pub async fn start(&self) -> bool {
        let shared = &self.shared;
        let addr = shared.config.addr();
        let mut run = shared.run.lock().await;
        if run.running {
            return true;
        }

        let listener = match shared.bind_listener() {
            Ok(listener) => listener,
            Err(err) => {
                drop(run);
                error!("Failed to bind {}: {}", addr, err);
                shared.events.publish(LinkEvent::from_error(&addr, &err));
                return false;
            }
        };
        let local_addr = listener.local_addr().ok();

        let (shutdown_tx, _) = broadcast::channel(1);
        let accept_shared = Arc::clone(shared);
        let accept_shutdown = shutdown_tx.clone();
        let handle = tokio::spawn(async move {
            accept_shared.accept_loop(listener, accept_shutdown).await;
        });

        run.running = true;
        run.local_addr = local_addr;
        run.shutdown_tx = Some(shutdown_tx);
        run.accept_handle = Some(handle);
        drop(run);

        info!("Link server listening on {}", addr);
        shared.events.publish(LinkEvent::ServerStarted { addr });
        true
    }

    /// Stops accepting, tears down every live session, and clears the
    /// registry. Idempotent; never fails.
    pub async fn stop(&self) {
        let shared = &self.shared;
        let (shutdown_tx, accept_handle) = {
            let mut run = shared.run.lock().await;
            if !run.running {
                return;
            }
            run.running = false;
            run.local_addr = None;
            (run.shutdown_tx.take(), run.accept_handle.take())
        };

        info!("Shutting down. Sending signal to all tasks.");
        if let Some(tx) = shutdown_tx {
            // No receivers means the accept loop already exited on its own.
            let _ = tx.send(());
        }

        if let Some(mut handle) = accept_handle {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("Timed out waiting for the accept task to finish cleanly.");
                handle.abort();
            }
        }

        // Close whatever the session tasks did not get to. Iteration works
        // on a snapshot copy so removals cannot race it.
        let leftovers: Vec<Arc<ClientSession>> = shared
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for session in leftovers {
            session.close().await;
            session.notify_disconnected();
        }
        shared.sessions.clear();

        shared.events.publish(LinkEvent::ServerStopped);
        info!("Server shutdown complete.");
    }
}

impl Shared {
    /// Creates the listening socket: address reuse, bind, then the
    /// configured backlog depth.
    fn bind_listener(&self) -> Result<TcpListener, LinkError> {
        let addr: SocketAddr = self
            .config
            .addr()
            .parse()
            .map_err(|e| LinkError::Bind(format!("invalid bind address: {e}")))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| LinkError::Bind(e.to_string()))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| LinkError::Bind(e.to_string()))?;
        socket
            .bind(addr)
            .map_err(|e| LinkError::Bind(e.to_string()))?;
        socket
            .listen(self.config.backlog)
            .map_err(|e| LinkError::Bind(e.to_string()))
    }

    /// The main accept loop. Exits on the shutdown signal or on a real
    /// accept error; in the latter case the run state is cleared so a
    /// later `start()` works.
    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown_tx: broadcast::Sender<()>,
    ) {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let accept_failed = loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Accept loop received shutdown signal.");
                    break false;
                }

                res = listener.accept() => match res {
                    Ok((stream, addr)) => {
                        let peer = addr.to_string();
                        info!("Accepted new connection from: {}", peer);

                        let session =
                            self.factory
                                .make_session(stream, peer.clone(), self.events.clone());
                        self.sessions.insert(peer.clone(), session.clone());
                        self.events.publish(LinkEvent::Connected { peer });

                        let shared = Arc::clone(&self);
                        let session_shutdown = shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            shared.session_loop(session, session_shutdown).await;
                        });
                    }
                    Err(e) => {
                        let err = LinkError::from(e);
                        error!("Failed to accept connection: {}", err);
                        self.events
                            .publish(LinkEvent::from_error(&self.config.addr(), &err));
                        break true;
                    }
                },
            }
        };

        if accept_failed {
            self.fail_stop().await;
        }
    }

    /// Cleanup after the accept loop exits on an error. Dropping the
    /// shutdown sender ends every session loop, so this is a full stop
    /// and the event stream must say so.
    async fn fail_stop(&self) {
        {
            let mut run = self.run.lock().await;
            if !run.running {
                return;
            }
            run.running = false;
            run.local_addr = None;
            run.shutdown_tx = None;
            run.accept_handle = None;
        }
        self.events.publish(LinkEvent::ServerStopped);
    }

    /// The per-session receive loop. The cleanup below the loop runs on
    /// every exit path: orderly close, receive error, or server shutdown.
    async fn session_loop(
        self: Arc<Self>,
        session: Arc<ClientSession>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,

                // The session publishes DataReceived itself; the loop only
                // has to notice when the session dies.
                _ = session.receive_once(None) => {
                    if !session.is_active() {
                        break;
                    }
                }
            }
        }

        session.close().await;
        self.sessions.remove(session.peer());
        session.notify_disconnected();
        info!("Session {} closed.", session.peer());
    }
}
