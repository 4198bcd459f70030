// src/client/persistent.rs

//! Defines the `PersistentClient`, which holds one connection open across
//! multiple send/receive calls until explicitly disconnected.

use crate::config::ClientConfig;
use crate::core::LinkError;
use crate::core::events::{EventBus, LinkEvent};
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

/// The connection state owned by one client instance.
///
/// Invariant: `connected == true` implies `stream` is `Some` and was healthy
/// as of the last successful connect, send, or receive.
#[derive(Debug, Default)]
struct ConnState {
    stream: Option<TcpStream>,
    connected: bool,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    events: EventBus,
    state: Mutex<ConnState>,
}

/// A TCP client that maintains one long-lived connection.
///
/// Every fallible operation returns a `bool` or `Option` and reports the
/// underlying failure on the event bus; nothing here panics or propagates
/// errors to the caller. All state mutation happens under the internal
/// mutex, which is released before any event is published so a listener
/// may re-enter the client. The handle is cheap to clone; clones share
/// the same connection.
#[derive(Debug, Clone)]
pub struct PersistentClient {
    inner: Arc<Inner>,
}

impl PersistentClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                events: EventBus::new(),
                state: Mutex::new(ConnState::default()),
            }),
        }
    }

    /// Provides a new receiver subscribed to this client's events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }

    /// Establishes the connection. A no-op returning `true` when already
    /// connected. On failure the client stays disconnected and the
    /// classified error is published.
    pub async fn connect(&self) -> bool {
        let inner = &self.inner;
        let addr = inner.config.addr();
        let mut state = inner.state.lock().await;
        if state.connected {
            return true;
        }

        match tokio::time::timeout(inner.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                state.stream = Some(stream);
                state.connected = true;
                drop(state);
                info!("Connected to {}", addr);
                inner.events.publish(LinkEvent::Connected { peer: addr });
                true
            }
            Ok(Err(e)) => {
                drop(state);
                let err = LinkError::classify(e, &addr);
                warn!("Connect to {} failed: {}", addr, err);
                inner.events.publish(LinkEvent::from_error(&addr, &err));
                false
            }
            Err(_) => {
                drop(state);
                warn!("Connect to {} timed out", addr);
                inner
                    .events
                    .publish(LinkEvent::from_error(&addr, &LinkError::Timeout));
                false
            }
        }
    }

    /// Fire-and-forget connect; the outcome is reported only via events.
    pub fn spawn_connect(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            client.connect().await;
        });
    }

    /// Writes `text` on the open connection. Returns `false` immediately
    /// when not connected. A write failure transitions the client to
    /// disconnected and publishes `Error` then `Disconnected`.
    pub async fn send(&self, text: &str) -> bool {
        let inner = &self.inner;
        let addr = inner.config.addr();
        let mut state = inner.state.lock().await;
        if !state.connected {
            return false;
        }
        let Some(stream) = state.stream.as_mut() else {
            state.connected = false;
            return false;
        };

        let write = tokio::time::timeout(
            inner.config.connect_timeout,
            stream.write_all(text.as_bytes()),
        )
        .await;

        let err = match write {
            Ok(Ok(())) => {
                debug!("Sent {} bytes to {}", text.len(), addr);
                return true;
            }
            Ok(Err(e)) => LinkError::classify(e, &addr),
            Err(elapsed) => elapsed.into(),
        };

        state.stream = None;
        state.connected = false;
        drop(state);
        warn!("Send to {} failed: {}", addr, err);
        inner.events.publish(LinkEvent::from_error(&addr, &err));
        inner.events.publish(LinkEvent::Disconnected { peer: addr });
        false
    }

    /// Fire-and-forget send; the outcome is reported only via events.
    pub fn spawn_send(&self, text: String) {
        let client = self.clone();
        tokio::spawn(async move {
            client.send(&text).await;
        });
    }

    /// Performs one blocking receive bounded by `timeout` (or the configured
    /// default). Returns `None` when not connected, on timeout (still
    /// connected), on peer close (transitions to disconnected), and on any
    /// I/O or decode failure.
    pub async fn receive(&self, timeout: Option<Duration>) -> Option<String> {
        let inner = &self.inner;
        let addr = inner.config.addr();
        let wait = timeout.unwrap_or(inner.config.recv_timeout);

        let mut state = inner.state.lock().await;
        if !state.connected {
            return None;
        }
        let Some(stream) = state.stream.as_mut() else {
            state.connected = false;
            return None;
        };

        let mut buf = BytesMut::with_capacity(inner.config.buffer_size);
        match tokio::time::timeout(wait, stream.read_buf(&mut buf)).await {
            // A receive timeout is a normal polling outcome.
            Err(_) => None,
            Ok(Ok(0)) => {
                state.stream = None;
                state.connected = false;
                drop(state);
                debug!("Connection to {} closed by peer.", addr);
                inner.events.publish(LinkEvent::Disconnected { peer: addr });
                None
            }
            Ok(Ok(_)) => match std::str::from_utf8(&buf) {
                Ok(text) => {
                    let trimmed = text.trim().to_string();
                    drop(state);
                    if trimmed.is_empty() { None } else { Some(trimmed) }
                }
                Err(e) => {
                    drop(state);
                    let err: LinkError = e.into();
                    warn!("Received undecodable bytes from {}: {}", addr, err);
                    inner.events.publish(LinkEvent::from_error(&addr, &err));
                    None
                }
            },
            Ok(Err(e)) => {
                state.stream = None;
                state.connected = false;
                drop(state);
                let err = LinkError::classify(e, &addr);
                warn!("Receive from {} failed: {}", addr, err);
                inner.events.publish(LinkEvent::from_error(&addr, &err));
                None
            }
        }
    }

    /// Closes the connection if open. Idempotent; `Disconnected` is
    /// published only on the transition out of the connected state.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        let addr = inner.config.addr();
        let was_connected = {
            let mut state = inner.state.lock().await;
            let was_connected = state.connected;
            state.connected = false;
            if let Some(mut stream) = state.stream.take() {
                // Best-effort cleanup; a close-time error is not reportable.
                let _ = stream.shutdown().await;
            }
            was_connected
        };
        if was_connected {
            info!("Disconnected from {}", addr);
            inner.events.publish(LinkEvent::Disconnected { peer: addr });
        }
    }
}
