// src/server/session.rs

//! Defines the state and receive lifecycle of a single accepted connection.

use crate::core::LinkError;
use crate::core::events::{EventBus, LinkEvent};
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One accepted connection and its single-shot receive lifecycle.
///
/// `active` is terminal: once it flips to `false` the session never
/// reactivates. `close()` is idempotent and safe to call from any task.
/// Exactly one `Disconnected` event is ever published for a session, no
/// matter which path ends it.
#[derive(Debug)]
pub struct ClientSession {
    stream: Mutex<TcpStream>,
    peer: String,
    active: AtomicBool,
    disconnect_notified: AtomicBool,
    recv_timeout: Duration,
    buffer_size: usize,
    events: EventBus,
}

impl ClientSession {
    pub fn new(
        stream: TcpStream,
        peer: String,
        recv_timeout: Duration,
        buffer_size: usize,
        events: EventBus,
    ) -> Self {
        Self {
            stream: Mutex::new(stream),
            peer,
            active: AtomicBool::new(true),
            disconnect_notified: AtomicBool::new(false),
            recv_timeout,
            buffer_size,
            events,
        }
    }

    /// The remote address as `"ip:port"`.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Attempts one receive bounded by `timeout` (or the session default).
    ///
    /// Outcomes:
    /// - inactive session: `None` immediately, no I/O.
    /// - timeout: `None`, session stays active, no event.
    /// - peer closed: session becomes permanently inactive, `Disconnected`
    ///   is published (once ever), `None`.
    /// - invalid UTF-8: `Error` is published, the bytes are dropped, the
    ///   session stays active, `None`.
    /// - other I/O error: session becomes inactive, `Error` then
    ///   `Disconnected` are published, `None`.
    /// - success: the text is trimmed; when non-empty a `DataReceived`
    ///   event is published and the text returned.
    pub async fn receive_once(&self, timeout: Option<Duration>) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let wait = timeout.unwrap_or(self.recv_timeout);

        let mut stream = self.stream.lock().await;
        let mut buf = BytesMut::with_capacity(self.buffer_size);
        match tokio::time::timeout(wait, stream.read_buf(&mut buf)).await {
            // Nothing arrived within the deadline; a normal polling outcome.
            Err(_) => None,
            Ok(Ok(0)) => {
                drop(stream);
                debug!("Session {} closed by peer.", self.peer);
                self.active.store(false, Ordering::SeqCst);
                self.notify_disconnected();
                None
            }
            Ok(Ok(_)) => match std::str::from_utf8(&buf) {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        return None;
                    }
                    let trimmed = trimmed.to_string();
                    drop(stream);
                    self.events.publish(LinkEvent::DataReceived {
                        peer: self.peer.clone(),
                        text: trimmed.clone(),
                    });
                    Some(trimmed)
                }
                Err(e) => {
                    drop(stream);
                    // Malformed bytes are skipped; the session survives.
                    let err: LinkError = e.into();
                    warn!("Session {} received undecodable bytes: {}", self.peer, err);
                    self.events.publish(LinkEvent::from_error(&self.peer, &err));
                    None
                }
            },
            Ok(Err(e)) => {
                drop(stream);
                let err = LinkError::classify(e, &self.peer);
                warn!("Session {} receive failed: {}", self.peer, err);
                self.active.store(false, Ordering::SeqCst);
                self.events.publish(LinkEvent::from_error(&self.peer, &err));
                self.notify_disconnected();
                None
            }
        }
    }

    /// Marks the session inactive and shuts the socket down. Idempotent;
    /// close-time OS errors are swallowed as best-effort cleanup.
    pub async fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut stream = self.stream.lock().await;
        let _ = stream.shutdown().await;
    }

    /// Publishes this session's `Disconnected` event, at most once ever.
    pub(crate) fn notify_disconnected(&self) {
        if !self.disconnect_notified.swap(true, Ordering::SeqCst) {
            self.events.publish(LinkEvent::Disconnected {
                peer: self.peer.clone(),
            });
        }
    }
}
