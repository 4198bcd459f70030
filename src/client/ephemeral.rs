// src/client/ephemeral.rs

//! Defines the `EphemeralClient`, which opens a fresh connection per payload
//! and closes it immediately after writing (fire-and-forget telemetry).

use crate::config::ClientConfig;
use crate::core::LinkError;
use crate::core::events::{EventBus, LinkEvent};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    events: EventBus,
}

/// A connect-write-close TCP client with no state beyond its endpoint.
///
/// Each `send` is fully independent; concurrent sends from any number of
/// tasks are safe because nothing mutable is shared between them. The
/// socket is closed on every path, success or failure, by ownership.
#[derive(Debug, Clone)]
pub struct EphemeralClient {
    inner: Arc<Inner>,
}

impl EphemeralClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                events: EventBus::new(),
            }),
        }
    }

    /// Provides a new receiver subscribed to this client's events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    /// Opens a connection, writes `text`, and closes. Every failure is
    /// classified, published as an `Error` event, and returned as `false`.
    pub async fn send(&self, text: &str) -> bool {
        let inner = &self.inner;
        let addr = inner.config.addr();

        let connect =
            tokio::time::timeout(inner.config.connect_timeout, TcpStream::connect(&addr)).await;
        let mut stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let err = LinkError::classify(e, &addr);
                warn!("Ephemeral connect to {} failed: {}", addr, err);
                inner.events.publish(LinkEvent::from_error(&addr, &err));
                return false;
            }
            Err(_) => {
                warn!("Ephemeral connect to {} timed out", addr);
                inner
                    .events
                    .publish(LinkEvent::from_error(&addr, &LinkError::Timeout));
                return false;
            }
        };

        // The write gets the same bound as the connect so a peer that
        // accepts but never reads cannot park this call once the kernel
        // buffers fill.
        let write = tokio::time::timeout(
            inner.config.connect_timeout,
            stream.write_all(text.as_bytes()),
        )
        .await;

        let err = match write {
            Ok(Ok(())) => {
                // Orderly close so the receiver observes EOF right after the
                // payload. A shutdown failure here is best-effort cleanup,
                // not reportable.
                let _ = stream.shutdown().await;
                debug!("Ephemeral send of {} bytes to {} complete.", text.len(), addr);
                return true;
            }
            Ok(Err(e)) => LinkError::classify(e, &addr),
            Err(elapsed) => elapsed.into(),
        };

        warn!("Ephemeral send to {} failed: {}", addr, err);
        inner.events.publish(LinkEvent::from_error(&addr, &err));
        false
    }

    /// Fire-and-forget send; the boolean outcome is discarded and failures
    /// are reported only via events.
    pub fn spawn_send(&self, text: String) {
        let client = self.clone();
        tokio::spawn(async move {
            client.send(&text).await;
        });
    }
}
