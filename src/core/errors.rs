// src/core/errors.rs

//! Defines the primary error type for the link core.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, classifying every failure the link core can observe.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
///
/// None of these values ever cross a public client/server method boundary;
/// fallible operations report them through the event bus and return a
/// boolean or `None` instead.
#[derive(Error, Debug)]
pub enum LinkError {
    /// An operation's deadline elapsed before any data or connection arrived.
    /// On receive paths this is a normal polling outcome, not a fault.
    #[error("timed out waiting for the peer")]
    Timeout,

    /// The remote end actively rejected the connection.
    #[error("connection refused by {0}")]
    Refused(String),

    /// The remote end closed the connection in an orderly fashion.
    #[error("connection closed by peer")]
    PeerClosed,

    /// Received bytes were not valid UTF-8 (or a payload failed to parse).
    #[error("decode error: {0}")]
    Decode(String),

    /// The listening socket could not bind to its configured address.
    #[error("bind error: {0}")]
    Bind(String),

    /// An operation required an established connection and there was none.
    #[error("not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl LinkError {
    /// Maps a low-level OS error into the link core's taxonomy.
    ///
    /// The set of kinds treated as an orderly peer close matches what a
    /// remote endpoint produces when it drops a connection mid-stream.
    pub fn classify(e: std::io::Error, peer: &str) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => LinkError::Timeout,
            ErrorKind::ConnectionRefused => LinkError::Refused(peer.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => LinkError::PeerClosed,
            _ => LinkError::Io(Arc::new(e)),
        }
    }

    /// True for conditions a caller may simply retry on the next poll.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout)
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for LinkError {
    fn clone(&self) -> Self {
        match self {
            LinkError::Timeout => LinkError::Timeout,
            LinkError::Refused(s) => LinkError::Refused(s.clone()),
            LinkError::PeerClosed => LinkError::PeerClosed,
            LinkError::Decode(s) => LinkError::Decode(s.clone()),
            LinkError::Bind(s) => LinkError::Bind(s.clone()),
            LinkError::NotConnected => LinkError::NotConnected,
            LinkError::Io(e) => LinkError::Io(Arc::clone(e)),
        }
    }
}

impl PartialEq for LinkError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LinkError::Io(e1), LinkError::Io(e2)) => e1.to_string() == e2.to_string(),
            (LinkError::Refused(s1), LinkError::Refused(s2)) => s1 == s2,
            (LinkError::Decode(s1), LinkError::Decode(s2)) => s1 == s2,
            (LinkError::Bind(s1), LinkError::Bind(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(Arc::new(e))
    }
}

impl From<std::string::FromUtf8Error> for LinkError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        LinkError::Decode(e.to_string())
    }
}

impl From<std::str::Utf8Error> for LinkError {
    fn from(e: std::str::Utf8Error) -> Self {
        LinkError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Decode(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for LinkError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        LinkError::Timeout
    }
}
