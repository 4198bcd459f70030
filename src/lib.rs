// src/lib.rs

pub mod client;
pub mod config;
pub mod core;
pub mod server;
pub mod wire;

// Re-export
pub use crate::core::LinkError;
pub use crate::core::events::{EventBus, LinkEvent};
