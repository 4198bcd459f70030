// src/client/mod.rs

//! Outbound link clients: one persistent, one ephemeral.

pub mod ephemeral;
pub mod persistent;

pub use ephemeral::EphemeralClient;
pub use persistent::PersistentClient;
