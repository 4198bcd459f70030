// src/core/mod.rs

//! The central module containing the error taxonomy and event bus of thermolink.

pub mod errors;
pub mod events;

pub use errors::LinkError;
