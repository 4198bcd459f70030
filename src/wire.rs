// src/wire.rs

//! Typed encode/parse helpers for the payloads carried over a link.
//!
//! The socket layer moves opaque trimmed text; these helpers are the
//! collaborators that give that text shape. Two formats exist on the wire:
//! bare decimal telemetry readings (one reading per ephemeral connection)
//! and newline-terminated JSON control commands.

use crate::core::LinkError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The timestamp layout the remote controller expects, ISO-8601 with
/// microsecond precision and no zone suffix.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// A command/state pair addressed to or reported by the controller, e.g.
/// `{"comando": "power", "estado": "on", "timestamp": "..."}`.
///
/// The on-wire field names are fixed by the controller firmware and kept
/// as serde renames.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlCommand {
    #[serde(rename = "comando")]
    pub command: String,
    #[serde(rename = "estado")]
    pub state: String,
    #[serde(
        rename = "timestamp",
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: NaiveDateTime,
}

fn serialize_timestamp<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
}

impl ControlCommand {
    /// Builds a command stamped with the current local time.
    pub fn new(command: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            state: state.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    /// Serializes the command as one newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, LinkError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses a received line, tolerating the trailing newline the sender
    /// appends and any surrounding whitespace the session already trimmed.
    pub fn parse(line: &str) -> Result<Self, LinkError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

/// Parses a bare decimal telemetry reading such as `"23.50"` or `"75.5"`.
pub fn parse_reading(text: &str) -> Result<f64, LinkError> {
    let trimmed = text.trim();
    trimmed
        .parse::<f64>()
        .map_err(|e| LinkError::Decode(format!("invalid reading '{trimmed}': {e}")))
}

/// Renders a telemetry reading the way the simulators transmit it, with
/// two decimal places.
pub fn format_reading(value: f64) -> String {
    format!("{value:.2}")
}
