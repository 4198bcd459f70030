// src/config.rs

//! Manages link configuration: defaults, TOML loading, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Configuration for a [`LinkServer`](crate::server::LinkServer).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// OS-level queue depth for connections not yet accepted.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// How long a session's single-shot receive waits before yielding.
    #[serde(with = "humantime_serde", default = "default_server_recv_timeout")]
    pub recv_timeout: Duration,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Configuration shared by the persistent and ephemeral clients.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Deadline for establishing a connection and for blocking writes.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Default deadline for a blocking receive; overridable per call.
    #[serde(with = "humantime_serde", default = "default_client_recv_timeout")]
    pub recv_timeout: Duration,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_backlog() -> u32 {
    5
}
fn default_server_recv_timeout() -> Duration {
    Duration::from_secs(1)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_client_recv_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_buffer_size() -> usize {
    4096
}

impl ServerConfig {
    /// A configuration bound to the given port with default timeouts.
    pub fn for_port(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            backlog: default_backlog(),
            recv_timeout: default_server_recv_timeout(),
            buffer_size: default_buffer_size(),
        }
    }

    /// Creates a new `ServerConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: ServerConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// The bind address as `"host:port"`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.buffer_size == 0 {
            return Err(anyhow!("buffer_size cannot be 0"));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// A configuration targeting `host:port` with default timeouts.
    pub fn for_endpoint(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: default_connect_timeout(),
            recv_timeout: default_client_recv_timeout(),
            buffer_size: default_buffer_size(),
        }
    }

    /// Creates a new `ClientConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: ClientConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// The target address as `"host:port"`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.buffer_size == 0 {
            return Err(anyhow!("buffer_size cannot be 0"));
        }
        Ok(())
    }
}
