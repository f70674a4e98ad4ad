//! Endpoint configuration and the serialized snapshot handed from the
//! supervisor to the child process at launch.
//!
//! The snapshot carries configuration *data* only (base64-encoded JSON); the
//! child maps the `dcc` identity back to a concrete hook through its own local
//! registry. Executable code is never transmitted across the process boundary.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::hooks::DccKind;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Identity of one bound listener. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Which DCC family hosts the listener.
    pub dcc: DccKind,
    /// DCC version string, e.g. "2024" for Maya2024 or "20.5.445" for Houdini.
    pub version: String,
    pub host: String,
    pub port: u16,
    /// Optional root searched before the built-in discovery hints.
    pub custom_root: Option<PathBuf>,
}

impl EndpointConfig {
    pub fn new(dcc: DccKind, version: impl Into<String>) -> Self {
        Self {
            dcc,
            version: version.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            custom_root: None,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Encode this config as a portable snapshot string for the child process.
    pub fn encode_snapshot(&self) -> Result<String, SnapshotError> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }

    /// Reconstruct a config from a snapshot argument received at bootstrap.
    pub fn decode_snapshot(snapshot: &str) -> Result<Self, SnapshotError> {
        let json = BASE64.decode(snapshot.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("invalid base64 in config snapshot: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("malformed config snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}
