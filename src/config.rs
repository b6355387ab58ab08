//! Client configuration
//!
//! Settings can be built in code, read from a TOML file and overridden from
//! the environment:
//!
//! - `EDGEWIRE_MAX_MESSAGE_SIZE` - largest accepted inbound message in bytes
//! - `EDGEWIRE_REQUEST_TIMEOUT_MS` - per-read timeout, `0` disables it
//! - `EDGEWIRE_IMPLICIT_LIMIT` - implicit result limit sent with every query

use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::driver::protocol::{message::header, Headers, MAX_MESSAGE_SIZE};
use crate::error::{DriverError, DriverResult};

pub const ENV_MAX_MESSAGE_SIZE: &str = "EDGEWIRE_MAX_MESSAGE_SIZE";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "EDGEWIRE_REQUEST_TIMEOUT_MS";
pub const ENV_IMPLICIT_LIMIT: &str = "EDGEWIRE_IMPLICIT_LIMIT";

/// Smallest accepted read buffer.
const MIN_READ_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Largest inbound message accepted before the connection is dropped
    pub max_message_size: usize,
    /// Initial capacity of the connection read buffer
    pub read_buffer_capacity: usize,
    /// Timeout for each read from the server
    pub request_timeout_ms: Option<u64>,
    /// Maximum number of cached codecs
    pub codec_cache_size: usize,
    /// Implicit `LIMIT` applied by the server to every query
    pub implicit_limit: Option<u64>,
    /// Ask the server to include `__tname__` in object results
    pub implicit_typenames: bool,
    /// Capability mask sent with every query
    pub allow_capabilities: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
            read_buffer_capacity: 8 * 1024,
            request_timeout_ms: None,
            codec_cache_size: 1000,
            implicit_limit: None,
            implicit_typenames: false,
            allow_capabilities: None,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> DriverResult<Self> {
        let mut config: ClientConfig =
            toml::from_str(content).map_err(|e| DriverError::Config(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, applying environment overrides.
    pub fn from_file(path: &Path) -> DriverResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> DriverResult<String> {
        toml::to_string_pretty(self).map_err(|e| DriverError::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(size) = env_number(ENV_MAX_MESSAGE_SIZE) {
            self.max_message_size = size as usize;
        }
        if let Some(ms) = env_number(ENV_REQUEST_TIMEOUT_MS) {
            self.request_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(limit) = env_number(ENV_IMPLICIT_LIMIT) {
            self.implicit_limit = Some(limit);
        }
    }

    pub fn validate(&self) -> DriverResult<()> {
        if self.max_message_size < crate::driver::protocol::buffer::FRAME_HEADER_SIZE {
            return Err(DriverError::Config(format!(
                "max_message_size {} is too small",
                self.max_message_size
            )));
        }
        if self.read_buffer_capacity < MIN_READ_BUFFER {
            return Err(DriverError::Config(format!(
                "read_buffer_capacity must be at least {}",
                MIN_READ_BUFFER
            )));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(DriverError::Config(
                "request_timeout_ms must be positive; omit it to disable".to_string(),
            ));
        }
        if self.codec_cache_size == 0 {
            return Err(DriverError::Config(
                "codec_cache_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Protocol headers sent with every query.
    pub fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        if let Some(limit) = self.implicit_limit {
            headers.insert(header::IMPLICIT_LIMIT, Bytes::from(limit.to_string()));
        }
        if self.implicit_typenames {
            headers.insert(header::IMPLICIT_TYPENAMES, Bytes::from_static(b"true"));
        }
        if let Some(caps) = self.allow_capabilities {
            headers.insert(
                header::ALLOW_CAPABILITIES,
                Bytes::copy_from_slice(&caps.to_be_bytes()),
            );
        }
        headers
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
