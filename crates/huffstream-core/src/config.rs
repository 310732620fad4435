//! Session configuration.
//!
//! Values arrive already resolved; loading them from files is the caller's
//! job.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default transfer chunk size
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default bound on concurrently active sessions
pub const DEFAULT_MAX_SESSIONS: usize = 16;

/// Default per-operation channel deadline
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum header line length, delimiter included
pub const DEFAULT_MAX_HEADER_LEN: usize = 4096;

/// Session and transfer tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Read and write chunk size in bytes
    pub buffer_size: usize,

    /// Maximum concurrently active sessions; further connections are refused
    pub max_sessions: usize,

    /// Deadline for any single channel read or write
    pub io_timeout: Duration,

    /// Longest accepted transfer header or control line
    pub max_header_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_sessions: DEFAULT_MAX_SESSIONS,
            io_timeout: DEFAULT_IO_TIMEOUT,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
        }
    }
}

impl SessionConfig {
    /// Check that every value is usable
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::invalid_config("buffer_size must be greater than 0"));
        }
        if self.max_sessions == 0 {
            return Err(Error::invalid_config("max_sessions must be greater than 0"));
        }
        if self.io_timeout.is_zero() {
            return Err(Error::invalid_config("io_timeout must be greater than 0"));
        }
        if self.max_header_len < 16 {
            return Err(Error::invalid_config("max_header_len must be at least 16"));
        }
        Ok(())
    }
}

/// Address of one server: a control port and a data port on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    /// Host name or IP address
    pub host: String,
    /// Port carrying transfer bodies
    pub data_port: u16,
    /// Port carrying control messages
    pub control_port: u16,
}

impl ServerEndpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, data_port: u16, control_port: u16) -> Self {
        Self {
            host: host.into(),
            data_port,
            control_port,
        }
    }
}

impl std::fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (data {}, control {})",
            self.host, self.data_port, self.control_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.max_header_len, 4096);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let cases = [
            SessionConfig {
                buffer_size: 0,
                ..Default::default()
            },
            SessionConfig {
                max_sessions: 0,
                ..Default::default()
            },
            SessionConfig {
                io_timeout: Duration::ZERO,
                ..Default::default()
            },
            SessionConfig {
                max_header_len: 8,
                ..Default::default()
            },
        ];

        for config in cases {
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        }
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = ServerEndpoint::new("localhost", 8443, 8444);
        assert_eq!(endpoint.to_string(), "localhost (data 8443, control 8444)");
    }
}
