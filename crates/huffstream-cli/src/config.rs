//! Configuration system for the HuffStream CLI.

use huffstream_core::{ServerEndpoint, SessionConfig};
use huffstream_transport::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HuffStream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Known servers; the first one is used unless another is selected
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    /// Session tuning
    #[serde(default)]
    pub session: SessionSettings,
    /// Client connect retry
    #[serde(default)]
    pub retry: RetrySettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One server entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name or address
    pub host: String,
    /// Port carrying transfers
    pub data_port: u16,
    /// Port carrying control messages
    pub control_port: u16,
    /// Where a server stores received files
    #[serde(default = "default_save_directory")]
    pub save_directory: PathBuf,
}

/// Session tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Read/write chunk size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Concurrent sessions a server admits
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Per-operation I/O timeout in seconds
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
    /// Longest accepted header or control line
    #[serde(default = "default_max_header_len")]
    pub max_header_len: usize,
}

/// Client connect retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total connection attempts
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    /// Seconds between attempts
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig {
        host: "127.0.0.1".to_string(),
        data_port: 9000,
        control_port: 9001,
        save_directory: default_save_directory(),
    }]
}

fn default_save_directory() -> PathBuf {
    PathBuf::from("received_files")
}

fn default_buffer_size() -> usize {
    huffstream_core::DEFAULT_BUFFER_SIZE
}

fn default_max_sessions() -> usize {
    huffstream_core::DEFAULT_MAX_SESSIONS
}

fn default_io_timeout_secs() -> u64 {
    huffstream_core::DEFAULT_IO_TIMEOUT.as_secs()
}

fn default_max_header_len() -> usize {
    huffstream_core::DEFAULT_MAX_HEADER_LEN
}

fn default_retry_attempts() -> u32 {
    RetryPolicy::default().attempts
}

fn default_retry_delay_secs() -> u64 {
    RetryPolicy::default().delay.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            session: SessionSettings::default(),
            retry: RetrySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_sessions: default_max_sessions(),
            io_timeout_secs: default_io_timeout_secs(),
            max_header_len: default_max_header_len(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("huffstream/config.toml")
    }

    /// Load `path`, or the default path if none is given
    ///
    /// A missing file at the default path yields the defaults; a missing
    /// explicit path is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or parsing the config fails.
    pub fn resolve(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Server entry at `index`
    ///
    /// # Errors
    ///
    /// Returns an error if no such server is configured.
    pub fn server(&self, index: usize) -> anyhow::Result<&ServerConfig> {
        self.servers.get(index).ok_or_else(|| {
            anyhow::anyhow!(
                "Server index {index} out of range ({} configured)",
                self.servers.len()
            )
        })
    }

    /// Core session configuration
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            buffer_size: self.session.buffer_size,
            max_sessions: self.session.max_sessions,
            io_timeout: Duration::from_secs(self.session.io_timeout_secs),
            max_header_len: self.session.max_header_len,
        }
    }

    /// Client retry policy
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts,
            delay: Duration::from_secs(self.retry.delay_secs),
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.servers.is_empty() {
            anyhow::bail!("At least one server must be configured");
        }

        for (index, server) in self.servers.iter().enumerate() {
            server.validate().map_err(|e| anyhow::anyhow!("Server {index}: {e}"))?;
        }

        self.session_config().validate()?;

        if self.retry.attempts == 0 {
            anyhow::bail!("Retry attempts must be at least 1");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}

impl ServerConfig {
    /// Core endpoint for this entry
    #[must_use]
    pub fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint::new(self.host.clone(), self.data_port, self.control_port)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("empty hostname");
        }

        if self.host.contains("..") || self.host.contains('/') || self.host.contains('\\') {
            anyhow::bail!("host '{}' contains invalid characters", self.host);
        }

        if self.data_port == 0 || self.control_port == 0 {
            anyhow::bail!("ports must be non-zero");
        }

        if self.data_port == self.control_port {
            anyhow::bail!("data and control ports must differ");
        }

        Ok(())
    }
}
