//! Configuration for sessions and clients.

use dirsync_protocol::{max_frame_len, BackupType, DEFAULT_MAX_PACKET_SIZE};
use std::time::Duration;

/// Configuration of one framed session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Largest frame accepted on receive, header included.
    pub max_frame_len: usize,
    /// Read timeout; `None` blocks forever.
    pub read_timeout: Option<Duration>,
    /// Write timeout; `None` blocks forever.
    pub write_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Creates a configuration for the given data block size.
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_frame_len: max_frame_len(max_packet_size),
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Sets the frame limit from a data block size.
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_frame_len = max_frame_len(max_packet_size);
        self
    }

    /// Sets both read and write timeouts.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self.write_timeout = Some(timeout);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE as usize)
    }
}

/// Configuration of a [`SyncClient`](crate::SyncClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub server_addr: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Virtual folder on the server.
    pub target_folder: String,
    /// Backup type the client expects the folder to have.
    pub backup_type: BackupType,
    /// Largest data block to send or accept.
    pub max_packet_size: i32,
    /// Connections the client would like to use.
    pub max_connections: i32,
    /// Acknowledge everything, write nothing.
    pub dry_run: bool,
    /// Socket timeout.
    pub timeout: Option<Duration>,
    /// Reconnect policy.
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Creates a client configuration.
    pub fn new(
        server_addr: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        target_folder: impl Into<String>,
    ) -> Self {
        Self {
            server_addr: server_addr.into(),
            username: username.into(),
            password: password.into(),
            target_folder: target_folder.into(),
            backup_type: BackupType::Mirror,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_connections: 1,
            dry_run: false,
            timeout: Some(Duration::from_secs(60)),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the expected backup type.
    pub fn with_backup_type(mut self, backup_type: BackupType) -> Self {
        self.backup_type = backup_type;
        self
    }

    /// Sets the data block size.
    pub fn with_max_packet_size(mut self, size: i32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Sets the requested connection count.
    pub fn with_max_connections(mut self, connections: i32) -> Self {
        self.max_connections = connections;
        self
    }

    /// Enables or disables dry-run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the socket timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::new(self.max_packet_size.max(1) as usize);
        match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:8090", "", "", "")
    }
}

/// Configuration for reconnect behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of connection attempts.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
