//! Server configuration.

use crate::settings::ServerSettings;
use dirsync_engine::SessionConfig;
use dirsync_protocol::DEFAULT_MAX_PACKET_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Largest data block offered to clients.
    pub max_packet_size: i32,
    /// Connections offered to clients per session.
    pub max_connections: i32,
    /// Acknowledge everything, change nothing.
    pub dry_run: bool,
    /// Socket read/write timeout.
    pub io_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_connections: 5,
            dry_run: false,
            io_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Takes port and limits from persistent settings, listening on all
    /// interfaces.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], settings.port)))
            .with_max_packet_size(settings.max_packet_size)
            .with_max_connections(settings.max_connections)
    }

    /// Sets the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the largest data block.
    pub fn with_max_packet_size(mut self, size: i32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Sets the connections per session.
    pub fn with_max_connections(mut self, max: i32) -> Self {
        self.max_connections = max;
        self
    }

    /// Enables or disables dry-run for every session.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the socket timeout; `None` blocks indefinitely.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Framing limits for accepted connections.
    pub fn session_config(&self) -> SessionConfig {
        let session = SessionConfig::new(usize::try_from(self.max_packet_size).unwrap_or(0));
        match self.io_timeout {
            Some(timeout) => session.with_timeout(timeout),
            None => session,
        }
    }

    /// Block size agreed with a client asking for `requested`.
    pub fn negotiate_packet_size(&self, requested: i32) -> i32 {
        if requested > 0 {
            requested.min(self.max_packet_size)
        } else {
            self.max_packet_size
        }
    }

    /// Connection count agreed with a client asking for `requested`.
    pub fn negotiate_connections(&self, requested: i32) -> i32 {
        if requested > 0 {
            requested.min(self.max_connections)
        } else {
            self.max_connections
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8090)))
    }
}
