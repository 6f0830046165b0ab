//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};

/// Default cap on a buffered urlencoded form body (64 KiB).
pub const DEFAULT_MAX_FORM_SIZE: usize = 64 * 1024;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,

    /// Log every request with its status and duration.
    pub request_logging: bool,

    /// Largest form body buffered while looking for a session id.
    pub max_form_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            request_logging: true,
            max_form_size: DEFAULT_MAX_FORM_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    pub fn with_max_form_size(mut self, bytes: usize) -> Self {
        self.max_form_size = bytes;
        self
    }
}
