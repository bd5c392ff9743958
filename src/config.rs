//! Runtime configuration.
//!
//! Plain structs with defaults. The binary fills them from command-line flags
//! and `KEYDECK_*` environment variables.

use std::time::Duration;

// ACCESSOR
#[derive(Debug, Clone)]
pub struct AccessorConfig {
    /// Budget for each individual store call.
    pub call_timeout: Duration,
    /// Maximum descriptor lookups in flight while hydrating a page.
    pub fanout_limit: usize,
    /// `COUNT` hint passed to each scan step.
    pub scan_count: usize,
}

impl Default for AccessorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            fanout_limit: 16,
            scan_count: 250,
        }
    }
}

impl AccessorConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the fan-out limit. Zero is raised to one.
    pub fn with_fanout_limit(mut self, limit: usize) -> Self {
        self.fanout_limit = limit.max(1);
        self
    }

    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }
}

// STORE
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `host:port` of the server.
    pub endpoint: String,
    pub password: Option<String>,
    /// Logical database selected on every new connection.
    pub database: u32,
    /// Idle connections kept for reuse.
    pub pool_size: usize,
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:6379".to_string(),
            password: None,
            database: 0,
            pool_size: 16,
            connect_timeout: Duration::from_secs(3),
        }
    }
}

impl StoreConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}
