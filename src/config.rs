use std::path::PathBuf;

use crate::error::ConfigError;

/// Default bind address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default number of bytes sent per `/speedtest` run, 50 MiB.
pub const DEFAULT_SPEED_TEST_BYTES: u64 = 50 << 20;

/// Process-wide server settings.
///
/// Built once at startup and shared read-only with every request. The fields are typically
/// initialized through the builder methods.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// The directory that defines the entire addressable namespace.
    pub root: PathBuf,
    /// Address to listen on, as `host:port`.
    pub addr: String,
    /// Number of bytes `/speedtest` attempts to send. Never zero.
    pub speed_test_bytes: u64,
}

impl ServerConfig {
    /// Create a configuration serving `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ServerConfig {
            root: root.into(),
            addr: DEFAULT_ADDR.to_owned(),
            speed_test_bytes: DEFAULT_SPEED_TEST_BYTES,
        }
    }

    /// Listen on the given address.
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the speed test budget. Zero selects the default.
    pub fn speed_test_bytes(mut self, bytes: u64) -> Self {
        self.speed_test_bytes = if bytes == 0 {
            DEFAULT_SPEED_TEST_BYTES
        } else {
            bytes
        };
        self
    }

    /// Check that the root is a directory and make it absolute.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let root = std::fs::canonicalize(&self.root).map_err(|source| ConfigError::InvalidRoot {
            path: self.root.clone(),
            source,
        })?;
        if !root.is_dir() {
            return Err(ConfigError::NotADirectory(self.root));
        }
        self.root = root;
        Ok(self)
    }
}
