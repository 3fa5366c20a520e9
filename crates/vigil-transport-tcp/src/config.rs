use std::time::Duration;

use vigil_core::TransportConfigFile;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Socket settings for a framed TCP link.
///
/// Edge links are long-lived and mostly idle between heartbeats, so reads
/// have no timeout unless one is set explicitly; request/response callers
/// such as the operator client set `read_timeout`.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub max_message_size: usize,
    pub nodelay: bool,
}

impl TcpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub const fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            nodelay: true,
        }
    }
}

impl From<&TransportConfigFile> for TcpConfig {
    fn from(file: &TransportConfigFile) -> Self {
        let millis = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            connect_timeout: Duration::from_millis(file.connect_timeout_ms),
            read_timeout: None,
            write_timeout: millis(file.write_timeout_ms),
            max_message_size: file.max_message_size,
            nodelay: file.nodelay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = TcpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.write_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert!(config.nodelay);
    }

    #[test]
    fn builder_methods_work() {
        let config = TcpConfig::new()
            .with_connect_timeout(Duration::from_secs(5))
            .with_read_timeout(Some(Duration::from_secs(2)))
            .with_max_message_size(1024 * 1024)
            .with_nodelay(false);

        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert!(!config.nodelay);
    }

    #[test]
    fn from_config_file() {
        let file = TransportConfigFile {
            max_message_size: 4096,
            connect_timeout_ms: 250,
            read_timeout_ms: 1_000,
            write_timeout_ms: 0,
            nodelay: false,
        };
        let config = TcpConfig::from(&file);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.write_timeout, None);
        assert_eq!(config.max_message_size, 4096);
        assert!(!config.nodelay);
    }
}
