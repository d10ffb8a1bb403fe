use std::time::Duration;

/// What to do when a frame or request checksum does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Log the mismatch, record it on the session and keep going.
    #[default]
    Warn,
    /// Fail the exchange with `Error::Checksum`.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Per-transfer USB timeout. `None` uses the session profile's default.
    pub timeout: Option<Duration>,
    pub checksum_policy: ChecksumPolicy,
    read_size: usize,
}

pub const DEFAULT_READ_SIZE: usize = 0x400;

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            timeout: None,
            checksum_policy: ChecksumPolicy::Warn,
            read_size: DEFAULT_READ_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }

    /// Size of the buffer handed to each bulk read. Never zero.
    pub fn read_size(&self) -> usize {
        self.read_size
    }
}
