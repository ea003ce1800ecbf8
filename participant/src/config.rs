//! Outbox configuration.

/// Configuration for a transactional outbox.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Capacity of the channel messages are published to on commit.
    pub channel_capacity: usize,
    /// Maximum number of messages staged in one transaction.
    pub max_staged: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            max_staged: 1000,
        }
    }
}

impl OutboxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(capacity) = std::env::var("UNITWORK_OUTBOX_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.channel_capacity = capacity;
            }
        }

        if let Ok(max) = std::env::var("UNITWORK_OUTBOX_MAX_STAGED") {
            if let Ok(max) = max.parse() {
                config.max_staged = max;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err("Channel capacity cannot be zero".to_string());
        }

        if self.max_staged == 0 {
            return Err("Maximum staged messages cannot be zero".to_string());
        }

        Ok(())
    }
}
