//! Channel sizing for worker-to-collector communication

/// Channel buffer configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Record channel buffer size (workers -> collector)
    pub records_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            records_buffer: 10_000,
        }
    }
}

impl ChannelConfig {
    /// Use a custom record buffer size (minimum 1)
    pub fn with_records_buffer(mut self, size: usize) -> Self {
        self.records_buffer = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_default() {
        assert_eq!(ChannelConfig::default().records_buffer, 10_000);
    }

    #[test]
    fn test_channel_config_builder() {
        assert_eq!(
            ChannelConfig::default()
                .with_records_buffer(64)
                .records_buffer,
            64
        );
        assert_eq!(
            ChannelConfig::default().with_records_buffer(0).records_buffer,
            1
        );
    }
}
