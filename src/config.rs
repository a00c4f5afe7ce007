//! Connection driver configuration.

use std::time::Duration;

use crate::{
    constants::{CHANNEL_CAPACITY, DEFAULT_REQUEST_TIMEOUT, READ_BUFFER_CAPACITY},
    protocol::ProtocolVersion,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub protocol_version: ProtocolVersion,
    /// Timeout of requests submitted without one.
    pub request_timeout: Duration,
    /// Largest inbound packet accepted, `None` for the protocol limit.
    pub maximum_packet_size: Option<u32>,
    pub read_buffer_capacity: usize,
    /// Capacity of the command and inbound packet channels.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::V311,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            maximum_packet_size: None,
            read_buffer_capacity: READ_BUFFER_CAPACITY,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn new(protocol_version: ProtocolVersion) -> Self {
        Self { protocol_version, ..Default::default() }
    }

    /// Use MQTT 5.0.
    pub fn mqtt5(mut self) -> Self {
        self.protocol_version = ProtocolVersion::V5;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn maximum_packet_size(mut self, size: u32) -> Self {
        self.maximum_packet_size = Some(size);
        self
    }

    pub fn read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity;
        self
    }

    /// Channels need room for at least one message.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = ClientConfig::default()
            .mqtt5()
            .request_timeout(Duration::from_millis(250))
            .maximum_packet_size(1024)
            .channel_capacity(0);

        assert_eq!(config.protocol_version, ProtocolVersion::V5);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.maximum_packet_size, Some(1024));
        assert_eq!(config.read_buffer_capacity, 4096);
        assert_eq!(config.channel_capacity, 1);
    }
}
