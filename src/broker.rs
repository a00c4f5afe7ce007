use crate::{packets::ConnAckPacket, protocol::QoS};

/// What the broker announced it supports, as far as pre-send validation cares.
///
/// MQTT 5 brokers advertise these in the CONNACK properties; an absent property
/// means the feature is available. MQTT 3.1.1 brokers advertise nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerCapabilities {
    /// Largest packet the broker accepts, fixed header included.
    pub maximum_packet_size: Option<u32>,
    pub subscription_identifiers_available: bool,
    pub wildcard_subscription_available: bool,
    pub shared_subscription_available: bool,
    pub retain_available: bool,
    pub maximum_qos: QoS,
}

impl Default for BrokerCapabilities {
    fn default() -> Self {
        Self {
            maximum_packet_size: None,
            subscription_identifiers_available: true,
            wildcard_subscription_available: true,
            shared_subscription_available: true,
            retain_available: true,
            maximum_qos: QoS::ExactlyOnce,
        }
    }
}

impl BrokerCapabilities {
    pub fn from_conn_ack(conn_ack: &ConnAckPacket) -> Self {
        let properties = &conn_ack.properties;
        let available = |flag: Option<u8>| flag != Some(0);

        Self {
            maximum_packet_size: properties.maximum_packet_size,
            subscription_identifiers_available: available(
                properties.subscription_identifiers_available,
            ),
            wildcard_subscription_available: available(properties.wildcard_subscription_available),
            shared_subscription_available: available(properties.shared_subscription_available),
            retain_available: available(properties.retain_available),
            maximum_qos: properties
                .maximum_qos
                .and_then(QoS::from_u8)
                .unwrap_or(QoS::ExactlyOnce),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Properties;

    #[test]
    fn missing_properties_mean_available() {
        let conn_ack = ConnAckPacket::default();
        assert_eq!(BrokerCapabilities::from_conn_ack(&conn_ack), BrokerCapabilities::default());
    }

    #[test]
    fn zero_flags_disable_features() {
        let conn_ack = ConnAckPacket {
            properties: Properties {
                maximum_packet_size: Some(128),
                wildcard_subscription_available: Some(0),
                shared_subscription_available: Some(1),
                maximum_qos: Some(1),
                ..Properties::default()
            },
            ..ConnAckPacket::default()
        };

        let capabilities = BrokerCapabilities::from_conn_ack(&conn_ack);
        assert_eq!(capabilities.maximum_packet_size, Some(128));
        assert!(!capabilities.wildcard_subscription_available);
        assert!(capabilities.shared_subscription_available);
        assert_eq!(capabilities.maximum_qos, QoS::AtLeastOnce);
    }
}
