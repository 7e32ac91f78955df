//! Aggregator configuration.
//!
//! Configuration is an explicit value handed to the aggregator at
//! construction. There is no process-global service registry; two
//! aggregators in one process can run different service sets.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Discovery service types a backend can be asked to probe for.
///
/// Tags follow the vendor service naming reported by backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Dial,
    Dlna,
    NetcastTv,
    Roku,
    WebOsTv,
    SmartView,
}

impl ServiceKind {
    /// Returns the wire tag for this service type.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Dial => "DIALService",
            Self::Dlna => "DLNAService",
            Self::NetcastTv => "NetcastTVService",
            Self::Roku => "RokuService",
            Self::WebOsTv => "WebOSTVService",
            Self::SmartView => "SmartViewService",
        }
    }

    /// Parses a wire tag into a service type.
    pub fn parse(tag: &str) -> Option<Self> {
        let kind = match tag {
            "DIALService" => Self::Dial,
            "DLNAService" => Self::Dlna,
            "NetcastTVService" => Self::NetcastTv,
            "RokuService" => Self::Roku,
            "WebOSTVService" => Self::WebOsTv,
            "SmartViewService" => Self::SmartView,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for ServiceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for ServiceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = ServiceKind;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a service tag such as \"DIALService\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ServiceKind, E> {
                ServiceKind::parse(value)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}

/// Service types enabled when a configuration does not name any.
///
/// SmartView is deliberately absent; it is opt-in.
pub const DEFAULT_SERVICE_KINDS: &[ServiceKind] = &[
    ServiceKind::Dial,
    ServiceKind::Dlna,
    ServiceKind::NetcastTv,
    ServiceKind::Roku,
    ServiceKind::WebOsTv,
];

/// Pairing behavior requested from device transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PairingLevel {
    /// Transports skip pairing prompts where the protocol allows it.
    Off,
    /// Transports request pairing for services that support it.
    #[default]
    On,
}

/// Configuration for a [`DiscoveryAggregator`](crate::discovery::DiscoveryAggregator).
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AggregatorConfig {
    /// Service types registered with each discovery backend.
    pub services: HashSet<ServiceKind>,

    /// Pairing level handed to discovery backends at start.
    pub pairing_level: PairingLevel,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl AggregatorConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.services.is_empty() {
            return Err("services must not be empty".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            services: DEFAULT_SERVICE_KINDS.iter().copied().collect(),
            pairing_level: PairingLevel::On,
            event_channel_capacity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AggregatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pairing_level, PairingLevel::On);
        assert_eq!(config.services.len(), 5);
    }

    #[test]
    fn default_services_exclude_smart_view() {
        let config = AggregatorConfig::default();
        assert!(!config.services.contains(&ServiceKind::SmartView));
        assert!(config.services.contains(&ServiceKind::Dial));
        assert!(config.services.contains(&ServiceKind::WebOsTv));
    }

    #[test]
    fn validate_rejects_empty_services_and_zero_capacity() {
        let config = AggregatorConfig {
            services: HashSet::new(),
            ..AggregatorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AggregatorConfig {
            event_channel_capacity: 0,
            ..AggregatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn service_kind_round_trips_through_its_tag() {
        for kind in [
            ServiceKind::Dial,
            ServiceKind::Dlna,
            ServiceKind::NetcastTv,
            ServiceKind::Roku,
            ServiceKind::WebOsTv,
            ServiceKind::SmartView,
        ] {
            assert_eq!(ServiceKind::parse(kind.tag()), Some(kind));
        }
        assert_eq!(ServiceKind::parse("ChromecastService"), None);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AggregatorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AggregatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.services, config.services);
        assert_eq!(back.event_channel_capacity, config.event_channel_capacity);
    }
}
