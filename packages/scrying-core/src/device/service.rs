//! Service-level metadata and capability queries.

use std::collections::HashSet;

use serde::Serialize;

use crate::backend::RawService;
use crate::capability::Capability;
use crate::config::ServiceKind;

/// One service endpoint of a device, as tracked by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceService {
    /// Service type of this endpoint.
    pub kind: ServiceKind,
    /// Whether the endpoint accepts connections.
    pub connectable: bool,
    /// Whether the endpoint requires out-of-band pairing.
    pub requires_pairing: bool,
    /// Capability identifiers this endpoint supports.
    pub capabilities: HashSet<Capability>,
}

impl DeviceService {
    /// True iff the identifier is literally present in the service set.
    pub fn has_capability(&self, capability: impl Into<Capability>) -> bool {
        self.capabilities.contains(&capability.into())
    }

    /// Conjunction over identifiers; an empty list is vacuously true.
    pub fn has_capabilities(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|c| self.capabilities.contains(c))
    }

    /// Serializable view with capabilities in tag order.
    pub fn snapshot(&self) -> ServiceSnapshot {
        let mut capabilities: Vec<Capability> = self.capabilities.iter().copied().collect();
        capabilities.sort_by_key(|c| c.tag());
        ServiceSnapshot {
            kind: self.kind,
            connectable: self.connectable,
            requires_pairing: self.requires_pairing,
            capabilities,
        }
    }
}

impl From<&RawService> for DeviceService {
    fn from(raw: &RawService) -> Self {
        Self {
            kind: raw.kind,
            connectable: raw.connectable,
            requires_pairing: raw.requires_pairing,
            capabilities: raw.capabilities.iter().copied().collect(),
        }
    }
}

/// Serializable view of one service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    /// Service type of this endpoint.
    pub kind: ServiceKind,
    /// Whether the endpoint accepts connections.
    pub connectable: bool,
    /// Whether the endpoint requires out-of-band pairing.
    pub requires_pairing: bool,
    /// Capability tags in sorted order.
    pub capabilities: Vec<Capability>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{MediaControlCapability, VolumeControlCapability};

    fn raw() -> RawService {
        RawService {
            kind: ServiceKind::WebOsTv,
            connectable: true,
            requires_pairing: true,
            capabilities: vec![
                Capability::VolumeControl(VolumeControlCapability::Set),
                Capability::MediaControl(MediaControlCapability::Play),
                // Duplicate collapses into the set.
                Capability::VolumeControl(VolumeControlCapability::Set),
            ],
        }
    }

    #[test]
    fn conversion_collapses_duplicate_capabilities() {
        let service = DeviceService::from(&raw());
        assert_eq!(service.capabilities.len(), 2);
        assert!(service.has_capability(VolumeControlCapability::Set));
        assert!(!service.has_capability(VolumeControlCapability::MuteSet));
    }

    #[test]
    fn has_capabilities_is_a_conjunction() {
        let service = DeviceService::from(&raw());
        assert!(service.has_capabilities(&[]));
        assert!(service.has_capabilities(&[
            Capability::VolumeControl(VolumeControlCapability::Set),
            Capability::MediaControl(MediaControlCapability::Play),
        ]));
        assert!(!service.has_capabilities(&[
            Capability::VolumeControl(VolumeControlCapability::Set),
            Capability::VolumeControl(VolumeControlCapability::MuteSet),
        ]));
    }

    #[test]
    fn snapshot_sorts_capabilities_by_tag() {
        let snapshot = DeviceService::from(&raw()).snapshot();
        let tags: Vec<&str> = snapshot.capabilities.iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["MediaControl.Play", "VolumeControl.Set"]);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let value = serde_json::to_value(DeviceService::from(&raw()).snapshot()).unwrap();
        assert_eq!(value["kind"], "WebOSTVService");
        assert_eq!(value["requiresPairing"], true);
        assert!(value["capabilities"].is_array());
    }
}
