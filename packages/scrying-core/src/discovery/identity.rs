//! Device identity derivation.
//!
//! Sightings from different backends must land on the same record when
//! they describe the same physical device. The key is derived with a
//! fixed precedence: a backend-assigned stable id wins, then a service
//! endpoint reference, then the display name as a last resort. Name
//! equality alone never merges two devices that both carry stable ids.

use std::fmt;

use url::Url;

use crate::backend::{DeviceRef, RawDevice};

/// Identity of one aggregated device record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    /// Backend-assigned stable identifier, normalized.
    Id(String),
    /// Service endpoint reference for devices without a stable id.
    ServiceRef(String),
    /// Display-name fallback for sightings carrying neither.
    Name(String),
    /// Synthetic fixture tag.
    Fixture(String),
}

impl IdentityKey {
    /// Derives the identity key for a sighting.
    pub fn from_raw(raw: &RawDevice) -> Self {
        match &raw.device_ref {
            DeviceRef::Native { id } if !id.trim().is_empty() => {
                Self::Id(normalize_device_id(id))
            }
            DeviceRef::Native { .. } => {
                let name = raw
                    .friendly_name
                    .clone()
                    .or_else(|| raw.address.clone())
                    .unwrap_or_else(|| format!("{}-unnamed", raw.backend));
                Self::Name(name)
            }
            DeviceRef::Service { endpoint } => Self::ServiceRef(endpoint.clone()),
            DeviceRef::Fixture { tag } => Self::Fixture(tag.clone()),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::ServiceRef(endpoint) => write!(f, "service:{endpoint}"),
            Self::Name(name) => write!(f, "name:{name}"),
            Self::Fixture(tag) => write!(f, "fixture:{tag}"),
        }
    }
}

/// Normalizes a backend device id.
///
/// Strips the `uuid:` prefix and anything after a `::` qualifier, so
/// `uuid:abc-123::urn:dial-multiscreen-org:service:dial:1` and
/// `abc-123` land on the same key.
pub(crate) fn normalize_device_id(id: &str) -> String {
    let id = id.strip_prefix("uuid:").unwrap_or(id);
    let id = id.split("::").next().unwrap_or(id);
    id.to_string()
}

/// Extracts the host part of an endpoint or address string.
///
/// Accepts full URLs, `host:port` pairs and bare hosts. Used to
/// associate a service-ref sighting with an existing record at the same
/// address.
pub(crate) fn endpoint_host(endpoint: &str) -> Option<String> {
    if let Ok(url) = Url::parse(endpoint) {
        if let Some(host) = url.host_str() {
            return Some(host.to_string());
        }
    }
    // `host:port` parses as scheme:path above and reports no host.
    endpoint
        .split(':')
        .next()
        .map(str::to_string)
        .filter(|host| !host.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::{DeviceTransport, TransportEvent};
    use crate::error::BackendError;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct NullTransport;

    #[async_trait]
    impl DeviceTransport for NullTransport {
        async fn connect(
            &self,
            _events: mpsc::UnboundedSender<TransportEvent>,
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), BackendError> {
            Ok(())
        }

        async fn launch_browser(
            &self,
            _url: &Url,
        ) -> Result<Arc<dyn crate::backend::LaunchSessionHandle>, BackendError> {
            Err(BackendError::new("unsupported"))
        }

        async fn launch_app(
            &self,
            _app_id: &str,
            _params: Option<&serde_json::Value>,
        ) -> Result<Arc<dyn crate::backend::LaunchSessionHandle>, BackendError> {
            Err(BackendError::new("unsupported"))
        }

        async fn set_volume(&self, _volume: f32) -> Result<(), BackendError> {
            Ok(())
        }

        async fn set_mute(&self, _mute: bool) -> Result<(), BackendError> {
            Ok(())
        }

        async fn play_media(
            &self,
            _request: &crate::media::MediaRequest,
        ) -> Result<crate::backend::MediaLaunch, BackendError> {
            Err(BackendError::new("unsupported"))
        }

        async fn close_media(&self, _session_id: &str) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn native(id: &str, name: Option<&str>, address: Option<&str>) -> RawDevice {
        RawDevice {
            backend: "ssdp".to_string(),
            device_ref: DeviceRef::Native { id: id.to_string() },
            friendly_name: name.map(str::to_string),
            model_name: None,
            address: address.map(str::to_string),
            capabilities: vec![],
            services: vec![],
            transport: Arc::new(NullTransport),
        }
    }

    #[test]
    fn stable_id_wins_and_is_normalized() {
        let raw = native(
            "uuid:abc-123::urn:dial-multiscreen-org:service:dial:1",
            Some("Living Room TV"),
            None,
        );
        assert_eq!(
            IdentityKey::from_raw(&raw),
            IdentityKey::Id("abc-123".to_string())
        );
    }

    #[test]
    fn devices_sharing_a_name_keep_distinct_ids() {
        let a = IdentityKey::from_raw(&native("uuid:aaa", Some("Samsung TV"), None));
        let b = IdentityKey::from_raw(&native("uuid:bbb", Some("Samsung TV"), None));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_id_falls_back_to_name_then_address() {
        let named = native("", Some("Bedroom TV"), Some("192.168.1.9"));
        assert_eq!(
            IdentityKey::from_raw(&named),
            IdentityKey::Name("Bedroom TV".to_string())
        );

        let addressed = native("  ", None, Some("192.168.1.9"));
        assert_eq!(
            IdentityKey::from_raw(&addressed),
            IdentityKey::Name("192.168.1.9".to_string())
        );

        let bare = native("", None, None);
        assert_eq!(
            IdentityKey::from_raw(&bare),
            IdentityKey::Name("ssdp-unnamed".to_string())
        );
    }

    #[test]
    fn service_endpoint_becomes_service_ref() {
        let mut raw = native("", None, None);
        raw.device_ref = DeviceRef::Service {
            endpoint: "192.168.1.5:8009".to_string(),
        };
        assert_eq!(
            IdentityKey::from_raw(&raw),
            IdentityKey::ServiceRef("192.168.1.5:8009".to_string())
        );
    }

    #[test]
    fn display_is_prefixed_by_kind() {
        assert_eq!(
            IdentityKey::Id("abc".to_string()).to_string(),
            "id:abc"
        );
        assert_eq!(
            IdentityKey::Fixture("f1".to_string()).to_string(),
            "fixture:f1"
        );
    }

    #[test]
    fn endpoint_host_handles_urls_pairs_and_bare_hosts() {
        assert_eq!(
            endpoint_host("http://192.168.1.5:8060/dial"),
            Some("192.168.1.5".to_string())
        );
        assert_eq!(
            endpoint_host("192.168.1.5:8009"),
            Some("192.168.1.5".to_string())
        );
        assert_eq!(endpoint_host("192.168.1.5"), Some("192.168.1.5".to_string()));
        assert_eq!(endpoint_host(""), None);
    }
}
