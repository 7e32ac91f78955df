//! Trait seams for discovery and transport backends.
//!
//! The core never speaks a wire protocol itself. Discovery backends probe
//! the network and push [`DiscoveryReport`]s into the aggregator; device
//! transports carry commands and push [`TransportEvent`]s into the owning
//! device's serialized event path. Implementations live outside this
//! crate; tests provide mocks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

use crate::capability::Capability;
use crate::config::{PairingLevel, ServiceKind};
use crate::error::BackendError;
use crate::media::MediaRequest;

/// Reference to the physical entity behind a sighting.
///
/// Exactly one shape is populated; a sighting is either a native-protocol
/// device with a backend-assigned id, an alternate-protocol service
/// endpoint, or a synthetic fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeviceRef {
    /// Device reachable through its primary protocol.
    Native {
        /// Stable identifier assigned by the reporting backend.
        id: String,
    },
    /// Device known only through an alternate-protocol service endpoint.
    Service {
        /// Endpoint reference, typically `host:port` or a URL.
        endpoint: String,
    },
    /// Synthetic device used by tests and demos.
    Fixture {
        /// Caller-chosen tag identifying the fixture.
        tag: String,
    },
}

/// One transport/service endpoint reported in a sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawService {
    /// Service type of this endpoint.
    pub kind: ServiceKind,
    /// Whether the endpoint accepts connections.
    pub connectable: bool,
    /// Whether the endpoint requires out-of-band pairing.
    pub requires_pairing: bool,
    /// Capability identifiers this endpoint supports.
    pub capabilities: Vec<Capability>,
}

/// A device sighting as reported by one discovery backend.
///
/// Sightings are merged by the aggregator; identity derivation and
/// cross-backend reconciliation live in [`crate::discovery`].
#[derive(Clone)]
pub struct RawDevice {
    /// Name of the backend that produced the sighting.
    pub backend: String,
    /// Reference to the underlying entity.
    pub device_ref: DeviceRef,
    /// Friendly name, when the backend resolved one.
    pub friendly_name: Option<String>,
    /// Model name, when the backend resolved one.
    pub model_name: Option<String>,
    /// Network address, when the backend resolved one.
    pub address: Option<String>,
    /// Device-level capability identifiers.
    pub capabilities: Vec<Capability>,
    /// Service endpoints in backend-reported order.
    pub services: Vec<RawService>,
    /// Transport that carries commands once the device is connected.
    pub transport: Arc<dyn DeviceTransport>,
}

impl RawDevice {
    /// Builds a synthetic sighting for tests and demos.
    pub fn fixture(
        tag: impl Into<String>,
        name: impl Into<String>,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        Self {
            backend: "fixture".to_string(),
            device_ref: DeviceRef::Fixture { tag: tag.into() },
            friendly_name: Some(name.into()),
            model_name: None,
            address: None,
            capabilities: Vec::new(),
            services: Vec::new(),
            transport,
        }
    }
}

impl fmt::Debug for RawDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDevice")
            .field("backend", &self.backend)
            .field("device_ref", &self.device_ref)
            .field("friendly_name", &self.friendly_name)
            .field("model_name", &self.model_name)
            .field("address", &self.address)
            .field("capabilities", &self.capabilities)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Raw sighting events flowing from backends into the aggregator.
#[derive(Debug, Clone)]
pub enum DiscoveryReport {
    /// A device was sighted for the first time by this backend.
    Found(RawDevice),
    /// A previously sighted device reported changed fields.
    Updated(RawDevice),
    /// A previously sighted device disappeared.
    Lost(RawDevice),
    /// The backend itself failed; no device set mutation implied.
    Failed {
        /// Name of the failing backend.
        backend: String,
        /// The failure it reported.
        error: BackendError,
    },
}

/// Pairing flavor requested by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PairingKind {
    /// Confirmation prompt on the device screen.
    FirstScreen,
    /// PIN code entry.
    PinCode,
    /// Device chooses between prompt and PIN.
    Mixed,
    /// Backend reported a code outside the known set.
    Unknown,
}

impl PairingKind {
    /// Maps a backend pairing-type code to a pairing kind.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::FirstScreen,
            2 => Self::PinCode,
            3 => Self::Mixed,
            _ => Self::Unknown,
        }
    }
}

/// Connection lifecycle events pushed by a device transport.
///
/// Transports may fire these from arbitrary tasks; the owning device
/// consumes them on a single serialized path, so ordering between
/// pairing and disconnect events is deterministic per device.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport finished connecting and accepts commands.
    Ready,
    /// The transport disconnected, with the triggering error when there
    /// was one.
    Disconnected(Option<BackendError>),
    /// A service requires out-of-band pairing before full control.
    PairingRequired {
        /// Pairing flavor the service asked for.
        kind: PairingKind,
        /// The service that asked.
        service: RawService,
    },
    /// Pairing with a service failed.
    PairingFailed {
        /// The service that failed to pair.
        service: RawService,
        /// The failure it reported.
        error: BackendError,
    },
    /// Pairing with a service completed.
    PairingSucceeded {
        /// The service that paired.
        service: RawService,
    },
}

/// Handles returned by a successful media launch.
#[derive(Clone)]
pub struct MediaLaunch {
    /// Closeable session handle.
    pub session: Arc<dyn LaunchSessionHandle>,
    /// Transport control scoped to this playback.
    pub media_control: Arc<dyn MediaControlHandle>,
}

/// Discovery backend collaborator.
///
/// Implementations probe the network with a transport-specific protocol
/// (SSDP, mDNS, vendor discovery) and report sightings through the channel
/// handed to [`start_discovery`](DiscoveryBackend::start_discovery).
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Short backend name used in logs and sighting attribution.
    fn name(&self) -> &str;

    /// Starts probing. Sightings flow through `reports` until stopped.
    ///
    /// # Arguments
    /// * `reports` - Channel the backend pushes sightings into
    /// * `pairing` - Pairing level transports created by this backend apply
    async fn start_discovery(
        &self,
        reports: mpsc::UnboundedSender<DiscoveryReport>,
        pairing: PairingLevel,
    ) -> Result<(), BackendError>;

    /// Stops probing and releases protocol resources.
    async fn stop_discovery(&self) -> Result<(), BackendError>;

    /// Enables discovery of the given service type.
    async fn register_service(&self, kind: ServiceKind) -> Result<(), BackendError>;

    /// Disables discovery of the given service type.
    async fn unregister_service(&self, kind: ServiceKind) -> Result<(), BackendError>;
}

/// Device transport collaborator, one per discovered device.
///
/// Command entry points resolve asynchronously with success or a
/// [`BackendError`]; lifecycle changes arrive through the event channel
/// handed to [`connect`](DeviceTransport::connect).
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Opens the control connection. Lifecycle events flow through
    /// `events` until the transport disconnects.
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), BackendError>;

    /// Closes the control connection.
    ///
    /// Completion is reported through the event channel as
    /// [`TransportEvent::Disconnected`], not through this return value.
    async fn disconnect(&self) -> Result<(), BackendError>;

    /// Opens the given URL in the device browser.
    async fn launch_browser(&self, url: &Url) -> Result<Arc<dyn LaunchSessionHandle>, BackendError>;

    /// Launches an application, optionally passing launch parameters.
    async fn launch_app(
        &self,
        app_id: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn LaunchSessionHandle>, BackendError>;

    /// Sets the device volume (0.0 - 1.0).
    async fn set_volume(&self, volume: f32) -> Result<(), BackendError>;

    /// Sets the device mute state.
    async fn set_mute(&self, mute: bool) -> Result<(), BackendError>;

    /// Starts media playback for the given request.
    async fn play_media(&self, request: &MediaRequest) -> Result<MediaLaunch, BackendError>;

    /// Closes a media session previously returned by
    /// [`play_media`](DeviceTransport::play_media), by session id.
    async fn close_media(&self, session_id: &str) -> Result<(), BackendError>;
}

/// Closeable handle for one launched browser/app/media session.
#[async_trait]
pub trait LaunchSessionHandle: Send + Sync {
    /// Backend-assigned session identifier.
    fn id(&self) -> &str;

    /// Closes the session on the device.
    async fn close(&self) -> Result<(), BackendError>;
}

/// Transport control scoped to one active media playback.
#[async_trait]
pub trait MediaControlHandle: Send + Sync {
    /// Resumes playback.
    async fn play(&self) -> Result<(), BackendError>;

    /// Pauses playback.
    async fn pause(&self) -> Result<(), BackendError>;

    /// Seeks to the given position.
    async fn seek(&self, position: Duration) -> Result<(), BackendError>;

    /// Subscribes to play-state changes.
    ///
    /// Raw backend state tags flow through `states`; the session layer
    /// maps them to [`PlayState`](crate::capability::PlayState) values
    /// before callers see them.
    async fn subscribe_play_state(
        &self,
        states: mpsc::UnboundedSender<String>,
    ) -> Result<(), BackendError>;
}
