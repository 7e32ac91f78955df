//! Event system for observing discovery, connection and playback.
//!
//! This module provides:
//! - [`EventEmitter`] trait for core components to emit events
//! - [`BroadcastEventBridge`] for fan-out to channel subscribers
//! - Event types for the three domains (discovery, connection, playback)
//!
//! Snapshot types carried by the events are defined in [`crate::device`]
//! and re-exported from the crate root.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::backend::PairingKind;
use crate::capability::PlayState;
use crate::device::{DeviceSnapshot, ServiceSnapshot, SessionKind};

/// Events broadcast to subscribers.
///
/// This enum categorizes all real-time events the core can emit. Each
/// category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from the discovery aggregator.
    Discovery(DiscoveryEvent),

    /// Events from per-device connection lifecycles.
    Connection(ConnectionEvent),

    /// Events from media playback sessions.
    Playback(PlaybackEvent),
}

/// Events from the discovery aggregator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiscoveryEvent {
    /// The aggregated device set changed.
    ///
    /// Carries the full current set, not a delta; a device appearing,
    /// disappearing, or changing fields all produce this event.
    DeviceListChanged {
        /// Snapshot of every currently known device.
        devices: Vec<DeviceSnapshot>,
    },
    /// A discovery backend reported a failure.
    DiscoveryFailed {
        /// Name of the failing backend.
        backend: String,
        /// Error message describing the failure.
        error: String,
    },
}

/// Events from per-device connection lifecycles.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// The device finished connecting and accepts commands.
    Connected {
        /// Snapshot of the device at the time of the transition.
        device: DeviceSnapshot,
    },
    /// The device disconnected.
    Disconnected {
        /// Snapshot of the device at the time of the transition.
        device: DeviceSnapshot,
        /// Error that triggered the disconnect, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A service requires out-of-band pairing before full control.
    PairingRequired {
        /// Snapshot of the device at the time of the transition.
        device: DeviceSnapshot,
        /// Pairing flavor the service asked for.
        pairing: PairingKind,
        /// The service that asked.
        service: ServiceSnapshot,
    },
    /// Pairing with a service failed.
    PairingFailed {
        /// Snapshot of the device at the time of the transition.
        device: DeviceSnapshot,
        /// The service that failed to pair.
        service: ServiceSnapshot,
        /// Error message describing the failure.
        error: String,
    },
    /// Pairing with a service completed.
    PairingSucceeded {
        /// Snapshot of the device at the time of the transition.
        device: DeviceSnapshot,
        /// The service that paired.
        service: ServiceSnapshot,
    },
}

/// Events from media playback sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// A browser, app, or media session was stored on a device.
    SessionStarted {
        /// Identity of the owning device.
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Core-assigned session identifier.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// What kind of session was launched.
        kind: SessionKind,
    },
    /// A session was closed or dropped by a disconnect.
    SessionEnded {
        /// Identity of the owning device.
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Core-assigned session identifier.
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// A play-state subscription reported a new state.
    PlayStateChanged {
        /// Identity of the owning device.
        #[serde(rename = "deviceId")]
        device_id: String,
        /// The mapped play state.
        state: PlayState,
    },
}

// From implementations for converting inner events to BroadcastEvent
impl From<DiscoveryEvent> for BroadcastEvent {
    fn from(event: DiscoveryEvent) -> Self {
        BroadcastEvent::Discovery(event)
    }
}

impl From<ConnectionEvent> for BroadcastEvent {
    fn from(event: ConnectionEvent) -> Self {
        BroadcastEvent::Connection(event)
    }
}

impl From<PlaybackEvent> for BroadcastEvent {
    fn from(event: PlaybackEvent) -> Self {
        BroadcastEvent::Playback(event)
    }
}
