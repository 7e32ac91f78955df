//! Scrying Core - smart-display discovery and control.
//!
//! This crate discovers smart displays and TVs on the local network
//! through pluggable discovery backends, merges their sightings into one
//! aggregated device set, and exposes a capability-gated command surface
//! (browser launch, app launch, volume and mute, media playback) that is
//! uniform across heterogeneous device protocols.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Event system for observing discovery, connection and playback
//! - [`config`]: Aggregator configuration and service type selection
//! - [`discovery`]: Sighting aggregation, identity derivation, device lookup
//! - [`device`]: Per-device connection lifecycle, sessions and gated commands
//! - [`media`]: Media launch requests and the fluent builder
//! - [`capability`]: Capability identifier registry
//! - [`backend`]: Trait seams for discovery and transport backends
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! Protocol implementations are decoupled from the core through traits:
//!
//! - [`DiscoveryBackend`](backend::DiscoveryBackend): Probing the network
//! - [`DeviceTransport`](backend::DeviceTransport): Carrying device commands
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//!
//! The core never speaks a wire protocol itself; tests drive it entirely
//! through mock backends and transports.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod capability;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod media;
pub mod runtime;

// Re-export commonly used types at the crate root
pub use backend::{
    DeviceRef, DeviceTransport, DiscoveryBackend, DiscoveryReport, LaunchSessionHandle,
    MediaControlHandle, MediaLaunch, PairingKind, RawDevice, RawService, TransportEvent,
};
pub use capability::{
    Capability, CapabilityCategory, LauncherCapability, MediaControlCapability, PlayState,
    VolumeControlCapability,
};
pub use config::{AggregatorConfig, PairingLevel, ServiceKind, DEFAULT_SERVICE_KINDS};
pub use device::{
    ConnectionState, DeviceHandle, DeviceService, DeviceSnapshot, MediaSession, ServiceSnapshot,
    SessionKind, SessionSnapshot,
};
pub use discovery::{AggregatorBuilder, DiscoveryAggregator, IdentityKey};
pub use error::{
    BackendError, CommandError, CommandResult, DiscoveryError, DiscoveryResult, ErrorCode,
};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, ConnectionEvent, DiscoveryEvent, EventEmitter,
    LoggingEventEmitter, NoopEventEmitter, PlaybackEvent,
};
pub use media::{MediaLaunchBuilder, MediaRequest};
pub use runtime::{TaskSpawner, TokioSpawner};
