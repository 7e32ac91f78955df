//! Event emitter abstraction for decoupling core components from transport.
//!
//! The aggregator and device handles depend on the [`EventEmitter`] trait
//! rather than concrete broadcast channels, enabling testing and alternative
//! delivery implementations.

use super::{ConnectionEvent, DiscoveryEvent, PlaybackEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Core components use this trait to emit events, decoupling them from the
/// specifics of how events are delivered to consumers (broadcast channel,
/// host-app callback, etc.).
///
/// # Example
///
/// ```ignore
/// struct MyComponent {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyComponent {
///     fn do_something(&self) {
///         self.emitter.emit_connection(ConnectionEvent::Connected { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a discovery event (device list changes, backend failures).
    fn emit_discovery(&self, event: DiscoveryEvent);

    /// Emits a connection lifecycle event.
    fn emit_connection(&self, event: ConnectionEvent);

    /// Emits a playback session event.
    fn emit_playback(&self, event: PlaybackEvent);
}

/// No-op emitter for embedding without a host callback.
///
/// Events are silently discarded. Consumers that only read the broadcast
/// channel use this emitter; the channel is fed independently by the
/// event bridge.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_discovery(&self, _event: DiscoveryEvent) {
        // No-op: consumers subscribe to the broadcast channel instead
    }

    fn emit_connection(&self, _event: ConnectionEvent) {
        // No-op
    }

    fn emit_playback(&self, _event: PlaybackEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level. Useful for debugging event flow
/// or in development environments.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_discovery(&self, event: DiscoveryEvent) {
        tracing::debug!(?event, "discovery_event");
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }
}
