//! Discovery aggregation across backends.
//!
//! The [`DiscoveryAggregator`] owns the set of known devices. Backends
//! push [`DiscoveryReport`]s into one channel; a single worker task
//! consumes them, so record creation, merging and removal are serialized
//! and the emitted device list is always internally consistent.
//!
//! Sightings of the same physical device from different backends are
//! merged into one record, keyed by [`IdentityKey`]. Every observable
//! change to the set emits [`DiscoveryEvent::DeviceListChanged`] with the
//! full current list.

mod identity;

pub use identity::IdentityKey;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::backend::{DeviceRef, DiscoveryBackend, DiscoveryReport, RawDevice};
use crate::config::{AggregatorConfig, PairingLevel, ServiceKind, DEFAULT_SERVICE_KINDS};
use crate::device::{DeviceHandle, DeviceSnapshot};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge, DiscoveryEvent, EventEmitter};
use crate::runtime::{TaskSpawner, TokioSpawner};
use identity::endpoint_host;

/// Aggregates device sightings from all configured backends.
///
/// Cloning is cheap; all clones share the same device set and event
/// bridge. Built through [`AggregatorBuilder`].
#[derive(Clone)]
pub struct DiscoveryAggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    config: AggregatorConfig,
    backends: Vec<Arc<dyn DiscoveryBackend>>,
    devices: DashMap<IdentityKey, DeviceHandle>,
    bridge: BroadcastEventBridge,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    running: Mutex<Option<RunningState>>,
}

struct RunningState {
    cancel: CancellationToken,
}

impl DiscoveryAggregator {
    /// Returns a builder with default configuration.
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    /// The validated configuration this aggregator was built with.
    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    /// Whether discovery is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.running.lock().is_some()
    }

    /// Starts discovery on every configured backend.
    ///
    /// Records from a previous run are dropped first. A backend that
    /// fails to start is reported through
    /// [`DiscoveryEvent::DiscoveryFailed`] without aborting the others.
    pub async fn start(&self) -> DiscoveryResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        {
            let mut running = self.inner.running.lock();
            if running.is_some() {
                return Err(DiscoveryError::AlreadyRunning);
            }
            *running = Some(RunningState {
                cancel: cancel.clone(),
            });
        }
        // Fresh scan: the previous run's records are stale.
        self.clear_devices();

        log::info!(
            "[Discovery] Starting {} backend(s)",
            self.inner.backends.len()
        );

        let worker = self.inner.clone();
        let worker_cancel = cancel;
        self.inner.spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    report = rx.recv() => {
                        match report {
                            Some(report) => AggregatorInner::process_report(&worker, report),
                            None => break,
                        }
                    }
                }
            }
        });

        let pairing = self.inner.config.pairing_level;
        let starts = self.inner.backends.iter().map(|backend| {
            let tx = tx.clone();
            async move {
                (
                    backend.name().to_string(),
                    backend.start_discovery(tx, pairing).await,
                )
            }
        });
        for (name, result) in join_all(starts).await {
            if let Err(error) = result {
                log::warn!("[Discovery] Backend {name} failed to start: {error}");
                self.inner
                    .emitter
                    .emit_discovery(DiscoveryEvent::DiscoveryFailed {
                        backend: name,
                        error: error.to_string(),
                    });
            }
        }
        Ok(())
    }

    /// Stops discovery and drops all records.
    pub async fn stop(&self) -> DiscoveryResult<()> {
        let running = self
            .inner
            .running
            .lock()
            .take()
            .ok_or(DiscoveryError::NotRunning)?;
        running.cancel.cancel();

        let stops = self
            .inner
            .backends
            .iter()
            .map(|backend| async move { (backend.name().to_string(), backend.stop_discovery().await) });
        for (name, result) in join_all(stops).await {
            if let Err(error) = result {
                log::warn!("[Discovery] Backend {name} failed to stop: {error}");
            }
        }
        self.clear_devices();
        log::info!("[Discovery] Stopped");
        Ok(())
    }

    /// Enables discovery of a service type on every backend.
    ///
    /// All backends are attempted; the first failure is returned after
    /// the fan-out completes.
    pub async fn register_service(&self, kind: ServiceKind) -> DiscoveryResult<()> {
        let mut first_error = None;
        for backend in &self.inner.backends {
            if let Err(error) = backend.register_service(kind).await {
                log::warn!(
                    "[Discovery] Backend {} failed to register {kind}: {error}",
                    backend.name()
                );
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Disables discovery of a service type on every backend.
    pub async fn unregister_service(&self, kind: ServiceKind) -> DiscoveryResult<()> {
        let mut first_error = None;
        for backend in &self.inner.backends {
            if let Err(error) = backend.unregister_service(kind).await {
                log::warn!(
                    "[Discovery] Backend {} failed to unregister {kind}: {error}",
                    backend.name()
                );
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    // ─── Device access ───────────────────────────────────────────────

    /// Handles to every currently known device.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.inner.devices.iter().map(|e| e.value().clone()).collect()
    }

    /// Looks up a device by identity key.
    pub fn device(&self, identity: &IdentityKey) -> Option<DeviceHandle> {
        self.inner.devices.get(identity).map(|e| e.value().clone())
    }

    /// Looks up a device by its rendered id (as carried in snapshots).
    pub fn device_by_id(&self, id: &str) -> Option<DeviceHandle> {
        self.inner
            .devices
            .iter()
            .find(|e| e.key().to_string() == id)
            .map(|e| e.value().clone())
    }

    /// Snapshots of every known device, in identity order.
    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        AggregatorInner::sorted_snapshots(&self.inner)
    }

    // ─── Events ──────────────────────────────────────────────────────

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.inner.bridge.subscribe()
    }

    /// Returns a new subscription wrapped as a `Stream`.
    pub fn event_stream(&self) -> BroadcastStream<BroadcastEvent> {
        self.inner.bridge.event_stream()
    }

    /// Sets an external emitter for host-app event delivery.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        self.inner.bridge.set_external_emitter(emitter);
    }

    fn clear_devices(&self) {
        for entry in self.inner.devices.iter() {
            entry.value().shutdown();
        }
        self.inner.devices.clear();
    }
}

impl AggregatorInner {
    fn process_report(inner: &Arc<Self>, report: DiscoveryReport) {
        match report {
            DiscoveryReport::Found(raw) | DiscoveryReport::Updated(raw) => {
                if Self::upsert(inner, raw) {
                    Self::emit_device_list(inner);
                }
            }
            DiscoveryReport::Lost(raw) => {
                if Self::remove(inner, &raw) {
                    Self::emit_device_list(inner);
                }
            }
            DiscoveryReport::Failed { backend, error } => {
                log::warn!("[Discovery] Backend {backend} reported failure: {error}");
                inner.emitter.emit_discovery(DiscoveryEvent::DiscoveryFailed {
                    backend,
                    error: error.to_string(),
                });
            }
        }
    }

    /// Merges a sighting into an existing record or creates a new one.
    /// Returns whether the aggregated set observably changed.
    fn upsert(inner: &Arc<Self>, raw: RawDevice) -> bool {
        let key = IdentityKey::from_raw(&raw);
        if let Some(existing_key) = Self::find_record(inner, &key, &raw) {
            let handle = inner
                .devices
                .get(&existing_key)
                .map(|e| e.value().clone());
            if let Some(handle) = handle {
                let changed = handle.apply_sighting(&raw);
                if changed {
                    log::debug!(
                        "[Discovery] Device {existing_key} updated by backend {}",
                        raw.backend
                    );
                }
                return changed;
            }
        }

        // New record. Its worker dies with the current run.
        let cancel = inner
            .running
            .lock()
            .as_ref()
            .map(|r| r.cancel.child_token());
        let Some(cancel) = cancel else {
            // Report raced a stop; drop it.
            return false;
        };
        log::debug!("[Discovery] Device {key} found by backend {}", raw.backend);
        let handle = DeviceHandle::new(
            key.clone(),
            raw,
            inner.emitter.clone(),
            &inner.spawner,
            cancel,
        );
        inner.devices.insert(key, handle);
        true
    }

    /// Removes the record whose identity matches the lost sighting.
    ///
    /// A lost report for an unknown record is ignored; association
    /// heuristics are deliberately not applied here, so one backend
    /// losing sight of a device never tears down a record founded by
    /// another backend's sighting.
    fn remove(inner: &Arc<Self>, raw: &RawDevice) -> bool {
        let key = IdentityKey::from_raw(raw);
        match inner.devices.remove(&key) {
            Some((key, handle)) => {
                handle.shutdown();
                log::debug!("[Discovery] Device {key} lost by backend {}", raw.backend);
                true
            }
            None => {
                log::trace!("[Discovery] Lost report for unknown device {key}");
                false
            }
        }
    }

    /// Resolves which existing record a sighting belongs to.
    ///
    /// Lookup order: exact identity key, then same-host association for
    /// cross-protocol sightings, then display name as a last resort.
    /// Two sightings carrying distinct stable ids are never merged, no
    /// matter what their hosts or names say.
    fn find_record(inner: &Self, key: &IdentityKey, raw: &RawDevice) -> Option<IdentityKey> {
        if inner.devices.contains_key(key) {
            return Some(key.clone());
        }

        if let Some(incoming_host) = Self::sighting_host(raw) {
            for entry in inner.devices.iter() {
                if matches!(key, IdentityKey::Id(_)) && matches!(entry.key(), IdentityKey::Id(_)) {
                    continue;
                }
                let record_host = entry
                    .value()
                    .address()
                    .as_deref()
                    .and_then(endpoint_host);
                if record_host.as_deref() == Some(incoming_host.as_str()) {
                    return Some(entry.key().clone());
                }
            }
        }

        if !matches!(key, IdentityKey::Id(_)) {
            if let Some(name) = raw.friendly_name.as_deref() {
                for entry in inner.devices.iter() {
                    if entry.value().friendly_name().as_deref() == Some(name) {
                        return Some(entry.key().clone());
                    }
                }
            }
        }
        None
    }

    fn sighting_host(raw: &RawDevice) -> Option<String> {
        if let Some(host) = raw.address.as_deref().and_then(endpoint_host) {
            return Some(host);
        }
        if let DeviceRef::Service { endpoint } = &raw.device_ref {
            return endpoint_host(endpoint);
        }
        None
    }

    fn emit_device_list(inner: &Arc<Self>) {
        inner.emitter.emit_discovery(DiscoveryEvent::DeviceListChanged {
            devices: Self::sorted_snapshots(inner),
        });
    }

    fn sorted_snapshots(inner: &Self) -> Vec<DeviceSnapshot> {
        let mut records: Vec<(IdentityKey, DeviceHandle)> = inner
            .devices
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records.into_iter().map(|(_, handle)| handle.snapshot()).collect()
    }
}

/// Builder for [`DiscoveryAggregator`].
///
/// # Example
///
/// ```ignore
/// let aggregator = DiscoveryAggregator::builder()
///     .services(&[ServiceKind::WebOsTv, ServiceKind::Roku])
///     .backend(ssdp_backend)
///     .build()?;
/// aggregator.start().await?;
/// ```
pub struct AggregatorBuilder {
    config: AggregatorConfig,
    backends: Vec<Arc<dyn DiscoveryBackend>>,
    emitter: Option<Arc<dyn EventEmitter>>,
    spawner: Option<TokioSpawner>,
}

impl AggregatorBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: AggregatorConfig::default(),
            backends: Vec::new(),
            emitter: None,
            spawner: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Selects the service types to discover.
    ///
    /// An empty selection falls back to the default table.
    pub fn services(mut self, services: &[ServiceKind]) -> Self {
        self.config.services = if services.is_empty() {
            DEFAULT_SERVICE_KINDS.iter().copied().collect()
        } else {
            services.iter().copied().collect()
        };
        self
    }

    /// Sets the pairing level handed to backends on start.
    pub fn pairing_level(mut self, level: PairingLevel) -> Self {
        self.config.pairing_level = level;
        self
    }

    /// Adds a discovery backend.
    pub fn backend(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Sets an external emitter for host-app event delivery.
    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Overrides the task spawner. Defaults to the current runtime.
    pub fn spawner(mut self, spawner: TokioSpawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Validates the configuration and assembles the aggregator.
    pub fn build(self) -> DiscoveryResult<DiscoveryAggregator> {
        self.config
            .validate()
            .map_err(DiscoveryError::Configuration)?;
        if self.backends.is_empty() {
            return Err(DiscoveryError::Configuration(
                "at least one discovery backend is required".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for backend in &self.backends {
            if !names.insert(backend.name().to_string()) {
                return Err(DiscoveryError::Configuration(format!(
                    "duplicate backend name: {}",
                    backend.name()
                )));
            }
        }

        let bridge = BroadcastEventBridge::new(self.config.event_channel_capacity);
        if let Some(emitter) = self.emitter {
            bridge.set_external_emitter(emitter);
        }
        let emitter: Arc<dyn EventEmitter> = Arc::new(bridge.clone());
        let spawner = self.spawner.unwrap_or_else(TokioSpawner::current);

        Ok(DiscoveryAggregator {
            inner: Arc::new(AggregatorInner {
                config: self.config,
                backends: self.backends,
                devices: DashMap::new(),
                bridge,
                emitter,
                spawner,
                running: Mutex::new(None),
            }),
        })
    }
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
