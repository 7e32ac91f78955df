//! Device handles and the per-device event worker.
//!
//! Each discovered device gets one [`DeviceHandle`]: a cheap-clone `Arc`
//! wrapper over the device record. The handle owns a worker task that
//! consumes transport events on a single serialized path, so state
//! transitions, session teardown and event emission happen in arrival
//! order regardless of which task the transport fired from.

mod connection;
mod gate;
mod service;
mod session;

pub use connection::ConnectionState;
pub use service::{DeviceService, ServiceSnapshot};
pub use session::{MediaSession, SessionKind, SessionSnapshot};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backend::{DeviceRef, DeviceTransport, MediaControlHandle, RawDevice, TransportEvent};
use crate::capability::{Capability, LauncherCapability, PlayState};
use crate::device::connection::ConnectionMachine;
use crate::device::gate::Command;
use crate::device::session::SessionSlot;
use crate::discovery::IdentityKey;
use crate::error::{CommandError, CommandResult};
use crate::events::{ConnectionEvent, EventEmitter, PlaybackEvent};
use crate::media::{MediaLaunchBuilder, MediaRequest};
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Handle to one discovered device.
///
/// Cloning is cheap; all clones observe the same state. Handles stay
/// valid after the device disappears from discovery, but commands on a
/// lost device fail with [`CommandError::NotConnected`] once its
/// transport drops.
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<DeviceInner>,
}

#[derive(Debug, Clone, Default)]
struct DeviceInfo {
    friendly_name: Option<String>,
    model_name: Option<String>,
    address: Option<String>,
}

struct DeviceInner {
    identity: IdentityKey,
    device_ref: DeviceRef,
    info: RwLock<DeviceInfo>,
    capabilities: RwLock<HashSet<Capability>>,
    services: RwLock<Vec<DeviceService>>,
    state: Mutex<ConnectionMachine>,
    session: SessionSlot,
    transport: RwLock<Arc<dyn DeviceTransport>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    cancel: CancellationToken,
}

impl DeviceHandle {
    /// Wraps a sighting into a live handle and spawns its event worker.
    pub(crate) fn new(
        identity: IdentityKey,
        raw: RawDevice,
        emitter: Arc<dyn EventEmitter>,
        spawner: &TokioSpawner,
        cancel: CancellationToken,
    ) -> Self {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(DeviceInner {
            identity,
            device_ref: raw.device_ref.clone(),
            info: RwLock::new(DeviceInfo {
                friendly_name: raw.friendly_name.clone(),
                model_name: raw.model_name.clone(),
                address: raw.address.clone(),
            }),
            capabilities: RwLock::new(raw.capabilities.iter().copied().collect()),
            services: RwLock::new(raw.services.iter().map(DeviceService::from).collect()),
            state: Mutex::new(ConnectionMachine::new()),
            session: SessionSlot::default(),
            transport: RwLock::new(raw.transport),
            events_tx,
            emitter,
            spawner: spawner.clone(),
            cancel,
        });

        let worker = inner.clone();
        spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = worker.cancel.cancelled() => {
                        log::debug!("[Device] {} event worker stopped", worker.identity);
                        break;
                    }
                    event = events_rx.recv() => {
                        match event {
                            Some(event) => DeviceInner::process_transport_event(&worker, event),
                            None => break,
                        }
                    }
                }
            }
        });

        Self { inner }
    }

    // ─── Identity & metadata ─────────────────────────────────────────

    /// Stable identity key of this device.
    pub fn identity(&self) -> &IdentityKey {
        &self.inner.identity
    }

    /// Identity rendered as the string carried in snapshots and events.
    pub fn id(&self) -> String {
        self.inner.identity.to_string()
    }

    /// Reference to the underlying entity.
    pub fn device_ref(&self) -> &DeviceRef {
        &self.inner.device_ref
    }

    /// Friendly name from the most recent sighting.
    pub fn friendly_name(&self) -> Option<String> {
        self.inner.info.read().friendly_name.clone()
    }

    /// Model name from the most recent sighting.
    pub fn model_name(&self) -> Option<String> {
        self.inner.info.read().model_name.clone()
    }

    /// Network address from the most recent sighting.
    pub fn address(&self) -> Option<String> {
        self.inner.info.read().address.clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().state()
    }

    /// Service endpoints from the most recent sighting.
    pub fn services(&self) -> Vec<DeviceService> {
        self.inner.services.read().clone()
    }

    /// The active session, if any.
    pub fn active_session(&self) -> Option<MediaSession> {
        self.inner.session.get()
    }

    /// Serializable view of the device at this instant.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.inner.snapshot()
    }

    // ─── Capability queries ──────────────────────────────────────────

    /// True iff the identifier is literally present in the union of
    /// device-level and service-level capability sets.
    pub fn has_capability(&self, capability: impl Into<Capability>) -> bool {
        self.inner.capability_union().contains(&capability.into())
    }

    /// Conjunction over identifiers; an empty list is vacuously true.
    pub fn has_capabilities(&self, capabilities: &[Capability]) -> bool {
        let union = self.inner.capability_union();
        capabilities.iter().all(|c| union.contains(c))
    }

    // ─── Connection lifecycle ────────────────────────────────────────

    /// Starts a connection attempt.
    ///
    /// A no-op when an attempt is already in flight or the device is
    /// already connected. On transport failure the device lands in
    /// `Disconnected` through the normal event path and the error is
    /// also returned to the caller.
    pub async fn connect(&self) -> CommandResult<()> {
        let Some((from, to)) = self.inner.state.lock().begin_connect() else {
            log::debug!(
                "[Device] {} connect ignored in state {:?}",
                self.inner.identity,
                self.state()
            );
            return Ok(());
        };
        log::debug!(
            "[Device] {} state {:?} -> {:?}",
            self.inner.identity,
            from,
            to
        );

        let transport = self.transport();
        if let Err(error) = transport.connect(self.inner.events_tx.clone()).await {
            // Route teardown through the worker so it stays on one path.
            let _ = self
                .inner
                .events_tx
                .send(TransportEvent::Disconnected(Some(error.clone())));
            return Err(error.into());
        }
        Ok(())
    }

    /// Asks the transport to disconnect.
    ///
    /// The state edge happens when the transport confirms through its
    /// event channel, not on return of this call.
    pub async fn disconnect(&self) -> CommandResult<()> {
        let transport = self.transport();
        transport.disconnect().await.map_err(CommandError::from)
    }

    // ─── Gated commands ──────────────────────────────────────────────

    /// Opens a URL in the device browser.
    ///
    /// The returned session is retained on the device only when it can
    /// be closed remotely (`Launcher.App.Close`); it is handed to the
    /// caller either way.
    pub async fn open_browser(&self, url: &str) -> CommandResult<MediaSession> {
        let url = Url::parse(url)
            .map_err(|e| CommandError::InvalidArgument(format!("invalid URL: {e}")))?;
        self.guard(Command::OpenBrowser)?;
        let handle = self.transport().launch_browser(&url).await?;
        let session = MediaSession::new(SessionKind::Browser, handle);
        let retain = self.has_capability(LauncherCapability::AppClose);
        self.store_after_launch(session, retain)
    }

    /// Launches an application, optionally with launch parameters.
    pub async fn launch_app(
        &self,
        app_id: &str,
        params: Option<serde_json::Value>,
    ) -> CommandResult<MediaSession> {
        if app_id.trim().is_empty() {
            return Err(CommandError::InvalidArgument(
                "app id is required".to_string(),
            ));
        }
        let command = if params.is_some() {
            Command::LaunchAppWithParams
        } else {
            Command::LaunchApp
        };
        self.guard(command)?;
        let handle = self.transport().launch_app(app_id, params.as_ref()).await?;
        let session = MediaSession::new(SessionKind::App, handle);
        self.store_after_launch(session, true)
    }

    /// Starts media playback for a validated request.
    ///
    /// Usually reached through [`DeviceHandle::media_builder`].
    pub async fn play_media(&self, request: &MediaRequest) -> CommandResult<MediaSession> {
        self.guard(Command::PlayMedia)?;
        let launch = self.transport().play_media(request).await?;
        let session = MediaSession::with_media_control(launch.session, launch.media_control);
        self.store_after_launch(session, true)
    }

    /// Returns a fluent builder for launching media on this device.
    pub fn media_builder(&self) -> MediaLaunchBuilder {
        MediaLaunchBuilder::new(self.clone())
    }

    /// Sets the device volume (0.0 - 1.0).
    pub async fn set_volume(&self, volume: f32) -> CommandResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(CommandError::InvalidArgument(format!(
                "volume {volume} outside 0.0..=1.0"
            )));
        }
        self.guard(Command::SetVolume)?;
        self.transport()
            .set_volume(volume)
            .await
            .map_err(CommandError::from)
    }

    /// Sets the device mute state.
    pub async fn set_mute(&self, mute: bool) -> CommandResult<()> {
        self.guard(Command::SetMute)?;
        self.transport()
            .set_mute(mute)
            .await
            .map_err(CommandError::from)
    }

    /// Resumes playback of the active media session.
    pub async fn play(&self) -> CommandResult<()> {
        self.guard(Command::Play)?;
        let control = self.media_control()?;
        control.play().await.map_err(CommandError::from)
    }

    /// Pauses playback of the active media session.
    pub async fn pause(&self) -> CommandResult<()> {
        self.guard(Command::Pause)?;
        let control = self.media_control()?;
        control.pause().await.map_err(CommandError::from)
    }

    /// Seeks the active media session to the given position.
    pub async fn seek(&self, position: Duration) -> CommandResult<()> {
        self.guard(Command::Seek)?;
        let control = self.media_control()?;
        control.seek(position).await.map_err(CommandError::from)
    }

    /// Subscribes to play-state changes of the active media session.
    ///
    /// Raw backend tags are mapped through [`PlayState::from_raw`]
    /// before delivery; each change is also emitted as
    /// [`PlaybackEvent::PlayStateChanged`].
    pub async fn subscribe_play_state(
        &self,
    ) -> CommandResult<mpsc::UnboundedReceiver<PlayState>> {
        self.guard(Command::SubscribePlayState)?;
        let control = self.media_control()?;
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<String>();
        control.subscribe_play_state(raw_tx).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = self.inner.clone();
        self.inner.spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = worker.cancel.cancelled() => break,
                    raw = raw_rx.recv() => {
                        let Some(raw) = raw else { break };
                        let state = PlayState::from_raw(&raw);
                        worker.emitter.emit_playback(PlaybackEvent::PlayStateChanged {
                            device_id: worker.identity.to_string(),
                            state,
                        });
                        if tx.send(state).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    // ─── Session closes ──────────────────────────────────────────────

    /// Closes the active browser session.
    pub async fn close_browser(&self) -> CommandResult<()> {
        self.close_matching(Some(SessionKind::Browser)).await
    }

    /// Closes the active app session.
    pub async fn close_app(&self) -> CommandResult<()> {
        self.close_matching(Some(SessionKind::App)).await
    }

    /// Closes the active media session.
    pub async fn close_media_player(&self) -> CommandResult<()> {
        self.close_matching(Some(SessionKind::Media)).await
    }

    /// Closes the active session regardless of kind.
    pub async fn close_session(&self) -> CommandResult<()> {
        self.close_matching(None).await
    }

    // ─── Internals ───────────────────────────────────────────────────

    /// Drops the event worker and any active session. Called when the
    /// device leaves the aggregated set.
    pub(crate) fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.session.take();
    }

    /// Merges a fresh sighting into this record.
    ///
    /// Absent optional fields and empty capability/service lists keep
    /// the previous values. Returns whether anything observable changed.
    pub(crate) fn apply_sighting(&self, raw: &RawDevice) -> bool {
        let mut changed = false;
        {
            let mut info = self.inner.info.write();
            if raw.friendly_name.is_some() && raw.friendly_name != info.friendly_name {
                info.friendly_name = raw.friendly_name.clone();
                changed = true;
            }
            if raw.model_name.is_some() && raw.model_name != info.model_name {
                info.model_name = raw.model_name.clone();
                changed = true;
            }
            if raw.address.is_some() && raw.address != info.address {
                info.address = raw.address.clone();
                changed = true;
            }
        }
        if !raw.capabilities.is_empty() {
            let next: HashSet<Capability> = raw.capabilities.iter().copied().collect();
            let mut capabilities = self.inner.capabilities.write();
            if *capabilities != next {
                *capabilities = next;
                changed = true;
            }
        }
        if !raw.services.is_empty() {
            let next: Vec<DeviceService> = raw.services.iter().map(DeviceService::from).collect();
            let mut services = self.inner.services.write();
            if *services != next {
                *services = next;
                changed = true;
            }
        }
        // Swap the transport only while no connection could be using it.
        let settled = matches!(
            self.state(),
            ConnectionState::Idle | ConnectionState::Disconnected | ConnectionState::Failed
        );
        if settled {
            *self.inner.transport.write() = raw.transport.clone();
        }
        changed
    }

    fn guard(&self, command: Command) -> CommandResult<()> {
        let state = self.inner.state.lock().state();
        gate::check(state, &self.inner.capability_union(), command)
    }

    fn transport(&self) -> Arc<dyn DeviceTransport> {
        self.inner.transport.read().clone()
    }

    fn media_control(&self) -> CommandResult<Arc<dyn MediaControlHandle>> {
        self.inner
            .session
            .get()
            .and_then(|s| s.media_control().cloned())
            .ok_or(CommandError::NoActiveSession)
    }

    /// Finishes a launch that resolved after the transport call.
    ///
    /// The connection may have dropped while the launch was in flight;
    /// in that case the result is discarded instead of resurrecting a
    /// session on a disconnected device.
    fn store_after_launch(
        &self,
        session: MediaSession,
        retain: bool,
    ) -> CommandResult<MediaSession> {
        {
            let machine = self.inner.state.lock();
            if machine.state() != ConnectionState::Connected {
                return Err(CommandError::NotConnected);
            }
            if retain {
                self.inner.session.store(session.clone());
            }
        }
        if retain {
            self.inner.emitter.emit_playback(PlaybackEvent::SessionStarted {
                device_id: self.inner.identity.to_string(),
                session_id: session.id().to_string(),
                kind: session.kind(),
            });
        }
        Ok(session)
    }

    async fn close_matching(&self, kind: Option<SessionKind>) -> CommandResult<()> {
        let session = self
            .inner
            .session
            .get()
            .filter(|s| kind.map_or(true, |k| s.kind() == k))
            .ok_or(CommandError::NoActiveSession)?;
        match session.kind() {
            SessionKind::Media => {
                self.transport()
                    .close_media(session.session_handle().id())
                    .await?
            }
            SessionKind::Browser | SessionKind::App => session.session_handle().close().await?,
        }
        // Only drop the slot once the backend confirmed the close.
        if self.inner.session.remove(session.id()).is_some() {
            self.inner.emitter.emit_playback(PlaybackEvent::SessionEnded {
                device_id: self.inner.identity.to_string(),
                session_id: session.id().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("identity", &self.inner.identity)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DeviceInner {
    /// Union of device-level and service-level capability sets.
    fn capability_union(&self) -> HashSet<Capability> {
        let mut union = self.capabilities.read().clone();
        for service in self.services.read().iter() {
            union.extend(service.capabilities.iter().copied());
        }
        union
    }

    fn snapshot(&self) -> DeviceSnapshot {
        let info = self.info.read().clone();
        let mut capabilities: Vec<Capability> = self.capability_union().into_iter().collect();
        capabilities.sort_by_key(|c| c.tag());
        let services: Vec<ServiceSnapshot> =
            self.services.read().iter().map(DeviceService::snapshot).collect();
        DeviceSnapshot {
            id: self.identity.to_string(),
            device_ref: self.device_ref.clone(),
            friendly_name: info.friendly_name,
            model_name: info.model_name,
            address: info.address,
            state: self.state.lock().state(),
            capabilities,
            services,
            session: self.session.get().map(|s| s.snapshot()),
        }
    }

    /// Applies one transport event: state transition, session teardown
    /// and event emission, in that order.
    fn process_transport_event(inner: &Arc<Self>, event: TransportEvent) {
        let (transition, ended_session) = {
            let mut machine = inner.state.lock();
            let transition = machine.apply(&event);
            // Teardown happens under the same lock hold as the edge, so
            // a launch racing the disconnect cannot slip a session in.
            let ended = match transition {
                Some((_, ConnectionState::Disconnected)) => inner.session.take(),
                _ => None,
            };
            (transition, ended)
        };

        let Some((from, to)) = transition else {
            log::trace!(
                "[Device] {} ignored transport event {:?}",
                inner.identity,
                event
            );
            return;
        };
        log::debug!("[Device] {} state {:?} -> {:?}", inner.identity, from, to);

        // Snapshots take the state lock; build them only after release.
        match event {
            TransportEvent::Ready => {
                inner.emitter.emit_connection(ConnectionEvent::Connected {
                    device: inner.snapshot(),
                });
            }
            TransportEvent::Disconnected(error) => {
                inner.emitter.emit_connection(ConnectionEvent::Disconnected {
                    device: inner.snapshot(),
                    error: error.map(|e| e.to_string()),
                });
                if let Some(session) = ended_session {
                    inner.emitter.emit_playback(PlaybackEvent::SessionEnded {
                        device_id: inner.identity.to_string(),
                        session_id: session.id().to_string(),
                    });
                }
            }
            TransportEvent::PairingRequired { kind, service } => {
                inner
                    .emitter
                    .emit_connection(ConnectionEvent::PairingRequired {
                        device: inner.snapshot(),
                        pairing: kind,
                        service: DeviceService::from(&service).snapshot(),
                    });
            }
            TransportEvent::PairingFailed { service, error } => {
                inner.emitter.emit_connection(ConnectionEvent::PairingFailed {
                    device: inner.snapshot(),
                    service: DeviceService::from(&service).snapshot(),
                    error: error.to_string(),
                });
            }
            TransportEvent::PairingSucceeded { service } => {
                inner
                    .emitter
                    .emit_connection(ConnectionEvent::PairingSucceeded {
                        device: inner.snapshot(),
                        service: DeviceService::from(&service).snapshot(),
                    });
                inner.emitter.emit_connection(ConnectionEvent::Connected {
                    device: inner.snapshot(),
                });
            }
        }
    }
}

/// Serializable view of one device at an instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Identity key rendered as a string.
    pub id: String,
    /// Reference to the underlying entity.
    pub device_ref: DeviceRef,
    /// Friendly name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    /// Model name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Network address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Connection state at snapshot time.
    pub state: ConnectionState,
    /// Capability union in tag order.
    pub capabilities: Vec<Capability>,
    /// Service endpoints.
    pub services: Vec<ServiceSnapshot>,
    /// The active session, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    use crate::backend::{
        LaunchSessionHandle, MediaLaunch, PairingKind, RawService,
    };
    use crate::capability::{MediaControlCapability, VolumeControlCapability};
    use crate::config::ServiceKind;
    use crate::error::BackendError;
    use crate::events::DiscoveryEvent;

    // ─── Mocks ───────────────────────────────────────────────────────

    #[derive(Clone, Copy, PartialEq)]
    enum ConnectBehavior {
        /// Send `Ready` as soon as the connection opens.
        Ready,
        /// Ask for pairing instead of completing.
        PairingRequired,
        /// Open the channel but send nothing.
        Silent,
    }

    struct MockSessionHandle {
        id: String,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl LaunchSessionHandle for MockSessionHandle {
        fn id(&self) -> &str {
            &self.id
        }

        async fn close(&self) -> Result<(), BackendError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockMediaControl {
        plays: AtomicUsize,
        pauses: AtomicUsize,
        seeks: AtomicUsize,
        states: parking_lot::Mutex<Option<mpsc::UnboundedSender<String>>>,
    }

    #[async_trait]
    impl MediaControlHandle for MockMediaControl {
        async fn play(&self) -> Result<(), BackendError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn pause(&self) -> Result<(), BackendError> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn seek(&self, _position: Duration) -> Result<(), BackendError> {
            self.seeks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe_play_state(
            &self,
            states: mpsc::UnboundedSender<String>,
        ) -> Result<(), BackendError> {
            *self.states.lock() = Some(states);
            Ok(())
        }
    }

    struct MockTransport {
        connects: AtomicUsize,
        volume_calls: AtomicUsize,
        mute_calls: AtomicUsize,
        browser_launches: AtomicUsize,
        media_closes: AtomicUsize,
        behavior: parking_lot::Mutex<ConnectBehavior>,
        fail_connect: std::sync::atomic::AtomicBool,
        launch_gate: parking_lot::Mutex<Option<Arc<Notify>>>,
        events: parking_lot::Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
        media_control: Arc<MockMediaControl>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                volume_calls: AtomicUsize::new(0),
                mute_calls: AtomicUsize::new(0),
                browser_launches: AtomicUsize::new(0),
                media_closes: AtomicUsize::new(0),
                behavior: parking_lot::Mutex::new(ConnectBehavior::Ready),
                fail_connect: std::sync::atomic::AtomicBool::new(false),
                launch_gate: parking_lot::Mutex::new(None),
                events: parking_lot::Mutex::new(None),
                media_control: Arc::new(MockMediaControl::default()),
            })
        }

        fn set_behavior(&self, behavior: ConnectBehavior) {
            *self.behavior.lock() = behavior;
        }

        fn send(&self, event: TransportEvent) {
            self.events
                .lock()
                .as_ref()
                .expect("transport not connected")
                .send(event)
                .unwrap();
        }

        fn pairing_service() -> RawService {
            RawService {
                kind: ServiceKind::WebOsTv,
                connectable: true,
                requires_pairing: true,
                capabilities: vec![],
            }
        }
    }

    #[async_trait]
    impl DeviceTransport for MockTransport {
        async fn connect(
            &self,
            events: mpsc::UnboundedSender<TransportEvent>,
        ) -> Result<(), BackendError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(BackendError::with_code(503, "connection refused"));
            }
            let behavior = *self.behavior.lock();
            *self.events.lock() = Some(events.clone());
            match behavior {
                ConnectBehavior::Ready => {
                    events.send(TransportEvent::Ready).unwrap();
                }
                ConnectBehavior::PairingRequired => {
                    events
                        .send(TransportEvent::PairingRequired {
                            kind: PairingKind::PinCode,
                            service: Self::pairing_service(),
                        })
                        .unwrap();
                }
                ConnectBehavior::Silent => {}
            }
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), BackendError> {
            self.send(TransportEvent::Disconnected(None));
            Ok(())
        }

        async fn launch_browser(
            &self,
            _url: &Url,
        ) -> Result<Arc<dyn LaunchSessionHandle>, BackendError> {
            self.browser_launches.fetch_add(1, Ordering::SeqCst);
            let gate = self.launch_gate.lock().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(Arc::new(MockSessionHandle {
                id: "backend-browser-1".to_string(),
                closes: AtomicUsize::new(0),
            }))
        }

        async fn launch_app(
            &self,
            app_id: &str,
            _params: Option<&serde_json::Value>,
        ) -> Result<Arc<dyn LaunchSessionHandle>, BackendError> {
            Ok(Arc::new(MockSessionHandle {
                id: format!("backend-app-{app_id}"),
                closes: AtomicUsize::new(0),
            }))
        }

        async fn set_volume(&self, _volume: f32) -> Result<(), BackendError> {
            self.volume_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_mute(&self, _mute: bool) -> Result<(), BackendError> {
            self.mute_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn play_media(&self, _request: &MediaRequest) -> Result<MediaLaunch, BackendError> {
            Ok(MediaLaunch {
                session: Arc::new(MockSessionHandle {
                    id: "backend-media-1".to_string(),
                    closes: AtomicUsize::new(0),
                }),
                media_control: self.media_control.clone(),
            })
        }

        async fn close_media(&self, _session_id: &str) -> Result<(), BackendError> {
            self.media_closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEmitter {
        connection: parking_lot::Mutex<Vec<ConnectionEvent>>,
        playback: parking_lot::Mutex<Vec<PlaybackEvent>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_discovery(&self, _event: DiscoveryEvent) {}

        fn emit_connection(&self, event: ConnectionEvent) {
            self.connection.lock().push(event);
        }

        fn emit_playback(&self, event: PlaybackEvent) {
            self.playback.lock().push(event);
        }
    }

    fn device_with(
        caps: &[Capability],
        transport: Arc<MockTransport>,
        emitter: Arc<dyn EventEmitter>,
    ) -> DeviceHandle {
        let mut raw = RawDevice::fixture("dev-1", "Living Room TV", transport);
        raw.capabilities = caps.to_vec();
        DeviceHandle::new(
            IdentityKey::from_raw(&raw),
            raw,
            emitter,
            &TokioSpawner::current(),
            CancellationToken::new(),
        )
    }

    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    const MEDIA_CAPS: &[Capability] = &[
        Capability::MediaControl(MediaControlCapability::Play),
        Capability::MediaControl(MediaControlCapability::Pause),
        Capability::MediaControl(MediaControlCapability::Seek),
        Capability::MediaControl(MediaControlCapability::PlayStateSubscribe),
    ];

    // ─── Connection lifecycle ────────────────────────────────────────

    #[tokio::test]
    async fn connect_reaches_connected_and_emits() {
        let transport = MockTransport::new();
        let emitter = Arc::new(RecordingEmitter::default());
        let device = device_with(&[], transport.clone(), emitter.clone());

        device.connect().await.unwrap();
        settle().await;

        assert_eq!(device.state(), ConnectionState::Connected);
        let events = emitter.connection.lock();
        assert!(matches!(
            events.as_slice(),
            [ConnectionEvent::Connected { .. }]
        ));
    }

    #[tokio::test]
    async fn connect_while_live_is_a_noop() {
        let transport = MockTransport::new();
        let device = device_with(&[], transport.clone(), Arc::new(RecordingEmitter::default()));

        device.connect().await.unwrap();
        settle().await;
        device.connect().await.unwrap();

        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_failure_lands_in_disconnected() {
        let transport = MockTransport::new();
        transport.fail_connect.store(true, Ordering::SeqCst);
        let emitter = Arc::new(RecordingEmitter::default());
        let device = device_with(&[], transport, emitter.clone());

        let result = device.connect().await;
        settle().await;

        assert!(matches!(result, Err(CommandError::Backend(_))));
        assert_eq!(device.state(), ConnectionState::Disconnected);
        let events = emitter.connection.lock();
        assert!(matches!(
            events.as_slice(),
            [ConnectionEvent::Disconnected { error: Some(_), .. }]
        ));
    }

    #[tokio::test]
    async fn pairing_flow_gates_commands_until_connected() {
        let transport = MockTransport::new();
        transport.set_behavior(ConnectBehavior::PairingRequired);
        let emitter = Arc::new(RecordingEmitter::default());
        let device = device_with(
            &[Capability::VolumeControl(VolumeControlCapability::Set)],
            transport.clone(),
            emitter.clone(),
        );

        device.connect().await.unwrap();
        settle().await;
        assert_eq!(device.state(), ConnectionState::PairingRequired);
        assert!(matches!(
            device.set_volume(0.5).await,
            Err(CommandError::NotConnected)
        ));
        assert_eq!(transport.volume_calls.load(Ordering::SeqCst), 0);

        transport.send(TransportEvent::PairingSucceeded {
            service: MockTransport::pairing_service(),
        });
        settle().await;
        assert_eq!(device.state(), ConnectionState::Connected);
        device.set_volume(0.5).await.unwrap();

        let events = emitter.connection.lock();
        assert!(matches!(
            events.as_slice(),
            [
                ConnectionEvent::PairingRequired { .. },
                ConnectionEvent::PairingSucceeded { .. },
                ConnectionEvent::Connected { .. },
            ]
        ));
    }

    #[tokio::test]
    async fn pairing_failure_is_terminal_until_reconnect() {
        let transport = MockTransport::new();
        transport.set_behavior(ConnectBehavior::PairingRequired);
        let device = device_with(&[], transport.clone(), Arc::new(RecordingEmitter::default()));

        device.connect().await.unwrap();
        settle().await;
        transport.send(TransportEvent::PairingFailed {
            service: MockTransport::pairing_service(),
            error: BackendError::new("pin rejected"),
        });
        settle().await;
        assert_eq!(device.state(), ConnectionState::Failed);

        // Retry path: a fresh connect leaves Failed.
        transport.set_behavior(ConnectBehavior::Ready);
        device.connect().await.unwrap();
        settle().await;
        assert_eq!(device.state(), ConnectionState::Connected);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn late_ready_after_disconnect_is_discarded() {
        let transport = MockTransport::new();
        transport.set_behavior(ConnectBehavior::Silent);
        let device = device_with(&[], transport.clone(), Arc::new(RecordingEmitter::default()));

        device.connect().await.unwrap();
        settle().await;
        assert_eq!(device.state(), ConnectionState::Connecting);

        transport.send(TransportEvent::Disconnected(None));
        transport.send(TransportEvent::Ready);
        settle().await;
        assert_eq!(device.state(), ConnectionState::Disconnected);
    }

    // ─── Capability gate ─────────────────────────────────────────────

    #[tokio::test]
    async fn gate_rejects_before_touching_the_backend() {
        let transport = MockTransport::new();
        let device = device_with(
            &[Capability::VolumeControl(VolumeControlCapability::Set)],
            transport.clone(),
            Arc::new(RecordingEmitter::default()),
        );

        device.connect().await.unwrap();
        settle().await;

        device.set_volume(0.5).await.unwrap();
        assert_eq!(transport.volume_calls.load(Ordering::SeqCst), 1);

        match device.set_mute(true).await {
            Err(CommandError::CapabilityUnsupported(cap)) => {
                assert_eq!(cap.tag(), "VolumeControl.Mute.Set");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(transport.mute_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn commands_before_connect_fail_not_connected() {
        let device = device_with(
            MEDIA_CAPS,
            MockTransport::new(),
            Arc::new(RecordingEmitter::default()),
        );
        assert!(matches!(
            device.play().await,
            Err(CommandError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn volume_range_is_validated_first() {
        let transport = MockTransport::new();
        let device = device_with(
            &[Capability::VolumeControl(VolumeControlCapability::Set)],
            transport.clone(),
            Arc::new(RecordingEmitter::default()),
        );
        device.connect().await.unwrap();
        settle().await;

        assert!(matches!(
            device.set_volume(1.5).await,
            Err(CommandError::InvalidArgument(_))
        ));
        assert_eq!(transport.volume_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn service_capabilities_count_toward_the_union() {
        let transport = MockTransport::new();
        let mut raw = RawDevice::fixture("dev-svc", "Hallway TV", transport.clone());
        raw.services = vec![RawService {
            kind: ServiceKind::Dlna,
            connectable: true,
            requires_pairing: false,
            capabilities: vec![Capability::VolumeControl(VolumeControlCapability::Set)],
        }];
        let device = DeviceHandle::new(
            IdentityKey::from_raw(&raw),
            raw,
            Arc::new(RecordingEmitter::default()),
            &TokioSpawner::current(),
            CancellationToken::new(),
        );

        device.connect().await.unwrap();
        settle().await;
        assert!(device.has_capability(VolumeControlCapability::Set));
        device.set_volume(0.3).await.unwrap();
        assert_eq!(transport.volume_calls.load(Ordering::SeqCst), 1);
    }

    // ─── Sessions ────────────────────────────────────────────────────

    #[tokio::test]
    async fn browser_session_retained_only_with_app_close() {
        let emitter = Arc::new(RecordingEmitter::default());
        let device = device_with(
            &[Capability::Launcher(LauncherCapability::Browser)],
            MockTransport::new(),
            emitter.clone(),
        );
        device.connect().await.unwrap();
        settle().await;

        let session = device.open_browser("http://example.com").await.unwrap();
        assert_eq!(session.kind(), SessionKind::Browser);
        // Not remotely closeable, so not retained.
        assert!(device.active_session().is_none());
        assert!(emitter.playback.lock().is_empty());
        assert!(matches!(
            device.close_browser().await,
            Err(CommandError::NoActiveSession)
        ));

        let retained = device_with(
            &[
                Capability::Launcher(LauncherCapability::Browser),
                Capability::Launcher(LauncherCapability::AppClose),
            ],
            MockTransport::new(),
            emitter.clone(),
        );
        retained.connect().await.unwrap();
        settle().await;
        retained.open_browser("http://example.com").await.unwrap();
        assert!(retained.active_session().is_some());
        retained.close_browser().await.unwrap();
        assert!(retained.active_session().is_none());
    }

    #[tokio::test]
    async fn launch_app_stores_and_close_emits_session_ended() {
        let emitter = Arc::new(RecordingEmitter::default());
        let device = device_with(
            &[Capability::Launcher(LauncherCapability::App)],
            MockTransport::new(),
            emitter.clone(),
        );
        device.connect().await.unwrap();
        settle().await;

        let session = device.launch_app("netflix", None).await.unwrap();
        assert_eq!(session.kind(), SessionKind::App);
        assert!(device.active_session().is_some());

        device.close_app().await.unwrap();
        assert!(device.active_session().is_none());

        let playback = emitter.playback.lock();
        assert!(matches!(
            playback.as_slice(),
            [
                PlaybackEvent::SessionStarted { .. },
                PlaybackEvent::SessionEnded { .. },
            ]
        ));
    }

    #[tokio::test]
    async fn launch_app_requires_params_capability() {
        let device = device_with(
            &[Capability::Launcher(LauncherCapability::App)],
            MockTransport::new(),
            Arc::new(RecordingEmitter::default()),
        );
        device.connect().await.unwrap();
        settle().await;

        device.launch_app("youtube", None).await.unwrap();
        match device
            .launch_app("youtube", Some(serde_json::json!({ "videoId": "abc" })))
            .await
        {
            Err(CommandError::CapabilityUnsupported(cap)) => {
                assert_eq!(cap.tag(), "Launcher.App.Params");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_app_id_is_invalid() {
        let device = device_with(
            &[Capability::Launcher(LauncherCapability::App)],
            MockTransport::new(),
            Arc::new(RecordingEmitter::default()),
        );
        device.connect().await.unwrap();
        settle().await;

        assert!(matches!(
            device.launch_app("  ", None).await,
            Err(CommandError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn media_transport_controls_require_a_session() {
        let transport = MockTransport::new();
        let device = device_with(
            MEDIA_CAPS,
            transport.clone(),
            Arc::new(RecordingEmitter::default()),
        );
        device.connect().await.unwrap();
        settle().await;

        assert!(matches!(
            device.pause().await,
            Err(CommandError::NoActiveSession)
        ));

        let request = device
            .media_builder()
            .media_url("http://example.com/movie.mp4")
            .request()
            .unwrap();
        device.play_media(&request).await.unwrap();

        device.play().await.unwrap();
        device.pause().await.unwrap();
        device.seek(Duration::from_secs(42)).await.unwrap();
        assert_eq!(transport.media_control.plays.load(Ordering::SeqCst), 1);
        assert_eq!(transport.media_control.pauses.load(Ordering::SeqCst), 1);
        assert_eq!(transport.media_control.seeks.load(Ordering::SeqCst), 1);

        device.close_media_player().await.unwrap();
        assert_eq!(transport.media_closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            device.play().await,
            Err(CommandError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn disconnect_clears_the_session() {
        let transport = MockTransport::new();
        let emitter = Arc::new(RecordingEmitter::default());
        let device = device_with(MEDIA_CAPS, transport.clone(), emitter.clone());
        device.connect().await.unwrap();
        settle().await;

        let request = device
            .media_builder()
            .media_url("http://example.com/movie.mp4")
            .request()
            .unwrap();
        device.play_media(&request).await.unwrap();
        assert!(device.active_session().is_some());

        transport.send(TransportEvent::Disconnected(None));
        settle().await;

        assert!(device.active_session().is_none());
        assert!(matches!(
            device.play().await,
            Err(CommandError::NotConnected)
        ));
        let playback = emitter.playback.lock();
        assert!(matches!(
            playback.as_slice(),
            [
                PlaybackEvent::SessionStarted { .. },
                PlaybackEvent::SessionEnded { .. },
            ]
        ));
    }

    #[tokio::test]
    async fn launch_finishing_after_disconnect_is_discarded() {
        let transport = MockTransport::new();
        let gate = Arc::new(Notify::new());
        *transport.launch_gate.lock() = Some(gate.clone());
        let device = device_with(
            &[
                Capability::Launcher(LauncherCapability::Browser),
                Capability::Launcher(LauncherCapability::AppClose),
            ],
            transport.clone(),
            Arc::new(RecordingEmitter::default()),
        );
        device.connect().await.unwrap();
        settle().await;

        let pending = {
            let device = device.clone();
            tokio::spawn(async move { device.open_browser("http://example.com").await })
        };
        settle().await;
        assert_eq!(transport.browser_launches.load(Ordering::SeqCst), 1);

        transport.send(TransportEvent::Disconnected(None));
        settle().await;
        gate.notify_one();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(CommandError::NotConnected)));
        assert!(device.active_session().is_none());
    }

    #[tokio::test]
    async fn play_state_subscription_maps_raw_tags() {
        let transport = MockTransport::new();
        let emitter = Arc::new(RecordingEmitter::default());
        let device = device_with(MEDIA_CAPS, transport.clone(), emitter.clone());
        device.connect().await.unwrap();
        settle().await;

        let request = device
            .media_builder()
            .media_url("http://example.com/movie.mp4")
            .request()
            .unwrap();
        device.play_media(&request).await.unwrap();

        let mut states = device.subscribe_play_state().await.unwrap();
        let raw_tx = transport.media_control.states.lock().clone().unwrap();
        raw_tx.send("playing".to_string()).unwrap();
        raw_tx.send("definitely-not-a-state".to_string()).unwrap();

        assert_eq!(states.recv().await, Some(PlayState::Playing));
        assert_eq!(states.recv().await, Some(PlayState::Unknown));

        settle().await;
        let playback = emitter.playback.lock();
        assert!(playback.iter().any(|e| matches!(
            e,
            PlaybackEvent::PlayStateChanged {
                state: PlayState::Playing,
                ..
            }
        )));
    }

    // ─── Sighting merge ──────────────────────────────────────────────

    #[tokio::test]
    async fn sighting_merge_overwrites_present_fields_only() {
        let transport = MockTransport::new();
        let device = device_with(&[], transport.clone(), Arc::new(RecordingEmitter::default()));

        let mut update = RawDevice::fixture("dev-1", "Renamed TV", transport.clone());
        update.model_name = Some("OLED55".to_string());
        assert!(device.apply_sighting(&update));
        assert_eq!(device.friendly_name().as_deref(), Some("Renamed TV"));
        assert_eq!(device.model_name().as_deref(), Some("OLED55"));

        // Absent fields and empty lists keep previous values.
        let mut sparse = RawDevice::fixture("dev-1", "Renamed TV", transport.clone());
        sparse.friendly_name = None;
        sparse.model_name = None;
        assert!(!device.apply_sighting(&sparse));
        assert_eq!(device.model_name().as_deref(), Some("OLED55"));

        // Identical sighting reports no change.
        let mut same = RawDevice::fixture("dev-1", "Renamed TV", transport);
        same.model_name = Some("OLED55".to_string());
        assert!(!device.apply_sighting(&same));
    }

    #[tokio::test]
    async fn snapshot_reflects_state_and_sorted_capabilities() {
        let device = device_with(
            &[
                Capability::VolumeControl(VolumeControlCapability::Set),
                Capability::Launcher(LauncherCapability::Browser),
            ],
            MockTransport::new(),
            Arc::new(RecordingEmitter::default()),
        );
        device.connect().await.unwrap();
        settle().await;

        let snapshot = device.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        let tags: Vec<&str> = snapshot.capabilities.iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["Launcher.Browser", "VolumeControl.Set"]);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], "connected");
        assert_eq!(value["deviceRef"]["kind"], "fixture");
        assert!(value.get("session").is_none());
    }
}
