//! Launch session bookkeeping.
//!
//! A device holds at most one active session at a time. The slot that
//! enforces this lives next to the connection machine; both are only
//! mutated while the device state lock is held, so a launch completing
//! after a disconnect can never resurrect a session.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::backend::{LaunchSessionHandle, MediaControlHandle};

/// What kind of surface a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    /// A web page opened in the device browser.
    Browser,
    /// A launched application.
    App,
    /// Media playback through the device player.
    Media,
}

/// One active browser, app or media session.
///
/// Cloning is cheap; clones share the underlying transport handles.
#[derive(Clone)]
pub struct MediaSession {
    id: String,
    kind: SessionKind,
    session: Arc<dyn LaunchSessionHandle>,
    media_control: Option<Arc<dyn MediaControlHandle>>,
}

impl MediaSession {
    /// Wraps a launch that exposes no playback control.
    pub(crate) fn new(kind: SessionKind, session: Arc<dyn LaunchSessionHandle>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            session,
            media_control: None,
        }
    }

    /// Wraps a media launch together with its playback control handle.
    pub(crate) fn with_media_control(
        session: Arc<dyn LaunchSessionHandle>,
        media_control: Arc<dyn MediaControlHandle>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: SessionKind::Media,
            session,
            media_control: Some(media_control),
        }
    }

    /// Core-assigned session identifier, stable for the session lifetime.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// What kind of surface this session drives.
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Closeable transport handle for this session.
    pub fn session_handle(&self) -> &Arc<dyn LaunchSessionHandle> {
        &self.session
    }

    /// Playback control, present only for media sessions.
    pub fn media_control(&self) -> Option<&Arc<dyn MediaControlHandle>> {
        self.media_control.as_ref()
    }

    /// Serializable view of this session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            kind: self.kind,
        }
    }
}

impl fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("has_media_control", &self.media_control.is_some())
            .finish_non_exhaustive()
    }
}

/// Serializable view of one active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Core-assigned session identifier.
    pub id: String,
    /// What kind of surface the session drives.
    pub kind: SessionKind,
}

/// Holder for the single active session of one device.
///
/// Lock order: callers that also hold the device state lock must acquire
/// it before touching the slot.
#[derive(Default)]
pub(crate) struct SessionSlot {
    current: Mutex<Option<MediaSession>>,
}

impl SessionSlot {
    /// Stores a session, returning the one it replaced.
    pub(crate) fn store(&self, session: MediaSession) -> Option<MediaSession> {
        self.current.lock().replace(session)
    }

    /// Clears the slot, returning the session it held.
    pub(crate) fn take(&self) -> Option<MediaSession> {
        self.current.lock().take()
    }

    /// Clears the slot only if it still holds the session with `id`.
    ///
    /// A close racing a replacement must not drop the newer session.
    pub(crate) fn remove(&self, id: &str) -> Option<MediaSession> {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|s| s.id() == id) {
            current.take()
        } else {
            None
        }
    }

    /// Clones the current session out of the slot.
    pub(crate) fn get(&self) -> Option<MediaSession> {
        self.current.lock().clone()
    }
}
