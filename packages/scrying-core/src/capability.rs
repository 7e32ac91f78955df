//! Capability identifier registry.
//!
//! Capability identifiers are opaque, compile-time tags namespaced by
//! category (`Launcher.*`, `MediaControl.*`, `VolumeControl.*`). Device
//! backends report them in sightings; the command gate checks them by
//! exact membership before any command reaches a transport.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Category a capability identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityCategory {
    /// Application/browser launch features.
    Launcher,
    /// Media playback transport features.
    MediaControl,
    /// Volume and mute features.
    VolumeControl,
}

/// Launcher capability identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LauncherCapability {
    Any,
    App,
    AppParams,
    AppClose,
    AppList,
    AppStore,
    AppStoreParams,
    Browser,
    BrowserParams,
    Hulu,
    HuluParams,
    Netflix,
    NetflixParams,
    YouTube,
    YouTubeParams,
    AppState,
    AppStateSubscribe,
    RunningApp,
    RunningAppSubscribe,
}

impl LauncherCapability {
    /// Returns the wire tag for this identifier.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Any => "Launcher.Any",
            Self::App => "Launcher.App",
            Self::AppParams => "Launcher.App.Params",
            Self::AppClose => "Launcher.App.Close",
            Self::AppList => "Launcher.App.List",
            Self::AppStore => "Launcher.AppStore",
            Self::AppStoreParams => "Launcher.AppStore.Params",
            Self::Browser => "Launcher.Browser",
            Self::BrowserParams => "Launcher.Browser.Params",
            Self::Hulu => "Launcher.Hulu",
            Self::HuluParams => "Launcher.Hulu.Params",
            Self::Netflix => "Launcher.Netflix",
            Self::NetflixParams => "Launcher.Netflix.Params",
            Self::YouTube => "Launcher.YouTube",
            Self::YouTubeParams => "Launcher.YouTube.Params",
            Self::AppState => "Launcher.AppState",
            Self::AppStateSubscribe => "Launcher.AppState.Subscribe",
            Self::RunningApp => "Launcher.RunningApp",
            Self::RunningAppSubscribe => "Launcher.RunningApp.Subscribe",
        }
    }

    /// Parses a wire tag into an identifier.
    pub fn parse(tag: &str) -> Option<Self> {
        let cap = match tag {
            "Launcher.Any" => Self::Any,
            "Launcher.App" => Self::App,
            "Launcher.App.Params" => Self::AppParams,
            "Launcher.App.Close" => Self::AppClose,
            "Launcher.App.List" => Self::AppList,
            "Launcher.AppStore" => Self::AppStore,
            "Launcher.AppStore.Params" => Self::AppStoreParams,
            "Launcher.Browser" => Self::Browser,
            "Launcher.Browser.Params" => Self::BrowserParams,
            "Launcher.Hulu" => Self::Hulu,
            "Launcher.Hulu.Params" => Self::HuluParams,
            "Launcher.Netflix" => Self::Netflix,
            "Launcher.Netflix.Params" => Self::NetflixParams,
            "Launcher.YouTube" => Self::YouTube,
            "Launcher.YouTube.Params" => Self::YouTubeParams,
            "Launcher.AppState" => Self::AppState,
            "Launcher.AppState.Subscribe" => Self::AppStateSubscribe,
            "Launcher.RunningApp" => Self::RunningApp,
            "Launcher.RunningApp.Subscribe" => Self::RunningAppSubscribe,
            _ => return None,
        };
        Some(cap)
    }
}

/// Media control capability identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaControlCapability {
    Any,
    Play,
    Pause,
    Stop,
    Duration,
    Rewind,
    FastForward,
    Seek,
    PlayState,
    PlayStateSubscribe,
    Position,
    MetaData,
    MetaDataSubscribe,
}

impl MediaControlCapability {
    /// Returns the wire tag for this identifier.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Any => "MediaControl.Any",
            Self::Play => "MediaControl.Play",
            Self::Pause => "MediaControl.Pause",
            Self::Stop => "MediaControl.Stop",
            Self::Duration => "MediaControl.Duration",
            Self::Rewind => "MediaControl.Rewind",
            Self::FastForward => "MediaControl.FastForward",
            Self::Seek => "MediaControl.Seek",
            Self::PlayState => "MediaControl.PlayState",
            Self::PlayStateSubscribe => "MediaControl.PlayState.Subscribe",
            Self::Position => "MediaControl.Position",
            Self::MetaData => "MediaControl.MetaData",
            Self::MetaDataSubscribe => "MediaControl.MetaData.Subscribe",
        }
    }

    /// Parses a wire tag into an identifier.
    pub fn parse(tag: &str) -> Option<Self> {
        let cap = match tag {
            "MediaControl.Any" => Self::Any,
            "MediaControl.Play" => Self::Play,
            "MediaControl.Pause" => Self::Pause,
            "MediaControl.Stop" => Self::Stop,
            "MediaControl.Duration" => Self::Duration,
            "MediaControl.Rewind" => Self::Rewind,
            "MediaControl.FastForward" => Self::FastForward,
            "MediaControl.Seek" => Self::Seek,
            "MediaControl.PlayState" => Self::PlayState,
            "MediaControl.PlayState.Subscribe" => Self::PlayStateSubscribe,
            "MediaControl.Position" => Self::Position,
            "MediaControl.MetaData" => Self::MetaData,
            "MediaControl.MetaData.Subscribe" => Self::MetaDataSubscribe,
            _ => return None,
        };
        Some(cap)
    }
}

/// Volume control capability identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeControlCapability {
    Any,
    Get,
    Set,
    UpDown,
    Subscribe,
    MuteGet,
    MuteSet,
    MuteSubscribe,
}

impl VolumeControlCapability {
    /// Returns the wire tag for this identifier.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Any => "VolumeControl.Any",
            Self::Get => "VolumeControl.Get",
            Self::Set => "VolumeControl.Set",
            Self::UpDown => "VolumeControl.UpDown",
            Self::Subscribe => "VolumeControl.Subscribe",
            Self::MuteGet => "VolumeControl.Mute.Get",
            Self::MuteSet => "VolumeControl.Mute.Set",
            Self::MuteSubscribe => "VolumeControl.Mute.Subscribe",
        }
    }

    /// Parses a wire tag into an identifier.
    pub fn parse(tag: &str) -> Option<Self> {
        let cap = match tag {
            "VolumeControl.Any" => Self::Any,
            "VolumeControl.Get" => Self::Get,
            "VolumeControl.Set" => Self::Set,
            "VolumeControl.UpDown" => Self::UpDown,
            "VolumeControl.Subscribe" => Self::Subscribe,
            "VolumeControl.Mute.Get" => Self::MuteGet,
            "VolumeControl.Mute.Set" => Self::MuteSet,
            "VolumeControl.Mute.Subscribe" => Self::MuteSubscribe,
            _ => return None,
        };
        Some(cap)
    }
}

/// A capability identifier from any category.
///
/// Membership checks are exact: `*.Any` tags are ordinary identifiers
/// with no wildcard expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Launcher(LauncherCapability),
    MediaControl(MediaControlCapability),
    VolumeControl(VolumeControlCapability),
}

impl Capability {
    /// Returns the wire tag for this identifier.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Launcher(c) => c.tag(),
            Self::MediaControl(c) => c.tag(),
            Self::VolumeControl(c) => c.tag(),
        }
    }

    /// Returns the category this identifier belongs to.
    pub fn category(&self) -> CapabilityCategory {
        match self {
            Self::Launcher(_) => CapabilityCategory::Launcher,
            Self::MediaControl(_) => CapabilityCategory::MediaControl,
            Self::VolumeControl(_) => CapabilityCategory::VolumeControl,
        }
    }

    /// Parses a wire tag from any category.
    ///
    /// Returns `None` for tags outside the registry; unknown tags in
    /// sightings are dropped, never stored raw.
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.starts_with("Launcher.") {
            LauncherCapability::parse(tag).map(Self::Launcher)
        } else if tag.starts_with("MediaControl.") {
            MediaControlCapability::parse(tag).map(Self::MediaControl)
        } else if tag.starts_with("VolumeControl.") {
            VolumeControlCapability::parse(tag).map(Self::VolumeControl)
        } else {
            None
        }
    }

    /// All identifiers in the registry, in tag order per category.
    pub fn all() -> impl Iterator<Item = Capability> {
        const LAUNCHER: &[LauncherCapability] = &[
            LauncherCapability::Any,
            LauncherCapability::App,
            LauncherCapability::AppParams,
            LauncherCapability::AppClose,
            LauncherCapability::AppList,
            LauncherCapability::AppStore,
            LauncherCapability::AppStoreParams,
            LauncherCapability::Browser,
            LauncherCapability::BrowserParams,
            LauncherCapability::Hulu,
            LauncherCapability::HuluParams,
            LauncherCapability::Netflix,
            LauncherCapability::NetflixParams,
            LauncherCapability::YouTube,
            LauncherCapability::YouTubeParams,
            LauncherCapability::AppState,
            LauncherCapability::AppStateSubscribe,
            LauncherCapability::RunningApp,
            LauncherCapability::RunningAppSubscribe,
        ];
        const MEDIA: &[MediaControlCapability] = &[
            MediaControlCapability::Any,
            MediaControlCapability::Play,
            MediaControlCapability::Pause,
            MediaControlCapability::Stop,
            MediaControlCapability::Duration,
            MediaControlCapability::Rewind,
            MediaControlCapability::FastForward,
            MediaControlCapability::Seek,
            MediaControlCapability::PlayState,
            MediaControlCapability::PlayStateSubscribe,
            MediaControlCapability::Position,
            MediaControlCapability::MetaData,
            MediaControlCapability::MetaDataSubscribe,
        ];
        const VOLUME: &[VolumeControlCapability] = &[
            VolumeControlCapability::Any,
            VolumeControlCapability::Get,
            VolumeControlCapability::Set,
            VolumeControlCapability::UpDown,
            VolumeControlCapability::Subscribe,
            VolumeControlCapability::MuteGet,
            VolumeControlCapability::MuteSet,
            VolumeControlCapability::MuteSubscribe,
        ];
        LAUNCHER
            .iter()
            .copied()
            .map(Capability::Launcher)
            .chain(MEDIA.iter().copied().map(Capability::MediaControl))
            .chain(VOLUME.iter().copied().map(Capability::VolumeControl))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl From<LauncherCapability> for Capability {
    fn from(cap: LauncherCapability) -> Self {
        Capability::Launcher(cap)
    }
}

impl From<MediaControlCapability> for Capability {
    fn from(cap: MediaControlCapability) -> Self {
        Capability::MediaControl(cap)
    }
}

impl From<VolumeControlCapability> for Capability {
    fn from(cap: VolumeControlCapability) -> Self {
        Capability::VolumeControl(cap)
    }
}

// Capabilities cross the wire as their tag strings.
impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = Capability;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a capability tag such as \"VolumeControl.Set\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Capability, E> {
                Capability::parse(value)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}

/// Play state of an active media session.
///
/// Fixed enumeration; raw backend values outside the known set map to
/// [`PlayState::Unknown`] and never reach callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayState {
    Unknown,
    Idle,
    Playing,
    Paused,
    Buffering,
    Finished,
}

impl PlayState {
    /// Maps a raw backend state tag to a play state.
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "idle" => Self::Idle,
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            "buffering" => Self::Buffering,
            "finished" => Self::Finished,
            _ => Self::Unknown,
        }
    }
}
