//! Capability gate in front of the transport.
//!
//! Every state-changing command passes through [`check`] before any
//! backend call: connection status first, then exact-match membership of
//! each required capability identifier. A command rejected here never
//! reaches the transport.

use std::collections::HashSet;

use crate::capability::{
    Capability, LauncherCapability, MediaControlCapability, VolumeControlCapability,
};
use crate::device::connection::ConnectionState;
use crate::error::{CommandError, CommandResult};

/// Gated commands a device handle can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    OpenBrowser,
    LaunchApp,
    LaunchAppWithParams,
    SetVolume,
    SetMute,
    PlayMedia,
    Play,
    Pause,
    Seek,
    SubscribePlayState,
}

impl Command {
    /// Capability identifiers the device must carry for this command.
    pub(crate) fn required_capabilities(&self) -> &'static [Capability] {
        const OPEN_BROWSER: &[Capability] =
            &[Capability::Launcher(LauncherCapability::Browser)];
        const LAUNCH_APP: &[Capability] = &[Capability::Launcher(LauncherCapability::App)];
        const LAUNCH_APP_WITH_PARAMS: &[Capability] = &[
            Capability::Launcher(LauncherCapability::App),
            Capability::Launcher(LauncherCapability::AppParams),
        ];
        const SET_VOLUME: &[Capability] =
            &[Capability::VolumeControl(VolumeControlCapability::Set)];
        const SET_MUTE: &[Capability] =
            &[Capability::VolumeControl(VolumeControlCapability::MuteSet)];
        const PLAY_MEDIA: &[Capability] =
            &[Capability::MediaControl(MediaControlCapability::Play)];
        const PLAY: &[Capability] = &[Capability::MediaControl(MediaControlCapability::Play)];
        const PAUSE: &[Capability] = &[Capability::MediaControl(MediaControlCapability::Pause)];
        const SEEK: &[Capability] = &[Capability::MediaControl(MediaControlCapability::Seek)];
        const SUBSCRIBE_PLAY_STATE: &[Capability] = &[Capability::MediaControl(
            MediaControlCapability::PlayStateSubscribe,
        )];

        match self {
            Self::OpenBrowser => OPEN_BROWSER,
            Self::LaunchApp => LAUNCH_APP,
            Self::LaunchAppWithParams => LAUNCH_APP_WITH_PARAMS,
            Self::SetVolume => SET_VOLUME,
            Self::SetMute => SET_MUTE,
            Self::PlayMedia => PLAY_MEDIA,
            Self::Play => PLAY,
            Self::Pause => PAUSE,
            Self::Seek => SEEK,
            Self::SubscribePlayState => SUBSCRIBE_PLAY_STATE,
        }
    }
}

/// Admits or rejects a command against status and capability set.
///
/// Status is checked before capabilities; a disconnected device reports
/// `NotConnected` even when the capability is also missing.
pub(crate) fn check(
    state: ConnectionState,
    capabilities: &HashSet<Capability>,
    command: Command,
) -> CommandResult<()> {
    if state != ConnectionState::Connected {
        return Err(CommandError::NotConnected);
    }
    for capability in command.required_capabilities() {
        if !capabilities.contains(capability) {
            return Err(CommandError::CapabilityUnsupported(*capability));
        }
    }
    Ok(())
}
