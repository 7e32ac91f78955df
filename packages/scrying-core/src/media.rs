//! Media launch requests and the fluent builder that assembles them.
//!
//! A [`MediaRequest`] is validated up front; URL fields are parsed before
//! any transport call happens, so malformed input fails fast with
//! [`CommandError::InvalidArgument`] instead of surfacing as a backend
//! error mid-launch.

use url::Url;

use crate::device::{DeviceHandle, MediaSession};
use crate::error::{CommandError, CommandResult};

/// Validated description of one media playback launch.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRequest {
    /// URL of the media to play.
    pub media_url: Url,
    /// Artwork shown while loading or in track listings.
    pub icon_url: Option<Url>,
    /// Display title.
    pub title: Option<String>,
    /// Display description.
    pub description: Option<String>,
    /// MIME type; when absent the transport picks a default.
    pub mime_type: Option<String>,
    /// Sidecar subtitles URL.
    pub subtitles_url: Option<Url>,
    /// Whether playback restarts when the media ends.
    pub should_loop: bool,
}

/// Fluent builder for launching media on one device.
///
/// Obtained from [`DeviceHandle::media_builder`]. All fields except the
/// media URL are optional.
///
/// # Example
///
/// ```ignore
/// let session = device
///     .media_builder()
///     .media_url("http://example.com/movie.mp4")
///     .title("Movie Night")
///     .mime_type("video/mp4")
///     .play()
///     .await?;
/// ```
pub struct MediaLaunchBuilder {
    device: DeviceHandle,
    media_url: Option<String>,
    icon_url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    mime_type: Option<String>,
    subtitles_url: Option<String>,
    should_loop: bool,
}

impl MediaLaunchBuilder {
    pub(crate) fn new(device: DeviceHandle) -> Self {
        Self {
            device,
            media_url: None,
            icon_url: None,
            title: None,
            description: None,
            mime_type: None,
            subtitles_url: None,
            should_loop: false,
        }
    }

    /// Sets the URL of the media to play. Required.
    pub fn media_url(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    /// Sets the artwork URL.
    pub fn icon_url(mut self, url: impl Into<String>) -> Self {
        self.icon_url = Some(url.into());
        self
    }

    /// Sets the display title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the display description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the MIME type of the media.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the sidecar subtitles URL.
    pub fn subtitles_url(mut self, url: impl Into<String>) -> Self {
        self.subtitles_url = Some(url.into());
        self
    }

    /// Sets whether playback restarts when the media ends.
    pub fn looping(mut self, should_loop: bool) -> Self {
        self.should_loop = should_loop;
        self
    }

    /// Validates the accumulated fields into a [`MediaRequest`].
    ///
    /// Fails with [`CommandError::InvalidArgument`] when the media URL is
    /// missing or any URL field does not parse.
    pub fn request(&self) -> CommandResult<MediaRequest> {
        let media_url = self
            .media_url
            .as_deref()
            .ok_or_else(|| CommandError::InvalidArgument("media URL is required".to_string()))?;
        let media_url = parse_url("media URL", media_url)?;
        let icon_url = self
            .icon_url
            .as_deref()
            .map(|raw| parse_url("icon URL", raw))
            .transpose()?;
        let subtitles_url = self
            .subtitles_url
            .as_deref()
            .map(|raw| parse_url("subtitles URL", raw))
            .transpose()?;

        Ok(MediaRequest {
            media_url,
            icon_url,
            title: self.title.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            subtitles_url,
            should_loop: self.should_loop,
        })
    }

    /// Validates the request and launches it on the owning device.
    pub async fn play(self) -> CommandResult<MediaSession> {
        let request = self.request()?;
        self.device.play_media(&request).await
    }
}

fn parse_url(field: &str, raw: &str) -> CommandResult<Url> {
    Url::parse(raw).map_err(|e| CommandError::InvalidArgument(format!("invalid {field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::backend::{
        DeviceTransport, LaunchSessionHandle, MediaLaunch, RawDevice, TransportEvent,
    };
    use crate::discovery::IdentityKey;
    use crate::error::BackendError;
    use crate::events::NoopEventEmitter;
    use crate::runtime::TokioSpawner;

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
        ) -> Result<Arc<dyn LaunchSessionHandle>, BackendError> {
            Err(BackendError::new("unsupported"))
        }

        async fn launch_app(
            &self,
            _app_id: &str,
            _params: Option<&serde_json::Value>,
        ) -> Result<Arc<dyn LaunchSessionHandle>, BackendError> {
            Err(BackendError::new("unsupported"))
        }

        async fn set_volume(&self, _volume: f32) -> Result<(), BackendError> {
            Ok(())
        }

        async fn set_mute(&self, _mute: bool) -> Result<(), BackendError> {
            Ok(())
        }

        async fn play_media(&self, _request: &MediaRequest) -> Result<MediaLaunch, BackendError> {
            Err(BackendError::new("unsupported"))
        }

        async fn close_media(&self, _session_id: &str) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn fixture_device() -> DeviceHandle {
        let raw = RawDevice::fixture("builder-test", "Test Display", Arc::new(NullTransport));
        DeviceHandle::new(
            IdentityKey::from_raw(&raw),
            raw,
            Arc::new(NoopEventEmitter),
            &TokioSpawner::current(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn request_requires_media_url() {
        let builder = fixture_device().media_builder().title("No URL");
        match builder.request() {
            Err(CommandError::InvalidArgument(msg)) => {
                assert!(msg.contains("media URL"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_rejects_malformed_urls() {
        let builder = fixture_device().media_builder().media_url("not a url");
        assert!(matches!(
            builder.request(),
            Err(CommandError::InvalidArgument(_))
        ));

        let builder = fixture_device()
            .media_builder()
            .media_url("http://example.com/movie.mp4")
            .subtitles_url("::::");
        match builder.request() {
            Err(CommandError::InvalidArgument(msg)) => {
                assert!(msg.contains("subtitles URL"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_carries_all_fields() {
        let request = fixture_device()
            .media_builder()
            .media_url("http://example.com/movie.mp4")
            .icon_url("http://example.com/icon.png")
            .title("Movie Night")
            .description("A test feature")
            .mime_type("video/mp4")
            .subtitles_url("http://example.com/movie.srt")
            .looping(true)
            .request()
            .unwrap();

        assert_eq!(request.media_url.as_str(), "http://example.com/movie.mp4");
        assert_eq!(
            request.icon_url.as_ref().map(Url::as_str),
            Some("http://example.com/icon.png")
        );
        assert_eq!(request.title.as_deref(), Some("Movie Night"));
        assert_eq!(request.mime_type.as_deref(), Some("video/mp4"));
        assert!(request.should_loop);

        let minimal = fixture_device()
            .media_builder()
            .media_url("http://example.com/a.mp3")
            .request()
            .unwrap();
        assert!(minimal.icon_url.is_none());
        assert!(minimal.mime_type.is_none());
        assert!(!minimal.should_loop);
    }
}
