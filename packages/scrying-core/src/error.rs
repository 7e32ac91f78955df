//! Centralized error types for the Scrying Glass core library.
//!
//! Two failure surfaces exist:
//! - [`CommandError`] for per-device commands (gate rejections are
//!   synchronous, transport failures arrive through the same result)
//! - [`DiscoveryError`] for aggregator lifecycle and configuration
//!
//! Backend failures of either kind wrap an opaque [`BackendError`].
//! Pairing-required and pairing-failed conditions are connection state
//! transitions, not errors; they never appear here.

use serde::Serialize;
use thiserror::Error;

use crate::capability::Capability;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for event payloads and logs.
    fn code(&self) -> &'static str;
}

/// Opaque failure reported by a discovery or transport backend.
///
/// The core never interprets backend failures beyond carrying them to the
/// caller; the optional numeric code is whatever the backend assigned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct BackendError {
    /// Numeric code assigned by the backend, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Human-readable failure description.
    pub message: String,
}

impl BackendError {
    /// Creates a backend error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a backend error carrying the backend's numeric code.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl ErrorCode for BackendError {
    fn code(&self) -> &'static str {
        "backend_error"
    }
}

/// Failure of a per-device command.
///
/// Gate failures (`NotConnected`, `CapabilityUnsupported`,
/// `NoActiveSession`, `InvalidArgument`) are detected before the transport
/// is touched; `Backend` wraps an asynchronous transport failure.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CommandError {
    /// Command issued while the device is not in the Connected state.
    #[error("device is not connected")]
    NotConnected,

    /// The device lacks a capability the command requires.
    #[error("capability not supported: {0}")]
    CapabilityUnsupported(Capability),

    /// Session operation issued while no media session is active.
    #[error("no active media session")]
    NoActiveSession,

    /// Malformed launch argument (URL or JSON payload).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device transport reported a failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl ErrorCode for CommandError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::CapabilityUnsupported(_) => "capability_unsupported",
            Self::NoActiveSession => "no_active_session",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Backend(_) => "backend_error",
        }
    }
}

/// Failure of an aggregator lifecycle or configuration operation.
///
/// Backend failures during a running discovery do not surface here; they
/// are delivered as `discoveryFailed` notifications to subscribers.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum DiscoveryError {
    /// `start()` called while discovery is already running.
    #[error("discovery is already running")]
    AlreadyRunning,

    /// `stop()` called while discovery is not running.
    #[error("discovery is not running")]
    NotRunning,

    /// Invalid aggregator configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A discovery backend failed outside the notification path.
    #[error("discovery backend error: {0}")]
    Backend(#[from] BackendError),
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::Configuration(_) => "configuration_error",
            Self::Backend(_) => "backend_error",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

/// Convenient Result alias for per-device command operations.
pub type CommandResult<T> = Result<T, CommandError>;

/// Convenient Result alias for aggregator operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
