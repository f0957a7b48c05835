use crate::api::{Device, Preset, RecordingStatus, SavedDevice, SessionConfig};
use serde::{Deserialize, Serialize};

/// Errors produced by the synchronization engine and its transports.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Network-level failure (refused, reset, DNS, TLS).
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    /// Non-2xx response. `message` is the server's `detail`/`error`/`message`
    /// text when the body carried one.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("request failed"))]
    Http { status: u16, message: Option<String> },
    #[error("invalid response: {0}")]
    Decode(String),
    /// The server answered `success: false`.
    #[error("{0}")]
    Rejected(String),
    #[error("Select a device to browse files.")]
    SelectDevice,
    #[error("No device connected.")]
    NoDevice,
    #[error("another operation is in progress")]
    Busy,
    #[error("{0}")]
    InvalidMove(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("session is not ready")]
    NotReady,
    #[error("engine is stopped")]
    Closed,
}

impl SyncError {
    /// Text the server supplied for this failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            SyncError::Http {
                message: Some(message),
                ..
            } => Some(message),
            SyncError::Rejected(message) => Some(message),
            _ => None,
        }
    }

    /// Failures that happen before any remote call is made.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SyncError::SelectDevice
                | SyncError::NoDevice
                | SyncError::Busy
                | SyncError::InvalidMove(_)
                | SyncError::InvalidInput(_)
        )
    }
}

/// Status of the push channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    /// Not started, or stopped
    #[default]
    Closed,
    /// Connection attempt in progress
    Connecting,
    /// Connected and receiving frames
    Open,
    /// Connection lost; the next attempt is scheduled
    Reconnecting { attempt: u32 },
}

impl ChannelStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelStatus::Open)
    }
}

/// Progress of the initial configuration handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootPhase {
    #[default]
    Idle,
    /// Zero-based attempt currently in flight
    Booting { attempt: u32 },
    Ready,
    /// All attempts failed; only an explicit retry leaves this phase
    TimedOut,
}

impl BootPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, BootPhase::Ready)
    }
}

/// Event sent from background tasks to the engine's apply loop via
/// async_channel.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    BootPhaseChanged(BootPhase),
    /// Bootstrap succeeded with this configuration
    SessionConfigured(SessionConfig),
    /// Full device pull: both lists replace the local ones
    DevicesPolled {
        connected: Vec<Device>,
        saved: Vec<SavedDevice>,
    },
    /// Push frame: only the connected list is replaced
    DevicesPushed(Vec<Device>),
    /// Reconciliation (re)started; device lists are being loaded
    DevicesLoading,
    /// A device pull finished, successfully or not
    DevicesLoadSettled,
    /// Server-side preset list after a save or delete
    PresetsUpdated(Vec<Preset>),
    RecordingUpdated(RecordingStatus),
    /// Formatted elapsed time of the active recording, `None` when idle
    RecordingElapsed(Option<String>),
    ChannelStatusChanged(ChannelStatus),
}
