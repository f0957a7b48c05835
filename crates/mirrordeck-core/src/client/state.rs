use crate::api::{Device, RecordingStatus, SavedDevice, SessionConfig};
use crate::client::types::{BootPhase, ChannelStatus, SyncEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Read-only snapshot of everything the engine reconciles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncState {
    pub boot: BootPhase,
    pub config: Option<SessionConfig>,
    pub devices: Vec<Device>,
    pub saved_devices: Vec<SavedDevice>,
    /// True until the first device pull after start settles
    pub devices_loading: bool,
    pub recording: RecordingStatus,
    pub recording_elapsed: Option<String>,
    pub channel: ChannelStatus,
}

impl SyncState {
    /// Fold one event into the snapshot. Lists are always replaced
    /// wholesale.
    pub fn apply(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::BootPhaseChanged(phase) => self.boot = phase,
            SyncEvent::SessionConfigured(config) => self.config = Some(config),
            SyncEvent::DevicesPolled { connected, saved } => {
                self.devices = connected;
                self.saved_devices = saved;
            }
            SyncEvent::DevicesPushed(connected) => self.devices = connected,
            SyncEvent::DevicesLoading => self.devices_loading = true,
            SyncEvent::DevicesLoadSettled => self.devices_loading = false,
            SyncEvent::PresetsUpdated(presets) => {
                if let Some(config) = &mut self.config {
                    config.presets = presets;
                }
            }
            SyncEvent::RecordingUpdated(status) => {
                if !status.active {
                    self.recording_elapsed = None;
                }
                self.recording = status;
            }
            SyncEvent::RecordingElapsed(elapsed) => {
                // A tick queued before the stop must not resurrect the timer.
                self.recording_elapsed = if self.recording.active { elapsed } else { None };
            }
            SyncEvent::ChannelStatusChanged(status) => self.channel = status,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn find_device(&self, serial: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.serial == serial)
    }
}

/// Shared handle to the current `SyncState` plus a version counter that
/// bumps on every applied event.
#[derive(Clone)]
pub struct SyncStore {
    state: Arc<Mutex<SyncState>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(SyncState::default())),
            version: Arc::new(tx),
        }
    }

    pub fn snapshot(&self) -> SyncState {
        self.state.lock().clone()
    }

    /// Borrow the state for a quick read without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&SyncState) -> R) -> R {
        let state = self.state.lock();
        f(&state)
    }

    pub fn apply(&self, event: SyncEvent) {
        self.state.lock().apply(event);
        self.version.send_modify(|v| *v += 1);
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}
