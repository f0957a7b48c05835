use crate::api::RecordingError;
use crate::client::transport::SessionApi;
use crate::client::types::{SyncError, SyncEvent};
use crate::normalize::{normalize_devices, normalize_saved_devices};
use crate::notify::{Deduplicator, ErrorCategory, NotificationCenter, recording_fingerprint};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub const DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const RECORDING_POLL_INTERVAL: Duration = Duration::from_millis(2000);
/// A pull that has not answered by then counts as failed, so a hung
/// request never stalls its loop.
pub const POLL_REQUEST_TIMEOUT: Duration = Duration::from_millis(4000);

const RECORDING_FAILED: &str = "Recording failed";

/// Periodic pull of the device lists and the recording status.
///
/// Cheap to clone; clones share the fingerprint slot and the task handles.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn SessionApi>,
    events: async_channel::Sender<SyncEvent>,
    notifications: NotificationCenter,
    dedup: Deduplicator,
    /// Serializes recording pulls so notification decisions see them in order
    recording_lock: tokio::sync::Mutex<()>,
    runtime: tokio::runtime::Handle,
    tasks: Mutex<Vec<tokio::task::AbortHandle>>,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn SessionApi>,
        events: async_channel::Sender<SyncEvent>,
        notifications: NotificationCenter,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                events,
                notifications,
                dedup: Deduplicator::new(),
                recording_lock: tokio::sync::Mutex::new(()),
                runtime,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.inner.tasks.lock().is_empty()
    }

    /// Spawn both polling loops. The first pull of each happens
    /// immediately. No-op if already running.
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        let _ = self.inner.events.try_send(SyncEvent::DevicesLoading);

        let devices = self.clone();
        let handle = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(DEVICE_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = devices.pull_devices().await;
            }
        });
        tasks.push(handle.abort_handle());

        let recording = self.clone();
        let handle = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(RECORDING_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = recording.pull_recording().await;
            }
        });
        tasks.push(handle.abort_handle());
    }

    pub fn stop(&self) {
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Pull both device lists and replace the local ones. On failure the
    /// previous lists stay in place.
    pub async fn pull_devices(&self) -> Result<(), SyncError> {
        let result = tokio::time::timeout(POLL_REQUEST_TIMEOUT, self.inner.api.get_devices())
            .await
            .unwrap_or(Err(SyncError::Timeout));
        let outcome = match result {
            Ok(resp) => {
                let connected = normalize_devices(&resp.connected);
                let saved = normalize_saved_devices(&resp.saved);
                log::trace!(
                    "Device poll: {} connected, {} saved",
                    connected.len(),
                    saved.len()
                );
                let _ = self
                    .inner
                    .events
                    .send(SyncEvent::DevicesPolled { connected, saved })
                    .await;
                Ok(())
            }
            Err(e) => {
                log::warn!("Device poll failed: {}", e);
                Err(e)
            }
        };
        let _ = self.inner.events.send(SyncEvent::DevicesLoadSettled).await;
        outcome
    }

    /// Pull the recording status, surfacing a new failure at most once per
    /// fingerprint. On failure the previous status stays in place.
    pub async fn pull_recording(&self) -> Result<(), SyncError> {
        let _guard = self.inner.recording_lock.lock().await;

        let pulled = tokio::time::timeout(
            POLL_REQUEST_TIMEOUT,
            self.inner.api.get_recording_status(),
        )
        .await
        .unwrap_or(Err(SyncError::Timeout));
        let status = match pulled {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Recording status poll failed: {}", e);
                return Err(e);
            }
        };

        if !status.active {
            if let Some(error) = &status.last_error {
                self.surface_failure(error);
            }
        }

        let _ = self
            .inner
            .events
            .send(SyncEvent::RecordingUpdated(status))
            .await;
        Ok(())
    }

    fn surface_failure(&self, error: &RecordingError) {
        let Some(fingerprint) = recording_fingerprint(error) else {
            return;
        };
        if !self
            .inner
            .dedup
            .should_surface(ErrorCategory::RecordingFailure, &fingerprint)
        {
            return;
        }
        let message = error
            .output
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(RECORDING_FAILED);
        log::warn!("Recording failed: {}", message);
        self.inner.notifications.error(message);
    }
}
