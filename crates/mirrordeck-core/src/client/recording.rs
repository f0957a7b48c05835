use crate::api::{RecordingRequest, RecordingStatus, StartRecordingResponse};
use crate::client::busy::BusyFlag;
use crate::client::poller::Reconciler;
use crate::client::state::SyncStore;
use crate::client::transport::SessionApi;
use crate::client::types::{SyncError, SyncEvent};
use crate::normalize::DEFAULT_ADB_PORT;
use crate::notify::NotificationCenter;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Period of the elapsed-time display refresh.
pub const ELAPSED_TICK: Duration = Duration::from_millis(1000);

// ── Elapsed time ────────────────────────────────────────────────────────────

/// Parse a `started_at` value. Offset-less timestamps are taken in the local
/// offset, falling back to UTC when the local offset cannot be determined.
pub fn parse_started_at(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(at);
    }
    if let Ok(at) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Some(at);
    }
    let naive = PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT).ok()?;
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    Some(naive.assume_offset(offset))
}

/// Wall-clock time since `started`, clamped at zero.
pub fn elapsed_since(started: OffsetDateTime) -> Duration {
    Duration::try_from(OffsetDateTime::now_utc() - started).unwrap_or(Duration::ZERO)
}

/// `MM:SS`, or `H:MM:SS` from one hour on.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

// ── Tracker ─────────────────────────────────────────────────────────────────

struct Ticker {
    started_at: String,
    handle: tokio::task::AbortHandle,
}

/// Drives the elapsed-time display from observed recording statuses.
///
/// A tick task runs only while the status is active with a parseable
/// `started_at`; any other status stops it.
pub struct RecordingTracker {
    events: async_channel::Sender<SyncEvent>,
    runtime: tokio::runtime::Handle,
    ticker: Mutex<Option<Ticker>>,
}

impl RecordingTracker {
    pub fn new(events: async_channel::Sender<SyncEvent>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            events,
            runtime,
            ticker: Mutex::new(None),
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.lock().is_some()
    }

    pub fn observe(&self, status: &RecordingStatus) {
        let started = status
            .started_at
            .as_deref()
            .filter(|_| status.active)
            .and_then(|raw| parse_started_at(raw).map(|at| (raw, at)));

        let Some((raw, started)) = started else {
            self.stop();
            return;
        };

        let mut ticker = self.ticker.lock();
        if ticker.as_ref().is_some_and(|t| t.started_at == raw) {
            return;
        }
        if let Some(previous) = ticker.take() {
            previous.handle.abort();
        }

        // Wall-clock offset at observation plus monotonic time since then.
        let offset = elapsed_since(started);
        let base = tokio::time::Instant::now();
        let events = self.events.clone();
        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(ELAPSED_TICK);
            loop {
                interval.tick().await;
                let elapsed = format_elapsed(offset + base.elapsed());
                if events
                    .send(SyncEvent::RecordingElapsed(Some(elapsed)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        log::debug!("Recording timer started for {}", raw);
        *ticker = Some(Ticker {
            started_at: raw.to_string(),
            handle: task.abort_handle(),
        });
    }

    pub fn stop(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.handle.abort();
            log::debug!("Recording timer stopped");
            let _ = self.events.try_send(SyncEvent::RecordingElapsed(None));
        }
    }
}

impl Drop for RecordingTracker {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.handle.abort();
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

const RECORDING_STARTED: &str = "Recording started";
const RECORDING_FAILED: &str = "Recording failed";
const RECORDING_STOPPED: &str = "Recording stopped";
const RECORDING_STOP_FAILED: &str = "Failed to stop recording";

/// Start and stop commands for the recording job.
pub struct RecordingControl {
    api: Arc<dyn SessionApi>,
    store: SyncStore,
    events: async_channel::Sender<SyncEvent>,
    notifications: NotificationCenter,
    reconciler: Reconciler,
    busy: BusyFlag,
}

impl RecordingControl {
    pub fn new(
        api: Arc<dyn SessionApi>,
        store: SyncStore,
        events: async_channel::Sender<SyncEvent>,
        notifications: NotificationCenter,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            api,
            store,
            events,
            notifications,
            reconciler,
            busy: BusyFlag::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_set()
    }

    /// Default request for the current session, seeded from the recording
    /// defaults published at bootstrap.
    pub fn default_request(&self) -> RecordingRequest {
        self.store.read(|s| {
            s.config
                .as_ref()
                .map(|c| RecordingRequest::from_defaults(&c.recording))
                .unwrap_or_default()
        })
    }

    /// Start recording. Does nothing while a recording is already active.
    ///
    /// With automatic connection selection enabled and no explicit
    /// `connection`, the backend's recommendation fills in serial and
    /// connection before the request is sent.
    pub async fn start(&self, request: &RecordingRequest) -> Result<(), SyncError> {
        if self.store.read(|s| s.recording.active) {
            log::debug!("Recording already active, ignoring start");
            return Ok(());
        }
        let result = {
            let _busy = self.busy.acquire()?;
            let request = self.resolve_connection(request).await;
            self.send_start(&request).await
        };
        let _ = self.reconciler.pull_recording().await;
        result
    }

    async fn resolve_connection(&self, request: &RecordingRequest) -> RecordingRequest {
        let mut resolved = request.clone();
        let explicit = request.connection.as_deref().is_some_and(|c| !c.is_empty());
        let auto = self
            .store
            .read(|s| s.config.as_ref().is_some_and(|c| c.auto_connection));
        if explicit || !auto {
            return resolved;
        }

        let serial = request.serial.as_deref().filter(|s| !s.is_empty());
        let recommended = match self.api.auto_switch(serial, DEFAULT_ADB_PORT).await {
            Ok(resp) if resp.success => resp.recommended,
            Ok(resp) => {
                log::debug!("No connection recommendation: {:?}", resp.error);
                None
            }
            Err(e) => {
                log::warn!("Connection auto-switch failed: {}", e);
                None
            }
        };
        let Some(recommended) = recommended else {
            return resolved;
        };

        resolved.serial = recommended
            .serial
            .filter(|s| !s.is_empty())
            .or(resolved.serial);
        if resolved.serial.is_none() {
            resolved.connection = recommended.connection_type.filter(|t| !t.is_empty());
        }
        log::debug!(
            "Recording connection resolved to {:?} ({:?})",
            resolved.serial,
            resolved.connection
        );
        resolved
    }

    async fn send_start(&self, request: &RecordingRequest) -> Result<(), SyncError> {
        match self.api.start_recording(request).await {
            Ok(resp) if resp.success => {
                log::info!("Recording started: {:?}", resp.output_path);
                self.notifications.success(RECORDING_STARTED);
                let _ = self
                    .events
                    .send(SyncEvent::RecordingUpdated(optimistic_status(resp)))
                    .await;
                Ok(())
            }
            Ok(resp) => {
                let message = resp
                    .detail
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| RECORDING_FAILED.to_string());
                log::warn!("Recording start rejected: {}", message);
                self.notifications.error(message.clone());
                Err(SyncError::Rejected(message))
            }
            Err(e) => {
                log::warn!("Recording start failed: {}", e);
                self.notifications
                    .error(e.server_message().unwrap_or(RECORDING_FAILED));
                Err(e)
            }
        }
    }

    pub async fn stop(&self) -> Result<(), SyncError> {
        let result = {
            let _busy = self.busy.acquire()?;
            self.send_stop().await
        };
        let _ = self.reconciler.pull_recording().await;
        result
    }

    async fn send_stop(&self) -> Result<(), SyncError> {
        match self.api.stop_recording().await {
            Ok(resp) if resp.success => {
                log::info!("Recording stopped");
                self.notifications.success(RECORDING_STOPPED);
                Ok(())
            }
            Ok(resp) => {
                let message = resp
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| RECORDING_STOP_FAILED.to_string());
                self.notifications.error(message.clone());
                Err(SyncError::Rejected(message))
            }
            Err(e) => {
                log::warn!("Recording stop failed: {}", e);
                self.notifications.error(RECORDING_STOP_FAILED);
                Err(e)
            }
        }
    }
}

fn optimistic_status(resp: StartRecordingResponse) -> RecordingStatus {
    RecordingStatus {
        active: true,
        pid: resp.pid,
        started_at: resp.started_at,
        output_path: resp.output_path,
        settings: resp.settings.unwrap_or_default(),
        last_error: None,
    }
}
