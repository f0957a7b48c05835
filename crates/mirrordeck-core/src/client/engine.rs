use crate::api::SessionConfig;
use crate::client::bootstrap::Bootstrapper;
use crate::client::channel::LiveChannel;
use crate::client::config::EngineConfig;
use crate::client::devices::DeviceCommands;
use crate::client::files::FileSession;
use crate::client::poller::Reconciler;
use crate::client::presets::PresetCommands;
use crate::client::recording::{RecordingControl, RecordingTracker};
use crate::client::state::{SyncState, SyncStore};
use crate::client::transport::{HttpApi, PushConnector, SessionApi, WsConnector};
use crate::client::types::{BootPhase, SyncError, SyncEvent};
use crate::notify::NotificationCenter;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// The synchronization engine for one backend.
///
/// Background components report through a single event channel; one apply
/// task folds those events into the `SyncStore`, so the snapshot is only
/// ever written from one place. Commands are exposed through `devices()`,
/// `presets()`, `recording()` and `files()`.
pub struct SyncEngine {
    config: EngineConfig,
    store: SyncStore,
    notifications: NotificationCenter,
    bootstrapper: Bootstrapper,
    channel: LiveChannel,
    reconciler: Reconciler,
    tracker: Arc<RecordingTracker>,
    recording: RecordingControl,
    devices: DeviceCommands,
    presets: PresetCommands,
    files: FileSession,
    apply_task: Mutex<Option<tokio::task::AbortHandle>>,
}

impl SyncEngine {
    pub fn new(
        config: EngineConfig,
        api: Arc<dyn SessionApi>,
        connector: Arc<dyn PushConnector>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let (event_tx, event_rx) = async_channel::unbounded();
        let store = SyncStore::new();
        let notifications = NotificationCenter::new();

        let bootstrapper = Bootstrapper::new(api.clone(), event_tx.clone());
        let channel = LiveChannel::new(
            connector,
            config.push_url.clone(),
            event_tx.clone(),
            runtime.clone(),
        );
        let reconciler = Reconciler::new(
            api.clone(),
            event_tx.clone(),
            notifications.clone(),
            runtime.clone(),
        );
        let tracker = Arc::new(RecordingTracker::new(event_tx.clone(), runtime.clone()));
        let recording = RecordingControl::new(
            api.clone(),
            store.clone(),
            event_tx.clone(),
            notifications.clone(),
            reconciler.clone(),
        );
        let presets = PresetCommands::new(api.clone(), event_tx, notifications.clone());
        let devices = DeviceCommands::new(api.clone(), notifications.clone(), reconciler.clone());
        let files = FileSession::new(
            api,
            store.clone(),
            notifications.clone(),
            &config.files_root,
            config.files_page_size,
        );

        let apply = runtime.spawn(apply_loop(event_rx, store.clone(), tracker.clone()));

        Self {
            config,
            store,
            notifications,
            bootstrapper,
            channel,
            reconciler,
            tracker,
            recording,
            devices,
            presets,
            files,
            apply_task: Mutex::new(Some(apply.abort_handle())),
        }
    }

    /// Engine over the real HTTP and WebSocket transports.
    pub fn connect(
        config: EngineConfig,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self, SyncError> {
        let api = Arc::new(HttpApi::new(&config.base_url)?);
        let connector = Arc::new(WsConnector);
        Ok(Self::new(config, api, connector, runtime))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> BootPhase {
        self.bootstrapper.phase()
    }

    /// Fetch the session configuration, then start live updates and
    /// polling.
    pub async fn boot(&self) -> Result<SessionConfig, SyncError> {
        log::info!("Booting session against {}", self.config.base_url);
        let config = self.bootstrapper.boot().await?;
        self.start()?;
        Ok(config)
    }

    /// Restart the handshake after it timed out.
    pub async fn retry_boot(&self) -> Result<SessionConfig, SyncError> {
        log::info!("Retrying session boot against {}", self.config.base_url);
        let config = self.bootstrapper.retry().await?;
        self.start()?;
        Ok(config)
    }

    /// Start the push channel and both polling loops. Requires a completed
    /// boot.
    pub fn start(&self) -> Result<(), SyncError> {
        if !self.phase().is_ready() {
            return Err(SyncError::NotReady);
        }
        if self.apply_task.lock().is_none() {
            return Err(SyncError::Closed);
        }
        self.channel.start();
        self.reconciler.start();
        Ok(())
    }

    /// Stop every background loop. The snapshot keeps its last values.
    pub fn stop(&self) {
        self.channel.stop();
        self.reconciler.stop();
        self.tracker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.channel.is_running() || self.reconciler.is_running()
    }

    pub fn snapshot(&self) -> SyncState {
        self.store.snapshot()
    }

    pub fn store(&self) -> &SyncStore {
        &self.store
    }

    /// Version counter that bumps on every applied event.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn devices(&self) -> &DeviceCommands {
        &self.devices
    }

    pub fn presets(&self) -> &PresetCommands {
        &self.presets
    }

    pub fn recording(&self) -> &RecordingControl {
        &self.recording
    }

    pub fn files(&self) -> &FileSession {
        &self.files
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
        self.files.close();
        if let Some(handle) = self.apply_task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn apply_loop(
    events: async_channel::Receiver<SyncEvent>,
    store: SyncStore,
    tracker: Arc<RecordingTracker>,
) {
    while let Ok(event) = events.recv().await {
        let observed = match &event {
            SyncEvent::RecordingUpdated(status) => Some(status.clone()),
            _ => None,
        };
        store.apply(event);
        if let Some(status) = observed {
            tracker.observe(&status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RecordingStatus;
    use crate::client::testing::{ConfigReply, FakeApi, FakeConnector, PushSession};
    use crate::client::types::ChannelStatus;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn engine(api: Arc<FakeApi>, connector: Arc<FakeConnector>) -> SyncEngine {
        SyncEngine::new(
            EngineConfig::default(),
            api,
            connector,
            tokio::runtime::Handle::current(),
        )
    }

    fn config_reply() -> ConfigReply {
        ConfigReply::Ok(json!({"language": "de", "version": "1.4.0"}))
    }

    #[tokio::test(start_paused = true)]
    async fn boot_starts_push_and_polling() {
        let api = Arc::new(FakeApi::new());
        api.config_replies.lock().push_back(config_reply());
        api.set_devices(json!({
            "connected": [{"serial": "abc", "status": "device"}],
            "saved": [{"ip": "10.0.0.2", "port": "5555", "name": "Tablet"}],
        }));
        let connector = Arc::new(FakeConnector::new(vec![PushSession::FramesThenHang(vec![
            r#"{"type":"devices_update","devices":[{"serial":"abc","status":"device"}]}"#.into(),
        ])]));
        let engine = engine(api.clone(), connector.clone());
        let versions = engine.subscribe();

        let config = engine.boot().await.unwrap();
        assert_eq!(config.language, "de");
        assert!(engine.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(versions.has_changed().unwrap());

        let state = engine.snapshot();
        assert_eq!(state.boot, BootPhase::Ready);
        assert_eq!(state.config.as_ref().map(|c| c.version.as_str()), Some("1.4.0"));
        assert_eq!(state.channel, ChannelStatus::Open);
        assert_eq!(state.devices.len(), 1);
        assert_eq!(state.saved_devices.len(), 1);
        assert!(!state.devices_loading);
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_requires_ready_session() {
        let engine = engine(Arc::new(FakeApi::new()), Arc::new(FakeConnector::default()));
        assert_eq!(engine.start(), Err(SyncError::NotReady));
        assert!(!engine.is_running());
        assert_eq!(
            engine.retry_boot().await.unwrap_err(),
            SyncError::InvalidInput("retry is only possible after boot timed out".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_boot_can_be_retried() {
        let api = Arc::new(FakeApi::new());
        api.set_devices(json!({"connected": [], "saved": []}));
        let engine = engine(api.clone(), Arc::new(FakeConnector::default()));

        assert_eq!(engine.boot().await.unwrap_err(), SyncError::Timeout);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.snapshot().boot, BootPhase::TimedOut);
        assert!(!engine.is_running());

        api.config_replies.lock().push_back(config_reply());
        engine.retry_boot().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.snapshot().boot, BootPhase::Ready);
        assert!(engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn recording_status_drives_elapsed_display() {
        let api = Arc::new(FakeApi::new());
        api.config_replies.lock().push_back(config_reply());
        api.set_devices(json!({"connected": [], "saved": []}));
        api.set_recording(RecordingStatus {
            active: true,
            started_at: Some("2024-05-01T10:00:00Z".into()),
            ..Default::default()
        });
        let engine = engine(api.clone(), Arc::new(FakeConnector::default()));
        engine.boot().await.unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let state = engine.snapshot();
        assert!(state.recording.active);
        assert!(state.recording_elapsed.is_some());

        api.set_recording(RecordingStatus::default());
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        let state = engine.snapshot();
        assert!(!state.recording.active);
        assert_eq!(state.recording_elapsed, None);
    }

    #[tokio::test(start_paused = true)]
    async fn preset_edits_replace_session_presets() {
        let api = Arc::new(FakeApi::new());
        api.config_replies.lock().push_back(ConfigReply::Ok(json!({
            "presets": [{"name": "HD", "bitrate": "8M", "maxsize": 1920}],
        })));
        api.set_devices(json!({"connected": [], "saved": []}));
        api.presets
            .lock()
            .push(("HD".into(), "8M".into(), "1920".into()));
        let engine = engine(api.clone(), Arc::new(FakeConnector::default()));
        engine.boot().await.unwrap();

        engine.presets().save("Low", "2M", "720").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let names = |engine: &SyncEngine| -> Vec<String> {
            engine
                .snapshot()
                .config
                .map(|c| c.presets.into_iter().map(|p| p.name).collect())
                .unwrap_or_default()
        };
        assert_eq!(names(&engine), vec!["HD", "Low"]);

        engine.presets().remove("HD").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(names(&engine), vec!["Low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_background_work() {
        let api = Arc::new(FakeApi::new());
        api.config_replies.lock().push_back(config_reply());
        api.set_devices(json!({"connected": [], "saved": []}));
        let connector = Arc::new(FakeConnector::default());
        let engine = engine(api.clone(), connector.clone());
        engine.boot().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(engine);
        let pulls = api.device_pulls.load(Ordering::SeqCst);
        let attempts = connector.attempt_count();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.device_pulls.load(Ordering::SeqCst), pulls);
        assert_eq!(connector.attempt_count(), attempts);
    }
}
