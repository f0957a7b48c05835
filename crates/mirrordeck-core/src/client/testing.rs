//! In-memory fakes for the transport seams.

use crate::api::{
    AutoSwitchResponse, CommandResponse, DevicesResponse, FileEntry, FileListResponse,
    PresetsResponse, ReadFileResponse, RecordingRequest, RecordingStatus, StartRecordingResponse,
};
use crate::client::transport::{PushConnector, PushStream, SessionApi, UploadFile};
use crate::client::types::{SyncError, SyncEvent};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub fn ok() -> CommandResponse {
    CommandResponse {
        success: true,
        ..Default::default()
    }
}

pub fn rejected(error: &str) -> CommandResponse {
    CommandResponse {
        success: false,
        error: Some(error.to_string()),
        ..Default::default()
    }
}

pub fn entry(name: &str, path: &str, is_dir: bool) -> FileEntry {
    FileEntry {
        name: name.to_string(),
        path: path.to_string(),
        is_dir,
        size: 0,
        permissions: None,
        date: None,
    }
}

/// How the fake answers `get_config`.
pub enum ConfigReply {
    Ok(serde_json::Value),
    Fail,
    /// Never answers; exercises the per-attempt timeout
    Hang,
}

/// Scriptable `SessionApi`. Every call is appended to `calls` as a short
/// human-readable line.
pub struct FakeApi {
    pub calls: Mutex<Vec<String>>,
    pub config_replies: Mutex<VecDeque<ConfigReply>>,
    pub devices: Mutex<Option<serde_json::Value>>,
    pub recording: Mutex<Option<RecordingStatus>>,
    pub start_reply: Mutex<Result<StartRecordingResponse, SyncError>>,
    pub command_reply: Mutex<Result<CommandResponse, SyncError>>,
    pub listings: Mutex<HashMap<String, FileListResponse>>,
    pub failing_uploads: Mutex<HashSet<String>>,
    /// Delay applied to every mutating call
    pub latency: Mutex<Duration>,
    pub device_pulls: AtomicUsize,
    pub recording_pulls: AtomicUsize,
    /// Number of upcoming device pulls that never answer
    pub hang_device_pulls: AtomicUsize,
    /// Number of upcoming recording pulls that never answer
    pub hang_recording_pulls: AtomicUsize,
    pub auto_switch_reply: Mutex<Result<AutoSwitchResponse, SyncError>>,
    /// Body of the most recent start request
    pub last_start: Mutex<Option<RecordingRequest>>,
    /// Server-side preset list as `(name, bitrate, maxsize)`
    pub presets: Mutex<Vec<(String, String, String)>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            config_replies: Mutex::new(VecDeque::new()),
            devices: Mutex::new(None),
            recording: Mutex::new(Some(RecordingStatus::default())),
            start_reply: Mutex::new(Ok(StartRecordingResponse::default())),
            command_reply: Mutex::new(Ok(ok())),
            listings: Mutex::new(HashMap::new()),
            failing_uploads: Mutex::new(HashSet::new()),
            latency: Mutex::new(Duration::ZERO),
            device_pulls: AtomicUsize::new(0),
            recording_pulls: AtomicUsize::new(0),
            hang_device_pulls: AtomicUsize::new(0),
            hang_recording_pulls: AtomicUsize::new(0),
            auto_switch_reply: Mutex::new(Ok(AutoSwitchResponse::default())),
            last_start: Mutex::new(None),
            presets: Mutex::new(Vec::new()),
        }
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_devices(&self, payload: serde_json::Value) {
        *self.devices.lock() = Some(payload);
    }

    pub fn set_recording(&self, status: RecordingStatus) {
        *self.recording.lock() = Some(status);
    }

    pub fn set_listing(&self, path: &str, files: Vec<FileEntry>) {
        let response = FileListResponse {
            total_count: Some(files.len() as u64),
            files,
            ..Default::default()
        };
        self.listings.lock().insert(path.to_string(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn presets_reply(&self) -> PresetsResponse {
        let presets = self
            .presets
            .lock()
            .iter()
            .map(|(name, bitrate, maxsize)| {
                serde_json::json!({"name": name, "bitrate": bitrate, "maxsize": maxsize})
            })
            .collect();
        PresetsResponse {
            success: true,
            presets: serde_json::Value::Array(presets),
            ..Default::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    async fn mutate(&self, call: String) -> Result<CommandResponse, SyncError> {
        self.record(call);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.command_reply.lock().clone()
    }
}

#[async_trait]
impl SessionApi for FakeApi {
    async fn get_config(&self) -> Result<serde_json::Value, SyncError> {
        self.record("config".to_string());
        let reply = self.config_replies.lock().pop_front();
        match reply {
            Some(ConfigReply::Ok(value)) => Ok(value),
            Some(ConfigReply::Hang) => futures::future::pending().await,
            Some(ConfigReply::Fail) | None => Err(SyncError::Transport("connection refused".into())),
        }
    }

    async fn get_devices(&self) -> Result<DevicesResponse, SyncError> {
        self.device_pulls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.hang_device_pulls) {
            return futures::future::pending().await;
        }
        let payload = self.devices.lock().clone();
        match payload {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| SyncError::Decode(e.to_string()))
            }
            None => Err(SyncError::Transport("connection refused".into())),
        }
    }

    async fn get_recording_status(&self) -> Result<RecordingStatus, SyncError> {
        self.recording_pulls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.hang_recording_pulls) {
            return futures::future::pending().await;
        }
        let status = self.recording.lock().clone();
        status.ok_or_else(|| SyncError::Http {
            status: 503,
            message: None,
        })
    }

    async fn start_recording(
        &self,
        request: &RecordingRequest,
    ) -> Result<StartRecordingResponse, SyncError> {
        self.record(format!("recording start {}", request.format));
        *self.last_start.lock() = Some(request.clone());
        self.start_reply.lock().clone()
    }

    async fn stop_recording(&self) -> Result<CommandResponse, SyncError> {
        self.mutate("recording stop".to_string()).await
    }

    async fn connect(&self, address: &str) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("connect {}", address)).await
    }

    async fn disconnect(&self, address: &str) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("disconnect {}", address)).await
    }

    async fn pair(&self, address: &str, code: &str) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("pair {} {}", address, code)).await
    }

    async fn tcpip(&self, port: &str) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("tcpip {}", port)).await
    }

    async fn save_device(
        &self,
        name: &str,
        ip: &str,
        port: &str,
    ) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("save {} {}:{}", name, ip, port)).await
    }

    async fn delete_saved(&self, ip: &str, port: &str) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("forget {}:{}", ip, port)).await
    }

    async fn auto_switch(
        &self,
        serial: Option<&str>,
        port: &str,
    ) -> Result<AutoSwitchResponse, SyncError> {
        self.record(format!("auto-switch {} {}", serial.unwrap_or("-"), port));
        self.auto_switch_reply.lock().clone()
    }

    async fn save_preset(
        &self,
        name: &str,
        bitrate: &str,
        maxsize: &str,
    ) -> Result<PresetsResponse, SyncError> {
        self.mutate(format!("preset save {} {} {}", name, bitrate, maxsize))
            .await?;
        {
            let mut presets = self.presets.lock();
            let entry = (name.to_string(), bitrate.to_string(), maxsize.to_string());
            match presets
                .iter_mut()
                .find(|(existing, _, _)| existing.eq_ignore_ascii_case(name))
            {
                Some(slot) => *slot = entry,
                None => presets.push(entry),
            }
        }
        Ok(self.presets_reply())
    }

    async fn delete_preset(&self, name: &str) -> Result<PresetsResponse, SyncError> {
        self.mutate(format!("preset delete {}", name)).await?;
        self.presets
            .lock()
            .retain(|(existing, _, _)| !existing.eq_ignore_ascii_case(name));
        Ok(self.presets_reply())
    }

    async fn list_files(
        &self,
        serial: &str,
        path: &str,
        page: u32,
        page_size: u32,
    ) -> Result<FileListResponse, SyncError> {
        self.record(format!("list {} {} {} @{}", path, page, page_size, serial));
        self.listings
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::Http {
                status: 404,
                message: Some(format!("Path not found: {}", path)),
            })
    }

    async fn read_file(&self, serial: &str, path: &str) -> Result<ReadFileResponse, SyncError> {
        self.record(format!("read {} @{}", path, serial));
        Ok(ReadFileResponse {
            content: format!("contents of {}", path),
            truncated: false,
            is_binary: false,
        })
    }

    async fn mkdir(&self, serial: &str, path: &str) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("mkdir {} @{}", path, serial)).await
    }

    async fn delete(&self, serial: &str, path: &str) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("delete {} @{}", path, serial)).await
    }

    async fn move_entry(
        &self,
        serial: &str,
        source: &str,
        destination: &str,
    ) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("move {} -> {} @{}", source, destination, serial))
            .await
    }

    async fn write_file(
        &self,
        serial: &str,
        path: &str,
        content: &str,
    ) -> Result<CommandResponse, SyncError> {
        self.mutate(format!("write {} ({} bytes) @{}", path, content.len(), serial))
            .await
    }

    async fn upload(
        &self,
        serial: &str,
        destination: &str,
        file: UploadFile,
    ) -> Result<CommandResponse, SyncError> {
        let fails = self.failing_uploads.lock().contains(&file.name);
        self.mutate(format!("upload {} -> {} @{}", file.name, destination, serial))
            .await?;
        if fails {
            Ok(rejected("No space left on device"))
        } else {
            Ok(ok())
        }
    }
}

/// How the fake push server answers one connection attempt.
pub enum PushSession {
    Refuse,
    /// Deliver the frames, then close
    Frames(Vec<String>),
    /// Deliver the frames, then stay open
    FramesThenHang(Vec<String>),
}

#[derive(Default)]
pub struct FakeConnector {
    pub sessions: Mutex<VecDeque<PushSession>>,
    pub attempts: Mutex<Vec<Instant>>,
}

impl FakeConnector {
    pub fn new(sessions: Vec<PushSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl PushConnector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<PushStream, SyncError> {
        self.attempts.lock().push(Instant::now());
        let session = self.sessions.lock().pop_front();
        match session {
            None | Some(PushSession::Refuse) => {
                Err(SyncError::Transport("connection refused".into()))
            }
            Some(PushSession::Frames(frames)) => {
                Ok(futures::stream::iter(frames.into_iter().map(Ok)).boxed())
            }
            Some(PushSession::FramesThenHang(frames)) => Ok(futures::stream::iter(
                frames.into_iter().map(Ok),
            )
            .chain(futures::stream::pending())
            .boxed()),
        }
    }
}

/// Decrement `counter` if it is non-zero.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Drain every event currently queued without waiting.
pub fn drain(rx: &async_channel::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
