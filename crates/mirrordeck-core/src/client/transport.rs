use crate::api::{
    AddressRequest, AutoSwitchRequest, AutoSwitchResponse, CommandResponse, DevicesResponse,
    FileListResponse, MoveRequest, PairRequest, PathRequest, PresetRequest, PresetsResponse,
    ReadFileResponse, RecordingRequest, RecordingStatus, SaveDeviceRequest,
    StartRecordingResponse, TcpipRequest, WriteRequest, error_text_from_value,
};
use crate::client::types::SyncError;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_tungstenite::tungstenite;

/// Upper bound for one API request, connect through body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Uploads carry whole files and get a longer bound.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A file picked for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// The backend's HTTP contract.
///
/// Implementations return `Err` for transport failures and non-2xx
/// responses only. A 2xx body with `success: false` is returned as-is; the
/// caller decides how to surface it.
#[async_trait]
pub trait SessionApi: Send + Sync + 'static {
    /// GET /api/config, untyped so the normalizer can coerce it.
    async fn get_config(&self) -> Result<serde_json::Value, SyncError>;
    async fn get_devices(&self) -> Result<DevicesResponse, SyncError>;
    async fn get_recording_status(&self) -> Result<RecordingStatus, SyncError>;
    async fn start_recording(
        &self,
        request: &RecordingRequest,
    ) -> Result<StartRecordingResponse, SyncError>;
    async fn stop_recording(&self) -> Result<CommandResponse, SyncError>;

    async fn connect(&self, address: &str) -> Result<CommandResponse, SyncError>;
    async fn disconnect(&self, address: &str) -> Result<CommandResponse, SyncError>;
    async fn pair(&self, address: &str, code: &str) -> Result<CommandResponse, SyncError>;
    async fn tcpip(&self, port: &str) -> Result<CommandResponse, SyncError>;
    async fn save_device(
        &self,
        name: &str,
        ip: &str,
        port: &str,
    ) -> Result<CommandResponse, SyncError>;
    async fn delete_saved(&self, ip: &str, port: &str) -> Result<CommandResponse, SyncError>;

    /// Ask the backend which connection a recording should use.
    async fn auto_switch(
        &self,
        serial: Option<&str>,
        port: &str,
    ) -> Result<AutoSwitchResponse, SyncError>;
    /// Insert or update a preset by name (case-insensitive).
    async fn save_preset(
        &self,
        name: &str,
        bitrate: &str,
        maxsize: &str,
    ) -> Result<PresetsResponse, SyncError>;
    async fn delete_preset(&self, name: &str) -> Result<PresetsResponse, SyncError>;

    async fn list_files(
        &self,
        serial: &str,
        path: &str,
        page: u32,
        page_size: u32,
    ) -> Result<FileListResponse, SyncError>;
    async fn read_file(&self, serial: &str, path: &str) -> Result<ReadFileResponse, SyncError>;
    async fn mkdir(&self, serial: &str, path: &str) -> Result<CommandResponse, SyncError>;
    async fn delete(&self, serial: &str, path: &str) -> Result<CommandResponse, SyncError>;
    async fn move_entry(
        &self,
        serial: &str,
        source: &str,
        destination: &str,
    ) -> Result<CommandResponse, SyncError>;
    async fn write_file(
        &self,
        serial: &str,
        path: &str,
        content: &str,
    ) -> Result<CommandResponse, SyncError>;
    async fn upload(
        &self,
        serial: &str,
        destination: &str,
        file: UploadFile,
    ) -> Result<CommandResponse, SyncError>;
}

/// Inbound text frames of one push connection. The stream ends when the
/// connection closes.
pub type PushStream = BoxStream<'static, Result<String, SyncError>>;

#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<PushStream, SyncError>;
}

// ── HTTP ────────────────────────────────────────────────────────────────────

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Transport(e.to_string())
    }
}

/// `SessionApi` over reqwest.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SyncError> {
        self.send_within(request, REQUEST_TIMEOUT).await
    }

    async fn send_within<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<T, SyncError> {
        let resp = request
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| error_text_from_value(&v));
            log::debug!("HTTP {} from backend: {:?}", status, message);
            return Err(SyncError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SessionApi for HttpApi {
    async fn get_config(&self) -> Result<serde_json::Value, SyncError> {
        self.send(self.client.get(self.url("/api/config"))).await
    }

    async fn get_devices(&self) -> Result<DevicesResponse, SyncError> {
        self.send(self.client.get(self.url("/api/devices"))).await
    }

    async fn get_recording_status(&self) -> Result<RecordingStatus, SyncError> {
        self.send(self.client.get(self.url("/api/recording/status")))
            .await
    }

    async fn start_recording(
        &self,
        request: &RecordingRequest,
    ) -> Result<StartRecordingResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/recording/start"))
                .json(request),
        )
        .await
    }

    async fn stop_recording(&self) -> Result<CommandResponse, SyncError> {
        self.send(self.client.post(self.url("/api/recording/stop")))
            .await
    }

    async fn connect(&self, address: &str) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/connect"))
                .json(&AddressRequest { address }),
        )
        .await
    }

    async fn disconnect(&self, address: &str) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/disconnect"))
                .json(&AddressRequest { address }),
        )
        .await
    }

    async fn pair(&self, address: &str, code: &str) -> Result<CommandResponse, SyncError> {
        self.send(self.client.post(self.url("/api/pair")).json(&PairRequest {
            pair_address: address,
            pair_code: code,
        }))
        .await
    }

    async fn tcpip(&self, port: &str) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/tcpip"))
                .json(&TcpipRequest { port }),
        )
        .await
    }

    async fn save_device(
        &self,
        name: &str,
        ip: &str,
        port: &str,
    ) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/devices/save"))
                .json(&SaveDeviceRequest { name, ip, port }),
        )
        .await
    }

    async fn delete_saved(&self, ip: &str, port: &str) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .delete(self.url(&format!("/api/devices/{}/{}", ip, port))),
        )
        .await
    }

    async fn auto_switch(
        &self,
        serial: Option<&str>,
        port: &str,
    ) -> Result<AutoSwitchResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/connection/auto-switch"))
                .json(&AutoSwitchRequest { serial, port }),
        )
        .await
    }

    async fn save_preset(
        &self,
        name: &str,
        bitrate: &str,
        maxsize: &str,
    ) -> Result<PresetsResponse, SyncError> {
        self.send(self.client.post(self.url("/api/presets")).json(&PresetRequest {
            name,
            bitrate,
            maxsize,
        }))
        .await
    }

    async fn delete_preset(&self, name: &str) -> Result<PresetsResponse, SyncError> {
        let mut url = reqwest::Url::parse(&self.url("/api/presets"))
            .map_err(|e| SyncError::InvalidInput(format!("Invalid backend URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidInput("Backend URL cannot carry a path".into()))?
            .push(name);
        self.send(self.client.delete(url)).await
    }

    async fn list_files(
        &self,
        serial: &str,
        path: &str,
        page: u32,
        page_size: u32,
    ) -> Result<FileListResponse, SyncError> {
        let page = page.to_string();
        let page_size = page_size.to_string();
        self.send(self.client.get(self.url("/api/files/list")).query(&[
            ("path", path),
            ("page", page.as_str()),
            ("page_size", page_size.as_str()),
            ("serial", serial),
        ]))
        .await
    }

    async fn read_file(&self, serial: &str, path: &str) -> Result<ReadFileResponse, SyncError> {
        self.send(
            self.client
                .get(self.url("/api/files/read"))
                .query(&[("path", path), ("serial", serial)]),
        )
        .await
    }

    async fn mkdir(&self, serial: &str, path: &str) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/files/mkdir"))
                .query(&[("serial", serial)])
                .json(&PathRequest { path }),
        )
        .await
    }

    async fn delete(&self, serial: &str, path: &str) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .delete(self.url("/api/files/delete"))
                .query(&[("path", path), ("serial", serial)]),
        )
        .await
    }

    async fn move_entry(
        &self,
        serial: &str,
        source: &str,
        destination: &str,
    ) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/files/move"))
                .query(&[("serial", serial)])
                .json(&MoveRequest {
                    source,
                    destination,
                }),
        )
        .await
    }

    async fn write_file(
        &self,
        serial: &str,
        path: &str,
        content: &str,
    ) -> Result<CommandResponse, SyncError> {
        self.send(
            self.client
                .post(self.url("/api/files/write"))
                .query(&[("serial", serial)])
                .json(&WriteRequest { path, content }),
        )
        .await
    }

    async fn upload(
        &self,
        serial: &str,
        destination: &str,
        file: UploadFile,
    ) -> Result<CommandResponse, SyncError> {
        let part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.name);
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send_within(
            self.client
                .post(self.url("/api/files/upload"))
                .query(&[("destination", destination), ("serial", serial)])
                .multipart(form),
            UPLOAD_TIMEOUT,
        )
        .await
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────────

/// `PushConnector` over tokio-tungstenite. Only text frames are forwarded;
/// pings, pongs and binary frames are skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<PushStream, SyncError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SyncError::Transport(format!("WebSocket connect failed: {}", e)))?;

        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(tungstenite::Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(_) => None,
                Err(e) => Some(Err(SyncError::Transport(format!(
                    "WebSocket read error: {}",
                    e
                )))),
            }
        });
        Ok(frames.boxed())
    }
}
