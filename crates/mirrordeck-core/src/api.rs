use serde::{Deserialize, Serialize};

// ── Normalized records ──────────────────────────────────────────────────────

/// A connected device as reported by the backend. Identity is `serial`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub status: String,
}

/// A device address persisted on the backend. Identity is `(ip, port)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDevice {
    pub ip: String,
    pub port: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
}

impl SavedDevice {
    /// `ip:port`, the form accepted by the connect endpoint.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Mirroring preset published in the session config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub bitrate: String,
    pub maxsize: String,
}

/// Recording defaults published in the session config. Every field is
/// optional; absent fields keep whatever the caller already had.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingDefaults {
    pub format: Option<String>,
    pub audio_source: Option<String>,
    pub output_dir: Option<String>,
    pub file_prefix: Option<String>,
    pub show_preview: Option<bool>,
    pub stay_awake: Option<bool>,
    pub show_touches: Option<bool>,
    pub turn_screen_off: Option<bool>,
}

/// Result of a successful bootstrap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub language: String,
    pub languages: Vec<String>,
    pub version: String,
    pub presets: Vec<Preset>,
    pub logs_export_dir: String,
    pub downloads_base_dir: String,
    /// `connection_optimizer.auto_switch`
    pub auto_connection: bool,
    pub recording: RecordingDefaults,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            languages: vec!["en".to_string()],
            version: String::new(),
            presets: Vec::new(),
            logs_export_dir: String::new(),
            downloads_base_dir: String::new(),
            auto_connection: false,
            recording: RecordingDefaults::default(),
        }
    }
}

// ── API request/response types ──────────────────────────────────────────────

/// GET /api/devices response.
///
/// Both lists stay untyped here; the normalizer turns them into
/// `Device`/`SavedDevice` records and drops anything malformed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub connected: serde_json::Value,
    #[serde(default)]
    pub saved: serde_json::Value,
}

/// Settings echoed by the recording endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_preview: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

/// Last failure of the recording process, kept by the backend until the
/// next recording starts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// GET /api/recording/status response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(flatten)]
    pub settings: RecordingSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RecordingError>,
}

/// POST /api/recording/start request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRequest {
    pub bitrate: String,
    pub maxsize: String,
    pub keyboard: String,
    pub format: String,
    pub audio_source: String,
    pub show_preview: bool,
    pub stay_awake: bool,
    pub show_touches: bool,
    pub turn_screen_off: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl Default for RecordingRequest {
    fn default() -> Self {
        Self {
            bitrate: "8M".to_string(),
            maxsize: String::new(),
            keyboard: "uhid".to_string(),
            format: "mp4".to_string(),
            audio_source: "output".to_string(),
            show_preview: false,
            stay_awake: false,
            show_touches: false,
            turn_screen_off: false,
            output_dir: None,
            file_prefix: None,
            connection: None,
            serial: None,
        }
    }
}

impl RecordingRequest {
    /// Seed a request from the defaults published at bootstrap.
    pub fn from_defaults(defaults: &RecordingDefaults) -> Self {
        let mut request = Self::default();
        if let Some(format) = non_empty(&defaults.format) {
            request.format = format;
        }
        if let Some(source) = non_empty(&defaults.audio_source) {
            request.audio_source = source;
        }
        request.output_dir = non_empty(&defaults.output_dir);
        request.file_prefix = non_empty(&defaults.file_prefix);
        request.show_preview = defaults.show_preview.unwrap_or(request.show_preview);
        request.stay_awake = defaults.stay_awake.unwrap_or(request.stay_awake);
        request.show_touches = defaults.show_touches.unwrap_or(request.show_touches);
        request.turn_screen_off = defaults.turn_screen_off.unwrap_or(request.turn_screen_off);
        request
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// POST /api/recording/start response
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StartRecordingResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub settings: Option<RecordingSettings>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Generic `{success, ...}` response shared by device commands, recording
/// stop and every filesystem mutation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub success: bool,
    /// Device IP returned by the tcpip endpoint
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CommandResponse {
    /// Server-provided failure text: `detail`, then `error`, then `message`.
    pub fn error_text(&self) -> Option<&str> {
        [&self.detail, &self.error, &self.message]
            .into_iter()
            .find_map(|v| v.as_deref())
    }
}

/// Extract the failure text from an arbitrary JSON error body.
pub fn error_text_from_value(value: &serde_json::Value) -> Option<String> {
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// POST /api/connect and /api/disconnect request body
#[derive(Debug, Serialize)]
pub struct AddressRequest<'a> {
    pub address: &'a str,
}

/// POST /api/pair request body
#[derive(Debug, Serialize)]
pub struct PairRequest<'a> {
    pub pair_address: &'a str,
    pub pair_code: &'a str,
}

/// POST /api/tcpip request body
#[derive(Debug, Serialize)]
pub struct TcpipRequest<'a> {
    pub port: &'a str,
}

/// POST /api/devices/save request body
#[derive(Debug, Serialize)]
pub struct SaveDeviceRequest<'a> {
    pub name: &'a str,
    pub ip: &'a str,
    pub port: &'a str,
}

/// POST /api/connection/auto-switch request body
#[derive(Debug, Serialize)]
pub struct AutoSwitchRequest<'a> {
    pub serial: Option<&'a str>,
    pub port: &'a str,
}

/// Connection the backend recommends for a device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionRecommendation {
    #[serde(default)]
    pub serial: Option<String>,
    /// `usb` or `wifi`
    #[serde(default, rename = "type")]
    pub connection_type: Option<String>,
}

/// POST /api/connection/auto-switch response
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AutoSwitchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub recommended: Option<ConnectionRecommendation>,
    #[serde(default)]
    pub error: Option<String>,
}

/// POST /api/presets request body
#[derive(Debug, Serialize)]
pub struct PresetRequest<'a> {
    pub name: &'a str,
    pub bitrate: &'a str,
    pub maxsize: &'a str,
}

/// Response of both preset endpoints: the full list after the change.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PresetsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub presets: serde_json::Value,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ── Files ───────────────────────────────────────────────────────────────────

/// One entry of a remote directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// GET /api/files/list response. Pagination fields are optional; missing
/// ones are derived by the filesystem session.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// GET /api/files/read response
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReadFileResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub is_binary: bool,
}

/// POST /api/files/mkdir request body
#[derive(Debug, Serialize)]
pub struct PathRequest<'a> {
    pub path: &'a str,
}

/// POST /api/files/move request body
#[derive(Debug, Serialize)]
pub struct MoveRequest<'a> {
    pub source: &'a str,
    pub destination: &'a str,
}

/// POST /api/files/write request body
#[derive(Debug, Serialize)]
pub struct WriteRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_status_parses_flattened_settings_and_error() {
        let json = r#"{
            "active": false,
            "format": "mkv",
            "serial": "abc",
            "last_error": {"exit_code": 1, "output": "disk full", "timestamp": "T1"}
        }"#;
        let status: RecordingStatus = serde_json::from_str(json).unwrap();
        assert!(!status.active);
        assert_eq!(status.settings.format.as_deref(), Some("mkv"));
        assert_eq!(status.settings.serial.as_deref(), Some("abc"));
        let err = status.last_error.unwrap();
        assert_eq!(err.exit_code, Some(1));
        assert_eq!(err.output.as_deref(), Some("disk full"));
    }

    #[test]
    fn empty_object_is_idle_recording() {
        let status: RecordingStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status, RecordingStatus::default());
    }

    #[test]
    fn command_response_error_text_precedence() {
        let resp: CommandResponse =
            serde_json::from_str(r#"{"success": false, "error": "e", "message": "m"}"#).unwrap();
        assert_eq!(resp.error_text(), Some("e"));

        let resp: CommandResponse =
            serde_json::from_str(r#"{"detail": "d", "error": "e"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error_text(), Some("d"));
    }

    #[test]
    fn error_text_from_value_ignores_non_strings() {
        let value = serde_json::json!({"detail": 42, "message": "busy"});
        assert_eq!(error_text_from_value(&value).as_deref(), Some("busy"));
        assert_eq!(error_text_from_value(&serde_json::json!([])), None);
    }

    #[test]
    fn recording_request_seeded_from_defaults() {
        let defaults = RecordingDefaults {
            format: Some("mkv".into()),
            output_dir: Some("  ".into()),
            file_prefix: Some("clip".into()),
            show_touches: Some(true),
            ..Default::default()
        };
        let request = RecordingRequest::from_defaults(&defaults);
        assert_eq!(request.format, "mkv");
        assert_eq!(request.audio_source, "output");
        assert_eq!(request.output_dir, None);
        assert_eq!(request.file_prefix.as_deref(), Some("clip"));
        assert!(request.show_touches);

        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("output_dir").is_none());
        assert!(body.get("serial").is_none());
    }

    #[test]
    fn auto_switch_response_reads_recommendation_type() {
        let json = r#"{"success": true, "recommended": {"serial": "10.0.0.2:5555", "type": "wifi"}}"#;
        let resp: AutoSwitchResponse = serde_json::from_str(json).unwrap();
        let rec = resp.recommended.unwrap();
        assert_eq!(rec.serial.as_deref(), Some("10.0.0.2:5555"));
        assert_eq!(rec.connection_type.as_deref(), Some("wifi"));

        let body = serde_json::to_value(AutoSwitchRequest {
            serial: None,
            port: "5555",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"serial": null, "port": "5555"}));
    }

    #[test]
    fn file_list_response_tolerates_missing_pagination() {
        let json = r#"{"files": [{"name": "DCIM", "path": "/sdcard/DCIM", "is_dir": true}]}"#;
        let resp: FileListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.files.len(), 1);
        assert_eq!(resp.files[0].size, 0);
        assert!(resp.total_pages.is_none());
    }
}
