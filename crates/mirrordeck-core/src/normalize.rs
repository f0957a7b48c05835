//! Coercion of loosely-typed backend payloads into strict local records.
//!
//! Every function here is pure and total: malformed entries are dropped,
//! never defaulted into half-valid records, and the relative order of the
//! surviving entries matches the input.

use crate::api::{Device, Preset, RecordingDefaults, SavedDevice, SessionConfig};
use serde_json::Value;

/// Port assumed for saved devices that do not carry one.
pub const DEFAULT_ADB_PORT: &str = "5555";

const UNKNOWN_STATUS: &str = "unknown";

fn trimmed_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn entries(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Normalize the `connected` list of a devices payload or push frame.
///
/// An entry survives only if it is an object with a non-empty string
/// `serial`. A missing or non-string `status` becomes `"unknown"`.
pub fn normalize_devices(value: &Value) -> Vec<Device> {
    entries(value)
        .iter()
        .filter_map(|item| {
            let record = item.as_object()?;
            let serial = trimmed_str(record.get("serial"))?;
            let status = record
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_STATUS)
                .to_string();
            Some(Device { serial, status })
        })
        .collect()
}

/// Normalize the `saved` list of a devices payload.
///
/// `ip` and `name` are required. `port` may be a string or a number; when it
/// is absent, blank, or of any other type it falls back to 5555.
pub fn normalize_saved_devices(value: &Value) -> Vec<SavedDevice> {
    entries(value)
        .iter()
        .filter_map(|item| {
            let record = item.as_object()?;
            let ip = trimmed_str(record.get("ip"))?;
            let name = trimmed_str(record.get("name"))?;
            let port = match record.get("port") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                _ => DEFAULT_ADB_PORT.to_string(),
            };
            let connection_type = record
                .get("connection_type")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(SavedDevice {
                ip,
                port,
                name,
                connection_type,
            })
        })
        .collect()
}

/// Normalize the `presets` list of the session config.
pub fn normalize_presets(value: &Value) -> Vec<Preset> {
    entries(value)
        .iter()
        .filter_map(|item| {
            let record = item.as_object()?;
            let name = trimmed_str(record.get("name"))?;
            let bitrate = record
                .get("bitrate")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let maxsize = match record.get("maxsize") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            Some(Preset {
                name,
                bitrate,
                maxsize,
            })
        })
        .collect()
}

fn recording_defaults(value: Option<&Value>) -> RecordingDefaults {
    let Some(record) = value.and_then(Value::as_object) else {
        return RecordingDefaults::default();
    };
    let text = |key: &str| record.get(key).and_then(Value::as_str).map(str::to_string);
    let flag = |key: &str| record.get(key).and_then(Value::as_bool);
    RecordingDefaults {
        format: text("format"),
        audio_source: text("audio_source"),
        output_dir: text("output_dir"),
        file_prefix: text("file_prefix"),
        show_preview: flag("show_preview"),
        stay_awake: flag("stay_awake"),
        show_touches: flag("show_touches"),
        turn_screen_off: flag("turn_screen_off"),
    }
}

/// Build a `SessionConfig` from a GET /api/config payload.
///
/// Returns `None` only when the payload is not a JSON object; individual
/// fields fall back to their defaults.
pub fn normalize_config(value: &Value) -> Option<SessionConfig> {
    let record = value.as_object()?;
    let defaults = SessionConfig::default();

    let nested = |section: &str, key: &str| {
        record
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let languages: Vec<String> = entries(record.get("languages").unwrap_or(&Value::Null))
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    Some(SessionConfig {
        language: trimmed_str(record.get("language")).unwrap_or(defaults.language),
        languages: if languages.is_empty() {
            defaults.languages
        } else {
            languages
        },
        version: record
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        presets: normalize_presets(record.get("presets").unwrap_or(&Value::Null)),
        logs_export_dir: nested("logs", "export_dir"),
        downloads_base_dir: nested("downloads", "base_dir"),
        auto_connection: record
            .get("connection_optimizer")
            .and_then(|c| c.get("auto_switch"))
            .is_some_and(is_truthy),
        recording: recording_defaults(record.get("recording")),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
