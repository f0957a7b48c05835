use mirrordeck_core::client::EngineConfig;
use mirrordeck_core::client::config::{
    DEFAULT_BASE_URL, DEFAULT_FILES_PAGE_SIZE, DEFAULT_FILES_ROOT, DEFAULT_PUSH_PATH,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings schema version - increment when making breaking changes
pub const SETTINGS_VERSION: u32 = 1;

/// Color scheme preference. Persisted only; a headless host never renders it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    Auto,
    Light,
    Dark,
}

/// Local client settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Settings schema version for migration support
    #[serde(default = "default_settings_version")]
    pub version: u32,
    /// HTTP origin of the mirroring backend
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the push channel on the backend
    #[serde(default = "default_push_path")]
    pub push_path: String,
    #[serde(default = "default_files_root")]
    pub files_root: String,
    #[serde(default = "default_files_page_size")]
    pub files_page_size: u32,
    /// Serial the file browser binds to; `None` picks the only connected
    /// device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_device: Option<String>,
    #[serde(default)]
    pub first_run_seen: bool,
    #[serde(default)]
    pub theme_preference: ThemePreference,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            base_url: default_base_url(),
            push_path: default_push_path(),
            files_root: default_files_root(),
            files_page_size: default_files_page_size(),
            preferred_device: None,
            first_run_seen: false,
            theme_preference: ThemePreference::default(),
        }
    }
}

impl Settings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.base_url, &self.push_path)
            .with_files(&self.files_root, self.files_page_size)
    }
}

fn default_settings_version() -> u32 {
    // Files written before versioning
    0
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_push_path() -> String {
    DEFAULT_PUSH_PATH.to_string()
}

fn default_files_root() -> String {
    DEFAULT_FILES_ROOT.to_string()
}

fn default_files_page_size() -> u32 {
    DEFAULT_FILES_PAGE_SIZE
}

/// Get the config directory path
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mirrordeck")
}

/// Get the settings file path
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

pub fn load_settings() -> Settings {
    load_settings_from(&get_settings_path())
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&get_settings_path(), settings)
}

/// Load settings with partial recovery. A missing or unreadable file yields
/// defaults; a file that does not parse as a whole keeps every field that
/// does.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        log::info!("Settings file not found at {}, using defaults", path.display());
        return Settings::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Failed to read settings file {}: {}", path.display(), e);
            return Settings::default();
        }
    };

    match serde_json::from_str::<Settings>(&content) {
        Ok(settings) => return migrate_settings(path, settings),
        Err(e) => {
            log::warn!("Failed to parse settings directly: {}, attempting partial recovery", e);
        }
    }

    match recover_settings_from_json(&content) {
        Ok(settings) => {
            log::info!("Recovered settings with partial data");
            let settings = migrate_settings(path, settings);
            if let Err(e) = save_settings_to(path, &settings) {
                log::warn!("Failed to save recovered settings: {}", e);
            }
            settings
        }
        Err(e) => {
            log::error!("Failed to recover settings from {}: {}", path.display(), e);
            log::error!("Using default settings. The old settings file has been preserved.");
            Settings::default()
        }
    }
}

fn recover_settings_from_json(content: &str) -> Result<Settings> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("Settings file is not valid JSON")?;
    let obj = value
        .as_object()
        .context("Settings file root is not a JSON object")?;

    let mut settings = Settings::default();

    if let Some(v) = obj.get("version").and_then(|v| v.as_u64()) {
        settings.version = u32::try_from(v).unwrap_or(SETTINGS_VERSION);
    }
    if let Some(v) = obj.get("base_url").and_then(|v| v.as_str()) {
        settings.base_url = v.to_string();
    }
    if let Some(v) = obj.get("push_path").and_then(|v| v.as_str()) {
        settings.push_path = v.to_string();
    }
    if let Some(v) = obj.get("files_root").and_then(|v| v.as_str()) {
        settings.files_root = v.to_string();
    }
    if let Some(v) = obj.get("files_page_size").and_then(|v| v.as_u64()) {
        settings.files_page_size = u32::try_from(v).unwrap_or(u32::MAX).max(1);
    }
    if let Some(v) = obj.get("preferred_device").and_then(|v| v.as_str()) {
        settings.preferred_device = Some(v.to_string()).filter(|s| !s.is_empty());
    }
    if let Some(v) = obj.get("first_run_seen").and_then(|v| v.as_bool()) {
        settings.first_run_seen = v;
    }
    if let Some(v) = obj.get("theme_preference") {
        if let Ok(theme) = serde_json::from_value::<ThemePreference>(v.clone()) {
            settings.theme_preference = theme;
        } else {
            log::warn!("Could not parse theme_preference, using default");
        }
    }

    Ok(settings)
}

fn migrate_settings(path: &Path, mut settings: Settings) -> Settings {
    let original_version = settings.version;
    if settings.version < SETTINGS_VERSION {
        settings.version = SETTINGS_VERSION;
        log::info!("Settings migrated from v{} to v{}", original_version, settings.version);
        if let Err(e) = save_settings_to(path, &settings) {
            log::warn!("Failed to save migrated settings: {}", e);
        }
    }
    settings
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
