use crate::api::PresetsResponse;
use crate::client::transport::SessionApi;
use crate::client::types::{SyncError, SyncEvent};
use crate::normalize::normalize_presets;
use crate::notify::NotificationCenter;

use std::sync::Arc;

const NAME_REQUIRED: &str = "Name required";
const PRESET_SAVED: &str = "Preset saved";
const PRESET_DELETED: &str = "Preset deleted";
const PRESET_FAILED: &str = "Failed to update presets";

/// Edits the mirroring presets kept by the backend. Both commands replace
/// the session's preset list with the one the backend returns.
pub struct PresetCommands {
    api: Arc<dyn SessionApi>,
    events: async_channel::Sender<SyncEvent>,
    notifications: NotificationCenter,
}

impl PresetCommands {
    pub fn new(
        api: Arc<dyn SessionApi>,
        events: async_channel::Sender<SyncEvent>,
        notifications: NotificationCenter,
    ) -> Self {
        Self {
            api,
            events,
            notifications,
        }
    }

    /// Save a preset. An existing preset with the same name, compared
    /// case-insensitively by the backend, is overwritten.
    pub async fn save(&self, name: &str, bitrate: &str, maxsize: &str) -> Result<(), SyncError> {
        let name = name.trim();
        if name.is_empty() {
            self.notifications.error(NAME_REQUIRED);
            return Err(SyncError::InvalidInput(NAME_REQUIRED.to_string()));
        }
        let result = self
            .api
            .save_preset(name, bitrate.trim(), maxsize.trim())
            .await;
        self.apply(&format!("Save preset {}", name), result, PRESET_SAVED)
            .await
    }

    pub async fn remove(&self, name: &str) -> Result<(), SyncError> {
        let result = self.api.delete_preset(name).await;
        self.apply(&format!("Delete preset {}", name), result, PRESET_DELETED)
            .await
    }

    async fn apply(
        &self,
        what: &str,
        result: Result<PresetsResponse, SyncError>,
        success: &str,
    ) -> Result<(), SyncError> {
        match result {
            Ok(resp) if resp.success => {
                let presets = normalize_presets(&resp.presets);
                log::info!("{} succeeded, {} presets", what, presets.len());
                let _ = self.events.send(SyncEvent::PresetsUpdated(presets)).await;
                self.notifications.success(success);
                Ok(())
            }
            Ok(resp) => {
                let message = [resp.detail, resp.error]
                    .into_iter()
                    .flatten()
                    .find(|m| !m.is_empty())
                    .unwrap_or_else(|| PRESET_FAILED.to_string());
                log::warn!("{} rejected: {}", what, message);
                self.notifications.error(PRESET_FAILED);
                Err(SyncError::Rejected(message))
            }
            Err(e) => {
                log::warn!("{} failed: {}", what, e);
                self.notifications.error(PRESET_FAILED);
                Err(e)
            }
        }
    }
}
