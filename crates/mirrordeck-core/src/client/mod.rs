pub mod bootstrap;
pub mod busy;
pub mod channel;
pub mod config;
pub mod devices;
pub mod engine;
pub mod files;
pub mod poller;
pub mod presets;
pub mod recording;
pub mod state;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use devices::{DeviceCommands, parse_device_address};
pub use engine::SyncEngine;
pub use files::{FileListing, FileSession, UploadReport};
pub use presets::PresetCommands;
pub use recording::{RecordingControl, format_elapsed};
pub use state::{SyncState, SyncStore};
pub use transport::{HttpApi, PushConnector, SessionApi, UploadFile, WsConnector};
pub use types::{BootPhase, ChannelStatus, SyncError, SyncEvent};
