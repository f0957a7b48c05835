use crate::api::Device;
use crate::normalize::normalize_devices;
use serde::Deserialize;

/// Outbound push frames (server to client), as they arrive on the wire.
///
/// `devices` stays untyped so that one malformed entry does not sink the
/// whole frame; the normalizer filters it.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsOutbound {
    DevicesUpdate {
        #[serde(default)]
        devices: serde_json::Value,
    },
}

/// A push frame the engine acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushMessage {
    /// Replacement for the connected device list.
    DevicesUpdate { devices: Vec<Device> },
}

/// Parse a text frame from the push channel.
///
/// Returns `Ok(None)` for well-formed JSON of any other shape (unknown
/// `type`, missing `type`, non-object), and `Err` only when the text is not
/// JSON at all.
pub fn parse_push_frame(text: &str) -> Result<Option<PushMessage>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match WsOutbound::deserialize(&value) {
        Ok(WsOutbound::DevicesUpdate { devices }) => Ok(Some(PushMessage::DevicesUpdate {
            devices: normalize_devices(&devices),
        })),
        Err(e) => {
            log::trace!("ignoring push frame: {}", e);
            Ok(None)
        }
    }
}
