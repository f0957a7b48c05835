use crate::api::CommandResponse;
use crate::client::poller::Reconciler;
use crate::client::transport::SessionApi;
use crate::client::types::SyncError;
use crate::normalize::DEFAULT_ADB_PORT;
use crate::notify::NotificationCenter;

use std::sync::Arc;

const ADDRESS_REQUIRED: &str = "Address required";
const NAME_REQUIRED: &str = "Name required";
const CONNECTED: &str = "Device connected";
const CONNECT_FAILED: &str = "Connection failed";
const DISCONNECTED: &str = "Device disconnected";
const SAVED: &str = "Device saved";
const SAVE_FAILED: &str = "Failed to save device";
const FORGOTTEN: &str = "Saved device removed";
const PAIRED: &str = "Device paired";
const PAIR_FAILED: &str = "Pairing failed";
const TCPIP_ENABLED: &str = "TCP/IP mode enabled";
const TCPIP_FAILED: &str = "Failed to enable TCP/IP mode";

/// Split an `ip:port` serial into its parts for the save-device flow.
/// USB serials have no `:` and yield `None`.
pub fn parse_device_address(serial: &str) -> Option<(String, String)> {
    if !serial.contains(':') {
        return None;
    }
    let mut parts = serial.split(':');
    let ip = parts.next().unwrap_or_default();
    if ip.is_empty() {
        return None;
    }
    let port = parts
        .next()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_ADB_PORT);
    Some((ip.to_string(), port.to_string()))
}

fn port_or_default(port: &str) -> &str {
    let port = port.trim();
    if port.is_empty() { DEFAULT_ADB_PORT } else { port }
}

/// Commands against the backend's device set. Each posts one notification
/// and, where the device lists change, pulls them right away.
pub struct DeviceCommands {
    api: Arc<dyn SessionApi>,
    notifications: NotificationCenter,
    reconciler: Reconciler,
}

impl DeviceCommands {
    pub fn new(
        api: Arc<dyn SessionApi>,
        notifications: NotificationCenter,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            api,
            notifications,
            reconciler,
        }
    }

    fn invalid(&self, message: &str) -> SyncError {
        self.notifications.error(message);
        SyncError::InvalidInput(message.to_string())
    }

    /// Turn a command reply into a result, posting the matching notification.
    fn report(
        &self,
        what: &str,
        result: Result<CommandResponse, SyncError>,
        success: &str,
        failure: &str,
    ) -> Result<CommandResponse, SyncError> {
        match result {
            Ok(resp) if resp.success => {
                log::info!("{} succeeded", what);
                self.notifications.success(success);
                Ok(resp)
            }
            Ok(resp) => {
                let message = resp.error_text().unwrap_or(failure).to_string();
                log::warn!("{} rejected: {}", what, message);
                self.notifications.error(failure);
                Err(SyncError::Rejected(message))
            }
            Err(e) => {
                log::warn!("{} failed: {}", what, e);
                self.notifications.error(failure);
                Err(e)
            }
        }
    }

    async fn refresh_devices(&self) {
        let _ = self.reconciler.pull_devices().await;
    }

    /// Connect to a typed `ip[:port]` address. Devices are re-pulled only on
    /// success.
    pub async fn quick_connect(&self, address: &str) -> Result<(), SyncError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(self.invalid(ADDRESS_REQUIRED));
        }
        let result = self.api.connect(address).await;
        self.report(&format!("Connect {}", address), result, CONNECTED, CONNECT_FAILED)?;
        self.refresh_devices().await;
        Ok(())
    }

    /// Connect to a saved device. Devices are re-pulled whatever the outcome.
    pub async fn connect_saved(&self, address: &str) -> Result<(), SyncError> {
        let result = self.api.connect(address).await;
        let outcome = self.report(&format!("Connect {}", address), result, CONNECTED, CONNECT_FAILED);
        self.refresh_devices().await;
        outcome.map(|_| ())
    }

    pub async fn disconnect(&self, address: &str) -> Result<(), SyncError> {
        let result = self.api.disconnect(address).await;
        self.report(&format!("Disconnect {}", address), result, DISCONNECTED, CONNECT_FAILED)?;
        self.refresh_devices().await;
        Ok(())
    }

    pub async fn save_device(&self, name: &str, ip: &str, port: &str) -> Result<(), SyncError> {
        let name = name.trim();
        let ip = ip.trim();
        if name.is_empty() {
            return Err(self.invalid(NAME_REQUIRED));
        }
        if ip.is_empty() {
            return Err(self.invalid(ADDRESS_REQUIRED));
        }
        let port = port_or_default(port);
        let result = self.api.save_device(name, ip, port).await;
        self.report(&format!("Save {}:{}", ip, port), result, SAVED, SAVE_FAILED)?;
        self.refresh_devices().await;
        Ok(())
    }

    pub async fn delete_saved(&self, ip: &str, port: &str) -> Result<(), SyncError> {
        let result = self.api.delete_saved(ip, port).await;
        self.report(&format!("Forget {}:{}", ip, port), result, FORGOTTEN, CONNECT_FAILED)?;
        self.refresh_devices().await;
        Ok(())
    }

    /// Wireless-debugging pairing. The paired device shows up once it is
    /// connected, so nothing is re-pulled here.
    pub async fn pair(&self, address: &str, code: &str) -> Result<(), SyncError> {
        let address = address.trim();
        let code = code.trim();
        if address.is_empty() || code.is_empty() {
            return Err(self.invalid(ADDRESS_REQUIRED));
        }
        let result = self.api.pair(address, code).await;
        self.report(&format!("Pair {}", address), result, PAIRED, PAIR_FAILED)
            .map(|_| ())
    }

    /// Switch the USB device to TCP/IP mode. Returns the `ip:port` address to
    /// quick-connect to.
    pub async fn enable_tcpip(&self, port: &str) -> Result<String, SyncError> {
        let port = port_or_default(port);
        let resp = match self.api.tcpip(port).await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("Enable tcpip on {} failed: {}", port, e);
                self.notifications.error(TCPIP_FAILED);
                return Err(e);
            }
        };
        let ip = resp.ip.as_deref().filter(|ip| !ip.is_empty());
        match ip {
            Some(ip) if resp.success => {
                let address = format!("{}:{}", ip, port);
                log::info!("TCP/IP mode enabled, device at {}", address);
                self.notifications.success(TCPIP_ENABLED);
                Ok(address)
            }
            _ => {
                let message = resp.error_text().unwrap_or(TCPIP_FAILED).to_string();
                log::warn!("Enable tcpip on {} rejected: {}", port, message);
                self.notifications.error(TCPIP_FAILED);
                Err(SyncError::Rejected(message))
            }
        }
    }
}
