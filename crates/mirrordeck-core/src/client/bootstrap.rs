use crate::api::SessionConfig;
use crate::client::transport::SessionApi;
use crate::client::types::{BootPhase, SyncError, SyncEvent};
use crate::normalize::normalize_config;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Number of configuration fetches before giving up.
pub const BOOT_MAX_ATTEMPTS: u32 = 40;
/// Per-attempt request timeout.
pub const BOOT_REQUEST_TIMEOUT: Duration = Duration::from_millis(4000);

const BACKOFF_BASE_MS: u64 = 400;
const BACKOFF_STEP_MS: u64 = 60;
const BACKOFF_CAP_MS: u64 = 1400;

/// Delay after failed attempt `attempt` (zero-based).
pub fn retry_delay(attempt: u32) -> Duration {
    let ms = BACKOFF_BASE_MS.saturating_add(u64::from(attempt).saturating_mul(BACKOFF_STEP_MS));
    Duration::from_millis(ms.min(BACKOFF_CAP_MS))
}

/// Bounded-retry handshake that fetches the session configuration.
///
/// Owns the boot phase. Nothing is committed between failed attempts; the
/// configuration is published only once, on success.
pub struct Bootstrapper {
    api: Arc<dyn SessionApi>,
    events: async_channel::Sender<SyncEvent>,
    phase: Mutex<BootPhase>,
}

impl Bootstrapper {
    pub fn new(api: Arc<dyn SessionApi>, events: async_channel::Sender<SyncEvent>) -> Self {
        Self {
            api,
            events,
            phase: Mutex::new(BootPhase::Idle),
        }
    }

    pub fn phase(&self) -> BootPhase {
        *self.phase.lock()
    }

    /// First boot. Only valid from `Idle`.
    pub async fn boot(&self) -> Result<SessionConfig, SyncError> {
        self.begin(|phase| matches!(phase, BootPhase::Idle), "boot already started")?;
        self.run().await
    }

    /// User-initiated retry. Only valid from `TimedOut`; restarts from
    /// attempt zero.
    pub async fn retry(&self) -> Result<SessionConfig, SyncError> {
        self.begin(
            |phase| matches!(phase, BootPhase::TimedOut),
            "retry is only possible after boot timed out",
        )?;
        self.run().await
    }

    fn begin(&self, allowed: impl Fn(&BootPhase) -> bool, reason: &str) -> Result<(), SyncError> {
        let mut phase = self.phase.lock();
        if !allowed(&*phase) {
            return Err(SyncError::InvalidInput(reason.to_string()));
        }
        *phase = BootPhase::Booting { attempt: 0 };
        Ok(())
    }

    fn set_phase(&self, phase: BootPhase) {
        *self.phase.lock() = phase;
        let _ = self.events.try_send(SyncEvent::BootPhaseChanged(phase));
    }

    async fn run(&self) -> Result<SessionConfig, SyncError> {
        for attempt in 0..BOOT_MAX_ATTEMPTS {
            self.set_phase(BootPhase::Booting { attempt });
            match self.fetch().await {
                Ok(config) => {
                    log::info!(
                        "Session configured after {} attempt(s), language {}",
                        attempt + 1,
                        config.language
                    );
                    let _ = self
                        .events
                        .try_send(SyncEvent::SessionConfigured(config.clone()));
                    self.set_phase(BootPhase::Ready);
                    return Ok(config);
                }
                Err(e) => {
                    if attempt + 1 < BOOT_MAX_ATTEMPTS {
                        let delay = retry_delay(attempt);
                        log::debug!(
                            "Config fetch failed: {}. Retrying in {}ms (attempt {}/{})",
                            e,
                            delay.as_millis(),
                            attempt + 1,
                            BOOT_MAX_ATTEMPTS
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        log::warn!("Config fetch failed: {}", e);
                    }
                }
            }
        }

        log::warn!("Boot timed out after {} attempts", BOOT_MAX_ATTEMPTS);
        self.set_phase(BootPhase::TimedOut);
        Err(SyncError::Timeout)
    }

    async fn fetch(&self) -> Result<SessionConfig, SyncError> {
        let payload = tokio::time::timeout(BOOT_REQUEST_TIMEOUT, self.api.get_config())
            .await
            .map_err(|_| SyncError::Timeout)??;
        normalize_config(&payload)
            .ok_or_else(|| SyncError::Decode("config payload is not an object".to_string()))
    }
}
