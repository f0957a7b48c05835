mod settings;

use mirrordeck_core::api::SessionConfig;
use mirrordeck_core::client::{SyncEngine, SyncError, SyncState};
use mirrordeck_core::notify::NotificationLevel;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

fn main() -> Result<()> {
    env_logger::init();

    let settings = settings::load_settings();
    if !settings.first_run_seen {
        let mut updated = settings.clone();
        updated.first_run_seen = true;
        if let Err(e) = settings::save_settings(&updated) {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(run(settings));
    // A pending stdin read must not hold up shutdown.
    runtime.shutdown_background();
    result
}

async fn run(settings: settings::Settings) -> Result<()> {
    let config = settings.engine_config();
    log::info!("Backend {} (push {})", config.base_url, config.push_url);

    let engine = Arc::new(
        SyncEngine::connect(config, tokio::runtime::Handle::current())
            .context("Failed to create sync engine")?,
    );
    engine.files().select_device(settings.preferred_device.clone());

    let watcher = tokio::spawn(watch_state(engine.clone()));

    let session = engine.as_ref();
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        booted = boot_session(session.boot(), || session.retry_boot(), input) => {
            if let Some(config) = booted {
                log::info!("Session ready (backend version {:?})", config.version);
            }
            tokio::signal::ctrl_c().await.context("Failed to wait for ctrl-c")?;
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    log::info!("Shutting down");
    watcher.abort();
    engine.stop();
    Ok(())
}

/// Await the first boot. While the handshake has timed out, every line
/// read from `input` triggers one retry. Returns `None` when boot failed
/// for good or input closed.
async fn boot_session<B, F, R>(
    boot: B,
    mut retry: impl FnMut() -> F,
    input: R,
) -> Option<SessionConfig>
where
    B: Future<Output = Result<SessionConfig, SyncError>>,
    F: Future<Output = Result<SessionConfig, SyncError>>,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut result = boot.await;
    loop {
        match result {
            Ok(config) => return Some(config),
            Err(SyncError::Timeout) => {
                log::warn!("Session boot timed out. Press Enter to retry.");
                match lines.next_line().await {
                    Ok(Some(_)) => result = retry().await,
                    Ok(None) => {
                        log::warn!("Input closed, boot will not be retried");
                        return None;
                    }
                    Err(e) => {
                        log::warn!("Failed to read input: {}", e);
                        return None;
                    }
                }
            }
            Err(e) => {
                log::error!("Session boot failed: {}", e);
                return None;
            }
        }
    }
}

/// Log every meaningful change of the snapshot and each new notification.
async fn watch_state(engine: Arc<SyncEngine>) {
    let mut versions = engine.subscribe();
    let mut last = SyncState::default();
    let mut seen = HashSet::new();

    while versions.changed().await.is_ok() {
        let state = engine.snapshot();
        log_changes(&last, &state);
        last = state;

        for notification in engine.notifications().snapshot() {
            if seen.insert(notification.id.clone()) {
                match notification.level {
                    NotificationLevel::Success => log::info!("{}", notification.message),
                    NotificationLevel::Error => log::error!("{}", notification.message),
                }
            }
        }
    }
}

fn log_changes(old: &SyncState, new: &SyncState) {
    if old.boot != new.boot {
        log::info!("Boot phase: {:?}", new.boot);
    }
    if old.channel != new.channel {
        log::info!("Push channel: {:?}", new.channel);
    }
    if old.devices != new.devices {
        let serials: Vec<&str> = new.devices.iter().map(|d| d.serial.as_str()).collect();
        log::info!("Connected devices: {:?}", serials);
    }
    if old.saved_devices != new.saved_devices {
        log::info!("Saved devices: {}", new.saved_devices.len());
    }
    if old.recording.active != new.recording.active {
        if new.recording.active {
            log::info!("Recording to {:?}", new.recording.output_path);
        } else {
            log::info!("Recording idle");
        }
    }
    if old.recording_elapsed != new.recording_elapsed {
        if let Some(elapsed) = &new.recording_elapsed {
            log::debug!("Recording elapsed {}", elapsed);
        }
    }
}
