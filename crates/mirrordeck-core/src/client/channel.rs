use crate::client::transport::PushConnector;
use crate::client::types::{ChannelStatus, SyncEvent};
use crate::ws::{PushMessage, parse_push_frame};

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Fixed delay between a closure of the push channel and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Persistent push connection with unconditional reconnection.
///
/// The channel is the only writer of `ChannelStatus`. `stop()` aborts the
/// loop task, which drops the open socket and any pending reconnect sleep.
pub struct LiveChannel {
    connector: Arc<dyn PushConnector>,
    url: String,
    events: async_channel::Sender<SyncEvent>,
    runtime: tokio::runtime::Handle,
    abort_handle: Mutex<Option<tokio::task::AbortHandle>>,
}

impl LiveChannel {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        url: impl Into<String>,
        events: async_channel::Sender<SyncEvent>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            connector,
            url: url.into(),
            events,
            runtime,
            abort_handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.abort_handle.lock().is_some()
    }

    /// Start the connect loop. No-op if already running.
    pub fn start(&self) {
        let mut abort_handle = self.abort_handle.lock();
        if abort_handle.is_some() {
            return;
        }
        let task = self.runtime.spawn(run_loop(
            self.connector.clone(),
            self.url.clone(),
            self.events.clone(),
        ));
        *abort_handle = Some(task.abort_handle());
    }

    pub fn stop(&self) {
        if let Some(handle) = self.abort_handle.lock().take() {
            handle.abort();
            log::info!("Push channel to {} closed", self.url);
            let _ = self
                .events
                .try_send(SyncEvent::ChannelStatusChanged(ChannelStatus::Closed));
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.abort_handle.get_mut().take() {
            handle.abort();
        }
    }
}

async fn emit(events: &async_channel::Sender<SyncEvent>, status: ChannelStatus) {
    let _ = events.send(SyncEvent::ChannelStatusChanged(status)).await;
}

/// Connect, pump frames until the connection ends, wait, repeat. Never
/// returns on its own.
async fn run_loop(
    connector: Arc<dyn PushConnector>,
    url: String,
    events: async_channel::Sender<SyncEvent>,
) {
    let mut attempt: u32 = 0;

    loop {
        emit(&events, ChannelStatus::Connecting).await;

        match connector.connect(&url).await {
            Ok(mut frames) => {
                log::info!("Push channel connected to {}", url);
                attempt = 0;
                emit(&events, ChannelStatus::Open).await;

                while let Some(frame) = frames.next().await {
                    let text = match frame {
                        Ok(text) => text,
                        Err(e) => {
                            log::warn!("Push channel read error: {}", e);
                            break;
                        }
                    };
                    match parse_push_frame(&text) {
                        Ok(Some(PushMessage::DevicesUpdate { devices })) => {
                            log::debug!("Push: {} connected device(s)", devices.len());
                            let _ = events.send(SyncEvent::DevicesPushed(devices)).await;
                        }
                        Ok(None) => {}
                        Err(e) => log::warn!("Dropping malformed push frame: {}", e),
                    }
                }
            }
            Err(e) => log::warn!("Push channel connect to {} failed: {}", url, e),
        }

        attempt = attempt.saturating_add(1);
        log::warn!(
            "Push channel to {} closed. Reconnecting in {}ms (attempt {})",
            url,
            RECONNECT_DELAY.as_millis(),
            attempt
        );
        emit(&events, ChannelStatus::Reconnecting { attempt }).await;
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Device;
    use crate::client::testing::{FakeConnector, PushSession, drain};
    use tokio::time::Instant;

    fn channel(connector: Arc<FakeConnector>) -> (LiveChannel, async_channel::Receiver<SyncEvent>) {
        let (tx, rx) = async_channel::unbounded();
        let channel = LiveChannel::new(
            connector,
            "ws://127.0.0.1:8000/ws",
            tx,
            tokio::runtime::Handle::current(),
        );
        (channel, rx)
    }

    fn statuses(events: &[SyncEvent]) -> Vec<ChannelStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::ChannelStatusChanged(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_every_three_seconds_while_refused() {
        let connector = Arc::new(FakeConnector::new(vec![]));
        let (channel, rx) = channel(connector.clone());
        let start = Instant::now();
        channel.start();

        tokio::time::sleep(Duration::from_millis(9_500)).await;

        let offsets: Vec<u128> = connector
            .attempts
            .lock()
            .iter()
            .map(|at| (*at - start).as_millis())
            .collect();
        assert_eq!(offsets.len(), 4);
        for (i, offset) in offsets.iter().enumerate() {
            let expected = 3000 * i as u128;
            assert!(*offset >= expected && *offset < expected + 50, "{offsets:?}");
        }

        let statuses = statuses(&drain(&rx));
        assert!(!statuses.contains(&ChannelStatus::Open));
        assert!(statuses.contains(&ChannelStatus::Reconnecting { attempt: 4 }));
        channel.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_device_frames_and_drops_malformed() {
        let connector = Arc::new(FakeConnector::new(vec![PushSession::FramesThenHang(vec![
            r#"{"type":"devices_update","devices":[{"serial":"abc","status":"device"}]}"#.into(),
            "{broken".into(),
            r#"{"type":"recording_update"}"#.into(),
            r#"{"type":"devices_update","devices":[]}"#.into(),
        ])]));
        let (channel, rx) = channel(connector.clone());
        channel.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let events = drain(&rx);
        let pushed: Vec<&Vec<Device>> = events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::DevicesPushed(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed[0][0].serial, "abc");
        assert!(pushed[1].is_empty());
        assert_eq!(
            statuses(&events),
            vec![ChannelStatus::Connecting, ChannelStatus::Open]
        );
        assert_eq!(connector.attempt_count(), 1);
        channel.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn closure_after_open_schedules_reconnect_and_resets_attempts() {
        let connector = Arc::new(FakeConnector::new(vec![
            PushSession::Frames(vec![]),
            PushSession::Refuse,
            PushSession::FramesThenHang(vec![]),
        ]));
        let (channel, rx) = channel(connector.clone());
        channel.start();
        tokio::time::sleep(Duration::from_millis(6_500)).await;

        assert_eq!(connector.attempt_count(), 3);
        assert_eq!(
            statuses(&drain(&rx)),
            vec![
                ChannelStatus::Connecting,
                ChannelStatus::Open,
                ChannelStatus::Reconnecting { attempt: 1 },
                ChannelStatus::Connecting,
                ChannelStatus::Reconnecting { attempt: 2 },
                ChannelStatus::Connecting,
                ChannelStatus::Open,
            ]
        );
        channel.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_reconnect() {
        let connector = Arc::new(FakeConnector::new(vec![]));
        let (channel, rx) = channel(connector.clone());
        channel.start();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(channel.is_running());

        channel.stop();
        assert!(!channel.is_running());
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(
            statuses(&drain(&rx)).last(),
            Some(&ChannelStatus::Closed)
        );
    }
}
