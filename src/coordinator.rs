use crate::config::clamp_poll_interval;
use crate::error::Result;
use crate::protocol::{parse_status, Command, PolledStatus};
use crate::zone::Zone;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant, MissedTickBehavior};

/// Status queries per poll cycle when the amplifier stays silent
pub const QUERY_ATTEMPTS: usize = 2;

/// Pause between the query attempts of one cycle
pub const RETRY_DELAY: Duration = Duration::from_millis(300);

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Periodic status poller for one zone.
///
/// Each cycle asks the amplifier for the channel's output byte and hands
/// the parsed status to [`Zone::reconcile`]. A cycle that cannot reach the
/// amplifier is reported as a refresh failure and leaves state alone.
pub struct ZoneCoordinator {
    zone: Zone,
    interval: Duration,
    stop_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl ZoneCoordinator {
    /// Create a poller; the interval is clamped to 1..=300 seconds
    pub fn new(zone: Zone, interval_secs: u32) -> Self {
        Self {
            zone,
            interval: Duration::from_secs(u64::from(clamp_poll_interval(interval_secs))),
            stop_tx: None,
            task_handle: None,
        }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Run one poll cycle now.
    ///
    /// Returns whether a status was applied to the zone.
    pub async fn refresh(&self) -> Result<bool> {
        refresh_zone(&self.zone).await
    }

    /// Start polling in the background, restarting if already running
    pub async fn start(&mut self) {
        self.stop().await;

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        self.stop_tx = Some(stop_tx);

        let zone = self.zone.clone();
        let interval = self.interval;
        tracing::info!("Polling {} every {:?}", zone.name(), interval);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::debug!("Polling of {} stopped", zone.name());
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = refresh_zone(&zone).await {
                            tracing::warn!("Refresh of {} failed: {}", zone.name(), e);
                            zone.report_refresh_failure(e.to_string());
                        }
                    }
                }
            }
        });

        self.task_handle = Some(handle);
    }

    /// Stop polling and wait for the task to finish.
    ///
    /// Once this returns the poller no longer touches the zone.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.task_handle.take() {
            if timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("Poller for {} did not stop in time, aborting", self.zone.name());
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl Drop for ZoneCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Query the channel status, retrying once if the amplifier stays silent.
///
/// `Ok(None)` covers both silence and a reply that does not parse.
pub async fn query_status(zone: &Zone) -> Result<Option<PolledStatus>> {
    let channel = zone.channel().channel();
    let command = Command::StatusQuery { channel };

    for attempt in 1..=QUERY_ATTEMPTS {
        match zone.channel().query(command).await {
            Ok(Some(reply)) => {
                let status = parse_status(&reply, channel);
                if status.is_none() {
                    tracing::debug!("Ignoring status reply for {}: {:?}", zone.name(), reply);
                }
                return Ok(status);
            }
            Ok(None) => {
                tracing::trace!("No status reply for {} (attempt {})", zone.name(), attempt);
            }
            Err(e) if attempt < QUERY_ATTEMPTS => {
                tracing::debug!("Status query for {} failed, retrying: {}", zone.name(), e);
            }
            Err(e) => return Err(e),
        }

        if attempt < QUERY_ATTEMPTS {
            sleep(RETRY_DELAY).await;
        }
    }

    Ok(None)
}

async fn refresh_zone(zone: &Zone) -> Result<bool> {
    Ok(match query_status(zone).await? {
        Some(status) => zone.reconcile(status, Instant::now()),
        None => false,
    })
}
