use crate::channel::AmpChannel;
use crate::config::ZoneConfig;
use crate::error::{AmpError, Result};
use crate::protocol::PolledStatus;
use crate::subscription::ZoneUpdate;
use crate::transport::Transport;
use crate::types::{DeviceInfo, EntityDescriptor, Feature, PowerState, ZoneKey, MANUFACTURER, MODEL};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

/// Poll results arriving this soon after a local command are dropped
pub const COMMAND_GRACE_PERIOD: Duration = Duration::from_millis(1500);

/// Volume change per step
pub const VOLUME_STEP: f64 = 0.01;

/// Media-player view of one amplifier zone.
///
/// Cheap to clone; clones share state. User commands and poll
/// reconciliation both go through here, and every state write is
/// followed by a [`ZoneUpdate::StateChanged`].
#[derive(Clone)]
pub struct Zone {
    entry_id: Uuid,
    config: Arc<ZoneConfig>,
    channel: Arc<AmpChannel>,
    state: Arc<Mutex<ZoneState>>,
    updates: broadcast::Sender<ZoneUpdate>,
}

/// Runtime state of a zone
#[derive(Debug, Clone)]
pub struct ZoneState {
    pub power: PowerState,
    /// Desired volume, 0.0..=1.0
    pub volume: f64,
    pub muted: bool,
    /// Volume to restore on unmute
    pub pre_mute_volume: f64,
    pub selected_source: String,
    /// When the last local command was issued
    pub last_command: Option<Instant>,
}

/// Read-only copy of a zone's state for the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub entry_id: Uuid,
    pub name: String,
    pub power: PowerState,
    pub volume_level: f64,
    pub muted: bool,
    pub source: String,
    pub source_list: Vec<String>,
}

impl Zone {
    /// Create a zone from its effective configuration
    pub fn new(
        entry_id: Uuid,
        config: ZoneConfig,
        transport: Arc<dyn Transport>,
        updates: broadcast::Sender<ZoneUpdate>,
    ) -> Self {
        let on_volume = on_volume_level(&config);
        let selected_source = config.source_list.first().cloned().unwrap_or_default();

        let channel = AmpChannel::new(transport, config.host.clone(), config.port, config.channel, 1);
        channel.preset_volume(on_volume);

        Self {
            entry_id,
            config: Arc::new(config),
            channel: Arc::new(channel),
            state: Arc::new(Mutex::new(ZoneState {
                power: PowerState::Off,
                volume: on_volume,
                muted: false,
                pre_mute_volume: on_volume,
                selected_source,
                last_command: None,
            })),
            updates,
        }
    }

    pub fn entry_id(&self) -> Uuid {
        self.entry_id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn key(&self) -> ZoneKey {
        self.config.key()
    }

    pub fn source_list(&self) -> &[String] {
        &self.config.source_list
    }

    pub fn channel(&self) -> &AmpChannel {
        &self.channel
    }

    pub fn state(&self) -> ZoneState {
        self.state.lock().unwrap().clone()
    }

    pub fn power(&self) -> PowerState {
        self.state.lock().unwrap().power
    }

    /// Volume level for UI readback (0.0..=1.0)
    pub fn volume_level(&self) -> f64 {
        self.channel.volume()
    }

    pub fn is_volume_muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    pub fn source(&self) -> String {
        self.state.lock().unwrap().selected_source.clone()
    }

    pub fn snapshot(&self) -> ZoneSnapshot {
        let state = self.state.lock().unwrap();
        ZoneSnapshot {
            entry_id: self.entry_id,
            name: self.config.name.clone(),
            power: state.power,
            volume_level: self.channel.volume(),
            muted: state.muted,
            source: state.selected_source.clone(),
            source_list: self.config.source_list.clone(),
        }
    }

    /// Entity registration record
    pub fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor {
            unique_id: self.key().to_string(),
            device_key: self.config.amp_id().to_string(),
            name: self.config.name.clone(),
            features: Feature::zone_features(),
        }
    }

    /// Descriptor of the amplifier this zone belongs to
    pub fn device_info(&self) -> DeviceInfo {
        let amp = self.config.amp_id();
        DeviceInfo {
            identifier: amp.to_string(),
            name: format!("{} {}", MANUFACTURER, amp),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
        }
    }

    // ========== Commands ==========
    //
    // State is written optimistically before the datagram goes out. Send
    // failures are logged and otherwise ignored.

    pub async fn turn_on(&self) {
        tracing::info!("Turning on {}", self.config.name);
        let volume = on_volume_level(&self.config);
        self.write_state(|state| {
            state.power = PowerState::On;
            state.volume = volume;
            state.muted = false;
        });
        self.channel.preset_volume(volume);
        self.report("turn on", self.channel.turn_on().await);
        self.publish();
    }

    pub async fn turn_off(&self) {
        tracing::info!("Turning off {}", self.config.name);
        let volume = on_volume_level(&self.config);
        self.write_state(|state| {
            state.power = PowerState::Off;
            state.volume = volume;
            state.muted = false;
        });
        self.channel.preset_volume(volume);
        self.report("turn off", self.channel.turn_off().await);
        self.publish();
    }

    /// Set volume, clamped to 0.0..=1.0
    pub async fn set_volume_level(&self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        self.write_state(|state| state.volume = volume);
        self.report("set volume", self.channel.set_volume(volume).await);
        tracing::debug!("{} volume set to {:.2}", self.config.name, volume);
        self.publish();
    }

    pub async fn volume_up(&self) {
        self.set_volume_level(self.channel.volume() + VOLUME_STEP).await;
    }

    pub async fn volume_down(&self) {
        self.set_volume_level(self.channel.volume() - VOLUME_STEP).await;
    }

    /// Mute by driving volume to zero; unmute restores the saved level
    pub async fn mute_volume(&self, mute: bool) {
        let current = self.channel.volume();
        let target = {
            let mut state = self.state.lock().unwrap();
            match (mute, state.muted) {
                (true, false) => {
                    state.last_command = Some(Instant::now());
                    state.pre_mute_volume = current;
                    state.muted = true;
                    Some(0.0)
                }
                (false, true) => {
                    state.last_command = Some(Instant::now());
                    state.muted = false;
                    Some(state.pre_mute_volume)
                }
                _ => None,
            }
        };

        let Some(volume) = target else {
            return;
        };
        self.write_state(|state| state.volume = volume);
        self.report("mute", self.channel.set_volume(volume).await);
        self.publish();
    }

    /// Select a source by name
    pub async fn select_source(&self, source: &str) -> Result<()> {
        let index = self
            .config
            .source_list
            .iter()
            .position(|s| s == source)
            .ok_or_else(|| AmpError::UnknownSource(source.to_string()))?;
        let number = u8::try_from(index + 1).map_err(|_| AmpError::UnknownSource(source.to_string()))?;

        self.write_state(|state| state.selected_source = source.to_string());
        self.report("select source", self.channel.set_source(number).await);
        tracing::debug!("{} source set to {} ({})", self.config.name, source, number);
        self.publish();
        Ok(())
    }

    // ========== Reconciliation ==========

    /// Apply a polled status observed at `now`.
    ///
    /// Returns false when the poll landed inside the grace period after a
    /// local command and was dropped.
    pub fn reconcile(&self, status: PolledStatus, now: Instant) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(last) = state.last_command {
                if now.saturating_duration_since(last) < COMMAND_GRACE_PERIOD {
                    tracing::trace!("Dropping poll for {} inside grace period", self.config.name);
                    return false;
                }
            }

            state.power = if status.is_on { PowerState::On } else { PowerState::Off };
            if let Some(index) = status.source_index {
                match usize::try_from(index).ok().and_then(|i| i.checked_sub(1)) {
                    Some(i) if i < self.config.source_list.len() => {
                        state.selected_source = self.config.source_list[i].clone();
                        if let Ok(number) = u8::try_from(index) {
                            self.channel.preset_source(number);
                        }
                    }
                    _ => tracing::debug!("{} reported source {} outside source list", self.config.name, index),
                }
            }
        }

        self.publish();
        true
    }

    /// Tell the host a poll cycle failed; state stays as it was
    pub(crate) fn report_refresh_failure(&self, reason: String) {
        let _ = self.updates.send(ZoneUpdate::RefreshFailed {
            entry_id: self.entry_id,
            reason,
        });
    }

    fn write_state(&self, f: impl FnOnce(&mut ZoneState)) {
        let mut state = self.state.lock().unwrap();
        state.last_command = Some(Instant::now());
        f(&mut state);
    }

    fn report(&self, action: &str, result: Result<()>) {
        if let Err(e) = result {
            tracing::warn!("Failed to {} {}: {}", action, self.config.name, e);
        }
    }

    fn publish(&self) {
        // No receivers is fine
        let _ = self.updates.send(ZoneUpdate::StateChanged(Box::new(self.snapshot())));
    }
}

fn on_volume_level(config: &ZoneConfig) -> f64 {
    f64::from(config.on_volume.min(100)) / 100.0
}
