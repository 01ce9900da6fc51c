use crate::error::Result;
use crate::protocol::Command;
use crate::transport::Transport;
use crate::types::Channel;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
struct Levels {
    volume: f64,
    source: u8,
}

/// Command client for one output channel of an amplifier.
///
/// Remembers the last volume and source it sent so that power-on can
/// restore them. Volume is not clamped here; callers clamp.
pub struct AmpChannel {
    host: String,
    port: u16,
    channel: Channel,
    transport: Arc<dyn Transport>,
    levels: Mutex<Levels>,
}

impl AmpChannel {
    pub fn new(
        transport: Arc<dyn Transport>,
        host: impl Into<String>,
        port: u16,
        channel: Channel,
        source: u8,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            channel,
            transport,
            levels: Mutex::new(Levels {
                volume: 0.0,
                source,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Last volume set on this channel
    pub fn volume(&self) -> f64 {
        self.levels.lock().unwrap().volume
    }

    /// Last source number set on this channel (1-based)
    pub fn source(&self) -> u8 {
        self.levels.lock().unwrap().source
    }

    /// Update the remembered volume without sending it
    pub fn preset_volume(&self, volume: f64) {
        self.levels.lock().unwrap().volume = volume;
    }

    /// Update the remembered source without sending it
    pub fn preset_source(&self, source: u8) {
        self.levels.lock().unwrap().source = source;
    }

    /// Send a command without waiting on its reply
    async fn send(&self, command: Command) -> Result<()> {
        let text = command.to_string();
        self.transport.send_only(&text, &self.host, self.port).await
    }

    /// Send a command and return the amplifier's reply, if any
    pub async fn query(&self, command: Command) -> Result<Option<String>> {
        let text = command.to_string();
        self.transport.send_command(&text, &self.host, self.port).await
    }

    /// Set and transmit the channel volume
    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        self.levels.lock().unwrap().volume = volume;
        self.send(Command::Volume {
            channel: self.channel,
            level: volume,
        })
        .await
    }

    /// Set and transmit the selected source
    pub async fn set_source(&self, source: u8) -> Result<()> {
        self.levels.lock().unwrap().source = source;
        self.send(Command::Output {
            channel: self.channel,
            source,
        })
        .await
    }

    /// Power the channel on at the current volume and source
    pub async fn turn_on(&self) -> Result<()> {
        let levels = *self.levels.lock().unwrap();
        self.send(Command::Volume {
            channel: self.channel,
            level: levels.volume,
        })
        .await?;
        self.send(Command::Output {
            channel: self.channel,
            source: levels.source,
        })
        .await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.send(Command::power_off(self.channel)).await
    }
}
