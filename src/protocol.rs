use crate::types::Channel;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Command name shared by output selection and the status query
pub const OUTPUT_COMMAND: &str = "c4.amp.out";

/// Command name for channel volume
pub const VOLUME_COMMAND: &str = "c4.amp.chvol";

/// Added to the percent volume to get the amplifier's native level
pub const VOLUME_OFFSET: u32 = 160;

/// Source number that switches a channel off
pub const SOURCE_OFF: u8 = 0;

/// Lowest sequence number used in the datagram prefix
pub const SEQUENCE_MIN: u8 = 10;

/// Highest sequence number used in the datagram prefix
pub const SEQUENCE_MAX: u8 = 99;

/// Text commands understood by the amplifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Route `source` to `channel`; source 0 powers the channel off
    Output { channel: Channel, source: u8 },
    /// Set channel volume, `level` in 0.0..=1.0
    Volume { channel: Channel, level: f64 },
    /// Ask for the channel's current output byte
    StatusQuery { channel: Channel },
}

impl Command {
    pub fn power_off(channel: Channel) -> Self {
        Command::Output {
            channel,
            source: SOURCE_OFF,
        }
    }

    /// Channel this command addresses
    pub fn channel(&self) -> Channel {
        match self {
            Command::Output { channel, .. }
            | Command::Volume { channel, .. }
            | Command::StatusQuery { channel } => *channel,
        }
    }
}

/// Native volume level for a 0.0..=1.0 volume
pub fn volume_to_native(level: f64) -> u32 {
    let percent = (level.clamp(0.0, 1.0) * 100.0).round() as u32;
    percent + VOLUME_OFFSET
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Output { channel, source } => {
                write!(f, "{} {:02} {:02}", OUTPUT_COMMAND, channel, source)
            }
            Command::Volume { channel, level } => {
                write!(f, "{} {:02} {:x}", VOLUME_COMMAND, channel, volume_to_native(*level))
            }
            Command::StatusQuery { channel } => write!(f, "{} {:02}", OUTPUT_COMMAND, channel),
        }
    }
}

/// Wrap a command in the datagram framing the amplifier expects
pub fn frame(sequence: u8, command: &str) -> String {
    format!("0s2a{} {} \r\n", sequence, command)
}

/// Channel status reported by one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolledStatus {
    pub is_on: bool,
    /// Decoded status value as a 1-based source number, when the channel is on
    pub source_index: Option<u32>,
}

impl PolledStatus {
    pub fn off() -> Self {
        Self {
            is_on: false,
            source_index: None,
        }
    }
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"c4\.amp\.out\s+0*(\d+)\s+(\S+)").expect("status pattern is valid")
    })
}

/// Parse a status reply for `channel`.
///
/// The reply may carry a sequence prefix and trailing words such as an
/// acknowledgement. Returns `None` when the reply does not report this
/// channel or the status token is not a hex byte.
pub fn parse_status(response: &str, channel: Channel) -> Option<PolledStatus> {
    let captures = status_pattern()
        .captures_iter(response)
        .find(|c| c[1].parse::<u32>().ok() == Some(u32::from(channel)))?;

    let token = captures.get(2)?.as_str();
    if matches!(token, "0" | "00" | "000") {
        return Some(PolledStatus::off());
    }

    let value = match u32::from_str_radix(token, 16) {
        Ok(value) => value,
        Err(_) => {
            tracing::trace!("Unparsable status token {:?} for channel {}", token, channel);
            return None;
        }
    };

    if value == 0 {
        return Some(PolledStatus::off());
    }

    Some(PolledStatus {
        is_on: true,
        source_index: Some(value),
    })
}
