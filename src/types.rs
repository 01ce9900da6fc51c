use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Channel number on an amplifier (1-based)
pub type Channel = u8;

/// Manufacturer reported in device metadata
pub const MANUFACTURER: &str = "Control4";

/// Model reported in device metadata
pub const MODEL: &str = "Matrix Amplifier";

/// Identity of one physical amplifier: the (host, port) pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AmpId {
    pub host: String,
    pub port: u16,
}

impl AmpId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for AmpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Identity of one zone: (host, port, channel), unique across all zones
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneKey {
    pub amp: AmpId,
    pub channel: Channel,
}

impl ZoneKey {
    pub fn new(host: impl Into<String>, port: u16, channel: Channel) -> Self {
        Self {
            amp: AmpId::new(host, port),
            channel,
        }
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:ch{}", self.amp, self.channel)
    }
}

/// Supported amplifier sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AmpSize {
    Four,
    #[default]
    Eight,
}

impl AmpSize {
    /// All sizes offered by the setup wizard
    pub const CHOICES: [AmpSize; 2] = [AmpSize::Four, AmpSize::Eight];

    /// Number of output channels
    pub fn channels(self) -> Channel {
        match self {
            AmpSize::Four => 4,
            AmpSize::Eight => 8,
        }
    }

    /// Map an arbitrary number onto a known size, falling back to 8 channels
    pub fn from_channels_or_default(value: Option<i64>) -> Self {
        match value {
            Some(4) => AmpSize::Four,
            _ => AmpSize::Eight,
        }
    }
}

impl TryFrom<u8> for AmpSize {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            4 => Ok(AmpSize::Four),
            8 => Ok(AmpSize::Eight),
            other => Err(format!("unsupported amplifier size {}", other)),
        }
    }
}

impl From<AmpSize> for u8 {
    fn from(size: AmpSize) -> Self {
        size.channels()
    }
}

impl fmt::Display for AmpSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channels())
    }
}

/// Power state of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

/// Media-player capabilities a zone exposes to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    TurnOn,
    TurnOff,
    VolumeSet,
    VolumeStep,
    VolumeMute,
    SelectSource,
}

impl Feature {
    /// Capability set of every zone
    pub fn zone_features() -> BTreeSet<Feature> {
        [
            Feature::TurnOn,
            Feature::TurnOff,
            Feature::VolumeSet,
            Feature::VolumeStep,
            Feature::VolumeMute,
            Feature::SelectSource,
        ]
        .into_iter()
        .collect()
    }
}

/// Device descriptor, one per amplifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Grouping key (`host:port`)
    pub identifier: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Registration record for one zone entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub unique_id: String,
    /// Key of the owning [`DeviceInfo`]
    pub device_key: String,
    pub name: String,
    pub features: BTreeSet<Feature>,
}
