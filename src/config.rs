//! Persisted zone configuration and the options overlay
//!
//! One [`ConfigEntry`] exists per zone. Its `data` is the record the setup
//! wizard created; `options` is what the options editor wrote afterwards.
//! [`ConfigEntry::effective`] layers the two without touching `data`.

use crate::types::{AmpId, AmpSize, Channel, ZoneKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default UDP control port of the amplifier
pub const DEFAULT_PORT: u16 = 8750;

/// Default volume applied when a zone is turned on (percent)
pub const DEFAULT_ON_VOLUME: u8 = 5;

/// Default source names
pub const DEFAULT_SOURCE_LIST: [&str; 4] = ["1", "2", "3", "4"];

pub const DEFAULT_POLL_EXTERNAL: bool = false;

/// Default polling interval in seconds
pub const DEFAULT_POLL_INTERVAL: u32 = 5;

pub const MIN_POLL_INTERVAL: u32 = 1;
pub const MAX_POLL_INTERVAL: u32 = 300;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_on_volume() -> u8 {
    DEFAULT_ON_VOLUME
}

fn default_poll_interval() -> u32 {
    DEFAULT_POLL_INTERVAL
}

/// The default source list as owned strings
pub fn default_source_list() -> Vec<String> {
    DEFAULT_SOURCE_LIST.iter().map(|s| s.to_string()).collect()
}

/// Clamp a polling interval to the supported range
pub fn clamp_poll_interval(seconds: u32) -> u32 {
    seconds.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Split comma or newline separated text, dropping blank pieces
pub fn split_sources(text: &str) -> Vec<String> {
    text.replace('\r', "\n")
        .split('\n')
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split comma or newline separated text into a clean source list.
///
/// Text with no usable pieces yields the default list.
pub fn normalize_sources(text: &str) -> Vec<String> {
    let sources = split_sources(text);
    if sources.is_empty() {
        default_source_list()
    } else {
        sources
    }
}

/// Trim list items and drop blanks
pub fn normalize_source_items<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inherited list if there is one, otherwise `1..=size`
pub fn default_sources_for_size(size: AmpSize, inherited: Option<&[String]>) -> Vec<String> {
    match inherited {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ => (1..=size.channels()).map(|i| i.to_string()).collect(),
    }
}

/// Persisted configuration of one zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub channel: Channel,

    /// Volume applied on power-on, in percent
    #[serde(default = "default_on_volume")]
    pub on_volume: u8,

    #[serde(default = "default_source_list")]
    pub source_list: Vec<String>,

    #[serde(default)]
    pub poll_external: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: u32,
}

impl ZoneConfig {
    /// New zone record with default on-volume, sources and polling
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, channel: Channel) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            channel,
            on_volume: DEFAULT_ON_VOLUME,
            source_list: default_source_list(),
            poll_external: DEFAULT_POLL_EXTERNAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn amp_id(&self) -> AmpId {
        AmpId::new(self.host.clone(), self.port)
    }

    pub fn key(&self) -> ZoneKey {
        ZoneKey::new(self.host.clone(), self.port, self.channel)
    }

    /// Entry title shown by the host
    pub fn title(&self) -> String {
        format!("{} ({}:{} ch{})", self.name, self.host, self.port, self.channel)
    }
}

/// Options overlay written by the options editor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_volume: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_list: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_external: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u32>,
}

impl ZoneOptions {
    pub fn is_empty(&self) -> bool {
        *self == ZoneOptions::default()
    }
}

/// One persisted zone record as the host stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: Uuid,
    pub unique_id: String,
    pub title: String,
    pub data: ZoneConfig,
    #[serde(default)]
    pub options: ZoneOptions,
}

impl ConfigEntry {
    /// Create an entry with a fresh id for the given zone
    pub fn new(data: ZoneConfig) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            unique_id: data.key().to_string(),
            title: data.title(),
            data,
            options: ZoneOptions::default(),
        }
    }

    pub fn amp_id(&self) -> AmpId {
        self.data.amp_id()
    }

    /// Source list currently in effect (options first, then data)
    pub fn source_list(&self) -> Vec<String> {
        let list = self
            .options
            .source_list
            .as_deref()
            .unwrap_or(&self.data.source_list);
        let list = normalize_source_items(list);
        if list.is_empty() {
            default_source_list()
        } else {
            list
        }
    }

    /// Configuration with the options overlay applied
    pub fn effective(&self) -> ZoneConfig {
        let mut config = self.data.clone();
        if let Some(on_volume) = self.options.on_volume {
            config.on_volume = on_volume;
        }
        config.source_list = self.source_list();
        if let Some(poll_external) = self.options.poll_external {
            config.poll_external = poll_external;
        }
        if let Some(poll_interval) = self.options.poll_interval {
            config.poll_interval = poll_interval;
        }
        config.on_volume = config.on_volume.min(100);
        config.poll_interval = clamp_poll_interval(config.poll_interval);
        config
    }
}

/// Source list as written in a legacy record: a list or delimited text
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceListInput {
    List(Vec<serde_yaml::Value>),
    Text(String),
}

impl SourceListInput {
    pub fn normalize(&self) -> Vec<String> {
        match self {
            SourceListInput::Text(text) => normalize_sources(text),
            SourceListInput::List(items) => {
                let items: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
                let list = normalize_source_items(&items);
                if list.is_empty() {
                    default_source_list()
                } else {
                    list
                }
            }
        }
    }
}

/// String form of a YAML scalar; `None` for mappings and sequences
pub(crate) fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Flat zone record from a legacy configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub channel: Option<i64>,
    #[serde(default)]
    pub on_volume: Option<i64>,
    #[serde(default)]
    pub source_list: Option<SourceListInput>,
    #[serde(default, alias = "Amplifier Size")]
    pub amp_size: Option<i64>,
}

/// Parse a YAML sequence of legacy zone records
pub fn parse_import_records(text: &str) -> crate::error::Result<Vec<ImportRecord>> {
    Ok(serde_yaml::from_str(text)?)
}
