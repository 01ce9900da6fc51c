//! Setup wizard for new zones
//!
//! The flow moves through explicit steps:
//!
//! ```text
//! start -> MainForm --submit_main--> MainForm    (soft refresh / correction)
//!                                 -> BulkNames   --submit_bulk_names--> Created
//!                                 -> Created
//!                                 -> Aborted
//! ```
//!
//! A soft refresh happens when the amplifier size or the bulk toggle differs
//! from what the form was last rendered with. It only re-renders; nothing is
//! committed. Import and direct creation skip the forms entirely.

use crate::config::{
    default_source_list, default_sources_for_size, normalize_sources, parse_import_records,
    ConfigEntry, ImportRecord, ZoneConfig, DEFAULT_ON_VOLUME, DEFAULT_PORT,
};
use crate::error::{AmpError, Result};
use crate::store::EntryStore;
use crate::types::{AmpId, AmpSize, Channel};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Values of the main setup form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainFormInput {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub amp_size: AmpSize,
    pub channel: u32,
    /// Percent, 0..=100
    pub on_volume: u8,
    /// Comma or newline separated; `None` takes the suggested default
    pub source_list: Option<String>,
    pub bulk: bool,
    pub name_prefix: String,
    pub zone_count: Option<u32>,
}

impl Default for MainFormInput {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: DEFAULT_PORT,
            amp_size: AmpSize::Eight,
            channel: 1,
            on_volume: DEFAULT_ON_VOLUME,
            source_list: None,
            bulk: false,
            name_prefix: String::new(),
            zone_count: Some(1),
        }
    }
}

/// Main form as it should be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainForm {
    /// Values to prefill
    pub defaults: MainFormInput,
    /// Upper bound of the channel picker
    pub channel_max: Channel,
    /// Upper bound of the zone count picker
    pub zone_max: Channel,
    /// Whether the bulk prefix and count fields are shown
    pub show_bulk: bool,
    pub error: Option<FormError>,
}

/// Recoverable problem shown on the main form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Form updated for a {0}-zone amplifier.")]
    AmpSizeChanged(AmpSize),

    #[error("Host is required.")]
    HostRequired,

    #[error("Channel must be between 1 and {max}.")]
    ChannelOutOfRange { max: Channel },

    #[error("Channel {channel} is already configured on {amp}. Next available is {next}.")]
    ChannelInUse {
        channel: Channel,
        amp: String,
        next: Channel,
    },
}

/// Per-channel name form shown after a bulk submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkNamesForm {
    /// Channels that will be created, ascending
    pub channels: Vec<Channel>,
    pub defaults: BTreeMap<Channel, String>,
}

/// Why a flow ended without creating anything
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("All zones are already configured for {0}.")]
    NoCapacity(String),

    #[error("Zone {0} is already configured.")]
    AlreadyConfigured(String),

    #[error("Could not save zone: {0}")]
    StoreFailed(String),
}

/// What the host should do after a flow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    MainForm(MainForm),
    BulkNames(BulkNamesForm),
    Created(ConfigEntry),
    Aborted(AbortReason),
}

#[derive(Debug, Clone)]
struct BulkPlan {
    channels: Vec<Channel>,
    prefix: String,
    host: String,
    port: u16,
    on_volume: u8,
    source_list: Vec<String>,
}

impl BulkPlan {
    fn default_name(&self, channel: Channel) -> String {
        if self.prefix.is_empty() {
            format!("Zone {}", channel)
        } else {
            format!("{} {}", self.prefix, channel)
        }
    }
}

#[derive(Debug, Clone)]
enum FlowState {
    Init,
    MainForm { amp_size: AmpSize, bulk: bool },
    BulkNames(BulkPlan),
    Done,
}

/// Smallest channel not in `used`, if the amplifier has one free
pub fn next_available(used: &BTreeSet<Channel>, size: AmpSize) -> Option<Channel> {
    (1..=size.channels()).find(|ch| !used.contains(ch))
}

/// Contiguous free channels starting at `start`
pub fn available_run(used: &BTreeSet<Channel>, start: Channel, size: AmpSize) -> Vec<Channel> {
    (start.max(1)..=size.channels())
        .take_while(|ch| !used.contains(ch))
        .collect()
}

fn zone_max(used: &BTreeSet<Channel>, start: Channel, size: AmpSize, bulk: bool) -> Channel {
    if bulk {
        let run = available_run(used, start, size).len();
        Channel::try_from(run.max(1)).unwrap_or(size.channels())
    } else {
        size.channels()
    }
}

fn clamp_channel(channel: u32, size: AmpSize) -> Channel {
    let clamped = channel.clamp(1, u32::from(size.channels()));
    Channel::try_from(clamped).unwrap_or(1)
}

/// Interactive setup flow for one or more zones.
///
/// Holds only per-flow scratch state; concurrent flows share nothing but
/// the entry store.
pub struct ConfigFlow {
    store: Arc<dyn EntryStore>,
    state: FlowState,
    spawned: Vec<JoinHandle<FlowStep>>,
    completed: Vec<FlowStep>,
}

impl ConfigFlow {
    pub fn new(store: Arc<dyn EntryStore>) -> Self {
        Self {
            store,
            state: FlowState::Init,
            spawned: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Initial render: 8-zone amplifier, bulk off
    pub fn start(&mut self) -> FlowStep {
        let size = AmpSize::Eight;
        self.state = FlowState::MainForm {
            amp_size: size,
            bulk: false,
        };
        let defaults = MainFormInput {
            source_list: Some(default_sources_for_size(size, None).join(",")),
            ..MainFormInput::default()
        };
        FlowStep::MainForm(MainForm {
            defaults,
            channel_max: size.channels(),
            zone_max: size.channels(),
            show_bulk: false,
            error: None,
        })
    }

    /// Handle a submission of the main form
    pub fn submit_main(&mut self, input: MainFormInput) -> Result<FlowStep> {
        let (last_size, last_bulk) = match self.state {
            FlowState::MainForm { amp_size, bulk } => (amp_size, bulk),
            ref other => {
                return Err(AmpError::InvalidFlowState(format!(
                    "main form submitted in {:?}",
                    other
                )))
            }
        };

        let mut input = input;
        input.name = input.name.trim().to_string();
        input.host = input.host.trim().to_string();
        input.name_prefix = input.name_prefix.trim().to_string();
        let size = input.amp_size;
        let bulk = input.bulk;

        let amp = AmpId::new(input.host.clone(), input.port);
        let known_amp = !input.host.is_empty() && input.port != 0;
        let (used, inherited) = if known_amp {
            let siblings = self.store.entries_for_amp(&amp);
            let used: BTreeSet<Channel> = siblings.iter().map(|e| e.data.channel).collect();
            (used, siblings.first().map(|e| e.source_list()))
        } else {
            (BTreeSet::new(), None)
        };
        let location = if known_amp {
            amp.to_string()
        } else {
            "this amplifier".to_string()
        };

        let auto_sources = default_sources_for_size(size, inherited.as_deref());
        let mut source_list = match &input.source_list {
            Some(text) => normalize_sources(text),
            None => auto_sources.clone(),
        };

        let start = clamp_channel(input.channel, size);
        let next = next_available(&used, size);

        if bulk && known_amp && next.is_none() {
            self.state = FlowState::Done;
            return Ok(FlowStep::Aborted(AbortReason::NoCapacity(location)));
        }

        if last_size != size || last_bulk != bulk {
            self.state = FlowState::MainForm { amp_size: size, bulk };
            let render_channel = if known_amp { next.unwrap_or(start) } else { start };
            let error = (last_size != size).then_some(FormError::AmpSizeChanged(size));
            tracing::debug!("Re-rendering setup form for {}-zone amplifier, bulk {}", size, bulk);
            return Ok(self.render(&input, render_channel, &auto_sources, &used, None, error));
        }

        source_list.truncate(usize::from(size.channels()));

        if !known_amp {
            return Ok(self.render(&input, start, &source_list, &used, None, Some(FormError::HostRequired)));
        }

        if input.channel < 1 || input.channel > u32::from(size.channels()) {
            let error = FormError::ChannelOutOfRange {
                max: size.channels(),
            };
            return Ok(self.render(&input, start, &source_list, &used, None, Some(error)));
        }

        let Some(next) = next else {
            self.state = FlowState::Done;
            return Ok(FlowStep::Aborted(AbortReason::NoCapacity(location)));
        };

        let channel = start;
        if used.contains(&channel) {
            let suggested_count = available_run(&used, next, size).len();
            let error = FormError::ChannelInUse {
                channel,
                amp: location,
                next,
            };
            return Ok(self.render(
                &input,
                next,
                &source_list,
                &used,
                Some(suggested_count as u32),
                Some(error),
            ));
        }

        if bulk {
            let run = available_run(&used, channel, size);
            let requested = input.zone_count.unwrap_or(run.len() as u32) as usize;
            let count = requested.clamp(1, run.len());
            let plan = BulkPlan {
                channels: run[..count].to_vec(),
                prefix: input.name_prefix.clone(),
                host: input.host.clone(),
                port: input.port,
                on_volume: input.on_volume.min(100),
                source_list,
            };
            let form = BulkNamesForm {
                channels: plan.channels.clone(),
                defaults: plan
                    .channels
                    .iter()
                    .map(|&ch| (ch, plan.default_name(ch)))
                    .collect(),
            };
            tracing::debug!("Bulk setup of channels {:?} on {}", plan.channels, amp);
            self.state = FlowState::BulkNames(plan);
            return Ok(FlowStep::BulkNames(form));
        }

        let name = if input.name.is_empty() {
            format!("Zone {}", channel)
        } else {
            input.name.clone()
        };
        let mut config = ZoneConfig::new(name, input.host, input.port, channel);
        config.on_volume = input.on_volume.min(100);
        config.source_list = source_list;
        Ok(self.commit(config))
    }

    /// Handle the per-channel names of a bulk setup.
    ///
    /// The first zone is created by this flow; the rest are created by
    /// independent flows spawned on the current Tokio runtime. Without a
    /// runtime the rest are created in place and collected by
    /// [`ConfigFlow::take_completed`].
    pub fn submit_bulk_names(&mut self, names: BTreeMap<Channel, String>) -> Result<FlowStep> {
        let plan = match std::mem::replace(&mut self.state, FlowState::Done) {
            FlowState::BulkNames(plan) => plan,
            other => {
                let message = format!("bulk names submitted in {:?}", other);
                self.state = other;
                return Err(AmpError::InvalidFlowState(message));
            }
        };

        let configs: Vec<ZoneConfig> = plan
            .channels
            .iter()
            .map(|&ch| {
                let name = names
                    .get(&ch)
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| plan.default_name(ch));
                let mut config = ZoneConfig::new(name, plan.host.clone(), plan.port, ch);
                config.on_volume = plan.on_volume;
                config.source_list = plan.source_list.clone();
                config
            })
            .collect();

        let mut configs = configs.into_iter();
        let Some(first) = configs.next() else {
            return Err(AmpError::InvalidFlowState("bulk plan has no channels".to_string()));
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                for config in configs {
                    let store = self.store.clone();
                    self.spawned.push(runtime.spawn(async move {
                        ConfigFlow::new(store).create_zone(config)
                    }));
                }
            }
            Err(_) => {
                tracing::debug!("No Tokio runtime, creating remaining bulk zones in place");
                for config in configs {
                    let step = ConfigFlow::new(self.store.clone()).create_zone(config);
                    self.completed.push(step);
                }
            }
        }

        Ok(self.commit(first))
    }

    /// Create a zone without any form interaction
    pub fn create_zone(&mut self, config: ZoneConfig) -> FlowStep {
        let key = config.key();
        if self.store.used_channels(&key.amp).contains(&key.channel) {
            self.state = FlowState::Done;
            return FlowStep::Aborted(AbortReason::AlreadyConfigured(key.to_string()));
        }
        self.commit(config)
    }

    /// Import one zone from a legacy record
    pub fn import(&mut self, record: ImportRecord) -> FlowStep {
        let size = AmpSize::from_channels_or_default(record.amp_size);
        let channel = record
            .channel
            .unwrap_or(1)
            .clamp(1, i64::from(size.channels()));
        let channel = Channel::try_from(channel).unwrap_or(1);

        let name = match record.name.trim() {
            "" => format!("Zone {}", channel),
            name => name.to_string(),
        };
        let mut config = ZoneConfig::new(
            name,
            record.host.trim(),
            record.port.unwrap_or(DEFAULT_PORT),
            channel,
        );
        config.on_volume = record
            .on_volume
            .map(|v| u8::try_from(v.clamp(0, 100)).unwrap_or(DEFAULT_ON_VOLUME))
            .unwrap_or(DEFAULT_ON_VOLUME);
        config.source_list = record
            .source_list
            .as_ref()
            .map(|s| s.normalize())
            .unwrap_or_else(default_source_list);

        tracing::info!("Importing {}", config.title());
        self.create_zone(config)
    }

    /// Handles of flows spawned by a bulk submission
    pub fn take_spawned(&mut self) -> Vec<JoinHandle<FlowStep>> {
        std::mem::take(&mut self.spawned)
    }

    /// Results of bulk flows that ran in place
    pub fn take_completed(&mut self) -> Vec<FlowStep> {
        std::mem::take(&mut self.completed)
    }

    fn commit(&mut self, config: ZoneConfig) -> FlowStep {
        self.state = FlowState::Done;
        let entry = ConfigEntry::new(config);
        match self.store.add_entry(entry.clone()) {
            Ok(()) => FlowStep::Created(entry),
            Err(AmpError::AlreadyConfigured(unique_id)) => {
                FlowStep::Aborted(AbortReason::AlreadyConfigured(unique_id))
            }
            Err(e) => FlowStep::Aborted(AbortReason::StoreFailed(e.to_string())),
        }
    }

    fn render(
        &self,
        input: &MainFormInput,
        channel: Channel,
        source_list: &[String],
        used: &BTreeSet<Channel>,
        zone_count: Option<u32>,
        error: Option<FormError>,
    ) -> FlowStep {
        let size = input.amp_size;
        let zone_max = zone_max(used, channel, size, input.bulk);
        let zone_count = zone_count
            .or(input.zone_count)
            .unwrap_or(1)
            .clamp(1, u32::from(zone_max));

        FlowStep::MainForm(MainForm {
            defaults: MainFormInput {
                channel: u32::from(channel),
                source_list: Some(source_list.join(",")),
                zone_count: Some(zone_count),
                ..input.clone()
            },
            channel_max: size.channels(),
            zone_max,
            show_bulk: input.bulk,
            error,
        })
    }
}

/// Run one import flow per record in a legacy YAML zone list
pub fn import_yaml(store: Arc<dyn EntryStore>, text: &str) -> Result<Vec<FlowStep>> {
    let records = parse_import_records(text)?;
    Ok(records
        .into_iter()
        .map(|record| ConfigFlow::new(store.clone()).import(record))
        .collect())
}
