//! Rust library for controlling Control4 matrix amplifiers
//!
//! Each output channel of an amplifier is exposed as a zone that behaves
//! like a media player. It supports:
//!
//! - Power, volume, mute and source selection per zone over UDP
//! - Optional polling of the amplifier to pick up changes made elsewhere
//! - A setup wizard that adds one zone or a run of zones per amplifier
//! - An options editor with a YAML/JSON source list editor
//! - Import of zone definitions from YAML
//! - Real-time state update subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use control4_amp::{ConfigFlow, FlowStep, MainFormInput, MemoryStore, Registry, UdpTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!
//!     // Add a zone through the setup wizard
//!     let mut flow = ConfigFlow::new(store.clone());
//!     flow.start();
//!     let step = flow.submit_main(MainFormInput {
//!         name: "Kitchen".into(),
//!         host: "192.168.1.50".into(),
//!         channel: 1,
//!         ..MainFormInput::default()
//!     })?;
//!
//!     if let FlowStep::Created(entry) = step {
//!         let registry = Registry::new(Arc::new(UdpTransport::new()));
//!         let zone = registry.setup_entry(&entry).await?;
//!
//!         let mut updates = registry.subscribe_updates();
//!         zone.turn_on().await;
//!         zone.select_source("2").await?;
//!
//!         while let Ok(update) = updates.recv().await {
//!             println!("State update: {:?}", update);
//!             break;
//!         }
//!
//!         registry.shutdown().await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Wizard / Options**: entry creation and editing against an [`EntryStore`]
//! - **Registry**: live zones for configured entries
//! - **Zone**: media player facade with optimistic state
//! - **Coordinator**: periodic status polling
//! - **Channel**: command sequences for one amplifier output
//! - **Transport**: UDP request/reply exchange
//! - **Protocol**: command text, framing and status parsing

mod channel;
mod config;
mod coordinator;
mod error;
mod options;
mod protocol;
mod registry;
mod store;
mod subscription;
mod transport;
mod types;
mod wizard;
mod zone;

// Public exports
pub use channel::AmpChannel;
pub use config::{
    default_source_list, default_sources_for_size, normalize_sources, parse_import_records,
    split_sources, ConfigEntry, ImportRecord, SourceListInput, ZoneConfig, ZoneOptions,
    DEFAULT_ON_VOLUME, DEFAULT_POLL_INTERVAL, DEFAULT_PORT, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
pub use coordinator::{query_status, ZoneCoordinator};
pub use error::{AmpError, Result};
pub use options::{
    dump_source_document, parse_source_document, AdvancedForm, OptionsFlow, OptionsInput,
    OptionsStep, SOURCE_LIST_EXAMPLE,
};
pub use protocol::{frame, parse_status, volume_to_native, Command, PolledStatus};
pub use registry::Registry;
pub use store::{EntryStore, MemoryStore};
pub use subscription::{StateReceiver, ZoneUpdate};
pub use transport::{Transport, UdpTransport};
pub use types::{
    AmpId, AmpSize, Channel, DeviceInfo, EntityDescriptor, Feature, PowerState, ZoneKey,
};
pub use wizard::{
    available_run, import_yaml, next_available, AbortReason, BulkNamesForm, ConfigFlow, FlowStep,
    FormError, MainForm, MainFormInput,
};
pub use zone::{Zone, ZoneSnapshot, ZoneState};
