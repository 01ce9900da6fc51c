//! Post-setup options editor
//!
//! The simple form edits on-volume, the source list as delimited text and
//! the polling settings. Ticking "advanced" switches to a YAML/JSON editor
//! for the source list. Either path can push the new source list (and only
//! the source list) to every other zone on the same amplifier.

use crate::config::{
    clamp_poll_interval, normalize_source_items, normalize_sources, scalar_to_string, split_sources,
    ConfigEntry, ZoneOptions,
};
use crate::error::{AmpError, Result};
use crate::store::EntryStore;
use serde_yaml::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Sample document shown next to parse errors
pub const SOURCE_LIST_EXAMPLE: &str = "- HC800-1\n- HC800-2\n- Server";

/// Values of the simple options form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsInput {
    pub on_volume: Option<u8>,
    pub source_list: Option<String>,
    /// Continue to the advanced source list editor
    pub advanced: bool,
    pub apply_to_all: bool,
    pub poll_external: Option<bool>,
    pub poll_interval: Option<u32>,
}

impl Default for OptionsInput {
    fn default() -> Self {
        Self {
            on_volume: None,
            source_list: None,
            advanced: false,
            apply_to_all: true,
            poll_external: None,
            poll_interval: None,
        }
    }
}

/// Advanced editor as it should be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancedForm {
    pub text: String,
    pub apply_to_all: bool,
    pub error: Option<String>,
}

/// What the host should do after an options step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsStep {
    /// Simple form, prefilled
    Form(OptionsInput),
    Advanced(AdvancedForm),
    /// Options written for the edited entry
    Saved(ZoneOptions),
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    on_volume: u8,
    apply_to_all: bool,
    poll_external: bool,
    poll_interval: u32,
}

#[derive(Debug, Clone, Copy)]
enum OptionsState {
    Init,
    Form,
    Advanced(Pending),
    Done,
}

/// Parse the advanced editor's document into a source list.
///
/// Accepts a YAML/JSON list or a bare comma/newline separated string.
/// Anything else, or a list that is empty after trimming, is an error.
pub fn parse_source_document(text: &str) -> Result<Vec<String>> {
    let value: Value = serde_yaml::from_str(text)?;
    let sources = match value {
        Value::Null => Vec::new(),
        Value::String(s) => split_sources(&s),
        Value::Number(_) | Value::Bool(_) => scalar_to_string(&value)
            .map(|s| split_sources(&s))
            .unwrap_or_default(),
        Value::Sequence(items) => {
            let mut names = Vec::with_capacity(items.len());
            for item in &items {
                match item {
                    Value::Null => {}
                    other => names.push(scalar_to_string(other).ok_or_else(|| {
                        AmpError::InvalidSourceList("list items must be plain strings".to_string())
                    })?),
                }
            }
            normalize_source_items(&names)
        }
        Value::Mapping(_) | Value::Tagged(_) => {
            return Err(AmpError::InvalidSourceList(
                "expected a list of strings or a string".to_string(),
            ))
        }
    };

    if sources.is_empty() {
        return Err(AmpError::InvalidSourceList("source list is empty".to_string()));
    }
    Ok(sources)
}

/// Render a source list as a YAML block sequence, one source per line
pub fn dump_source_document(sources: &[String]) -> String {
    if sources.is_empty() {
        return "- ".to_string();
    }
    sources
        .iter()
        .map(|s| format!("- {}", yaml_scalar(s)))
        .collect::<Vec<_>>()
        .join("\n")
}

// Plain when it reads back unchanged, JSON-quoted otherwise
fn yaml_scalar(source: &str) -> String {
    match serde_yaml::from_str::<Value>(source) {
        Ok(Value::String(parsed)) if parsed == source => source.to_string(),
        _ => serde_json::Value::String(source.to_string()).to_string(),
    }
}

/// Options editor for one zone entry
pub struct OptionsFlow {
    store: Arc<dyn EntryStore>,
    entry_id: Uuid,
    state: OptionsState,
}

impl OptionsFlow {
    pub fn new(store: Arc<dyn EntryStore>, entry_id: Uuid) -> Self {
        Self {
            store,
            entry_id,
            state: OptionsState::Init,
        }
    }

    fn entry(&self) -> Result<ConfigEntry> {
        self.store
            .entry(self.entry_id)
            .ok_or(AmpError::EntryNotFound(self.entry_id))
    }

    /// Render the simple form with the zone's current options
    pub fn start(&mut self) -> Result<OptionsStep> {
        let current = self.entry()?.effective();
        self.state = OptionsState::Form;
        Ok(OptionsStep::Form(OptionsInput {
            on_volume: Some(current.on_volume),
            source_list: Some(current.source_list.join(",")),
            advanced: false,
            apply_to_all: true,
            poll_external: Some(current.poll_external),
            poll_interval: Some(current.poll_interval),
        }))
    }

    /// Handle a submission of the simple form
    pub fn submit(&mut self, input: OptionsInput) -> Result<OptionsStep> {
        if !matches!(self.state, OptionsState::Form) {
            return Err(AmpError::InvalidFlowState(format!(
                "options form submitted in {:?}",
                self.state
            )));
        }

        let current = self.entry()?.effective();
        let pending = Pending {
            on_volume: input.on_volume.unwrap_or(current.on_volume).min(100),
            apply_to_all: input.apply_to_all,
            poll_external: input.poll_external.unwrap_or(current.poll_external),
            poll_interval: clamp_poll_interval(input.poll_interval.unwrap_or(current.poll_interval)),
        };

        if input.advanced {
            self.state = OptionsState::Advanced(pending);
            return Ok(OptionsStep::Advanced(AdvancedForm {
                text: dump_source_document(&current.source_list),
                apply_to_all: pending.apply_to_all,
                error: None,
            }));
        }

        let sources = match &input.source_list {
            Some(text) => normalize_sources(text),
            None => current.source_list,
        };
        self.save(pending, sources)
    }

    /// Handle a submission of the advanced editor.
    ///
    /// A document that does not parse re-renders the editor with the text
    /// as entered.
    pub fn submit_advanced(&mut self, text: Option<String>, apply_to_all: Option<bool>) -> Result<OptionsStep> {
        let OptionsState::Advanced(mut pending) = self.state else {
            return Err(AmpError::InvalidFlowState(format!(
                "advanced editor submitted in {:?}",
                self.state
            )));
        };
        if let Some(apply_to_all) = apply_to_all {
            pending.apply_to_all = apply_to_all;
        }

        let text = match text {
            Some(text) => text,
            None => dump_source_document(&self.entry()?.effective().source_list),
        };

        match parse_source_document(&text) {
            Ok(sources) => self.save(pending, sources),
            Err(e) => {
                tracing::debug!("Rejected source list document: {}", e);
                self.state = OptionsState::Advanced(pending);
                Ok(OptionsStep::Advanced(AdvancedForm {
                    text,
                    apply_to_all: pending.apply_to_all,
                    error: Some(format!(
                        "Could not parse YAML/JSON. Please enter a list, e.g.\n{}",
                        SOURCE_LIST_EXAMPLE
                    )),
                }))
            }
        }
    }

    fn save(&mut self, pending: Pending, sources: Vec<String>) -> Result<OptionsStep> {
        let entry = self.entry()?;
        let options = ZoneOptions {
            on_volume: Some(pending.on_volume),
            source_list: Some(sources.clone()),
            poll_external: Some(pending.poll_external),
            poll_interval: Some(pending.poll_interval),
        };
        self.store.update_options(self.entry_id, options.clone())?;

        if pending.apply_to_all {
            let amp = entry.amp_id();
            for sibling in self.store.entries_for_amp(&amp) {
                if sibling.entry_id == self.entry_id {
                    continue;
                }
                let mut sibling_options = sibling.options.clone();
                sibling_options.source_list = Some(sources.clone());
                self.store.update_options(sibling.entry_id, sibling_options)?;
            }
            tracing::info!("Applied source list of {} to all zones on {}", entry.title, amp);
        }

        self.state = OptionsState::Done;
        Ok(OptionsStep::Saved(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneConfig;
    use crate::store::MemoryStore;

    fn store_with_amp() -> (Arc<MemoryStore>, Vec<Uuid>) {
        let entries: Vec<ConfigEntry> = (1..=3)
            .map(|ch| {
                let mut config = ZoneConfig::new(format!("Zone {}", ch), "10.0.0.5", 8750, ch);
                config.on_volume = 10 * ch;
                ConfigEntry::new(config)
            })
            .chain(std::iter::once(ConfigEntry::new(ZoneConfig::new(
                "Other amp",
                "10.0.0.6",
                8750,
                1,
            ))))
            .collect();
        let ids = entries.iter().map(|e| e.entry_id).collect();
        (Arc::new(MemoryStore::with_entries(entries)), ids)
    }

    #[test]
    fn test_parse_list_and_string_documents() {
        assert_eq!(
            parse_source_document("- HC800-1\n- HC800-2\n- Server").unwrap(),
            vec!["HC800-1", "HC800-2", "Server"]
        );
        assert_eq!(
            parse_source_document(r#"["Tuner", " TV ", 3]"#).unwrap(),
            vec!["Tuner", "TV", "3"]
        );
        assert_eq!(parse_source_document("Tuner, TV").unwrap(), vec!["Tuner", "TV"]);
    }

    #[test]
    fn test_parse_rejects_bad_documents() {
        assert!(parse_source_document("[unclosed").is_err());
        assert!(parse_source_document("a: b").is_err());
        assert!(parse_source_document("- [nested]").is_err());
        assert!(parse_source_document("").is_err());
        assert!(parse_source_document("- \n- ' '").is_err());
        assert!(parse_source_document("\" , \"").is_err());
        assert!(parse_source_document("'\n'").is_err());
    }

    #[test]
    fn test_dump_then_parse_preserves_sources() {
        let sources: Vec<String> = ["HC800-1", "Server: Main", "#2", "true", "- dash", "[x", "007"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let text = dump_source_document(&sources);
        assert_eq!(parse_source_document(&text).unwrap(), sources);
        assert!(text.starts_with("- HC800-1\n"));
    }

    #[test]
    fn test_simple_edit_applies_sources_to_siblings_only() {
        let (store, ids) = store_with_amp();
        let mut flow = OptionsFlow::new(store.clone(), ids[0]);
        flow.start().unwrap();

        let step = flow
            .submit(OptionsInput {
                on_volume: Some(40),
                source_list: Some("Tuner\nTV".into()),
                ..OptionsInput::default()
            })
            .unwrap();
        assert!(matches!(step, OptionsStep::Saved(ref o) if o.on_volume == Some(40)));

        let edited = store.entry(ids[0]).unwrap().effective();
        assert_eq!(edited.on_volume, 40);
        assert_eq!(edited.source_list, vec!["Tuner", "TV"]);

        for (id, on_volume) in [(ids[1], 20), (ids[2], 30)] {
            let sibling = store.entry(id).unwrap().effective();
            assert_eq!(sibling.source_list, vec!["Tuner", "TV"]);
            assert_eq!(sibling.on_volume, on_volume);
        }
        let other = store.entry(ids[3]).unwrap().effective();
        assert_eq!(other.source_list, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_edit_without_apply_to_all() {
        let (store, ids) = store_with_amp();
        let mut flow = OptionsFlow::new(store.clone(), ids[0]);
        flow.start().unwrap();
        flow.submit(OptionsInput {
            source_list: Some("Tuner".into()),
            apply_to_all: false,
            ..OptionsInput::default()
        })
        .unwrap();

        assert_eq!(store.entry(ids[0]).unwrap().effective().source_list, vec!["Tuner"]);
        assert!(store.entry(ids[1]).unwrap().options.is_empty());
    }

    #[test]
    fn test_advanced_editor_preserves_text_on_error() {
        let (store, ids) = store_with_amp();
        let mut flow = OptionsFlow::new(store.clone(), ids[1]);
        flow.start().unwrap();

        let step = flow
            .submit(OptionsInput {
                advanced: true,
                on_volume: Some(55),
                ..OptionsInput::default()
            })
            .unwrap();
        let OptionsStep::Advanced(form) = step else {
            panic!("expected advanced editor");
        };
        assert_eq!(form.text, "- \"1\"\n- \"2\"\n- \"3\"\n- \"4\"");

        let step = flow
            .submit_advanced(Some("{broken".into()), None)
            .unwrap();
        match step {
            OptionsStep::Advanced(form) => {
                assert_eq!(form.text, "{broken");
                assert!(form.error.unwrap().contains(SOURCE_LIST_EXAMPLE));
            }
            other => panic!("expected advanced editor, got {:?}", other),
        }

        let step = flow
            .submit_advanced(Some("- Tuner\n- Server".into()), Some(false))
            .unwrap();
        assert!(matches!(step, OptionsStep::Saved(_)));

        let edited = store.entry(ids[1]).unwrap().effective();
        assert_eq!(edited.on_volume, 55);
        assert_eq!(edited.source_list, vec!["Tuner", "Server"]);
        assert!(store.entry(ids[0]).unwrap().options.is_empty());
    }

    #[test]
    fn test_poll_settings_saved_and_clamped() {
        let (store, ids) = store_with_amp();
        let mut flow = OptionsFlow::new(store.clone(), ids[0]);
        flow.start().unwrap();
        flow.submit(OptionsInput {
            poll_external: Some(true),
            poll_interval: Some(0),
            apply_to_all: false,
            ..OptionsInput::default()
        })
        .unwrap();

        let effective = store.entry(ids[0]).unwrap().effective();
        assert!(effective.poll_external);
        assert_eq!(effective.poll_interval, 1);
    }

    #[test]
    fn test_unknown_entry() {
        let store = Arc::new(MemoryStore::new());
        let mut flow = OptionsFlow::new(store, Uuid::new_v4());
        assert!(matches!(flow.start(), Err(AmpError::EntryNotFound(_))));
    }
}
