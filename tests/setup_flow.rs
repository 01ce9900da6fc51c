use control4_amp::{
    import_yaml, AbortReason, AmpId, ConfigFlow, EntryStore, FlowStep, FormError, MainFormInput,
    MemoryStore, OptionsFlow, OptionsInput, OptionsStep, Registry, UdpTransport,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn amp_input() -> MainFormInput {
    MainFormInput {
        host: "10.0.0.5".into(),
        source_list: Some("Tuner, TV".into()),
        ..MainFormInput::default()
    }
}

async fn bulk_setup(store: Arc<MemoryStore>) {
    let mut flow = ConfigFlow::new(store.clone());
    flow.start();

    let input = MainFormInput {
        bulk: true,
        name_prefix: "Room".into(),
        zone_count: Some(3),
        ..amp_input()
    };

    // Toggling bulk only re-renders the form
    match flow.submit_main(input.clone()).unwrap() {
        FlowStep::MainForm(form) => {
            assert!(form.show_bulk);
            assert_eq!(form.zone_max, 8);
            assert!(form.error.is_none());
        }
        other => panic!("expected re-rendered form, got {:?}", other),
    }
    assert!(store.is_empty());

    let names = match flow.submit_main(input).unwrap() {
        FlowStep::BulkNames(form) => {
            assert_eq!(form.channels, vec![1, 2, 3]);
            assert_eq!(form.defaults[&1], "Room 1");
            form.defaults
        }
        other => panic!("expected bulk names, got {:?}", other),
    };

    let mut names: BTreeMap<u8, String> = names;
    names.insert(2, "Den".into());
    match flow.submit_bulk_names(names).unwrap() {
        FlowStep::Created(entry) => assert_eq!(entry.data.name, "Room 1"),
        other => panic!("expected created entry, got {:?}", other),
    }

    for handle in flow.take_spawned() {
        assert!(matches!(handle.await.unwrap(), FlowStep::Created(_)));
    }
}

#[tokio::test]
async fn test_bulk_setup_then_single_zone_suggestion() {
    let store = Arc::new(MemoryStore::new());
    bulk_setup(store.clone()).await;

    let names: Vec<String> = store.entries().into_iter().map(|e| e.data.name).collect();
    assert_eq!(names, vec!["Room 1", "Den", "Room 3"]);
    for entry in store.entries() {
        assert_eq!(entry.data.source_list, vec!["Tuner", "TV"]);
        assert_eq!(entry.unique_id, format!("10.0.0.5:8750:ch{}", entry.data.channel));
    }

    let mut flow = ConfigFlow::new(store.clone());
    flow.start();
    let step = flow
        .submit_main(MainFormInput {
            name: "Patio".into(),
            channel: 2,
            ..amp_input()
        })
        .unwrap();
    match step {
        FlowStep::MainForm(form) => {
            assert_eq!(
                form.error,
                Some(FormError::ChannelInUse {
                    channel: 2,
                    amp: "10.0.0.5:8750".into(),
                    next: 4,
                })
            );
            assert_eq!(form.defaults.channel, 4);

            let step = flow.submit_main(form.defaults).unwrap();
            assert!(matches!(step, FlowStep::Created(ref e) if e.data.channel == 4 && e.data.name == "Patio"));
        }
        other => panic!("expected corrected form, got {:?}", other),
    }
    assert_eq!(store.used_channels(&AmpId::new("10.0.0.5", 8750)).len(), 4);
}

#[tokio::test]
async fn test_options_broadcast_reaches_running_zones() {
    let store = Arc::new(MemoryStore::new());
    bulk_setup(store.clone()).await;
    let entries = store.entries();
    let edited = entries[0].entry_id;

    let registry = Registry::new(Arc::new(UdpTransport::new()));
    let zones = registry.setup_all(store.as_ref()).await.unwrap();
    assert_eq!(zones.len(), 3);
    for zone in &zones {
        assert_eq!(zone.source_list(), ["Tuner", "TV"].map(String::from));
    }

    let mut options = OptionsFlow::new(store.clone(), edited);
    options.start().unwrap();
    let step = options
        .submit(OptionsInput {
            on_volume: Some(30),
            advanced: true,
            ..OptionsInput::default()
        })
        .unwrap();
    assert!(matches!(step, OptionsStep::Advanced(ref form) if form.text == "- Tuner\n- TV"));

    let step = options
        .submit_advanced(Some("[Tuner, TV, Server]".into()), None)
        .unwrap();
    assert!(matches!(step, OptionsStep::Saved(_)));

    // Running zones keep their config until reloaded
    assert_eq!(
        registry.zone(edited).unwrap().source_list(),
        ["Tuner", "TV"].map(String::from)
    );

    for entry in &entries {
        registry.reload_entry(store.as_ref(), entry.entry_id).await.unwrap();
    }
    for entry in &entries {
        let zone = registry.zone(entry.entry_id).unwrap();
        assert_eq!(zone.source_list(), ["Tuner", "TV", "Server"].map(String::from));
        let expected_on_volume = if entry.entry_id == edited { 30 } else { 5 };
        assert_eq!(zone.config().on_volume, expected_on_volume);
    }
    assert_eq!(registry.zones().len(), 3);
    registry.shutdown().await;
}

#[test]
fn test_import_legacy_yaml() {
    let store = Arc::new(MemoryStore::new());
    let yaml = r#"
- name: Kitchen
  host: 10.0.0.9
  channel: 6
  Amplifier Size: 4
  source_list: "Tuner, TV"
- name: ""
  host: 10.0.0.9
  channel: 2
  on_volume: 80
  source_list: [Tuner, 7]
- name: Kitchen again
  host: 10.0.0.9
  channel: 4
"#;

    let steps = import_yaml(store.clone(), yaml).unwrap();
    assert_eq!(steps.len(), 3);
    match &steps[0] {
        FlowStep::Created(entry) => {
            assert_eq!(entry.data.channel, 4);
            assert_eq!(entry.data.source_list, vec!["Tuner", "TV"]);
        }
        other => panic!("expected created entry, got {:?}", other),
    }
    match &steps[1] {
        FlowStep::Created(entry) => {
            assert_eq!(entry.data.name, "Zone 2");
            assert_eq!(entry.data.on_volume, 80);
            assert_eq!(entry.data.source_list, vec!["Tuner", "7"]);
        }
        other => panic!("expected created entry, got {:?}", other),
    }
    assert_eq!(
        steps[2],
        FlowStep::Aborted(AbortReason::AlreadyConfigured("10.0.0.9:8750:ch4".into()))
    );
    assert_eq!(store.len(), 2);
}
