use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vamp_cli::audio::clock::ManualClock;
use vamp_cli::audio::offline::OfflineBackend;
use vamp_cli::config::EngineConfig;
use vamp_cli::engine::{Engine, SlotConfiguration};
use vamp_cli::model::{ColorTag, Section, SectionId, SectionKind, Setlist, SlotConfig, SlotId};
use vamp_cli::storage::setlist;

fn oceans() -> SlotConfig {
    let mut slot = SlotConfig::empty(SlotId(1), ColorTag("#7c3aed".into()));
    slot.name = "Oceans".into();
    slot.audio_source = Some(PathBuf::from("set/oceans.wav"));
    slot.file_name = Some("oceans.wav".into());
    slot.tempo_bpm = Some(68);
    slot.sections = vec![
        Section::normal(SectionId(1), "Intro", 1),
        Section::looped(SectionId(2), "Vamp", 9, 13),
    ];
    slot
}

#[test]
fn roundtrip_setlist_yaml() {
    let set = Setlist { slots: vec![oceans()] };

    let yaml = serde_yaml::to_string(&set).expect("serialize");
    let out: Setlist = serde_yaml::from_str(&yaml).expect("deserialize");

    assert_eq!(out, set);
    assert_eq!(out.slots[0].sections[1].kind, SectionKind::Loop { end_measure: 13 });
}

#[test]
fn loop_without_end_is_rejected_on_load() {
    let yaml = r#"
slots:
  - id: 1
    name: Oceans
    color: '#7c3aed'
    tempo_bpm: 68
    sections:
      - id: 1
        name: Vamp
        start_measure: 9
        kind: loop
"#;
    let err = serde_yaml::from_str::<Setlist>(yaml).unwrap_err();
    assert!(err.to_string().contains("has no end measure"), "{err}");
}

#[test]
fn saved_file_reopens_and_checks() {
    let dir = tempfile::tempdir().expect("tmp");
    for name in ["set.yaml", "set.json"] {
        let path = dir.path().join(name);
        let set = Setlist { slots: vec![oceans()] };
        setlist::save(&set, &path).expect("save");
        assert_eq!(setlist::open(&path).expect("open"), set);
        assert!(setlist::check(&path).is_ok());
    }
}

#[test]
fn engine_board_survives_save_and_load() {
    let clock = ManualClock::new();
    let backend = OfflineBackend::new(Arc::new(clock.clone())).with_track("set/oceans.wav", Duration::from_secs(120));
    let mut engine = Engine::new(EngineConfig::default(), Box::new(backend.clone()), Arc::new(clock.clone()));
    engine
        .save_slot_configuration(
            SlotId(3),
            SlotConfiguration {
                name: "Oceans".into(),
                audio_file: Some(PathBuf::from("set/oceans.wav")),
                tempo_bpm: Some(68),
                sections: oceans().sections,
            },
        )
        .expect("configure");

    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("set.yaml");
    setlist::save(&engine.setlist(), &path).expect("save");

    let mut fresh = Engine::new(EngineConfig::default(), Box::new(backend), Arc::new(clock));
    fresh.load_setlist(setlist::open(&path).expect("open")).expect("load");

    let slot = fresh.slot(SlotId(3)).expect("slot 3");
    assert_eq!(slot.name, "Oceans");
    assert!(slot.has_audio);
    assert_eq!(slot.file_name.as_deref(), Some("oceans.wav"));
    assert_eq!(slot.sections.len(), 2);
    assert_eq!(fresh.slot_ids().len(), 5);
}
