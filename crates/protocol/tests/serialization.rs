use pk_protocol::*;
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_process_definition_deserialization_from_yaml() {
    let yaml_str = r#"
name: onboarding
description: "Collect profile details, then sync them"
steps:
  - kind: set-vars
    vars:
      stage: profile
  - kind: sleep
    ms: 300
  - kind: emit
    event: synced
    args: ["profile", 2]
  - kind: fail
    message: "boom"
"#;

    let definition: ProcessDefinitionConfig =
        serde_yaml::from_str(yaml_str).expect("Failed to deserialize ProcessDefinitionConfig");

    assert_eq!(definition.name, "onboarding");
    assert_eq!(definition.steps.len(), 4);
    assert_eq!(definition.steps[0].kind, "set-vars");
    assert_eq!(definition.steps[0].param("vars"), Some(&json!({"stage": "profile"})));
    assert_eq!(definition.steps[1].param("ms"), Some(&json!(300)));
    assert_eq!(definition.steps[2].param("args"), Some(&json!(["profile", 2])));
    assert_eq!(definition.steps[3].param("message"), Some(&json!("boom")));
}

#[test]
fn test_definition_without_description() {
    let yaml_str = r#"
name: minimal
steps: []
"#;

    let definition: ProcessDefinitionConfig = serde_yaml::from_str(yaml_str).unwrap();
    assert_eq!(definition.description, "");
    assert!(definition.steps.is_empty());
}

#[test]
fn test_process_state_wire_names() {
    let cases = [
        (ProcessState::Start, "\"start\""),
        (ProcessState::InProgress, "\"in-progress\""),
        (ProcessState::Pause, "\"pause\""),
        (ProcessState::Cancel, "\"cancel\""),
        (ProcessState::Error, "\"error\""),
        (ProcessState::Done, "\"done\""),
    ];

    for (state, expected) in cases {
        assert_eq!(serde_json::to_string(&state).unwrap(), expected);
        assert_eq!(serde_json::from_str::<ProcessState>(expected).unwrap(), state);
    }
}

#[test]
fn test_process_record_json_shape() {
    let id = Uuid::new_v4();
    let mut vars = Vars::new();
    vars.insert("a".to_string(), json!(1));
    let record = ProcessRecord::new(id, "aries", "wizard", vars);

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(
        value,
        json!({
            "id": id.to_string(),
            "user_id": "aries",
            "process_type": "wizard",
            "step": 0,
            "state": "start",
            "vars": {"a": 1}
        })
    );
}

#[test]
fn test_record_patch_skips_absent_fields() {
    let patch = RecordPatch::state(ProcessState::Pause);
    let value = serde_json::to_value(&patch).unwrap();
    assert_eq!(value, json!({"state": "pause"}));

    let decoded: RecordPatch = serde_json::from_value(json!({"step": 2})).unwrap();
    assert_eq!(decoded, RecordPatch::step(2));
    assert!(RecordPatch::default().is_empty());
}

#[test]
fn test_process_event_tagged_serialization() {
    let record = ProcessRecord::new(Uuid::new_v4(), "aries", "wizard", Vars::new());
    let event = ProcessEvent::Task {
        record: record.clone(),
        step: Some(1),
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "task");
    assert_eq!(value["payload"]["step"], 1);
    assert_eq!(value["payload"]["record"]["process_type"], "wizard");

    let task_event = ProcessEvent::TaskEvent {
        name: "progress".to_string(),
        args: vec![json!(50), json!("half")],
    };
    let value = serde_json::to_value(&task_event).unwrap();
    assert_eq!(value["type"], "taskEvent");
    assert_eq!(value["payload"]["args"], json!([50, "half"]));

    let done = serde_json::to_value(&ProcessEvent::Done).unwrap();
    assert_eq!(done, json!({"type": "done"}));
}

#[test]
fn test_global_config_from_toml() {
    let toml_str = r#"
user-id = "aries"
poll-interval-ms = 250

[store]
backend = "sqlite"
path = "data/processes.db"
"#;

    let config: GlobalConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.user_id, "aries");
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.store.backend, StoreBackend::Sqlite);
    assert_eq!(config.store.path, "data/processes.db");
}

#[test]
fn test_global_config_defaults() {
    let config: GlobalConfig = toml::from_str("").unwrap();
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.store.path, DEFAULT_SQLITE_PATH);
}
