use std::fs::write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tgsender::config::{parse_admins, SenderConfig};
use tgsender::load_config::load_config;

fn config_file(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), content).unwrap();
    file
}

/// Legacy configs store flags as 0/1.
#[test]
fn test_load_config_accepts_numeric_flags() {
    let file = config_file(
        r#"
create_new_channel: 0
chat_id: -1001234567890
channel_adms: "@alice, @bob"
time_limit: 5
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    assert!(!config.create_new_channel);
    assert_eq!(config.chat_id, Some(-1001234567890));
    assert_eq!(config.admins(), vec!["@alice", "@bob"]);
    assert_eq!(config.send_deadline(), Duration::from_secs(300));
    assert_eq!(
        config.retry_cooldown(),
        Duration::from_secs(30),
        "cooldown defaults to 30 seconds"
    );
}

#[test]
fn test_load_config_accepts_boolean_flags() {
    let file = config_file("create_new_channel: true\nretry_cooldown_secs: 2\n");
    let config = load_config(file.path()).unwrap();
    assert!(config.create_new_channel);
    assert_eq!(config.chat_id, None);
    assert_eq!(config.retry_cooldown(), Duration::from_secs(2));
}

#[test]
fn test_load_config_defaults_for_empty_file() {
    let file = config_file("");
    let config = load_config(file.path()).unwrap();
    assert_eq!(config, SenderConfig::default());
    assert!(config.create_new_channel);
    assert_eq!(config.time_limit, 20);
    assert!(config.admins().is_empty());
}

#[test]
fn test_load_config_rejects_out_of_range_flag() {
    let file = config_file("create_new_channel: 2\n");
    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("parse"), "Parse error expected, got: {msg}");
}

#[test]
fn test_load_config_rejects_zero_time_limit() {
    let file = config_file("time_limit: 0\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("time_limit"), "got: {err}");
}

/// If the config file is not valid YAML, load_config errors and reports as such.
#[test]
fn test_load_config_errors_for_invalid_file() {
    let file = config_file("chat_id: [:::");
    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
fn test_load_config_errors_for_missing_file() {
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_parse_admins_trims_and_drops_empty_entries() {
    assert_eq!(parse_admins(" 123, @bob ,,"), vec!["123", "@bob"]);
    assert!(parse_admins("  ").is_empty());
}

#[test]
fn test_send_deadline_saturates_for_huge_time_limit() {
    let config = SenderConfig {
        time_limit: u64::MAX,
        ..Default::default()
    };
    assert_eq!(config.send_deadline(), Duration::from_secs(u64::MAX));

    let config = SenderConfig {
        time_limit: 20,
        ..Default::default()
    };
    assert_eq!(config.send_deadline(), Duration::from_secs(1200));
}
