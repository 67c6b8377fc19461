// Config loading and validation tests

use hubwatch::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[monitoring]
monitor_period_mins = 10

[[hosts]]
name = "prod"
addr = "api.notefile.net"

[[hosts]]
name = "staging"
addr = "api.staging.blues.tools"
disabled = true

[data]
directory = "data"
host_url = "https://watcher.example.net"

[slack]
webhook_url = "https://hooks.slack.com/services/T000/B000/XXXX"
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.monitoring.monitor_period_mins, 10);
    assert_eq!(config.hosts.len(), 2);
    assert_eq!(config.hosts[0].name, "prod");
    assert!(!config.hosts[0].disabled);
    assert!(config.hosts[1].disabled);
    assert_eq!(config.data.directory, "data");
    assert!(config.aws.is_none());
    assert!(config.datadog.is_none());
    assert_eq!(
        config.slack.as_ref().map(|s| s.webhook_url.as_str()),
        Some("https://hooks.slack.com/services/T000/B000/XXXX")
    );
}

#[test]
fn test_pending_events_warning_defaults() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    assert_eq!(config.monitoring.pending_events_warning, 250);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_zero_monitor_period() {
    let bad = VALID_CONFIG.replace("monitor_period_mins = 10", "monitor_period_mins = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("monitor_period_mins"));
}

#[test]
fn test_config_validation_rejects_empty_data_directory() {
    let bad = VALID_CONFIG.replace("directory = \"data\"", "directory = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("data.directory"));
}

#[test]
fn test_config_validation_rejects_host_without_addr() {
    let bad = VALID_CONFIG.replace("addr = \"api.notefile.net\"", "addr = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("needs an addr"));
}

#[test]
fn test_config_validation_rejects_empty_aws_bucket() {
    let bad = format!(
        "{VALID_CONFIG}\n[aws]\nregion = \"us-east-1\"\naccess_key_id = \"k\"\nsecret_access_key = \"s\"\nbucket = \"\"\n"
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("aws.bucket"));
}
