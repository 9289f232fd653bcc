// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Switchboard configuration system.

use switchboard_config::diagnostic::ConfigError;
use switchboard_config::model::SwitchboardConfig;
use switchboard_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[gateway]
name = "edge-1"
log_level = "debug"

[storage]
database_path = "/tmp/switchboard-test.db"
wal_mode = false

[session]
reconnect_delay_secs = 10
max_credential_purges = 2
default_country_code = "1"
send_timeout_secs = 20
max_send_timeout_secs = 40
event_buffer = 64

[queue]
drain_interval_secs = 3
max_retries = 5

[keepalive]
probe_interval_secs = 15
sweep_interval_secs = 60
inactivity_threshold_secs = 120
probe_timeout_secs = 5

[webhook]
timeout_secs = 8
response_preview_chars = 100
user_agent = "custom-agent"

[resolver]
max_entries = 50
max_age_secs = 600

[bridge]
url = "wss://bridge.internal/ws"
request_timeout_secs = 12
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.gateway.name, "edge-1");
    assert_eq!(config.gateway.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/switchboard-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.session.reconnect_delay_secs, 10);
    assert_eq!(config.session.max_credential_purges, 2);
    assert_eq!(config.session.default_country_code, "1");
    assert_eq!(config.session.send_timeout_secs, 20);
    assert_eq!(config.session.max_send_timeout_secs, 40);
    assert_eq!(config.session.event_buffer, 64);
    assert_eq!(config.queue.drain_interval_secs, 3);
    assert_eq!(config.queue.max_retries, 5);
    assert_eq!(config.keepalive.probe_interval_secs, 15);
    assert_eq!(config.keepalive.sweep_interval_secs, 60);
    assert_eq!(config.keepalive.inactivity_threshold_secs, 120);
    assert_eq!(config.keepalive.probe_timeout_secs, 5);
    assert_eq!(config.webhook.timeout_secs, 8);
    assert_eq!(config.webhook.response_preview_chars, 100);
    assert_eq!(config.webhook.user_agent, "custom-agent");
    assert_eq!(config.resolver.max_entries, 50);
    assert_eq!(config.resolver.max_age_secs, 600);
    assert_eq!(config.bridge.url, "wss://bridge.internal/ws");
    assert_eq!(config.bridge.request_timeout_secs, 12);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.gateway.name, "switchboard");
    assert_eq!(config.gateway.log_level, "info");
    assert!(config.storage.wal_mode);
    assert!(config.storage.database_path.ends_with("switchboard.db"));
    assert_eq!(config.session.reconnect_delay_secs, 5);
    assert_eq!(config.session.default_country_code, "91");
    assert_eq!(config.session.send_timeout_secs, 25);
    assert_eq!(config.session.max_send_timeout_secs, 45);
    assert_eq!(config.queue.drain_interval_secs, 5);
    assert_eq!(config.queue.max_retries, 3);
    assert_eq!(config.keepalive.probe_interval_secs, 30);
    assert_eq!(config.keepalive.sweep_interval_secs, 120);
    assert_eq!(config.keepalive.inactivity_threshold_secs, 300);
    assert_eq!(config.webhook.timeout_secs, 5);
    assert!(config.webhook.user_agent.starts_with("switchboard-webhook/"));
    assert_eq!(config.bridge.url, "ws://127.0.0.1:3001/bridge");
}

/// Unknown field in [queue] section produces an error with a suggestion.
#[test]
fn unknown_field_gets_suggestion() {
    let toml = r#"
[queue]
max_retires = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "max_retires");
            assert_eq!(suggestion.as_deref(), Some("max_retries"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_section_is_rejected() {
    let err = load_config_from_str("[telegram]\nbot_token = \"x\"\n")
        .expect_err("unknown section should be rejected");
    let err_str = err.to_string();
    assert!(
        err_str.contains("unknown field") || err_str.contains("telegram"),
        "error should mention the unknown section, got: {err_str}"
    );
}

/// Wrong value type is reported as InvalidType.
#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[session]
reconnect_delay_secs = "soon"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject string for integer");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("reconnect_delay_secs")))
    );
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_errors_surface_from_str_loader() {
    let toml = r#"
[bridge]
url = "http://not-a-websocket"
"#;
    let errors = load_and_validate_str(toml).expect_err("http bridge url is invalid");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("bridge.url")))
    );
}

/// Dotted overrides (what the env provider produces) land in the right section.
#[test]
fn dotted_overrides_map_into_sections() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: SwitchboardConfig = Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::string("[session]\nreconnect_delay_secs = 9\n"))
        .merge(("session.reconnect_delay_secs", 2))
        .merge(("webhook.response_preview_chars", 64))
        .extract()
        .expect("should merge overrides");

    assert_eq!(config.session.reconnect_delay_secs, 2);
    assert_eq!(config.webhook.response_preview_chars, 64);
}

/// Missing config files are silently skipped.
#[test]
fn missing_config_files_silently_skipped() {
    let path = std::path::Path::new("/nonexistent/path/switchboard.toml");
    let config = switchboard_config::load_and_validate_path(path)
        .expect("missing file should be silently skipped");
    assert_eq!(config.gateway.name, "switchboard");
}
