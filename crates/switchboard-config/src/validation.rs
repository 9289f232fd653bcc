// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero intervals and well-formed URLs.

use crate::diagnostic::ConfigError;
use crate::model::SwitchboardConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SwitchboardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.gateway.log_level.as_str()) {
        fail(format!(
            "gateway.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.gateway.log_level
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let code = &config.session.default_country_code;
    if code.is_empty() || code.len() > 3 || !code.chars().all(|c| c.is_ascii_digit()) {
        fail(format!(
            "session.default_country_code must be 1-3 digits, got `{code}`"
        ));
    }

    if config.session.max_send_timeout_secs < config.session.send_timeout_secs {
        fail(format!(
            "session.max_send_timeout_secs ({}) must be at least session.send_timeout_secs ({})",
            config.session.max_send_timeout_secs, config.session.send_timeout_secs
        ));
    }

    let non_zero: [(&str, u64); 12] = [
        ("session.reconnect_delay_secs", config.session.reconnect_delay_secs),
        ("session.send_timeout_secs", config.session.send_timeout_secs),
        ("session.event_buffer", config.session.event_buffer as u64),
        ("queue.drain_interval_secs", config.queue.drain_interval_secs),
        ("queue.max_retries", u64::from(config.queue.max_retries)),
        ("keepalive.probe_interval_secs", config.keepalive.probe_interval_secs),
        ("keepalive.sweep_interval_secs", config.keepalive.sweep_interval_secs),
        ("keepalive.probe_timeout_secs", config.keepalive.probe_timeout_secs),
        ("webhook.timeout_secs", config.webhook.timeout_secs),
        ("resolver.max_entries", config.resolver.max_entries as u64),
        ("resolver.max_age_secs", config.resolver.max_age_secs),
        ("bridge.request_timeout_secs", config.bridge.request_timeout_secs),
    ];
    for (key, value) in non_zero {
        if value == 0 {
            fail(format!("{key} must be greater than zero"));
        }
    }

    let url = config.bridge.url.trim();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        fail(format!("bridge.url must be a ws:// or wss:// URL, got `{url}`"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
