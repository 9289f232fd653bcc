// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Switchboard session gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Switchboard configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchboardConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Connection lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Outbound queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Keep-alive probe settings.
    #[serde(default)]
    pub keepalive: KeepAliveConfig,

    /// Webhook delivery settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Ephemeral address cache settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Protocol bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_gateway_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_gateway_name() -> String {
    "switchboard".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("switchboard").join("switchboard.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("switchboard.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Connection lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Delay before reconnecting after a non-logout closure.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Consecutive purges of incomplete credentials tolerated before the
    /// session is deactivated.
    #[serde(default = "default_max_credential_purges")]
    pub max_credential_purges: u32,

    /// Country code prepended to 10-digit national numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    /// Timeout for text sends; media sends scale up from this.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Upper bound for media send timeouts.
    #[serde(default = "default_max_send_timeout_secs")]
    pub max_send_timeout_secs: u64,

    /// Capacity of the connection event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_credential_purges: default_max_credential_purges(),
            default_country_code: default_country_code(),
            send_timeout_secs: default_send_timeout_secs(),
            max_send_timeout_secs: default_max_send_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_max_credential_purges() -> u32 {
    3
}

fn default_country_code() -> String {
    "91".to_string()
}

fn default_send_timeout_secs() -> u64 {
    25
}

fn default_max_send_timeout_secs() -> u64 {
    45
}

fn default_event_buffer() -> usize {
    256
}

/// Outbound queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Interval between periodic drains.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,

    /// Delivery attempts before a queued message is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_drain_interval_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

/// Keep-alive configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeepAliveConfig {
    /// Per-session liveness probe interval.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Interval of the global inactivity sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Idle time after which the sweep probes a session.
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,

    /// Timeout applied to each probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    120
}

fn default_inactivity_threshold_secs() -> u64 {
    300
}

fn default_probe_timeout_secs() -> u64 {
    10
}

/// Webhook delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// HTTP timeout per delivery.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,

    /// Characters of a failed response body kept in logs.
    #[serde(default = "default_response_preview_chars")]
    pub response_preview_chars: usize,

    /// User-Agent header sent with deliveries.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout_secs(),
            response_preview_chars: default_response_preview_chars(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    5
}

fn default_response_preview_chars() -> usize {
    200
}

fn default_user_agent() -> String {
    concat!("switchboard-webhook/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Ephemeral address cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Maximum number of cached mappings.
    #[serde(default = "default_resolver_max_entries")]
    pub max_entries: usize,

    /// Mappings older than this are pruned.
    #[serde(default = "default_resolver_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_entries: default_resolver_max_entries(),
            max_age_secs: default_resolver_max_age_secs(),
        }
    }
}

fn default_resolver_max_entries() -> usize {
    10_000
}

fn default_resolver_max_age_secs() -> u64 {
    86_400
}

/// Protocol bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// WebSocket endpoint of the protocol sidecar.
    #[serde(default = "default_bridge_url")]
    pub url: String,

    /// Timeout for a request/acknowledgement round trip.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:3001/bridge".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}
