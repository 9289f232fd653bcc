// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime settings resolved from configuration.

use std::time::Duration;

use switchboard_config::model::SwitchboardConfig;
use switchboard_core::types::OutboundPayload;

/// Binary size that buys one extra second of send timeout.
const MEDIA_CHUNK_BYTES: usize = 512 * 1024;

/// Timers and limits used by the session manager.
///
/// Kept separate from the config model so tests can use sub-second values.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub reconnect_delay: Duration,
    pub max_credential_purges: u32,
    pub default_country_code: String,
    pub send_timeout: Duration,
    pub max_send_timeout: Duration,
    pub event_buffer: usize,
    pub drain_interval: Duration,
    pub max_retries: u32,
    pub probe_interval: Duration,
    pub sweep_interval: Duration,
    pub inactivity_threshold: Duration,
    pub probe_timeout: Duration,
    pub resolver_max_entries: usize,
    pub resolver_max_age: Duration,
}

impl ManagerSettings {
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        Self {
            reconnect_delay: Duration::from_secs(config.session.reconnect_delay_secs),
            max_credential_purges: config.session.max_credential_purges,
            default_country_code: config.session.default_country_code.clone(),
            send_timeout: Duration::from_secs(config.session.send_timeout_secs),
            max_send_timeout: Duration::from_secs(config.session.max_send_timeout_secs),
            event_buffer: config.session.event_buffer,
            drain_interval: Duration::from_secs(config.queue.drain_interval_secs),
            max_retries: config.queue.max_retries,
            probe_interval: Duration::from_secs(config.keepalive.probe_interval_secs),
            sweep_interval: Duration::from_secs(config.keepalive.sweep_interval_secs),
            inactivity_threshold: Duration::from_secs(config.keepalive.inactivity_threshold_secs),
            probe_timeout: Duration::from_secs(config.keepalive.probe_timeout_secs),
            resolver_max_entries: config.resolver.max_entries,
            resolver_max_age: Duration::from_secs(config.resolver.max_age_secs),
        }
    }

    /// Timeout for one outbound send.
    ///
    /// Text uses the base timeout; media adds a second per 512 KiB, capped
    /// at the maximum.
    pub fn send_timeout_for(&self, payload: &OutboundPayload) -> Duration {
        let extra = Duration::from_secs((payload.binary_len() / MEDIA_CHUNK_BYTES) as u64);
        (self.send_timeout + extra).min(self.max_send_timeout)
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&SwitchboardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config() {
        let s = ManagerSettings::default();
        assert_eq!(s.reconnect_delay, Duration::from_secs(5));
        assert_eq!(s.drain_interval, Duration::from_secs(5));
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.default_country_code, "91");
    }

    #[test]
    fn send_timeout_scales_with_media_and_caps() {
        let s = ManagerSettings::default();
        assert_eq!(s.send_timeout_for(&OutboundPayload::text("hi")), Duration::from_secs(25));

        let image = OutboundPayload::Image {
            data: vec![0; 3 * MEDIA_CHUNK_BYTES],
            caption: None,
        };
        assert_eq!(s.send_timeout_for(&image), Duration::from_secs(28));

        let video = OutboundPayload::Video {
            data: vec![0; 64 * MEDIA_CHUNK_BYTES],
            caption: None,
        };
        assert_eq!(s.send_timeout_for(&video), Duration::from_secs(45));
    }
}
