// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier Resolver.
//!
//! Best-effort cache from ephemeral (`@lid`) addresses to the phone-based
//! address observed alongside them in message metadata. Entries expire
//! after a maximum age and the map is capped at a maximum size, evicting
//! the oldest observations first.

use std::time::Duration;

use dashmap::DashMap;
use switchboard_core::address::{self, AddressKind, PHONE_SUFFIX};
use switchboard_core::types::InboundEnvelope;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Mapping {
    address: String,
    observed_at: Instant,
}

pub struct IdentifierResolver {
    mappings: DashMap<String, Mapping>,
    max_entries: usize,
    max_age: Duration,
}

impl IdentifierResolver {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            mappings: DashMap::new(),
            max_entries,
            max_age,
        }
    }

    /// Records that `ephemeral` belongs to `stable`.
    pub fn observe(&self, ephemeral: &str, stable: &str) {
        self.mappings.insert(
            ephemeral.to_string(),
            Mapping {
                address: stable.to_string(),
                observed_at: Instant::now(),
            },
        );
        if self.mappings.len() > self.max_entries {
            self.prune();
        }
    }

    /// Maps an address to a stable one.
    ///
    /// Stable addresses resolve to themselves; ephemeral ones only through
    /// an unexpired mapping.
    pub fn resolve(&self, address: &str) -> Option<String> {
        if !address::is_ephemeral(address) {
            return Some(address.to_string());
        }
        let mapping = self.mappings.get(address)?;
        if mapping.observed_at.elapsed() > self.max_age {
            drop(mapping);
            self.evict_if_expired(address);
            return None;
        }
        Some(mapping.address.clone())
    }

    /// Removes the mapping for `address` only if it is still expired when
    /// the shard lock is held, so a concurrent fresh `observe` survives.
    fn evict_if_expired(&self, address: &str) -> bool {
        let max_age = self.max_age;
        self.mappings
            .remove_if(address, |_, m| m.observed_at.elapsed() > max_age)
            .is_some()
    }

    /// Resolves the sender of an inbound message, learning from its
    /// metadata when the sender address is ephemeral.
    pub fn resolve_inbound(&self, envelope: &InboundEnvelope) -> Option<String> {
        if address::kind(&envelope.from) != AddressKind::Ephemeral {
            return Some(envelope.from.clone());
        }
        if let Some(stable) = envelope.sender_phone.as_deref().and_then(phone_address) {
            self.observe(&envelope.from, &stable);
            debug!(from = %envelope.from, resolved = %stable, "learned address mapping");
            return Some(stable);
        }
        self.resolve(&envelope.from)
    }

    /// Drops expired mappings, then the oldest ones beyond the size cap.
    pub fn prune(&self) {
        let max_age = self.max_age;
        self.mappings.retain(|_, m| m.observed_at.elapsed() <= max_age);

        let excess = self.mappings.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut by_age: Vec<(String, Instant)> = self
                .mappings
                .iter()
                .map(|e| (e.key().clone(), e.value().observed_at))
                .collect();
            by_age.sort_by_key(|(_, observed_at)| *observed_at);
            for (key, _) in by_age.into_iter().take(excess) {
                self.mappings.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Phone-based address for sender metadata, which may be a bare number or
/// a full address with a device suffix.
fn phone_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.contains('@') && address::kind(raw) != AddressKind::Phone {
        return None;
    }
    let digits: String = address::user_part(raw)
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("{digits}{PHONE_SUFFIX}"))
    }
}
