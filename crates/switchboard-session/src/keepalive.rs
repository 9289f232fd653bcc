// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keep-Alive Monitor.
//!
//! Two cooperating timers: a per-session probe loop while connected, and a
//! global sweep that probes sessions idle past the inactivity threshold.
//! Probe failures are logged only; closure is detected through the
//! connection's own events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use switchboard_core::ConnectionHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A connected session as seen by the sweep.
pub struct SweepTarget {
    pub session_id: String,
    pub last_activity: Instant,
    pub handle: Arc<dyn ConnectionHandle>,
}

pub struct KeepAliveMonitor {
    probe_interval: Duration,
    inactivity_threshold: Duration,
    probe_timeout: Duration,
    timers: DashMap<String, CancellationToken>,
    sweeping: AtomicBool,
    shutdown: CancellationToken,
}

/// Clears the sweep flag when dropped, including when a sweep is cancelled.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl KeepAliveMonitor {
    pub fn new(
        probe_interval: Duration,
        inactivity_threshold: Duration,
        probe_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            probe_interval,
            inactivity_threshold,
            probe_timeout,
            timers: DashMap::new(),
            sweeping: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Starts the periodic probe for a session, replacing any previous one.
    pub fn arm(&self, session_id: &str, handle: Arc<dyn ConnectionHandle>) {
        let token = self.shutdown.child_token();
        if let Some(previous) = self.timers.insert(session_id.to_string(), token.clone()) {
            previous.cancel();
        }

        let session_id = session_id.to_string();
        let period = self.probe_interval;
        let timeout = self.probe_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => probe(&session_id, handle.as_ref(), timeout).await,
                    _ = token.cancelled() => break,
                }
            }
            debug!(session_id = %session_id, "keep-alive probe stopped");
        });
    }

    /// Stops the periodic probe for a session.
    pub fn disarm(&self, session_id: &str) {
        if let Some((_, token)) = self.timers.remove(session_id) {
            token.cancel();
        }
    }

    pub fn is_armed(&self, session_id: &str) -> bool {
        self.timers.contains_key(session_id)
    }

    pub fn disarm_all(&self) {
        for entry in self.timers.iter() {
            entry.value().cancel();
        }
        self.timers.clear();
    }

    /// Probes every target idle longer than the inactivity threshold.
    ///
    /// Returns the number probed, or `None` when a sweep is already running.
    pub async fn sweep(&self, targets: Vec<SweepTarget>) -> Option<usize> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("keep-alive sweep already running, skipping");
            return None;
        }
        let _guard = SweepGuard(&self.sweeping);

        let stale: Vec<SweepTarget> = targets
            .into_iter()
            .filter(|t| t.last_activity.elapsed() > self.inactivity_threshold)
            .collect();
        for target in &stale {
            debug!(session_id = %target.session_id, "session idle, probing");
            probe(&target.session_id, target.handle.as_ref(), self.probe_timeout).await;
        }
        Some(stale.len())
    }
}

async fn probe(session_id: &str, handle: &dyn ConnectionHandle, timeout: Duration) {
    match tokio::time::timeout(timeout, handle.probe()).await {
        Ok(Ok(())) => debug!(session_id, "keep-alive probe ok"),
        Ok(Err(e)) => warn!(session_id, error = %e, "keep-alive probe failed"),
        Err(_) => warn!(session_id, timeout_secs = timeout.as_secs(), "keep-alive probe timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_test_utils::MockHandle;

    fn monitor() -> KeepAliveMonitor {
        KeepAliveMonitor::new(
            Duration::from_secs(30),
            Duration::from_secs(300),
            Duration::from_secs(10),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn armed_session_is_probed_each_interval() {
        let monitor = monitor();
        let handle = Arc::new(MockHandle::new());
        monitor.arm("s", handle.clone());

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(handle.probe_count(), 3);

        monitor.disarm("s");
        assert!(!monitor.is_armed("s"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.probe_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_probes_only_idle_sessions() {
        let monitor = monitor();
        let idle = Arc::new(MockHandle::new());
        let busy = Arc::new(MockHandle::new());
        let idle_since = Instant::now();
        tokio::time::advance(Duration::from_secs(301)).await;

        let probed = monitor
            .sweep(vec![
                SweepTarget {
                    session_id: "idle".to_string(),
                    last_activity: idle_since,
                    handle: idle.clone(),
                },
                SweepTarget {
                    session_id: "busy".to_string(),
                    last_activity: Instant::now(),
                    handle: busy.clone(),
                },
            ])
            .await;

        assert_eq!(probed, Some(1));
        assert_eq!(idle.probe_count(), 1);
        assert_eq!(busy.probe_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sweep_does_not_block_the_next() {
        let monitor = monitor();
        let stuck = Arc::new(MockHandle::new());
        stuck.hang_probes(true);
        let since = Instant::now();
        tokio::time::advance(Duration::from_secs(400)).await;

        let target = |handle: &Arc<MockHandle>| SweepTarget {
            session_id: "s".to_string(),
            last_activity: since,
            handle: handle.clone(),
        };
        let cut_short =
            tokio::time::timeout(Duration::from_secs(1), monitor.sweep(vec![target(&stuck)])).await;
        assert!(cut_short.is_err());
        assert_eq!(stuck.probe_count(), 1);

        let healthy = Arc::new(MockHandle::new());
        assert_eq!(monitor.sweep(vec![target(&healthy)]).await, Some(1));
        assert_eq!(healthy.probe_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_probe_is_not_fatal() {
        let monitor = monitor();
        let handle = Arc::new(MockHandle::new());
        handle.fail_probes(true);
        let since = Instant::now();
        tokio::time::advance(Duration::from_secs(400)).await;

        let probed = monitor
            .sweep(vec![SweepTarget {
                session_id: "s".to_string(),
                last_activity: since,
                handle: handle.clone(),
            }])
            .await;
        assert_eq!(probed, Some(1));
        assert_eq!(handle.probe_count(), 1);
    }
}
