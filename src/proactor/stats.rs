//! Passive counters over dispatch and link activity
//!
//! Notification methods return nothing, so the loop cannot branch on them.
//! Readers on any thread take an immutable [`StatsSnapshot`].

use super::link_state::{CommEvent, LinkState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Thread-safe stats aggregator using atomics and a mutex for keyed counters
#[derive(Debug, Default)]
pub struct StatsAggregator {
    num_processed: AtomicU64,
    num_ack_timeouts: AtomicU64,
    by_type: Mutex<BTreeMap<String, u64>>,
    links: Mutex<BTreeMap<String, LinkStats>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStats {
    pub num_received: u64,
    pub num_received_by_type: BTreeMap<String, u64>,
    pub num_published: u64,
    pub num_decode_failures: u64,
    pub num_ack_timeouts: u64,
    pub state: Option<LinkState>,
    pub comm_events: Vec<CommEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub num_processed: u64,
    pub num_ack_timeouts: u64,
    pub num_processed_by_type: BTreeMap<String, u64>,
    pub links: BTreeMap<String, LinkStats>,
}

impl StatsSnapshot {
    pub fn link(&self, name: &str) -> Option<&LinkStats> {
        self.links.get(name)
    }

    pub fn processed(&self, message_type: &str) -> u64 {
        self.num_processed_by_type
            .get(message_type)
            .copied()
            .unwrap_or_default()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link so it shows up in snapshots before any traffic
    pub fn add_link(&self, link: &str) {
        self.with_link(link, |stats| {
            stats.state.get_or_insert(LinkState::NotStarted);
        });
    }

    pub fn message_processed(&self, message_type: &str) {
        self.num_processed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_type) = self.by_type.lock() {
            *by_type.entry(message_type.to_string()).or_default() += 1;
        }
    }

    pub fn message_received(&self, link: &str, message_type: &str) {
        self.with_link(link, |stats| {
            stats.num_received += 1;
            *stats
                .num_received_by_type
                .entry(message_type.to_string())
                .or_default() += 1;
        });
    }

    pub fn message_published(&self, link: &str) {
        self.with_link(link, |stats| stats.num_published += 1);
    }

    pub fn decode_failed(&self, link: &str) {
        self.with_link(link, |stats| stats.num_decode_failures += 1);
    }

    pub fn ack_timed_out(&self, link: &str) {
        self.num_ack_timeouts.fetch_add(1, Ordering::Relaxed);
        self.with_link(link, |stats| stats.num_ack_timeouts += 1);
    }

    pub fn comm_event(&self, event: &CommEvent) {
        self.with_link(&event.link, |stats| {
            stats.state = Some(event.to);
            stats.comm_events.push(event.clone());
        });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            num_processed: self.num_processed.load(Ordering::Relaxed),
            num_ack_timeouts: self.num_ack_timeouts.load(Ordering::Relaxed),
            num_processed_by_type: self
                .by_type
                .lock()
                .map(|by_type| by_type.clone())
                .unwrap_or_default(),
            links: self
                .links
                .lock()
                .map(|links| links.clone())
                .unwrap_or_default(),
        }
    }

    fn with_link<F: FnOnce(&mut LinkStats)>(&self, link: &str, f: F) {
        if let Ok(mut links) = self.links.lock() {
            f(links.entry(link.to_string()).or_default());
        }
    }
}
