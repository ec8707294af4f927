//! Network event correlation
//!
//! The driver reports responses and failed requests asynchronously. They land
//! in a single last-writer-wins slot; an action claims the slot's contents
//! only when the event is younger than the freshness window. A short ring of
//! recent events is kept alongside for reports.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use rowpilot_common::NetworkSnapshot;

use crate::driver::DriverEvent;

/// Default freshness window
pub const DEFAULT_FRESHNESS: Duration = Duration::from_millis(1500);

const HISTORY_CAPACITY: usize = 64;

/// Network activity attributed to one action; all `None` when stale
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub method: Option<String>,
    pub url: Option<String>,
    pub status: Option<u16>,
}

#[derive(Default)]
struct Slots {
    latest: Option<NetworkSnapshot>,
    history: VecDeque<NetworkSnapshot>,
}

pub struct NetworkCorrelator {
    freshness: Duration,
    slots: Mutex<Slots>,
}

impl NetworkCorrelator {
    pub fn new(freshness: Duration) -> Self {
        Self {
            freshness,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn record_response(&self, status: u16, method: &str, url: &str) {
        self.record_response_at(status, method, url, Utc::now());
    }

    pub fn record_response_at(&self, status: u16, method: &str, url: &str, at: DateTime<Utc>) {
        self.store(NetworkSnapshot {
            status: Some(status),
            method: method.to_string(),
            url: url.to_string(),
            observed_at: at,
        });
    }

    pub fn record_failure(&self, method: &str, url: &str) {
        self.record_failure_at(method, url, Utc::now());
    }

    pub fn record_failure_at(&self, method: &str, url: &str, at: DateTime<Utc>) {
        self.store(NetworkSnapshot {
            status: None,
            method: method.to_string(),
            url: url.to_string(),
            observed_at: at,
        });
    }

    pub fn observe(&self, event: DriverEvent) {
        match event {
            DriverEvent::Response {
                status,
                method,
                url,
            } => self.record_response(status, &method, &url),
            DriverEvent::RequestFailed { method, url } => self.record_failure(&method, &url),
        }
    }

    fn store(&self, snapshot: NetworkSnapshot) {
        trace!("network {} {} {:?}", snapshot.method, snapshot.url, snapshot.status);
        let mut slots = self.slots.lock();
        if slots.history.len() == HISTORY_CAPACITY {
            slots.history.pop_front();
        }
        slots.history.push_back(snapshot.clone());
        slots.latest = Some(snapshot);
    }

    pub fn latest(&self) -> Option<NetworkSnapshot> {
        self.slots.lock().latest.clone()
    }

    /// Recent events, oldest first
    pub fn history(&self) -> Vec<NetworkSnapshot> {
        self.slots.lock().history.iter().cloned().collect()
    }

    pub fn correlate(&self) -> Attribution {
        self.correlate_at(Utc::now())
    }

    /// Attribute the slot to an action happening at `now`
    pub fn correlate_at(&self, now: DateTime<Utc>) -> Attribution {
        let Some(latest) = self.latest() else {
            return Attribution::default();
        };

        let age = now.signed_duration_since(latest.observed_at);
        let fresh = age
            .to_std()
            .map(|age| age < self.freshness)
            .unwrap_or(true);

        if fresh {
            Attribution {
                method: Some(latest.method),
                url: Some(latest.url),
                status: latest.status,
            }
        } else {
            Attribution::default()
        }
    }

    /// Drain driver events into the slot until the stream ends
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<DriverEvent>,
    ) -> JoinHandle<()> {
        let correlator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                correlator.observe(event);
            }
        })
    }
}

impl Default for NetworkCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_empty_slot_is_unavailable() {
        let correlator = NetworkCorrelator::default();
        assert_eq!(correlator.correlate(), Attribution::default());
    }

    #[test]
    fn test_fresh_event_is_attributed() {
        let correlator = NetworkCorrelator::default();
        let at = Utc::now();
        correlator.record_response_at(201, "POST", "https://x/api/login", at);

        let attribution = correlator.correlate_at(at + ChronoDuration::milliseconds(1499));
        assert_eq!(attribution.method.as_deref(), Some("POST"));
        assert_eq!(attribution.url.as_deref(), Some("https://x/api/login"));
        assert_eq!(attribution.status, Some(201));
    }

    #[test]
    fn test_stale_event_is_unavailable() {
        let correlator = NetworkCorrelator::default();
        let at = Utc::now();
        correlator.record_response_at(200, "GET", "https://x/", at);

        let attribution = correlator.correlate_at(at + ChronoDuration::milliseconds(1501));
        assert_eq!(attribution, Attribution::default());
    }

    #[test]
    fn test_last_writer_wins() {
        let correlator = NetworkCorrelator::default();
        let at = Utc::now();
        correlator.record_response_at(200, "GET", "https://x/a", at);
        correlator.record_failure_at("GET", "https://x/b", at);

        let attribution = correlator.correlate_at(at);
        assert_eq!(attribution.url.as_deref(), Some("https://x/b"));
        assert_eq!(attribution.status, None);
        assert_eq!(correlator.history().len(), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let correlator = NetworkCorrelator::default();
        for i in 0..(HISTORY_CAPACITY + 10) {
            correlator.record_response(200, "GET", &format!("https://x/{}", i));
        }
        let history = correlator.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history[0].url, "https://x/10");
    }

    #[tokio::test]
    async fn test_listener_drains_events() {
        let correlator = Arc::new(NetworkCorrelator::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = correlator.spawn_listener(rx);

        tx.send(DriverEvent::Response {
            status: 404,
            method: "GET".to_string(),
            url: "https://x/missing".to_string(),
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(correlator.latest().unwrap().status, Some(404));
    }
}
