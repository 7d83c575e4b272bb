//! Repeat suppression for plates seen within a short window.
//!
//! The gate remembers when each plate was last *accepted*. A later reading of the
//! same plate is a duplicate while it falls inside the window; duplicates do not
//! refresh the entry, so a plate parked in view is re-recorded once per window.
//!
//! Distances are absolute, so a clock stepping backwards cannot produce two
//! accepted events closer than the window.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    Duplicate { since_last: Duration },
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accepted)
    }
}

/// In-memory plate -> last acceptance time. Owned by the capture loop; not shared.
#[derive(Debug)]
pub struct DedupGate {
    window: Duration,
    last_accepted: HashMap<String, SystemTime>,
    last_prune: Option<SystemTime>,
}

impl DedupGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
            last_prune: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of plates currently remembered.
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }

    /// Decide whether `plate` observed at `now` should be persisted.
    pub fn check(&mut self, plate: &str, now: SystemTime) -> GateDecision {
        self.prune_if_due(now);

        if let Some(&last) = self.last_accepted.get(plate) {
            let since_last = distance(now, last);
            if since_last < self.window {
                return GateDecision::Duplicate { since_last };
            }
        }

        self.last_accepted.insert(plate.to_string(), now);
        GateDecision::Accepted
    }

    /// Evict entries that can no longer block a write. Returns how many were removed.
    pub fn prune(&mut self, now: SystemTime) -> usize {
        let before = self.last_accepted.len();
        let window = self.window;
        self.last_accepted
            .retain(|_, &mut last| distance(now, last) < window);
        self.last_prune = Some(now);
        before - self.last_accepted.len()
    }

    fn prune_if_due(&mut self, now: SystemTime) {
        let due = match self.last_prune {
            Some(last) => distance(now, last) >= self.window,
            None => true,
        };
        if due {
            let removed = self.prune(now);
            if removed > 0 {
                log::debug!("dedup gate pruned {} expired plate(s)", removed);
            }
        }
    }
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

fn distance(a: SystemTime, b: SystemTime) -> Duration {
    match a.duration_since(b) {
        Ok(d) => d,
        Err(e) => e.duration(),
    }
}
