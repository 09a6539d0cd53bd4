use std::time::{Duration, Instant};

use dashmap::DashMap;

/// In-memory dedup filter keyed by `AuditEventDraft::dedup_key` (spec.md
/// §4.3 "Deduplication": "identical events within `dedup_window` are
/// collapsed to one"). Entries older than the window are lazily evicted on
/// `seen` rather than via a background sweep, since the filter is expected
/// to stay small relative to traffic volume.
pub struct DedupFilter {
    window: Duration,
    seen_at: DashMap<String, Instant>,
}

impl DedupFilter {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            seen_at: DashMap::new(),
        }
    }

    /// Returns `true` if `key` was already seen within the window (caller
    /// should drop the event), else records it and returns `false`.
    pub fn seen(&self, key: &str) -> bool {
        let now = Instant::now();
        if let Some(entry) = self.seen_at.get(key) {
            if now.duration_since(*entry) < self.window {
                return true;
            }
        }
        self.seen_at.insert(key.to_string(), now);
        false
    }

    pub fn len(&self) -> usize {
        self.seen_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_at.is_empty()
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}
