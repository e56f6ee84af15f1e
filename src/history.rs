use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// One remembered message from a submitter
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub normalized: String,
    pub original: String,
    pub links: Vec<String>,
    pub timestamp: SystemTime,
}

impl HistoryEntry {
    /// Time elapsed between this entry and `now`, zero if the clock went backwards
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.timestamp).unwrap_or(Duration::ZERO)
    }
}

/// Bounded, TTL-limited per-submitter message history.
///
/// Implementations must make `record` atomic per submitter: the returned
/// snapshot and the append happen under the same critical section.
pub trait HistoryStore: Send + Sync {
    /// Return the submitter's live entries (oldest first) as they were
    /// before this call, then append `entry`
    fn record(&self, submitter: &str, entry: HistoryEntry) -> Vec<HistoryEntry>;

    /// Live entries for the submitter at `now`, oldest first
    fn recent(&self, submitter: &str, now: SystemTime) -> Vec<HistoryEntry>;

    /// Drop expired entries for every submitter
    fn prune(&self, now: SystemTime);

    fn tracked_submitters(&self) -> usize;
}

pub struct InMemoryHistoryStore {
    windows: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
    capacity: usize,
    ttl: Duration,
    max_tracked_submitters: usize,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new(20, Duration::from_secs(10 * 60), 1000)
    }
}

impl InMemoryHistoryStore {
    pub fn new(capacity: usize, ttl: Duration, max_tracked_submitters: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
            max_tracked_submitters,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<HistoryEntry>>> {
        // The map holds plain data, so a panic elsewhere cannot leave it inconsistent
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn prune_map(&self, windows: &mut HashMap<String, VecDeque<HistoryEntry>>, now: SystemTime) {
        let ttl = self.ttl;
        windows.retain(|_, window| {
            window.retain(|e| e.age(now) < ttl);
            !window.is_empty()
        });
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn record(&self, submitter: &str, entry: HistoryEntry) -> Vec<HistoryEntry> {
        let now = entry.timestamp;
        let ttl = self.ttl;
        let mut windows = self.lock();

        let window = windows.entry(submitter.to_string()).or_default();
        window.retain(|e| e.age(now) < ttl);
        let previous: Vec<HistoryEntry> = window.iter().cloned().collect();

        window.push_back(entry);
        while window.len() > self.capacity {
            window.pop_front();
        }

        if windows.len() > self.max_tracked_submitters {
            log::debug!(
                "Tracking {} submitters (limit {}), pruning expired history",
                windows.len(),
                self.max_tracked_submitters
            );
            self.prune_map(&mut windows, now);
        }

        previous
    }

    fn recent(&self, submitter: &str, now: SystemTime) -> Vec<HistoryEntry> {
        let windows = self.lock();
        windows
            .get(submitter)
            .map(|window| {
                window
                    .iter()
                    .filter(|e| e.age(now) < self.ttl)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn prune(&self, now: SystemTime) {
        let mut windows = self.lock();
        self.prune_map(&mut windows, now);
    }

    fn tracked_submitters(&self) -> usize {
        self.lock().len()
    }
}
