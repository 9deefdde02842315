// Toolgate - Rate Limiter
//
// Sliding-window admission control, one independent window per tool name.
// A check evicts entries older than 60s, admits iff the window holds
// fewer than `max_per_minute` entries, and records only admitted calls.
// The evict-check-append sequence is atomic per key; different keys
// never contend on the same lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

type Window = Arc<Mutex<VecDeque<Instant>>>;

pub struct RateLimiter {
    max_per_minute: usize,
    /// Map lock guards only the key set; each window has its own mutex
    windows: RwLock<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Admit or reject one call for `key`. A rejected call does not
    /// consume a slot.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Same as `check` with an explicit clock — the seam the window
    /// tests drive.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let window = self.window_for(key);
        let mut entries = window.lock().expect("rate window lock poisoned");

        // Lazy eviction: drop everything older than now - 60s
        while let Some(front) = entries.front() {
            if now.duration_since(*front) >= WINDOW {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= self.max_per_minute {
            return false;
        }
        entries.push_back(now);
        true
    }

    /// Entries currently held for `key` (without evicting)
    pub fn usage(&self, key: &str) -> usize {
        let windows = self.windows.read().expect("rate map lock poisoned");
        windows
            .get(key)
            .map(|w| w.lock().expect("rate window lock poisoned").len())
            .unwrap_or(0)
    }

    fn window_for(&self, key: &str) -> Window {
        {
            let windows = self.windows.read().expect("rate map lock poisoned");
            if let Some(w) = windows.get(key) {
                return Arc::clone(w);
            }
        }
        let mut windows = self.windows.write().expect("rate map lock poisoned");
        Arc::clone(
            windows
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new()))),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
