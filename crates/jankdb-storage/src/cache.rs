//! Expiring key/value map with an optional background sweeper.
//!
//! The store keeps a single entry here (key `"all"`) as a shadow of its
//! in-memory value.

use std::{
    collections::HashMap,
    sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

type Entries<T> = Arc<Mutex<HashMap<String, Entry<T>>>>;

/// In-process TTL cache.
///
/// `default_expiration` of `None` keeps entries until deleted. Without a
/// `cleanup_interval` nothing sweeps in the background, but expired entries are
/// still never returned by [`Cache::get`].
pub struct Cache<T> {
    entries: Entries<T>,
    default_expiration: Option<Duration>,
    _janitor: Option<Janitor>,
}

impl<T: Clone + Send + 'static> Cache<T> {
    pub fn new(default_expiration: Option<Duration>, cleanup_interval: Option<Duration>) -> Self {
        let entries: Entries<T> = Arc::new(Mutex::new(HashMap::new()));
        let janitor = cleanup_interval
            .filter(|interval| !interval.is_zero())
            .and_then(|interval| Janitor::spawn(Arc::clone(&entries), interval));

        Self {
            entries,
            default_expiration,
            _janitor: janitor,
        }
    }

    /// Store `value` under `key` with the default expiration.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.insert(key.into(), value, self.default_expiration);
    }

    /// Store `value` under `key`, overriding the default expiration.
    /// `None` never expires.
    pub fn set_with_expiration(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        self.insert(key.into(), value, ttl);
    }

    /// Clone of the live value under `key`, if any.
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = lock(&self.entries);
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    pub fn delete(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn delete_expired(&self) -> usize {
        sweep(&self.entries)
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: String, value: T, ttl: Option<Duration>) {
        // A TTL too large to represent as an instant never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        lock(&self.entries).insert(key, Entry { value, expires_at });
    }
}

// Entries are whole-value replacements, so a panic mid-update cannot leave one
// half written.
fn lock<T>(entries: &Entries<T>) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sweep<T>(entries: &Entries<T>) -> usize {
    let now = Instant::now();
    let mut entries = lock(entries);
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

/// Background thread that sweeps expired entries until the cache is dropped.
struct Janitor {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Janitor {
    fn spawn<T: Send + 'static>(entries: Entries<T>, interval: Duration) -> Option<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("jankdb-cache-janitor".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let removed = sweep(&entries);
                        if removed > 0 {
                            trace!(removed, "swept expired cache entries");
                        }
                    }
                    // Sender dropped or explicit stop.
                    _ => break,
                }
            });

        match spawned {
            Ok(handle) => {
                debug!(?interval, "started cache janitor");
                Some(Self {
                    stop: Some(stop),
                    handle: Some(handle),
                })
            }
            Err(err) => {
                warn!("failed to start cache janitor, expired entries will not be swept: {err}");
                None
            }
        }
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        // Closing the channel wakes the thread immediately.
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
