use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::entry::{Entry, ExpireCallback, Expiry};
use crate::error::CacheError;
use crate::timer::{SweepTimer, MAX_SWEEP_DELAY};

/// Name to table mapping owned by a [`Registry`](crate::Registry)
pub(crate) type TableMap<V> = DashMap<String, Table<V>>;

/// Entries and scheduling state, guarded together by the table lock
struct TableState<V> {
    items: HashMap<String, Arc<Entry<V>>>,
    /// Delay the pending sweep was armed with; zero when idle
    next_check_interval: Duration,
    timer: Option<SweepTimer>,
    /// Bumped by `flush`; checks that scanned an older generation never re-arm
    generation: u64,
}

pub(crate) struct TableInner<V> {
    name: String,
    state: RwLock<TableState<V>>,
    runtime: Handle,
    inline_reschedule: bool,
    registry: Weak<TableMap<V>>,
}

/// A named cache table with per-entry TTL expiration
///
/// `Table` is a cheap handle; clones share the same entries. Each table keeps
/// at most one pending sweep, timed to the soonest expiration among its
/// entries. When the sweep fires it evicts expired entries, running their
/// `on_expire` callbacks first, and re-arms itself for the next one.
///
/// Tables are obtained from a [`Registry`](crate::Registry).
pub struct Table<V> {
    pub(crate) inner: Arc<TableInner<V>>,
}

impl<V> Clone for Table<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Table<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Table")
            .field("name", &self.inner.name)
            .field("count", &state.items.len())
            .field("next_check_interval", &state.next_check_interval)
            .finish()
    }
}

impl<V: Send + Sync + 'static> Table<V> {
    pub(crate) fn new(
        name: String,
        runtime: Handle,
        inline_reschedule: bool,
        registry: Weak<TableMap<V>>,
    ) -> Self {
        Self {
            inner: Arc::new(TableInner {
                name,
                state: RwLock::new(TableState {
                    items: HashMap::new(),
                    next_check_interval: Duration::ZERO,
                    timer: None,
                    generation: 0,
                }),
                runtime,
                inline_reschedule,
                registry,
            }),
        }
    }

    /// Returns the table's name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the number of entries currently stored
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.state.read().items.len()
    }

    /// Returns `true` if the table holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.read().items.is_empty()
    }

    /// Stores `value` under `key`, replacing any existing entry
    ///
    /// A `life_span` of `Duration::ZERO` stores the value permanently.
    /// Otherwise the entry is evicted once it has not been read for
    /// `life_span`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use cachetable_core::Registry;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let registry = Registry::new();
    ///     let sessions = registry.table("sessions");
    ///     sessions.insert("user:123", Duration::from_secs(300), "John Doe");
    /// }
    /// ```
    pub fn insert(&self, key: impl Into<String>, life_span: Duration, value: V) {
        self.insert_entry(key.into(), life_span, value, None);
    }

    /// Stores `value` under `key` with a callback run right before eviction
    ///
    /// The callback receives the key and runs on the sweep, with no table lock
    /// held, so it may call back into the table. A panicking callback is
    /// logged and the entry is evicted anyway. Replacing the entry discards
    /// the callback.
    pub fn insert_with_callback<F>(
        &self,
        key: impl Into<String>,
        life_span: Duration,
        value: V,
        on_expire: F,
    ) where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let callback: ExpireCallback = Arc::new(on_expire);
        self.insert_entry(key.into(), life_span, value, Some(callback));
    }

    fn insert_entry(
        &self,
        key: String,
        life_span: Duration,
        value: V,
        on_expire: Option<ExpireCallback>,
    ) {
        let entry = Arc::new(Entry::new(
            key.clone(),
            value,
            life_span,
            on_expire,
            Instant::now(),
        ));

        let next_check = {
            let mut state = self.inner.state.write();
            state.items.insert(key, entry);
            state.next_check_interval
        };

        // Nothing scheduled yet, or this entry expires before the pending sweep
        if !life_span.is_zero() && (next_check.is_zero() || life_span < next_check) {
            self.reschedule();
        }
    }

    fn reschedule(&self) {
        if self.inner.inline_reschedule {
            self.inner.expiration_check();
        } else {
            let inner = Arc::clone(&self.inner);
            self.inner.runtime.spawn(async move {
                inner.expiration_check();
            });
        }
    }

    /// Looks up `key` and marks the entry as accessed
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the key is absent, including when a
    /// sweep has just evicted it.
    pub fn get(&self, key: &str) -> Result<Arc<Entry<V>>, CacheError> {
        let state = self.inner.state.read();
        match state.items.get(key) {
            Some(entry) => {
                entry.keep_alive();
                Ok(Arc::clone(entry))
            }
            None => Err(self.not_found(key)),
        }
    }

    /// Checks whether `key` is stored, without extending its life
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.read().items.contains_key(key)
    }

    /// Returns all stored keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.read().items.keys().cloned().collect()
    }

    /// Removes `key` without running its `on_expire` callback
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the key is absent.
    pub fn delete(&self, key: &str) -> Result<Arc<Entry<V>>, CacheError> {
        let removed = self.inner.state.write().items.remove(key);
        removed.ok_or_else(|| self.not_found(key))
    }

    /// Deletes every entry, cancels the pending sweep and removes the table
    /// from its registry
    ///
    /// Callbacks are not run. Looking the name up in the registry afterwards
    /// creates a new, empty table.
    pub fn flush(&self) {
        let flushed = {
            let mut state = self.inner.state.write();
            let flushed = std::mem::take(&mut state.items);
            state.next_check_interval = Duration::ZERO;
            state.generation = state.generation.wrapping_add(1);
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }

            if let Some(tables) = self.inner.registry.upgrade() {
                tables.remove_if(&self.inner.name, |_, table| {
                    Arc::ptr_eq(&table.inner, &self.inner)
                });
            }
            flushed
        };

        tracing::debug!(table = %self.inner.name, removed = flushed.len(), "table flushed");
    }

    /// Runs one expiration check on the calling thread
    ///
    /// Sweeps normally run on their own; this forces one immediately and
    /// returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        self.inner.expiration_check()
    }

    /// Delay until the pending sweep, as of the last scan
    ///
    /// `Duration::ZERO` means no sweep is scheduled.
    pub fn next_check_interval(&self) -> Duration {
        self.inner.state.read().next_check_interval
    }

    /// Returns `true` while a sweep is scheduled
    pub fn is_armed(&self) -> bool {
        self.inner
            .state
            .read()
            .timer
            .as_ref()
            .is_some_and(SweepTimer::is_pending)
    }

    fn not_found(&self, key: &str) -> CacheError {
        CacheError::NotFound {
            table: self.inner.name.clone(),
            key: key.to_string(),
        }
    }
}

impl<V: Send + Sync + 'static> TableInner<V> {
    /// Scans the table, evicts expired entries and re-arms the sweep timer
    fn expiration_check(self: &Arc<Self>) -> usize {
        // Scan a snapshot so readers and writers are not blocked meanwhile
        let (generation, snapshot): (u64, Vec<(String, Arc<Entry<V>>)>) = {
            let mut state = self.state.write();
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            let snapshot = state
                .items
                .iter()
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect();
            (state.generation, snapshot)
        };

        let now = Instant::now();
        let mut evicted = 0;
        let mut smallest: Option<Duration> = None;

        for (key, entry) in snapshot {
            match entry.expiry(now) {
                Expiry::Never => {}
                Expiry::Remaining(remaining) => {
                    smallest = Some(smallest.map_or(remaining, |s| s.min(remaining)));
                }
                Expiry::Expired => {
                    if self.evict(&key, &entry) {
                        evicted += 1;
                    }
                }
            }
        }

        let next_check = self.schedule(smallest, generation);

        tracing::debug!(
            table = %self.name,
            evicted,
            ?next_check,
            "expiration check finished"
        );

        evicted
    }

    /// Runs the entry's callback and removes it, unless the key was
    /// overwritten or removed since the snapshot
    fn evict(&self, key: &str, entry: &Arc<Entry<V>>) -> bool {
        if !self.holds(key, entry) {
            return false;
        }

        if !entry.notify_expired() {
            tracing::warn!(
                table = %self.name,
                key,
                "on_expire callback panicked; evicting entry anyway"
            );
        }

        let mut state = self.state.write();
        match state.items.get(key) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                state.items.remove(key);
                true
            }
            _ => false,
        }
    }

    fn holds(&self, key: &str, entry: &Arc<Entry<V>>) -> bool {
        self.state
            .read()
            .items
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    /// Arms the next sweep after `delay`, or goes idle when `None`
    ///
    /// A pending timer armed by a concurrent check is kept when it fires no
    /// later than `delay`, so exactly one timer survives and it is the
    /// earliest one needed. A check that scanned entries from before a
    /// flush leaves the schedule alone. Returns the resulting check interval.
    fn schedule(self: &Arc<Self>, delay: Option<Duration>, generation: u64) -> Duration {
        let mut state = self.state.write();
        if state.generation != generation {
            return state.next_check_interval;
        }

        let delay = delay.map(|delay| delay.min(MAX_SWEEP_DELAY));
        let now = Instant::now();

        if let Some(pending) = state.timer.as_ref().filter(|timer| timer.is_pending()) {
            let deadline = pending.deadline();
            if delay.map_or(true, |delay| deadline <= now + delay) {
                state.next_check_interval = deadline.saturating_duration_since(now);
                return state.next_check_interval;
            }
        }

        state.next_check_interval = delay.unwrap_or(Duration::ZERO);
        let next = delay.map(|delay| {
            let table = Arc::downgrade(self);
            SweepTimer::arm(&self.runtime, delay, move || {
                if let Some(table) = table.upgrade() {
                    table.expiration_check();
                }
            })
        });
        if let Some(previous) = std::mem::replace(&mut state.timer, next) {
            previous.cancel();
        }

        state.next_check_interval
    }
}
