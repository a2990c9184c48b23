use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Callback invoked with an entry's key right before the entry is evicted
pub(crate) type ExpireCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome of checking an entry against the clock during a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    /// Life span is zero; the entry is never evicted
    Never,
    /// Unaccessed for at least its life span
    Expired,
    /// Still alive for the given duration
    Remaining(Duration),
}

/// A cached value with its timing metadata
///
/// Entries are handed out as `Arc<Entry<V>>`, so the value is shared with the
/// table rather than copied. Only the last-access time is mutable; it sits
/// behind the entry's own lock and is reachable only through the accessors.
pub struct Entry<V> {
    key: String,
    value: V,
    life_span: Duration,
    created_on: Instant,
    accessed_on: Mutex<Instant>,
    on_expire: Option<ExpireCallback>,
}

impl<V> Entry<V> {
    pub(crate) fn new(
        key: String,
        value: V,
        life_span: Duration,
        on_expire: Option<ExpireCallback>,
        now: Instant,
    ) -> Self {
        Self {
            key,
            value,
            life_span,
            created_on: now,
            accessed_on: Mutex::new(now),
            on_expire,
        }
    }

    /// Returns the key this entry is stored under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the cached value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns how long the entry survives without being accessed
    ///
    /// `Duration::ZERO` means the entry never expires.
    pub fn life_span(&self) -> Duration {
        self.life_span
    }

    /// Returns when the entry was inserted
    pub fn created_on(&self) -> Instant {
        self.created_on
    }

    /// Returns when the entry was last accessed
    pub fn accessed_on(&self) -> Instant {
        *self.accessed_on.lock()
    }

    /// Marks the entry as accessed now, restarting its life span
    pub fn keep_alive(&self) {
        self.touch(Instant::now());
    }

    pub(crate) fn touch(&self, now: Instant) {
        let mut accessed_on = self.accessed_on.lock();
        // Never move the access time behind creation or a newer touch
        if now > *accessed_on {
            *accessed_on = now;
        }
    }

    /// Checks the entry against `now` under its lock
    pub(crate) fn expiry(&self, now: Instant) -> Expiry {
        if self.life_span.is_zero() {
            return Expiry::Never;
        }

        let accessed_on = self.accessed_on.lock();
        let elapsed = now.saturating_duration_since(*accessed_on);
        if elapsed >= self.life_span {
            Expiry::Expired
        } else {
            Expiry::Remaining(self.life_span - elapsed)
        }
    }

    /// Runs the pre-eviction callback, if any.
    ///
    /// Returns `false` when the callback panicked. The panic does not
    /// propagate; the caller removes the entry regardless.
    pub(crate) fn notify_expired(&self) -> bool {
        let Some(callback) = &self.on_expire else {
            return true;
        };

        panic::catch_unwind(AssertUnwindSafe(|| callback(self.key.as_str()))).is_ok()
    }
}

impl<V: fmt::Debug> fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("life_span", &self.life_span)
            .field("created_on", &self.created_on)
            .field("accessed_on", &self.accessed_on())
            .field("on_expire", &self.on_expire.is_some())
            .finish()
    }
}
