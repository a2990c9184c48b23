use tokio::runtime::Handle;

/// Environment variable read by [`CacheConfig::from_env`].
pub const INLINE_RESCHEDULE_ENV: &str = "CACHETABLE_INLINE_RESCHEDULE";

/// Configuration for a [`Registry`](crate::Registry) and the tables it creates
///
/// # Example
///
/// ```rust,no_run
/// use cachetable_core::CacheConfig;
///
/// let config = CacheConfig::default()
///     .with_inline_reschedule(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Runtime that runs the sweep timers (default: the runtime current at
    /// registry construction)
    pub runtime: Option<Handle>,

    /// Run the schedule re-evaluation triggered by an insert on the
    /// inserting thread instead of dispatching it to the runtime
    /// (default: false)
    pub inline_reschedule: bool,
}

impl CacheConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime used to run sweep timers
    ///
    /// Useful when tables are driven from threads that are not part of a
    /// Tokio runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets whether inserts re-evaluate the expiration schedule inline
    ///
    /// When enabled, an insert that shortens the schedule scans the table on
    /// the caller's thread before returning. When disabled the scan runs as a
    /// task on the runtime and `insert` returns immediately.
    pub fn with_inline_reschedule(mut self, inline: bool) -> Self {
        self.inline_reschedule = inline;
        self
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads:
    /// - `CACHETABLE_INLINE_RESCHEDULE` - `1`, `true` or `yes` enables inline
    ///   re-evaluation
    pub fn from_env() -> Self {
        let inline_reschedule = std::env::var(INLINE_RESCHEDULE_ENV)
            .map(|raw| parse_flag(&raw))
            .unwrap_or(false);

        Self::default().with_inline_reschedule(inline_reschedule)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
