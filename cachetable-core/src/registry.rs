use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::table::{Table, TableMap};

/// Store of named cache tables
///
/// Tables are created lazily on first lookup and live until they are
/// flushed. `Registry` is a cheap handle; clones share the same tables, so
/// one registry is normally created at startup and passed to whatever needs
/// it.
///
/// Sweep timers run on a Tokio runtime, taken from the configuration or from
/// the context the registry is created in.
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
///
///     let users = registry.table("users");
///     users.insert("user:123", Duration::from_secs(60), "John Doe");
///
///     // Same name, same table
///     let entry = registry.table("users").get("user:123").unwrap();
///     println!("User: {}", entry.value());
/// }
/// ```
pub struct Registry<V> {
    tables: Arc<TableMap<V>>,
    runtime: Handle,
    inline_reschedule: bool,
}

impl<V> Clone for Registry<V> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            runtime: self.runtime.clone(),
            inline_reschedule: self.inline_reschedule,
        }
    }
}

impl<V> fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tables", &self.tables.len())
            .field("inline_reschedule", &self.inline_reschedule)
            .finish()
    }
}

impl<V: Send + Sync + 'static> Registry<V> {
    /// Creates a registry with default configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context. Use
    /// [`Registry::try_with_config`] to handle that case.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a registry with custom configuration
    ///
    /// # Panics
    ///
    /// Panics if the configuration names no runtime and the call is made
    /// outside of a Tokio runtime context.
    pub fn with_config(config: CacheConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(registry) => registry,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates a registry, failing if no runtime is available for sweeps
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoRuntime`] when `config.runtime` is unset and
    /// there is no current Tokio runtime.
    pub fn try_with_config(config: CacheConfig) -> Result<Self, CacheError> {
        let runtime = match config.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| CacheError::NoRuntime)?,
        };

        Ok(Self {
            tables: Arc::new(TableMap::new()),
            runtime,
            inline_reschedule: config.inline_reschedule,
        })
    }

    /// Returns the table called `name`, creating an empty one if needed
    ///
    /// Concurrent callers asking for the same name always get the same table.
    pub fn table(&self, name: &str) -> Table<V> {
        if let Some(table) = self.tables.get(name) {
            return table.value().clone();
        }

        // The entry API re-checks under the shard lock before inserting
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(table = name, "creating cache table");
                Table::new(
                    name.to_string(),
                    self.runtime.clone(),
                    self.inline_reschedule,
                    Arc::downgrade(&self.tables),
                )
            })
            .value()
            .clone()
    }

    /// Checks whether a table called `name` exists, without creating it
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns the number of tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if no table exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the names of all tables, sorted alphabetically
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .iter()
            .map(|table| table.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl<V: Send + Sync + 'static> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_requires_runtime() {
        let result = Registry::<String>::try_with_config(CacheConfig::default());
        assert!(matches!(result, Err(CacheError::NoRuntime)));
    }

    #[test]
    #[should_panic(expected = "requires a Tokio runtime")]
    fn test_new_panics_without_runtime() {
        let _ = Registry::<String>::new();
    }

    #[test]
    fn test_explicit_runtime_outside_context() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        let registry = Registry::<u8>::try_with_config(
            CacheConfig::default().with_runtime(rt.handle().clone()),
        )
        .unwrap();

        registry.table("plain-thread").insert("key", Duration::from_secs(5), 1);
        assert_eq!(registry.table("plain-thread").count(), 1);
    }

    #[tokio::test]
    async fn test_same_name_returns_same_table() {
        let registry = Registry::new();

        let first = registry.table("users");
        first.insert("key1", Duration::ZERO, "value1");

        let second = registry.table("users");
        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert_eq!(*second.get("key1").unwrap().value(), "value1");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_names_are_independent() {
        let registry = Registry::new();

        let users = registry.table("users");
        let sessions = registry.table("sessions");
        users.insert("id", Duration::ZERO, 1u32);

        assert!(sessions.get("id").is_err());
        assert_eq!(sessions.name(), "sessions");
        assert_eq!(registry.table_names(), vec!["sessions", "users"]);
    }

    #[tokio::test]
    async fn test_contains_does_not_create() {
        let registry = Registry::<()>::new();

        assert!(!registry.contains("lazy"));
        assert!(registry.is_empty());

        registry.table("lazy");
        assert!(registry.contains("lazy"));
        assert!(!registry.is_empty());
    }

    #[tokio::test]
    async fn test_clone_shares_tables() {
        let registry1 = Registry::new();
        let registry2 = registry1.clone();

        registry1.table("shared").insert("key", Duration::ZERO, 'x');

        assert_eq!(*registry2.table("shared").get("key").unwrap().value(), 'x');
    }

    #[tokio::test]
    async fn test_flush_removes_only_that_table() {
        let registry = Registry::new();
        registry.table("a").insert("key", Duration::ZERO, 1i32);
        registry.table("b").insert("key", Duration::ZERO, 2i32);

        registry.table("a").flush();

        assert_eq!(registry.table_names(), vec!["b"]);
        assert_eq!(*registry.table("b").get("key").unwrap().value(), 2);
        assert!(registry.table("a").is_empty());
    }

    #[test]
    fn test_concurrent_lookups_create_one_table() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let registry =
            Registry::<usize>::with_config(CacheConfig::default().with_runtime(rt.handle().clone()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let table = registry.table("contended");
                    table.insert(format!("key{}", i), Duration::ZERO, i);
                    table
                })
            })
            .collect();

        let tables: Vec<Table<usize>> = handles
            .into_iter()
            .map(|handle| handle.join().expect("Thread panicked"))
            .collect();

        for table in &tables {
            assert!(Arc::ptr_eq(&table.inner, &tables[0].inner));
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.table("contended").count(), 16);
    }
}
