//! # Cachetable Core
//!
//! In-process key/value cache tables with per-entry TTL (time-to-live)
//! expiration.
//!
//! ## Features
//!
//! - Independent named tables, created lazily through a [`Registry`]
//! - Per-entry life span measured from the last access (reads keep entries alive)
//! - Optional callback run right before an entry is evicted
//! - One self-adjusting sweep timer per table, always armed for the soonest
//!   expiration instead of polling at a fixed interval
//! - Sweeps scan a snapshot, so lookups and inserts are never blocked for a
//!   whole scan
//!
//! ## Example
//!
//! ```rust,no_run
//! use cachetable_core::{CacheConfig, Registry};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create a registry with default config
//!     let registry: Registry<&str> = Registry::new();
//!
//!     // Or run schedule re-evaluation on the inserting thread
//!     let config = CacheConfig::default().with_inline_reschedule(true);
//!     let registry = Registry::with_config(config);
//!
//!     let sessions = registry.table("sessions");
//!
//!     // Store a value that expires after 60 seconds without access
//!     sessions.insert_with_callback("user:123", Duration::from_secs(60), "John Doe", |key| {
//!         println!("{} is about to expire", key);
//!     });
//!
//!     // Retrieve the value (this also keeps it alive)
//!     if let Ok(entry) = sessions.get("user:123") {
//!         println!("User: {}", entry.value());
//!     }
//!
//!     // Drop the whole table
//!     sessions.flush();
//! }
//! ```

mod config;
mod entry;
mod error;
mod registry;
mod table;
mod timer;

pub use config::{CacheConfig, INLINE_RESCHEDULE_ENV};
pub use entry::Entry;
pub use error::CacheError;
pub use registry::Registry;
pub use table::Table;
