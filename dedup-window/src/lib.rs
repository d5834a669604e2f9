//! # dedup-window
//!
//! `dedup-window` counts the *distinct* identifiers seen during a fixed-length window
//! and hands that count to a [`ReportSink`] once per window.
//!
//! ## Core Philosophy
//!
//! Observations are on the hot path and the flush is not. The active window lives
//! behind a single atomically swapped pointer, so `observe` never takes a lock and a
//! rollover costs one pointer swap. Once the outgoing window is detached, the
//! [`Scheduler`] waits for in-flight observations to finish against it before counting.
//!
//! ## Key Concepts
//!
//! * **Membership Store**: "is this id new in this window?" ([`MembershipStore`]).
//!   [`LocalStore`] keeps the set in process memory; `RedisStore` (feature `redis`)
//!   keeps one Redis set per window so several instances can share it.
//! * **Window Tracker**: owns the active store and performs the rollover
//!   ([`WindowTracker`]).
//! * **Scheduler**: the single periodic task that rolls the window over and reports
//!   the outgoing count ([`Scheduler`]).
//! * **Report Sink**: where the per-window count goes ([`LogSink`], or `KafkaSink`
//!   with feature `kafka`).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use dedup_window::LocalBackend;
//! use dedup_window::WindowTracker;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let tracker = WindowTracker::new(Arc::new(LocalBackend), 0);
//!
//! assert!(tracker.observe(1).await.unwrap());
//! assert!(!tracker.observe(1).await.unwrap());
//!
//! let snapshot = tracker.rollover().await.unwrap();
//! assert_eq!(snapshot.map(|s| s.count), Some(1));
//! # }
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

mod clock;
mod error;
#[cfg(feature = "kafka")]
mod kafka_sink;
mod local_store;
#[cfg(feature = "redis")]
mod redis_store;
mod scheduler;
mod sink;
mod tracker;

pub use clock::wall_clock_window;
pub use error::SinkError;
pub use error::StoreError;
#[cfg(feature = "kafka")]
pub use kafka_sink::DEFAULT_TOPIC as DEFAULT_KAFKA_TOPIC;
#[cfg(feature = "kafka")]
pub use kafka_sink::KafkaSink;
pub use local_store::LocalBackend;
pub use local_store::LocalStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisBackend;
#[cfg(feature = "redis")]
pub use redis_store::DEFAULT_REDIS_PREFIX;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use scheduler::Scheduler;
pub use scheduler::SchedulerHandle;
pub use sink::LogSink;
pub use tracker::WindowTracker;

// Compiles and runs the README example with the doctests
#[cfg(doctest)]
#[doc = include_str!("../README.md")]
struct ReadmeDoctests;

/// A caller supplied identifier.
pub type Id = i64;

/// The count captured when a window is rolled over.
///
/// Produced at most once per window by [`WindowTracker::rollover`] and consumed once
/// by a [`ReportSink`]. It is never updated after it is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Sequence number of the window this count belongs to.
    pub window: u64,
    /// Number of distinct identifiers observed in that window.
    pub count: u64,
}

/// The set of identifiers seen during one window.
///
/// Implementations must be safe to share across tasks via `Arc`.
#[async_trait]
pub trait MembershipStore: Debug + Send + Sync {
    /// Inserts `id` if it is absent.
    ///
    /// Returns `true` only for the call that performed the insertion. Concurrent
    /// calls with the same new `id` yield exactly one `true`.
    async fn try_add(&self, id: Id) -> Result<bool, StoreError>;

    /// Number of distinct members currently stored.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Removes every member.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Asks to be the one process that reports this window.
    ///
    /// Stores private to a process always grant it. Stores shared between processes
    /// grant it to exactly one caller per window, so a shared window is reported once.
    async fn claim_report(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    /// Called once, after the window has been rolled over and counted.
    ///
    /// The default does nothing; the store is dropped when its last reference goes.
    async fn retire(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Opens the [`MembershipStore`] for a window.
pub trait Backend: Debug + Send + Sync {
    /// Returns a fresh, empty store for window number `window`.
    fn open(&self, window: u64) -> Arc<dyn MembershipStore>;
}

/// Destination for per-window counts.
#[async_trait]
pub trait ReportSink: Debug + Send + Sync {
    /// Best-effort delivery of one window's snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the destination could not be reached. Callers log it
    /// and move on; reports are never retried.
    async fn report(&self, snapshot: Snapshot) -> Result<(), SinkError>;
}
