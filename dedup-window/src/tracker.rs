use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio::time::timeout_at;

use super::Backend;
use super::Id;
use super::MembershipStore;
use super::Snapshot;
use super::StoreError;

const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Window {
    seq: u64,
    store: Arc<dyn MembershipStore>,
    released: Arc<Notify>,
}

impl Window {
    fn open(backend: &dyn Backend, seq: u64) -> Self {
        Self {
            seq,
            store: backend.open(seq),
            released: Arc::new(Notify::new()),
        }
    }
}

// Pins a window for the length of one store call. Dropping it wakes a draining
// rollover, including when the call is cancelled.
struct Lease {
    seq: u64,
    store: Arc<dyn MembershipStore>,
    window: Option<Arc<Window>>,
    released: Arc<Notify>,
}

impl Lease {
    fn take(active: &ArcSwap<Window>) -> Self {
        let window = active.load_full();
        Self {
            seq: window.seq,
            store: Arc::clone(&window.store),
            released: Arc::clone(&window.released),
            window: Some(window),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // Release before waking so the drain sees the lower count
        drop(self.window.take());
        self.released.notify_waiters();
    }
}

/// Tracks distinct identifiers for the current window.
///
/// The active window is held in an [`ArcSwap`]. `observe` takes the pointer it finds
/// and works against that window until it returns, so an observation that starts
/// before a rollover always lands in the outgoing window and one that starts after
/// lands in the new one. `rollover` swaps the pointer, then waits (up to the drain
/// grace period) for observations still holding the outgoing window before counting
/// it. Each observation wakes the rollover as it lets go, so the wait ends as soon
/// as the last one finishes.
///
/// Observations still running when the grace period ends are not included in the
/// outgoing snapshot. They are not carried into the new window either, so a slow store
/// can undercount a window but never corrupt the next one.
#[derive(Debug)]
pub struct WindowTracker {
    backend: Arc<dyn Backend>,
    active: ArcSwap<Window>,
    rolling: Mutex<()>,
    drain_grace: Duration,
}

impl WindowTracker {
    /// Creates a tracker whose first window is numbered `first_window`.
    ///
    /// # Arguments
    ///
    /// * `backend` - Opens the store for each window.
    /// * `first_window` - Sequence number of the first window. Stores shared between
    ///   processes name their keys after it, so processes sharing one should take it
    ///   from [`wall_clock_window`](crate::wall_clock_window).
    pub fn new(backend: Arc<dyn Backend>, first_window: u64) -> Self {
        let window = Window::open(backend.as_ref(), first_window);
        Self {
            backend,
            active: ArcSwap::from_pointee(window),
            rolling: Mutex::new(()),
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Set how long a rollover waits for in-flight observations of the outgoing
    /// window before counting it.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Records `id` in the current window.
    ///
    /// Returns `true` if this is the first time `id` has been seen in the window.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store could not confirm whether `id` is new.
    pub async fn observe(&self, id: Id) -> Result<bool, StoreError> {
        let lease = Lease::take(&self.active);
        lease.store.try_add(id).await
    }

    /// The number of distinct identifiers seen so far in the current window.
    pub async fn current_count(&self) -> Result<u64, StoreError> {
        let lease = Lease::take(&self.active);
        lease.store.count().await
    }

    /// Sequence number of the current window.
    pub fn current_window(&self) -> u64 {
        Lease::take(&self.active).seq
    }

    /// Starts a new window and returns the count of the one it replaces.
    ///
    /// Returns `None` when the store is shared and another process has already
    /// claimed the outgoing window's report. Calls are serialised with each other.
    /// They never block `observe`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the outgoing store could not be claimed or counted. The
    /// new window is installed regardless.
    pub async fn rollover(&self) -> Result<Option<Snapshot>, StoreError> {
        let _rolling = self.rolling.lock().await;

        let next = self.active.load().seq + 1;
        let fresh = Arc::new(Window::open(self.backend.as_ref(), next));
        let retired = self.active.swap(fresh);

        self.drain(&retired).await;

        let snapshot = self.snapshot(&retired).await;
        if let Err(err) = retired.store.retire().await {
            tracing::warn!(window = retired.seq, %err, "failed to retire window store");
        }
        snapshot
    }

    async fn snapshot(&self, retired: &Window) -> Result<Option<Snapshot>, StoreError> {
        if !retired.store.claim_report().await? {
            tracing::debug!(window = retired.seq, "window reported by another process");
            return Ok(None);
        }
        let count = retired.store.count().await?;
        Ok(Some(Snapshot {
            window: retired.seq,
            count,
        }))
    }

    // Wait for observers that leased `retired` before the swap to let go of it.
    async fn drain(&self, retired: &Arc<Window>) {
        let deadline = Instant::now() + self.drain_grace;
        loop {
            let released = retired.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed
            released.as_mut().enable();

            if Arc::strong_count(retired) <= 1 {
                return;
            }
            if timeout_at(deadline, released).await.is_err() {
                tracing::warn!(
                    window = retired.seq,
                    in_flight = Arc::strong_count(retired) - 1,
                    "drain grace elapsed; late observations are not counted"
                );
                return;
            }
        }
    }
}
