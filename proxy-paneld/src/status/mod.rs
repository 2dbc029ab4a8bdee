pub mod collector;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use shared::types::StatusSnapshot;
use crate::collaborators::StatusCollector;

/// Last time a client showed interest in the status.
///
/// Stored as milliseconds since a fixed monotonic base so it can be read and
/// written without a lock.
pub struct Liveness {
    base: Instant,
    last_millis: AtomicU64,
}

impl Liveness {
    /// A marker that counts as touched at creation
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    pub fn touch(&self) {
        let millis = self.base.elapsed().as_millis() as u64;
        self.last_millis.fetch_max(millis, Ordering::Relaxed);
    }

    /// Time since the last touch
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.base.elapsed().saturating_sub(last)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the poller, cloned into request handlers.
#[derive(Clone)]
pub struct StatusHandle {
    snapshot_rx: watch::Receiver<Option<StatusSnapshot>>,
    liveness: Arc<Liveness>,
}

impl StatusHandle {
    /// Latest snapshot, `None` before the first active tick. Marks the status as watched.
    pub fn current(&self) -> Option<StatusSnapshot> {
        self.liveness.touch();
        self.snapshot_rx.borrow().clone()
    }
}

/// Refreshes the shared snapshot on a fixed tick while somebody is watching.
pub struct StatusPoller {
    collector: Arc<dyn StatusCollector>,
    liveness: Arc<Liveness>,
    snapshot_tx: watch::Sender<Option<StatusSnapshot>>,
    idle_threshold: Duration,
}

impl StatusPoller {
    pub fn new(
        collector: Arc<dyn StatusCollector>,
        liveness: Arc<Liveness>,
        idle_threshold: Duration,
    ) -> (Self, StatusHandle) {
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let handle = StatusHandle {
            snapshot_rx,
            liveness: liveness.clone(),
        };
        let poller = Self {
            collector,
            liveness,
            snapshot_tx,
            idle_threshold,
        };
        (poller, handle)
    }

    /// Run one poll cycle. Returns true if the snapshot was refreshed.
    pub async fn tick(&self) -> bool {
        let idle_for = self.liveness.idle_for();
        if idle_for > self.idle_threshold {
            tracing::trace!("Status idle for {:?}, skipping refresh", idle_for);
            return false;
        }

        let previous = self.snapshot_tx.borrow().clone();
        let snapshot = self.collector.collect_status(previous.as_ref()).await;
        self.snapshot_tx.send_replace(Some(snapshot));
        true
    }

    /// Poll every `period` until cancelled
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Status poller shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCollector;

    const TICK: Duration = Duration::from_secs(1);
    const IDLE: Duration = Duration::from_secs(3);

    fn poller(collector: &Arc<FakeCollector>) -> (StatusPoller, StatusHandle) {
        StatusPoller::new(collector.clone(), Arc::new(Liveness::new()), IDLE)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_snapshot_before_first_tick() {
        let collector = Arc::new(FakeCollector::default());
        let (_poller, handle) = poller(&collector);
        assert!(handle.current().is_none());
        assert_eq!(collector.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_tracks_touches() {
        let liveness = Liveness::new();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(liveness.idle_for(), Duration::from_secs(5));

        liveness.touch();
        assert_eq!(liveness.idle_for(), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(liveness.idle_for(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_snapshot_is_passed_as_hint() {
        let collector = Arc::new(FakeCollector::default());
        let (poller, handle) = poller(&collector);

        poller.tick().await;
        poller.tick().await;

        assert_eq!(collector.hints(), vec![None, Some(1)]);
        assert_eq!(collector.generation(&handle.current()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tick_leaves_snapshot_untouched() {
        let collector = Arc::new(FakeCollector::default());
        let (poller, handle) = poller(&collector);

        assert!(poller.tick().await);
        let before = handle.current();

        tokio::time::advance(IDLE + Duration::from_millis(1)).await;
        assert!(!poller.tick().await);
        assert_eq!(collector.calls(), 1);

        // `current` above touched liveness, so compare through the channel directly
        assert_eq!(*poller.snapshot_tx.borrow(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_then_resume_scenario() {
        let collector = Arc::new(FakeCollector::default());
        let (poller, handle) = poller(&collector);

        // t=0: a client reads
        handle.current();

        // t=1..3: still within the idle threshold, every tick refreshes
        for _ in 1..=3 {
            tokio::time::advance(TICK).await;
            assert!(poller.tick().await);
        }
        let last_active = poller.snapshot_tx.borrow().clone();
        assert_eq!(collector.calls(), 3);

        // t=4..6: idle, snapshot frozen at the t=3 value
        for _ in 4..=6 {
            tokio::time::advance(TICK).await;
            assert!(!poller.tick().await);
            assert_eq!(*poller.snapshot_tx.borrow(), last_active);
        }
        assert_eq!(collector.calls(), 3);

        // t=7: a read, which still sees the frozen snapshot
        tokio::time::advance(TICK).await;
        assert_eq!(handle.current(), last_active);

        // t=8: refreshing has resumed
        tokio::time::advance(TICK).await;
        assert!(poller.tick().await);
        assert_eq!(collector.calls(), 4);
        assert_ne!(*poller.snapshot_tx.borrow(), last_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_refreshes_until_cancelled() {
        let collector = Arc::new(FakeCollector::default());
        let (poller, handle) = poller(&collector);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poller.run(TICK, cancel.clone()));

        // Interval fires immediately, then once per tick
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(collector.calls(), 3);
        assert!(handle.current().is_some());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_never_polls() {
        let collector = Arc::new(FakeCollector::default());
        let (poller, handle) = poller(&collector);
        let cancel = CancellationToken::new();
        cancel.cancel();

        poller.run(TICK, cancel).await;

        assert_eq!(collector.calls(), 0);
        assert!(handle.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_goes_quiet_without_readers() {
        let collector = Arc::new(FakeCollector::default());
        // Off the tick boundary so timer rounding cannot flip the t=3 tick
        let (poller, _handle) = StatusPoller::new(
            collector.clone(),
            Arc::new(Liveness::new()),
            Duration::from_millis(3500),
        );
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poller.run(TICK, cancel.clone()));
        tokio::time::sleep(Duration::from_secs(20)).await;

        // Ticks at t=0..3 refresh, everything after is skipped
        assert_eq!(collector.calls(), 4);

        cancel.cancel();
        task.await.unwrap();
    }
}
