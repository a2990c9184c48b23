use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Longest delay a sweep timer is armed with (~100 years)
///
/// Life spans beyond it are still honoured: the sweep that fires re-arms for
/// the time that is left.
pub(crate) const MAX_SWEEP_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A cancellable single-shot delayed task
///
/// Arming spawns a task on the runtime that sleeps until the deadline and then
/// runs the closure once. Cancelling, or dropping the timer, aborts the task
/// if it has not fired yet.
#[derive(Debug)]
pub(crate) struct SweepTimer {
    task: JoinHandle<()>,
    deadline: Instant,
}

impl SweepTimer {
    /// Schedules `fire` to run once after `delay`, capped at
    /// [`MAX_SWEEP_DELAY`]
    pub(crate) fn arm<F>(runtime: &Handle, delay: Duration, fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = delay.min(MAX_SWEEP_DELAY);
        let deadline = Instant::now() + delay;
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            fire();
        });

        tracing::trace!(?delay, "sweep timer armed");

        Self { task, deadline }
    }

    /// Instant at which the timer fires
    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the timer still has to fire
    pub(crate) fn is_pending(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancels the timer; a no-op if it already fired
    pub(crate) fn cancel(self) {
        drop(self);
    }
}

impl Drop for SweepTimer {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            tracing::trace!("sweep timer cancelled");
        }
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_timer(delay: Duration) -> (SweepTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = SweepTimer::arm(&Handle::current(), delay, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (timer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let (timer, fired) = counting_timer(Duration::from_millis(50));
        assert_eq!(timer.deadline(), Instant::now() + Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(49)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (timer, fired) = counting_timer(Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(20)).await;
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_prevents_firing() {
        let (timer, fired) = counting_timer(Duration::from_millis(10));
        drop(timer);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extreme_delay_is_capped() {
        let (timer, fired) = counting_timer(Duration::MAX);

        assert_eq!(timer.deadline(), Instant::now() + MAX_SWEEP_DELAY);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_is_noop() {
        let (timer, fired) = counting_timer(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(20)).await;
        timer.cancel();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
