//! Per-connection deadline scheduling.
//!
//! Deadlines run on `tokio::time`, so tests drive them deterministically with a
//! paused clock.

use std::{
    future::poll_fn,
    task::Poll,
    time::Duration,
};

use tokio_util::time::{DelayQueue, delay_queue};

/// Handle used to cancel an armed deadline.
pub(crate) type DeadlineKey = delay_queue::Key;

pub(crate) struct DeadlineScheduler<T> {
    queue: DelayQueue<T>,
}

impl<T> Default for DeadlineScheduler<T> {
    fn default() -> Self {
        Self {
            queue: DelayQueue::new(),
        }
    }
}

impl<T> DeadlineScheduler<T> {
    /// Fire `target` once `after` has elapsed.
    pub(crate) fn arm(&mut self, target: T, after: Duration) -> DeadlineKey {
        self.queue.insert(target, after)
    }

    /// Disarm a deadline. Cancelling an expired or unknown key is a no-op.
    pub(crate) fn cancel(&mut self, key: &DeadlineKey) -> Option<T> {
        self.queue.try_remove(key).map(delay_queue::Expired::into_inner)
    }

    /// Disarm every deadline.
    pub(crate) fn clear(&mut self) { self.queue.clear(); }

    pub(crate) fn is_empty(&self) -> bool { self.queue.is_empty() }

    pub(crate) fn len(&self) -> usize { self.queue.len() }

    /// Wait for the next deadline to fire.
    ///
    /// Pending forever while nothing is armed; callers guard on
    /// [`Self::is_empty`].
    pub(crate) async fn next_expired(&mut self) -> T {
        poll_fn(|cx| match self.queue.poll_expired(cx) {
            Poll::Ready(Some(expired)) => Poll::Ready(expired.into_inner()),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        })
        .await
    }
}

impl<T> std::fmt::Debug for DeadlineScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineScheduler")
            .field("armed", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;
    use rstest::rstest;

    use super::DeadlineScheduler;

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn deadline_fires_at_expiry_not_before() {
        let mut scheduler = DeadlineScheduler::default();
        scheduler.arm("a", Duration::from_millis(50));

        tokio::time::advance(Duration::from_millis(49)).await;
        assert!(scheduler.next_expired().now_or_never().is_none());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(scheduler.next_expired().now_or_never(), Some("a"));
        assert!(scheduler.is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn cancelled_deadline_never_fires() {
        let mut scheduler = DeadlineScheduler::default();
        let key = scheduler.arm(1, Duration::from_millis(10));
        scheduler.arm(2, Duration::from_millis(20));
        assert_eq!(scheduler.cancel(&key), Some(1));
        assert_eq!(scheduler.cancel(&key), None);

        tokio::time::advance(Duration::from_millis(30)).await;
        assert_eq!(scheduler.next_expired().await, 2);
        assert_eq!(scheduler.len(), 0);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn clear_disarms_everything() {
        let mut scheduler = DeadlineScheduler::default();
        scheduler.arm((), Duration::from_millis(5));
        scheduler.arm((), Duration::from_millis(6));
        scheduler.clear();
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(scheduler.next_expired().now_or_never().is_none());
    }
}
