//! Interframe pacing.
//!
//! A single re-arming timer in front of a FIFO. Each expiry releases exactly
//! one item, so consecutive items leave at least `period` apart. The pacer
//! never sleeps: callers ask for [`Pacer::deadline`] and call
//! [`Pacer::on_expire`] once their clock reaches it.
//!
//! ```text
//!  enqueue ──► [ FIFO ] ──► on_expire(now ≥ deadline) ──► one item
//!                 ▲                   │
//!                 └── re-arm at now + period while items remain
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Armed(Instant),
    /// Stopped with this much time left on the clock
    Frozen(Duration),
}

/// Releases queued items no faster than one per period.
#[derive(Debug)]
pub struct Pacer<T> {
    period: Duration,
    queue: VecDeque<T>,
    state: TimerState,
}

impl<T> Pacer<T> {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            queue: VecDeque::new(),
            state: TimerState::Idle,
        }
    }

    /// Queue an item, arming the timer at `now + period` if it is idle.
    pub fn enqueue(&mut self, item: T, now: Instant) {
        self.queue.push_back(item);
        if self.state == TimerState::Idle {
            self.state = TimerState::Armed(now + self.period);
        }
    }

    /// Release the head of the queue if the timer has expired.
    ///
    /// Re-arms at `now + period` while items remain and goes idle once the
    /// queue drains.
    pub fn on_expire(&mut self, now: Instant) -> Option<T> {
        let TimerState::Armed(deadline) = self.state else {
            return None;
        };
        if now < deadline {
            return None;
        }

        let item = self.queue.pop_front();
        self.state = if self.queue.is_empty() {
            TimerState::Idle
        } else {
            TimerState::Armed(now + self.period)
        };
        item
    }

    /// When the next item is due, if the timer is armed.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TimerState::Armed(deadline) => Some(deadline),
            TimerState::Idle | TimerState::Frozen(_) => None,
        }
    }

    /// Drop every queued item and disarm.
    ///
    /// # Returns
    /// Number of items dropped.
    pub fn force_cancel(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.state = TimerState::Idle;
        dropped
    }

    /// Stop the clock, remembering how long was left.
    pub fn freeze(&mut self, now: Instant) {
        if let TimerState::Armed(deadline) = self.state {
            self.state = TimerState::Frozen(deadline.saturating_duration_since(now));
        }
    }

    /// Restart a frozen clock with the time it had left.
    pub fn resume(&mut self, now: Instant) {
        if let TimerState::Frozen(remaining) = self.state {
            self.state = TimerState::Armed(now + remaining);
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.state, TimerState::Frozen(_))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_releases_one_per_period() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(PERIOD);
        pacer.enqueue('a', t0);
        pacer.enqueue('b', t0);
        pacer.enqueue('c', t0 + ms(10));

        assert_eq!(pacer.deadline(), Some(t0 + ms(100)));
        assert_eq!(pacer.on_expire(t0 + ms(99)), None);
        assert_eq!(pacer.on_expire(t0 + ms(100)), Some('a'));
        assert_eq!(pacer.deadline(), Some(t0 + ms(200)));

        // Firing late re-arms relative to the actual expiry
        assert_eq!(pacer.on_expire(t0 + ms(250)), Some('b'));
        assert_eq!(pacer.deadline(), Some(t0 + ms(350)));
        assert_eq!(pacer.on_expire(t0 + ms(350)), Some('c'));

        assert_eq!(pacer.deadline(), None);
        assert!(pacer.is_empty());
        assert_eq!(pacer.on_expire(t0 + ms(1000)), None);
    }

    #[test]
    fn test_enqueue_does_not_rearm_armed_timer() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(PERIOD);
        pacer.enqueue(1, t0);
        pacer.enqueue(2, t0 + ms(90));
        assert_eq!(pacer.deadline(), Some(t0 + ms(100)));
    }

    #[test]
    fn test_force_cancel() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(PERIOD);
        for i in 0..4 {
            pacer.enqueue(i, t0);
        }

        assert_eq!(pacer.force_cancel(), 4);
        assert_eq!(pacer.deadline(), None);
        assert_eq!(pacer.on_expire(t0 + ms(500)), None);
        assert_eq!(pacer.force_cancel(), 0);
    }

    #[test]
    fn test_freeze_and_resume_keep_remaining_time() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(PERIOD);
        pacer.enqueue("frame", t0);

        pacer.freeze(t0 + ms(30));
        assert!(pacer.is_frozen());
        assert_eq!(pacer.deadline(), None);
        assert_eq!(pacer.on_expire(t0 + ms(200)), None);

        // Enqueueing while frozen does not restart the clock
        pacer.enqueue("next", t0 + ms(300));
        assert!(pacer.is_frozen());

        pacer.resume(t0 + ms(1000));
        assert_eq!(pacer.deadline(), Some(t0 + ms(1070)));
        assert_eq!(pacer.on_expire(t0 + ms(1070)), Some("frame"));
    }

    #[test]
    fn test_resume_without_freeze_is_noop() {
        let t0 = Instant::now();
        let mut pacer: Pacer<u8> = Pacer::new(PERIOD);
        pacer.resume(t0);
        assert_eq!(pacer.deadline(), None);
    }
}
