//! Flush timing.
//!
//! The scheduler is either idle or armed. The first arrival arms a timer for
//! `min_delay`; each later arrival pushes the timer back by up to `min_delay`
//! but never past `max_delay` after the first arrival. An arrival at or past
//! that deadline flushes immediately. Size-triggered flushes are decided by
//! the caller before consulting the scheduler.

use std::time::Duration;

use tokio::time::Instant;

/// What the caller should do with the timer after an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerAction {
    /// Idle until now: start a timer.
    Arm(Duration),
    /// Already armed: replace the running timer.
    Rearm(Duration),
    /// The deadline has passed: flush without waiting.
    FlushNow,
}

#[derive(Debug)]
pub(crate) struct BatchScheduler {
    min_delay: Duration,
    max_delay: Duration,
    armed_at: Option<Instant>,
}

impl BatchScheduler {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            armed_at: None,
        }
    }

    /// Records an arrival at `now` and decides the timer transition.
    pub fn on_arrival(&mut self, now: Instant) -> TimerAction {
        let Some(armed_at) = self.armed_at else {
            self.armed_at = Some(now);
            return TimerAction::Arm(self.min_delay);
        };

        let elapsed = now.saturating_duration_since(armed_at);
        if elapsed >= self.max_delay {
            TimerAction::FlushNow
        } else {
            TimerAction::Rearm(self.min_delay.min(self.max_delay - elapsed))
        }
    }

    /// Returns to idle. Called whenever the pending batch is drained.
    pub fn disarm(&mut self) {
        self.armed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_arrival_arms_min_delay() {
        let mut scheduler = BatchScheduler::new(ms(10), ms(50));
        assert!(scheduler.armed_at.is_none());

        let action = scheduler.on_arrival(Instant::now());

        assert_eq!(action, TimerAction::Arm(ms(10)));
        assert!(scheduler.armed_at.is_some());
    }

    #[test]
    fn test_rearm_is_capped_by_deadline() {
        let mut scheduler = BatchScheduler::new(ms(10), ms(50));
        let start = Instant::now();
        scheduler.on_arrival(start);

        assert_eq!(scheduler.on_arrival(start + ms(5)), TimerAction::Rearm(ms(10)));
        assert_eq!(scheduler.on_arrival(start + ms(40)), TimerAction::Rearm(ms(10)));
        assert_eq!(scheduler.on_arrival(start + ms(45)), TimerAction::Rearm(ms(5)));
        assert_eq!(scheduler.on_arrival(start + ms(49)), TimerAction::Rearm(ms(1)));
    }

    #[test]
    fn test_arrival_past_deadline_flushes() {
        let mut scheduler = BatchScheduler::new(ms(10), ms(50));
        let start = Instant::now();
        scheduler.on_arrival(start);

        assert_eq!(scheduler.on_arrival(start + ms(50)), TimerAction::FlushNow);
        assert_eq!(scheduler.on_arrival(start + ms(80)), TimerAction::FlushNow);
    }

    #[test]
    fn test_disarm_restarts_window() {
        let mut scheduler = BatchScheduler::new(ms(10), ms(50));
        let start = Instant::now();
        scheduler.on_arrival(start);

        scheduler.disarm();

        assert!(scheduler.armed_at.is_none());
        assert_eq!(scheduler.on_arrival(start + ms(60)), TimerAction::Arm(ms(10)));
    }

    #[test]
    fn test_equal_min_and_max_delay() {
        let mut scheduler = BatchScheduler::new(ms(20), ms(20));
        let start = Instant::now();

        assert_eq!(scheduler.on_arrival(start), TimerAction::Arm(ms(20)));
        assert_eq!(scheduler.on_arrival(start + ms(15)), TimerAction::Rearm(ms(5)));
    }
}
