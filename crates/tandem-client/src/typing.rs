//! Trailing-edge typing debounce.
//!
//! Raw input activity collapses into at most one `typing: true` per burst
//! and exactly one trailing `typing: false` once the burst goes quiet for
//! the idle window. The state machine works on injected instants; the event
//! loop drives `poll` from its timer.

use std::time::Duration;

use tokio::time::Instant;

pub struct TypingDebouncer {
    idle: Duration,
    signaling: bool,
    deadline: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            signaling: false,
            deadline: None,
        }
    }

    /// Register an input tick. Returns `true` when a `typing: true` signal
    /// should be emitted, i.e. only on the first tick of a burst. Every tick
    /// re-arms the inactivity deadline.
    pub fn on_activity(&mut self, now: Instant) -> bool {
        self.deadline = Some(now + self.idle);
        if self.signaling {
            return false;
        }
        self.signaling = true;
        true
    }

    /// Check the inactivity deadline. Returns `true` when the burst ended
    /// and a `typing: false` signal should be emitted.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                let was_signaling = self.signaling;
                self.signaling = false;
                was_signaling
            }
            _ => false,
        }
    }

    /// Next instant at which `poll` may fire, for the event loop's timer.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_signaling(&self) -> bool {
        self.signaling
    }

    /// Clear without emitting anything (logout, channel loss).
    pub fn reset(&mut self) {
        self.signaling = false;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_millis(1000);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_burst_emits_one_start_and_one_stop() {
        let mut debouncer = TypingDebouncer::new(IDLE);
        let t0 = Instant::now();

        // Many ticks inside the window: only the first starts the burst
        assert!(debouncer.on_activity(t0));
        assert!(!debouncer.on_activity(t0 + ms(100)));
        assert!(!debouncer.on_activity(t0 + ms(500)));
        assert!(!debouncer.on_activity(t0 + ms(900)));

        // Deadline re-armed by the last tick
        assert!(!debouncer.poll(t0 + ms(1000)));
        assert!(debouncer.poll(t0 + ms(1900)));

        // Exactly one trailing stop
        assert!(!debouncer.poll(t0 + ms(3000)));
    }

    #[test]
    fn test_new_burst_after_stop_starts_again() {
        let mut debouncer = TypingDebouncer::new(IDLE);
        let t0 = Instant::now();

        assert!(debouncer.on_activity(t0));
        assert!(debouncer.poll(t0 + ms(1000)));

        assert!(debouncer.on_activity(t0 + ms(2000)));
        assert!(debouncer.is_signaling());
        assert!(debouncer.poll(t0 + ms(3000)));
    }

    #[test]
    fn test_poll_before_deadline_is_silent() {
        let mut debouncer = TypingDebouncer::new(IDLE);
        let t0 = Instant::now();

        assert!(debouncer.on_activity(t0));
        assert!(!debouncer.poll(t0 + ms(999)));
        assert!(debouncer.is_signaling());
        assert_eq!(debouncer.deadline(), Some(t0 + IDLE));
    }

    #[test]
    fn test_reset_clears_without_emitting() {
        let mut debouncer = TypingDebouncer::new(IDLE);
        let t0 = Instant::now();

        debouncer.on_activity(t0);
        debouncer.reset();
        assert!(!debouncer.is_signaling());
        assert_eq!(debouncer.deadline(), None);
        assert!(!debouncer.poll(t0 + ms(5000)));
    }

    #[test]
    fn test_idle_debouncer_has_no_deadline() {
        let mut debouncer = TypingDebouncer::new(IDLE);
        assert_eq!(debouncer.deadline(), None);
        assert!(!debouncer.poll(Instant::now()));
    }
}
