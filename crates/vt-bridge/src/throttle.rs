use std::time::{Duration, Instant};

use crate::protocol::WireFrame;

pub const DEFAULT_TYPING_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_PROCEDURAL_INTERVAL: Duration = Duration::from_millis(1050);

// ---------------------------------------------------------------------------
// IntervalGate
// ---------------------------------------------------------------------------

/// Compare-and-update time gate.
///
/// Opens at most once per `interval`. Rejected attempts are dropped, never
/// deferred, so there is no timer to cancel.
#[derive(Debug, Clone)]
pub struct IntervalGate {
    interval: Duration,
    last_pass: Option<Instant>,
}

impl IntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_pass: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn try_pass(&mut self) -> bool {
        self.try_pass_at(Instant::now())
    }

    /// Pass iff `interval` has elapsed since the last pass, recording `now`
    /// on success.
    pub fn try_pass_at(&mut self, now: Instant) -> bool {
        let open = match self.last_pass {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if open {
            self.last_pass = Some(now);
        }
        open
    }

    /// Make the next attempt pass regardless of timing.
    pub fn reset(&mut self) {
        self.last_pass = None;
    }
}

// ---------------------------------------------------------------------------
// TypingThrottle
// ---------------------------------------------------------------------------

/// Rate limiter for the `typing:*` heartbeat.
///
/// `typing:true` is emitted at most once per interval. `typing:false` is
/// always emitted and re-arms the gate.
#[derive(Debug, Clone)]
pub struct TypingThrottle {
    gate: IntervalGate,
}

impl TypingThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            gate: IntervalGate::new(min_interval),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.gate.interval()
    }

    pub fn request(&mut self, is_typing: bool) -> Option<WireFrame> {
        self.request_at(is_typing, Instant::now())
    }

    /// Returns the heartbeat frame to write, or `None` when throttled.
    pub fn request_at(&mut self, is_typing: bool, now: Instant) -> Option<WireFrame> {
        if !is_typing {
            self.gate.reset();
            return Some(WireFrame::heartbeat(false));
        }
        self.gate
            .try_pass_at(now)
            .then(|| WireFrame::heartbeat(true))
    }

    pub fn reset(&mut self) {
        self.gate.reset();
    }
}

impl Default for TypingThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_true_is_emitted() {
        let mut t = TypingThrottle::default();
        assert_eq!(t.request_at(true, Instant::now()), Some(WireFrame::Typing(true)));
    }

    #[test]
    fn true_inside_window_is_dropped() {
        let base = Instant::now();
        let mut t = TypingThrottle::new(ms(1500));
        assert!(t.request_at(true, base).is_some());
        assert!(t.request_at(true, base + ms(10)).is_none());
        assert!(t.request_at(true, base + ms(1499)).is_none());
        assert!(t.request_at(true, base + ms(1500)).is_some());
    }

    #[test]
    fn false_always_emits_and_rearms() {
        let base = Instant::now();
        let mut t = TypingThrottle::new(ms(1500));
        assert!(t.request_at(true, base).is_some());
        assert_eq!(
            t.request_at(false, base + ms(1)),
            Some(WireFrame::Typing(false))
        );
        assert_eq!(t.request_at(false, base + ms(2)), Some(WireFrame::Typing(false)));
        assert_eq!(t.request_at(true, base + ms(3)), Some(WireFrame::Typing(true)));
    }

    #[test]
    fn gate_ignores_clock_going_backwards() {
        let base = Instant::now() + ms(5000);
        let mut gate = IntervalGate::new(ms(1050));
        assert!(gate.try_pass_at(base));
        assert!(!gate.try_pass_at(base - ms(2000)));
    }

    proptest! {
        #[test]
        fn heartbeat_count_is_bounded(gaps in proptest::collection::vec(0u64..4000, 1..64)) {
            let interval = 1500u64;
            let base = Instant::now();
            let mut throttle = TypingThrottle::new(ms(interval));

            let mut at = 0u64;
            let mut emitted = 0u64;
            for (i, gap) in gaps.iter().enumerate() {
                if i > 0 {
                    at += gap;
                }
                if throttle.request_at(true, base + ms(at)).is_some() {
                    emitted += 1;
                }
            }
            prop_assert!(emitted <= 1 + at / interval);
        }

        #[test]
        fn emissions_are_spaced_by_interval(gaps in proptest::collection::vec(0u64..2000, 1..64)) {
            let interval = ms(1000);
            let base = Instant::now();
            let mut throttle = TypingThrottle::new(interval);

            let mut at = base;
            let mut last: Option<Instant> = None;
            for gap in gaps {
                at += ms(gap);
                if throttle.request_at(true, at).is_some() {
                    if let Some(prev) = last {
                        prop_assert!(at - prev >= interval);
                    }
                    last = Some(at);
                }
            }
        }
    }
}
