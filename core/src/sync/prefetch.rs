/// Throttled background loading of upcoming screenshot pages
///
/// Two trigger classes with separate clocks so a manual jump past the
/// loaded bound cannot starve a scheduled look-ahead fetch and vice versa:
/// reactive (viewed index past what is loaded) and proactive (within the
/// look-ahead window of the loaded tail).
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchTrigger {
    Reactive,
    Proactive,
}

pub struct PrefetchScheduler {
    lookahead: usize,
    debounce: Duration,
    min_interval: Duration,
    last_nav: Option<Instant>,
    last_reactive: Option<Instant>,
    last_proactive: Option<Instant>,
}

impl PrefetchScheduler {
    pub fn new(lookahead: usize, debounce: Duration, min_interval: Duration) -> Self {
        Self {
            lookahead,
            debounce,
            min_interval,
            last_nav: None,
            last_reactive: None,
            last_proactive: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a navigation event; prefetch stays quiet for the debounce
    /// window after the last one
    pub fn on_navigate(&mut self, now: Instant) {
        self.last_nav = Some(now);
    }

    /// Decide whether a fetch should fire for the given viewer position.
    /// `loaded` is the number of items currently in memory; `has_more`
    /// whether the server holds older ones.
    pub fn poll(
        &mut self,
        viewed_index: usize,
        loaded: usize,
        has_more: bool,
        now: Instant,
    ) -> Option<PrefetchTrigger> {
        if !has_more || loaded == 0 {
            return None;
        }
        if let Some(nav) = self.last_nav {
            if now.duration_since(nav) < self.debounce {
                return None;
            }
        }

        if viewed_index >= loaded {
            if ready(self.last_reactive, self.min_interval, now) {
                self.last_reactive = Some(now);
                return Some(PrefetchTrigger::Reactive);
            }
            return None;
        }

        let remaining = loaded - 1 - viewed_index;
        if remaining < self.lookahead {
            if ready(self.last_proactive, self.min_interval, now) {
                self.last_proactive = Some(now);
                return Some(PrefetchTrigger::Proactive);
            }
        }
        None
    }
}

fn ready(last: Option<Instant>, min_interval: Duration, now: Instant) -> bool {
    match last {
        Some(at) => now.duration_since(at) >= min_interval,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> PrefetchScheduler {
        PrefetchScheduler::new(3, Duration::from_millis(100), Duration::from_millis(500))
    }

    #[test]
    fn test_proactive_within_lookahead_window() {
        let mut sched = scheduler();
        let now = Instant::now();

        // 10 loaded, viewing index 5: 4 older items remain, outside window
        assert_eq!(sched.poll(5, 10, true, now), None);
        // index 7: 2 remain, inside window
        assert_eq!(sched.poll(7, 10, true, now), Some(PrefetchTrigger::Proactive));
    }

    #[test]
    fn test_reactive_past_loaded_bound() {
        let mut sched = scheduler();
        let now = Instant::now();
        assert_eq!(sched.poll(10, 10, true, now), Some(PrefetchTrigger::Reactive));
    }

    #[test]
    fn test_no_fetch_when_exhausted() {
        let mut sched = scheduler();
        let now = Instant::now();
        assert_eq!(sched.poll(9, 10, false, now), None);
        assert_eq!(sched.poll(0, 0, true, now), None);
    }

    #[test]
    fn test_debounce_quiets_after_navigation() {
        let mut sched = scheduler();
        let base = Instant::now();

        sched.on_navigate(base);
        assert_eq!(sched.poll(9, 10, true, base + Duration::from_millis(50)), None);
        assert_eq!(
            sched.poll(9, 10, true, base + Duration::from_millis(150)),
            Some(PrefetchTrigger::Proactive)
        );
    }

    #[test]
    fn test_min_interval_rate_limits() {
        let mut sched = scheduler();
        let base = Instant::now();

        assert!(sched.poll(9, 10, true, base).is_some());
        assert_eq!(sched.poll(9, 10, true, base + Duration::from_millis(200)), None);
        assert!(sched
            .poll(9, 10, true, base + Duration::from_millis(600))
            .is_some());
    }

    #[test]
    fn test_trigger_clocks_are_independent() {
        let mut sched = scheduler();
        let base = Instant::now();

        // A proactive fire must not consume the reactive budget
        assert_eq!(sched.poll(9, 10, true, base), Some(PrefetchTrigger::Proactive));
        assert_eq!(
            sched.poll(12, 10, true, base + Duration::from_millis(10)),
            Some(PrefetchTrigger::Reactive)
        );
    }
}
