use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_CALLS: u32 = 30;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

pub const VISION_SERVICE: &str = "vision";
pub const LLM_SERVICE: &str = "llm";

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window call limiter keyed by service name.
///
/// A window opens on the first call and closes once more than `window` has
/// elapsed; the next call then opens a fresh window.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    counters: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Record a call attempt; `false` means the service is over its limit.
    pub fn can_call(&self, service: &str) -> bool {
        self.can_call_at(service, Instant::now())
    }

    pub fn can_call_at(&self, service: &str, now: Instant) -> bool {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = Window {
            count: 0,
            started: now,
        };
        let w = counters.entry(service.to_string()).or_insert(fresh);
        if now.saturating_duration_since(w.started) > self.window {
            *w = fresh;
        }
        if w.count >= self.max_calls {
            return false;
        }
        w.count += 1;
        true
    }

    #[must_use]
    pub fn remaining_calls(&self, service: &str) -> u32 {
        self.remaining_calls_at(service, Instant::now())
    }

    #[must_use]
    pub fn remaining_calls_at(&self, service: &str, now: Instant) -> u32 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        match counters.get(service) {
            Some(w) if now.saturating_duration_since(w.started) <= self.window => {
                self.max_calls.saturating_sub(w.count)
            }
            _ => self.max_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_window() {
        let limiter = RateLimiter::default();
        let t0 = Instant::now();
        for _ in 0..30 {
            assert!(limiter.can_call_at(VISION_SERVICE, t0));
        }
        assert!(!limiter.can_call_at(VISION_SERVICE, t0));
        assert!(!limiter.can_call_at(VISION_SERVICE, t0 + Duration::from_secs(60)));
        assert_eq!(limiter.remaining_calls_at(VISION_SERVICE, t0), 0);
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::default();
        let t0 = Instant::now();
        for _ in 0..30 {
            limiter.can_call_at(VISION_SERVICE, t0);
        }
        let later = t0 + Duration::from_secs(61);
        assert_eq!(limiter.remaining_calls_at(VISION_SERVICE, later), 30);
        assert!(limiter.can_call_at(VISION_SERVICE, later));
        assert_eq!(limiter.remaining_calls_at(VISION_SERVICE, later), 29);
    }

    #[test]
    fn test_services_counted_separately() {
        let limiter = RateLimiter::new(1, DEFAULT_WINDOW);
        let t0 = Instant::now();
        assert!(limiter.can_call_at(VISION_SERVICE, t0));
        assert!(!limiter.can_call_at(VISION_SERVICE, t0));
        assert!(limiter.can_call_at(LLM_SERVICE, t0));
        assert_eq!(limiter.remaining_calls_at("unused", t0), 1);
    }
}
