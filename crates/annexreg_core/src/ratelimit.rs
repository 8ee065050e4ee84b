//! In-memory sliding-window rate limiter.
//!
//! Single-process and best-effort: a defense-in-depth measure, not a
//! correctness primitive. Multi-instance deployments can swap in a shared
//! counter store behind the same interface.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
    Login,
    Invite,
    Llm,
}

impl LimitClass {
    /// (max requests, window) per class.
    fn rule(self) -> (usize, Duration) {
        match self {
            Self::Login => (10, Duration::from_secs(60)),
            Self::Invite => (5, Duration::from_secs(3600)),
            Self::Llm => (30, Duration::from_secs(60)),
        }
    }
}

#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(LimitClass, String), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt for `identifier`; returns false when the window
    /// is already full.
    pub fn check(&self, class: LimitClass, identifier: &str) -> bool {
        self.check_at(class, identifier, Instant::now())
    }

    fn check_at(&self, class: LimitClass, identifier: &str, now: Instant) -> bool {
        let (max, window) = class.rule();
        let mut state = self.windows.lock().expect("rate limiter poisoned");
        let hits = state
            .entry((class, identifier.to_string()))
            .or_default();
        hits.retain(|t| now.duration_since(*t) < window);
        if hits.len() >= max {
            return false;
        }
        hits.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_allows_ten_per_minute() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_at(LimitClass::Login, "1.2.3.4", now));
        }
        assert!(!limiter.check_at(LimitClass::Login, "1.2.3.4", now));
        // Another caller is unaffected.
        assert!(limiter.check_at(LimitClass::Login, "5.6.7.8", now));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_at(LimitClass::Login, "ip", start));
        }
        assert!(!limiter.check_at(LimitClass::Login, "ip", start));
        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at(LimitClass::Login, "ip", later));
    }

    #[test]
    fn classes_are_isolated() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at(LimitClass::Invite, "user-1", now));
        }
        assert!(!limiter.check_at(LimitClass::Invite, "user-1", now));
        assert!(limiter.check_at(LimitClass::Llm, "user-1", now));
    }
}
