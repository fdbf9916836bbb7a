//! Per-source-IP handshake failure tracking with temporary bans.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Default failures before a source is banned.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default ban length.
pub const DEFAULT_BAN_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default)]
struct RateLimitEntry {
    failures: u32,
    banned_at: Option<Instant>,
}

impl RateLimitEntry {
    /// Measured from the ban start so a huge window cannot overflow `Instant`.
    fn is_banned(&self, now: Instant, window: Duration) -> bool {
        self.banned_at
            .is_some_and(|at| now.saturating_duration_since(at) < window)
    }
}

/// Counts verification failures per IP. Reaching the threshold bans the IP
/// for the ban window and restarts its count at zero.
#[derive(Debug)]
pub struct RateLimiter {
    threshold: u32,
    ban_window: Duration,
    entries: HashMap<IpAddr, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(threshold: u32, ban_window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            ban_window,
            entries: HashMap::new(),
        }
    }

    /// Record a failed attempt. Ignored while the IP is banned.
    pub fn record_failure(&mut self, ip: IpAddr, now: Instant) {
        self.prune(now);
        let window = self.ban_window;
        let entry = self.entries.entry(ip).or_default();
        if entry.is_banned(now, window) {
            return;
        }
        entry.banned_at = None;
        entry.failures += 1;
        if entry.failures >= self.threshold {
            entry.banned_at = Some(now);
            entry.failures = 0;
        }
    }

    pub fn is_banned(&self, ip: &IpAddr, now: Instant) -> bool {
        self.entries
            .get(ip)
            .is_some_and(|e| e.is_banned(now, self.ban_window))
    }

    /// Drop entries whose ban has run out and that carry no pending failures.
    fn prune(&mut self, now: Instant) {
        let window = self.ban_window;
        self.entries
            .retain(|_, e| e.failures > 0 || e.is_banned(now, window));
    }

    /// Forget everything about `ip`.
    pub fn reset(&mut self, ip: &IpAddr) {
        self.entries.remove(ip);
    }

    /// Failures counted since the last ban (or since the first failure).
    pub fn failure_count(&self, ip: &IpAddr) -> u32 {
        self.entries.get(ip).map(|e| e.failures).unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_BAN_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
    }

    #[test]
    fn not_banned_before_threshold() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        limiter.record_failure(ip(1), now);
        limiter.record_failure(ip(1), now);
        assert_eq!(limiter.failure_count(&ip(1)), 2);
        assert!(!limiter.is_banned(&ip(1), now));
    }

    #[test]
    fn banned_at_threshold_until_window_elapses() {
        let mut limiter = RateLimiter::default();
        let t0 = Instant::now();
        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            limiter.record_failure(ip(1), t0);
        }
        assert!(limiter.is_banned(&ip(1), t0));
        assert_eq!(limiter.failure_count(&ip(1)), 0);
        assert!(limiter.is_banned(&ip(1), t0 + Duration::from_secs(59)));
        assert!(!limiter.is_banned(&ip(1), t0 + DEFAULT_BAN_WINDOW));
        assert!(!limiter.is_banned(&ip(2), t0));
    }

    #[test]
    fn failures_while_banned_are_ignored() {
        let mut limiter = RateLimiter::default();
        let t0 = Instant::now();
        for _ in 0..3 {
            limiter.record_failure(ip(1), t0);
        }
        let later = t0 + Duration::from_secs(30);
        for _ in 0..10 {
            limiter.record_failure(ip(1), later);
        }
        assert_eq!(limiter.failure_count(&ip(1)), 0);
        // Ban was not extended by the ignored failures.
        assert!(!limiter.is_banned(&ip(1), t0 + DEFAULT_BAN_WINDOW));
    }

    #[test]
    fn fresh_cycle_after_ban_expires() {
        let mut limiter = RateLimiter::default();
        let t0 = Instant::now();
        for _ in 0..3 {
            limiter.record_failure(ip(1), t0);
        }
        let after = t0 + DEFAULT_BAN_WINDOW + Duration::from_secs(1);
        limiter.record_failure(ip(1), after);
        assert_eq!(limiter.failure_count(&ip(1)), 1);
        assert!(!limiter.is_banned(&ip(1), after));
    }

    #[test]
    fn expired_bans_are_forgotten() {
        let mut limiter = RateLimiter::default();
        let t0 = Instant::now();
        for last in 1..=20 {
            for _ in 0..3 {
                limiter.record_failure(ip(last), t0);
            }
        }
        assert_eq!(limiter.entries.len(), 20);

        let after = t0 + DEFAULT_BAN_WINDOW;
        limiter.record_failure(ip(99), after);
        assert_eq!(limiter.entries.len(), 1);
        assert_eq!(limiter.failure_count(&ip(99)), 1);
    }

    #[test]
    fn huge_ban_window_does_not_overflow() {
        let mut limiter = RateLimiter::new(1, Duration::MAX);
        let now = Instant::now();
        limiter.record_failure(ip(1), now);
        assert!(limiter.is_banned(&ip(1), now));
        assert!(limiter.is_banned(&ip(1), now + Duration::from_secs(365 * 24 * 3600)));
        limiter.record_failure(ip(2), now + Duration::from_secs(1));
        assert!(limiter.is_banned(&ip(1), now + Duration::from_secs(1)));
    }

    #[test]
    fn reset_clears_ban() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(5));
        let now = Instant::now();
        limiter.record_failure(ip(1), now);
        assert!(limiter.is_banned(&ip(1), now));
        limiter.reset(&ip(1));
        assert!(!limiter.is_banned(&ip(1), now));
        assert_eq!(limiter.failure_count(&ip(1)), 0);
    }
}
