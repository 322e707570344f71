use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic expiry tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_millis(by), Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Time-to-live / time-to-idle configuration shared by every expiring backend.
///
/// A zero duration means the bound is unused. When both are set, time-to-idle
/// should be the tighter bound; if it is not, time-to-live takes precedence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    pub time_to_live: Duration,
    pub time_to_idle: Duration,
}

impl ExpiryPolicy {
    pub fn new(time_to_live: Duration, time_to_idle: Duration) -> Self {
        Self {
            time_to_live,
            time_to_idle,
        }
    }

    /// Entries never expire.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn time_to_live(ttl: Duration) -> Self {
        Self::new(ttl, Duration::ZERO)
    }

    pub fn time_to_idle(tti: Duration) -> Self {
        Self::new(Duration::ZERO, tti)
    }

    fn ttl_millis(&self) -> i64 {
        duration_millis(self.time_to_live)
    }

    fn tti_millis(&self) -> i64 {
        duration_millis(self.time_to_idle)
    }

    pub fn expires(&self) -> bool {
        self.ttl_millis() > 0 || self.tti_millis() > 0
    }

    /// Time-to-idle only governs (and renews) when it is the tighter bound.
    pub fn renews_on_read(&self) -> bool {
        let (ttl, tti) = (self.ttl_millis(), self.tti_millis());
        tti > 0 && (ttl == 0 || tti < ttl)
    }

    /// Expiry timestamp for an entry written at `now`, or `None` if entries never expire.
    pub fn expiry_time(&self, now: i64) -> Option<i64> {
        if !self.expires() {
            return None;
        }

        if self.renews_on_read() {
            Some(now.saturating_add(self.tti_millis()))
        } else {
            Some(now.saturating_add(self.ttl_millis()))
        }
    }

    /// Renewed expiry timestamp for an entry read at `now`.
    pub fn renewed_expiry_time(&self, now: i64) -> Option<i64> {
        self.renews_on_read().then(|| now.saturating_add(self.tti_millis()))
    }
}

/// Whole milliseconds in `duration`, clamped to `i64::MAX`.
fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Returns true if an entry with the given expiry time is no longer readable at `now`.
pub fn is_expired(expiry_time: Option<i64>, now: i64) -> bool {
    matches!(expiry_time, Some(expiry) if now > expiry)
}

/// A stored value with its creation and expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub creation_time: i64,
    pub expiry_time: Option<i64>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, now: i64, policy: &ExpiryPolicy) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            creation_time: now,
            expiry_time: policy.expiry_time(now),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        is_expired(self.expiry_time, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_000_000;

    #[test]
    fn test_no_bounds_never_expire() {
        let policy = ExpiryPolicy::none();
        assert!(!policy.expires());
        assert_eq!(policy.expiry_time(NOW), None);
        assert!(!is_expired(None, i64::MAX));
    }

    #[test]
    fn test_single_bound() {
        let ttl = ExpiryPolicy::time_to_live(Duration::from_millis(100));
        assert_eq!(ttl.expiry_time(NOW), Some(NOW + 100));
        assert!(!ttl.renews_on_read());

        let tti = ExpiryPolicy::time_to_idle(Duration::from_millis(20));
        assert_eq!(tti.expiry_time(NOW), Some(NOW + 20));
        assert_eq!(tti.renewed_expiry_time(NOW + 5), Some(NOW + 25));
    }

    #[test]
    fn test_tighter_idle_bound_wins() {
        let policy = ExpiryPolicy::new(Duration::from_millis(100), Duration::from_millis(20));
        assert_eq!(policy.expiry_time(NOW), Some(NOW + 20));
    }

    #[test]
    fn test_misconfigured_idle_bound_falls_back_to_ttl() {
        let policy = ExpiryPolicy::new(Duration::from_millis(100), Duration::from_millis(150));
        assert_eq!(policy.expiry_time(NOW), Some(NOW + 100));
        assert!(!policy.renews_on_read());
        assert_eq!(policy.renewed_expiry_time(NOW + 50), None);

        let equal = ExpiryPolicy::new(Duration::from_millis(100), Duration::from_millis(100));
        assert_eq!(equal.expiry_time(NOW), Some(NOW + 100));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        assert!(!is_expired(Some(NOW), NOW));
        assert!(is_expired(Some(NOW), NOW + 1));
    }

    #[test]
    fn test_huge_bounds_saturate() {
        let ttl = ExpiryPolicy::time_to_live(Duration::from_millis(u64::MAX / 2));
        assert_eq!(ttl.expiry_time(NOW), Some(i64::MAX));
        assert!(!is_expired(ttl.expiry_time(NOW), NOW));

        let tti = ExpiryPolicy::time_to_idle(Duration::MAX);
        assert_eq!(tti.expiry_time(NOW), Some(i64::MAX));
        assert_eq!(tti.renewed_expiry_time(NOW), Some(i64::MAX));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10);
        clock.advance(Duration::from_millis(15));
        assert_eq!(clock.now_millis(), 25);
        clock.set(3);
        assert_eq!(clock.now_millis(), 3);
    }
}
