use chrono::{DateTime, Duration, Utc};

/// Cache hits younger than this are trusted without a server round trip.
/// Matches the pull-to-refresh throttle of the mobile client.
pub const DEFAULT_COOLDOWN_SECS: i64 = 30;

/// Whether a snapshot refreshed at `last_refreshed_at` has outlived `cooldown`.
///
/// A zero (or negative) cooldown never trusts the cache. A timestamp in the
/// future (clock skew) counts as fresh.
pub fn is_stale(last_refreshed_at: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    if cooldown <= Duration::zero() {
        return true;
    }
    now - last_refreshed_at >= cooldown
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    cooldown: Duration,
}

impl StalenessPolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    /// Out-of-range values saturate to the longest representable cooldown.
    pub fn from_secs(secs: u64) -> Self {
        let cooldown = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self::new(cooldown)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// `force_refresh` bypasses the cooldown unconditionally.
    pub fn should_refresh(&self, last_refreshed_at: DateTime<Utc>, now: DateTime<Utc>, force_refresh: bool) -> bool {
        force_refresh || is_stale(last_refreshed_at, now, self.cooldown)
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_cooldown_is_fresh() {
        let now = Utc::now();
        let cooldown = Duration::seconds(30);
        assert!(!is_stale(now, now, cooldown));
        assert!(!is_stale(now - Duration::seconds(29), now, cooldown));
    }

    #[test]
    fn test_cooldown_boundary_is_stale() {
        let now = Utc::now();
        let cooldown = Duration::seconds(30);
        assert!(is_stale(now - Duration::seconds(30), now, cooldown));
        assert!(is_stale(now - Duration::minutes(5), now, cooldown));
    }

    #[test]
    fn test_zero_cooldown_always_stale() {
        let now = Utc::now();
        assert!(is_stale(now, now, Duration::zero()));
        assert!(is_stale(now + Duration::seconds(10), now, Duration::zero()));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc::now();
        assert!(!is_stale(now + Duration::seconds(90), now, Duration::seconds(30)));
    }

    #[test]
    fn test_force_refresh_overrides_cooldown() {
        let policy = StalenessPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.cooldown(), Duration::seconds(DEFAULT_COOLDOWN_SECS));
        assert!(!policy.should_refresh(now, now, false));
        assert!(policy.should_refresh(now, now, true));
    }

    #[test]
    fn test_from_secs() {
        assert_eq!(StalenessPolicy::from_secs(45).cooldown(), Duration::seconds(45));
    }

    #[test]
    fn test_from_secs_saturates() {
        let now = Utc::now();
        for secs in [u64::MAX, i64::MAX as u64, (i64::MAX / 1000) as u64 + 1] {
            let policy = StalenessPolicy::from_secs(secs);
            assert_eq!(policy.cooldown(), Duration::MAX);
            assert!(!policy.should_refresh(now - Duration::days(365), now, false));
        }
    }
}
