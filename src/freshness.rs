//! Decides whether the stored snapshot needs refreshing.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub due: bool,
    /// Time left until the snapshot goes stale. Zero or negative once due.
    pub remaining: Duration,
}

/// `remaining = ttl - (now - last_modified)`, due once `remaining <= 0`.
///
/// A missing snapshot is always due.
pub fn check(last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>, ttl: Duration) -> Freshness {
    let Some(last_modified) = last_modified else {
        return Freshness {
            due: true,
            remaining: Duration::zero(),
        };
    };

    let remaining = ttl - now.signed_duration_since(last_modified);

    Freshness {
        due: remaining <= Duration::zero(),
        remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> Duration {
        Duration::minutes(10)
    }

    #[test]
    fn test_old_snapshot_is_due() {
        let now = Utc::now();
        let result = check(Some(now - Duration::minutes(11)), now, ttl());
        assert!(result.due);
    }

    #[test]
    fn test_recent_snapshot_counts_down() {
        let now = Utc::now();
        let result = check(Some(now - Duration::minutes(1)), now, ttl());
        assert!(!result.due);
        assert_eq!(result.remaining, Duration::minutes(9));
    }

    #[test]
    fn test_exact_ttl_is_due() {
        let now = Utc::now();
        assert!(check(Some(now - ttl()), now, ttl()).due);
    }

    #[test]
    fn test_missing_snapshot_is_due() {
        assert!(check(None, Utc::now(), ttl()).due);
    }

    #[test]
    fn test_future_timestamp_is_not_due() {
        let now = Utc::now();
        let result = check(Some(now + Duration::minutes(2)), now, ttl());
        assert!(!result.due);
        assert_eq!(result.remaining, Duration::minutes(12));
    }

    #[test]
    fn test_due_is_monotonic_in_now() {
        let last = Utc::now();
        let mut was_due = false;
        for secs in (0..1_800).step_by(7) {
            let result = check(Some(last), last + Duration::seconds(secs), ttl());
            assert!(!was_due || result.due, "due flipped back at {}s", secs);
            was_due = result.due;
        }
        assert!(was_due);
    }
}
