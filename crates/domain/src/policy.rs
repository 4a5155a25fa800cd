//! Order handling policy knobs.

use chrono::{DateTime, Duration, Utc};

/// Tunable thresholds for order handling.
#[derive(Debug, Clone, Copy)]
pub struct OrderPolicy {
    /// An open order older than this many days counts as overdue.
    pub overdue_after_days: i64,
}

impl OrderPolicy {
    /// The instant before which an open order is overdue, relative to `now`.
    pub fn overdue_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.overdue_after_days)
    }
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            overdue_after_days: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_days_before_now() {
        let policy = OrderPolicy {
            overdue_after_days: 4,
        };
        let now = Utc::now();
        assert_eq!(policy.overdue_cutoff(now), now - Duration::days(4));
    }
}
