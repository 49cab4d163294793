// Retry backoff
//
// Bounded exponential backoff for files whose embedding step failed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failure, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds
    pub max_delay_ms: u64,
    /// Attempts after which the file stays Failed until a new event
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// When a file failed `attempts` times may run again; `None` once exhausted
    pub fn next_retry_at(&self, now: DateTime<Utc>, attempts: u32) -> Option<DateTime<Utc>> {
        if attempts >= self.max_attempts {
            return None;
        }
        Some(now + self.delay(attempts))
    }

    /// Validate bounds
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be > 0".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err("retry.base_delay_ms must be <= retry.max_delay_ms".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 500)]
    #[case(2, 1_000)]
    #[case(4, 4_000)]
    #[case(10, 60_000)]
    #[case(200, 60_000)]
    fn test_delay_doubles_and_caps(#[case] attempt: u32, #[case] millis: i64) {
        assert_eq!(BackoffPolicy::default().delay(attempt), Duration::milliseconds(millis));
    }

    #[test]
    fn test_exhausted_attempts_have_no_retry() {
        let policy = BackoffPolicy {
            max_attempts: 2,
            ..BackoffPolicy::default()
        };
        let now = Utc::now();
        assert_eq!(policy.next_retry_at(now, 1), Some(now + Duration::milliseconds(500)));
        assert_eq!(policy.next_retry_at(now, 2), None);
    }

    #[test]
    fn test_validate() {
        assert!(BackoffPolicy::default().validate().is_ok());
        let bad = BackoffPolicy {
            base_delay_ms: 10,
            max_delay_ms: 1,
            max_attempts: 3,
        };
        assert!(bad.validate().is_err());
    }
}
