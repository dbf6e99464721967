use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::types::api_key::ApiKeyRecord;
use serde::Serialize;

/// Rotate away from a credential once its minute window reaches this share
/// of the limit. The margin absorbs burst overshoot from the network latency
/// between the eligibility check and the upstream call landing.
pub const SWITCH_THRESHOLD: f64 = 0.6;

pub const MINUTE_WINDOW_SECS: i64 = 60;

/// Mutable usage counters for one credential.
///
/// The minute window is a rolling window anchored at the first request after
/// the previous window elapsed; daily counters reset on UTC day change.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyUsage {
    pub key_id: u32,
    pub window_start_minute: DateTime<Utc>,
    pub requests_in_window: u32,
    pub day: NaiveDate,
    pub requests_today: u32,
    pub tokens_today: u64,
}

impl ApiKeyUsage {
    pub fn new(key_id: u32, now: DateTime<Utc>) -> Self {
        Self {
            key_id,
            window_start_minute: now,
            requests_in_window: 0,
            day: now.date_naive(),
            requests_today: 0,
            tokens_today: 0,
        }
    }

    /// Resets any counter whose window has elapsed.
    pub fn roll_over(&mut self, now: DateTime<Utc>) {
        if now - self.window_start_minute >= Duration::seconds(MINUTE_WINDOW_SECS) {
            self.window_start_minute = now;
            self.requests_in_window = 0;
        }
        if now.date_naive() != self.day {
            self.day = now.date_naive();
            self.requests_today = 0;
            self.tokens_today = 0;
        }
    }

    /// Whether another request may be reserved against this credential.
    pub fn is_eligible(&self, record: &ApiKeyRecord) -> bool {
        f64::from(self.requests_in_window)
            < f64::from(record.minute_limit_requests) * SWITCH_THRESHOLD
            && self.requests_today < record.daily_limit_requests
            && self.tokens_today < record.daily_limit_tokens
    }

    /// Highest of the three limit ratios; the pool picks the credential with
    /// the lowest value so load spreads instead of draining one key.
    pub fn utilization(&self, record: &ApiKeyRecord) -> f64 {
        let minute = f64::from(self.requests_in_window) / f64::from(record.minute_limit_requests);
        let daily_requests =
            f64::from(self.requests_today) / f64::from(record.daily_limit_requests);
        let daily_tokens = self.tokens_today as f64 / record.daily_limit_tokens as f64;
        minute.max(daily_requests).max(daily_tokens)
    }

    /// Time until the minute window reopens, zero if it already has.
    pub fn window_reopens_in(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = now - self.window_start_minute;
        let window = Duration::seconds(MINUTE_WINDOW_SECS);
        if elapsed >= window {
            Duration::zero()
        } else {
            window - elapsed
        }
    }
}
