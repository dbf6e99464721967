use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::{error::AppError, types::api_key::ApiKeyRecord};
use tracing::{debug, warn};

use crate::{
    clock::Clock,
    recorder::{UsageEvent, UsageRecorder},
    usage::ApiKeyUsage,
};

/// One upstream credential plus its usage counters.
///
/// Counters live behind a plain mutex: every critical section is a handful
/// of integer updates and never held across an await, and rollback has to
/// run from `Drop`, which is synchronous.
struct CredentialSlot {
    record: ApiKeyRecord,
    state: Mutex<ApiKeyUsage>,
}

impl CredentialSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, ApiKeyUsage> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands out credentials for outbound generation calls without letting any
/// credential exceed its per-minute or per-day limits, rotating away from
/// near-exhausted keys before they hit the wall.
pub struct QuotaPool {
    slots: Vec<Arc<CredentialSlot>>,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn UsageRecorder>,
}

impl QuotaPool {
    pub fn new(
        records: Vec<ApiKeyRecord>,
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn UsageRecorder>,
    ) -> Result<Arc<Self>, AppError> {
        if records.is_empty() {
            return Err(AppError::Configuration(
                "quota pool requires at least one credential".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for record in &records {
            record.validate()?;
            if !seen.insert(record.id) {
                return Err(AppError::Configuration(format!(
                    "duplicate api key id {}",
                    record.id
                )));
            }
        }

        let now = clock.now();
        let slots = records
            .into_iter()
            .map(|record| {
                let usage = ApiKeyUsage::new(record.id, now);
                Arc::new(CredentialSlot {
                    record,
                    state: Mutex::new(usage),
                })
            })
            .collect();

        Ok(Arc::new(Self {
            slots,
            clock,
            recorder,
        }))
    }

    /// Reserves a request slot on the least-utilized eligible credential.
    ///
    /// The reservation counts against the limits immediately, so concurrent
    /// acquirers can never jointly take a credential past its threshold.
    /// Dropping the returned lease without recording rolls the reservation
    /// back.
    pub fn acquire(self: &Arc<Self>) -> Result<CredentialLease, AppError> {
        let now = self.clock.now();

        // Rank candidates by utilization without holding more than one slot
        // lock at a time.
        let mut candidates: Vec<(f64, u32, usize)> = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            let mut state = slot.lock();
            state.roll_over(now);
            if state.is_eligible(&slot.record) {
                candidates.push((state.utilization(&slot.record), slot.record.id, index));
            }
        }
        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        // Reserve under the slot lock, re-checking eligibility: another
        // caller may have taken the last slot since the scan.
        for (_, _, index) in candidates {
            let slot = &self.slots[index];
            let mut state = slot.lock();
            state.roll_over(now);
            if !state.is_eligible(&slot.record) {
                continue;
            }
            state.requests_in_window += 1;
            state.requests_today += 1;
            let lease = CredentialLease {
                slot: Arc::clone(slot),
                recorder: Arc::clone(&self.recorder),
                reserved_window_start: state.window_start_minute,
                reserved_day: state.day,
                finalized: false,
            };
            debug!(
                key_id = slot.record.id,
                requests_in_window = state.requests_in_window,
                "credential acquired"
            );
            return Ok(lease);
        }

        let retry_in = self.next_available_in();
        warn!(retry_in_ms = retry_in.num_milliseconds(), "quota exhausted");
        Err(AppError::QuotaExhausted {
            retry_in_ms: retry_in.num_milliseconds().max(0) as u64,
        })
    }

    /// Hint for backoff: how long until some credential could become
    /// eligible again. Minute-window reopen for daily-eligible keys,
    /// otherwise the next UTC day.
    pub fn next_available_in(&self) -> Duration {
        let now = self.clock.now();
        let mut soonest: Option<Duration> = None;
        for slot in &self.slots {
            let state = slot.lock();
            let daily_open = state.requests_today < slot.record.daily_limit_requests
                && state.tokens_today < slot.record.daily_limit_tokens;
            if !daily_open {
                continue;
            }
            let reopen = state.window_reopens_in(now);
            soonest = Some(match soonest {
                Some(current) if current <= reopen => current,
                _ => reopen,
            });
        }
        soonest.unwrap_or_else(|| {
            let tomorrow = (now + Duration::days(1))
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map_or(now + Duration::days(1), |t| t.and_utc());
            tomorrow - now
        })
    }

    /// Snapshot of one credential's counters, for diagnostics and tests.
    pub fn usage(&self, key_id: u32) -> Option<ApiKeyUsage> {
        self.slots
            .iter()
            .find(|slot| slot.record.id == key_id)
            .map(|slot| slot.lock().clone())
    }
}

/// A reserved request slot on one credential.
///
/// Consume it with [`CredentialLease::record`] once the upstream call has
/// been dispatched; dropping it un-dispatched returns the slot.
pub struct CredentialLease {
    slot: Arc<CredentialSlot>,
    recorder: Arc<dyn UsageRecorder>,
    reserved_window_start: DateTime<Utc>,
    reserved_day: NaiveDate,
    finalized: bool,
}

impl CredentialLease {
    pub fn key_id(&self) -> u32 {
        self.slot.record.id
    }

    pub fn credential(&self) -> &str {
        &self.slot.record.credential
    }

    /// Finalizes the reservation after the upstream call. Counters stay
    /// incremented whether or not the call succeeded; a failed call still
    /// consumed a request slot upstream.
    pub async fn record(mut self, tokens_used: u64, success: bool) -> Result<(), AppError> {
        let event = {
            let mut state = self.slot.lock();
            state.tokens_today = state.tokens_today.saturating_add(tokens_used);
            self.finalized = true;
            UsageEvent {
                usage: state.clone(),
                tokens_used,
                success,
            }
        };
        self.recorder.record(event).await
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        // Cancelled before dispatch: give the reservation back, but only if
        // the counters it touched have not been reset by a rollover since.
        let mut state = self.slot.lock();
        if state.window_start_minute == self.reserved_window_start {
            state.requests_in_window = state.requests_in_window.saturating_sub(1);
        }
        if state.day == self.reserved_day {
            state.requests_today = state.requests_today.saturating_sub(1);
        }
        debug!(key_id = self.slot.record.id, "unused credential lease released");
    }
}
