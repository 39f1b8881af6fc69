use std::time::Duration;

use jiff::Timestamp;
use reqwest::StatusCode;
use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

/// Which path started a renewal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalTrigger {
    /// A caller invoked `do_auth` or `load_session`.
    Explicit,
    /// The renewal timer fired.
    Scheduled,
    /// A re-armed attempt after a failed scheduled renewal.
    Retry(u8),
}

/// Correlates the log events of a single renewal attempt.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    trigger: RenewalTrigger,
}

impl RefreshTelemetry {
    pub fn new(trigger: RenewalTrigger) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            trigger,
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn trigger(&self) -> RenewalTrigger {
        self.trigger
    }

    pub fn emit_start(&self, grant: &str) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            trigger = ?self.trigger,
            grant,
            "renewal.start"
        );
    }

    pub fn emit_fallback(&self, status: StatusCode) {
        event!(
            Level::WARN,
            attempt_id = %self.attempt_id,
            trigger = ?self.trigger,
            status = %status,
            "renewal.fallback: refresh grant rejected, retrying with password"
        );
    }

    /// `renew_at` is `None` when renewal was cancelled during the attempt.
    pub fn emit_success(&self, expire_date: Timestamp, renew_at: Option<Timestamp>) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            trigger = ?self.trigger,
            expire_date = %expire_date,
            renew_at = renew_at.map(tracing::field::display),
            "renewal.success"
        );
    }

    pub fn emit_retry(&self, attempt: u8, delay: Duration) {
        event!(
            Level::WARN,
            attempt_id = %self.attempt_id,
            trigger = ?self.trigger,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "renewal.retry"
        );
    }

    pub fn emit_failure(&self, error: &Error) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            trigger = ?self.trigger,
            error = %error,
            "renewal.failure"
        );
    }
}
