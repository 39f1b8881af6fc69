use std::time::Duration;

use crate::errors::Error;
use crate::retry::RetryPlan;

/// How long before expiry a renewal is scheduled.
pub const RENEWAL_LEAD_TIME: Duration = Duration::from_secs(15 * 60);

/// Upper bound on a single token endpoint request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Business rules governing proactive renewal.
#[derive(Clone, Debug)]
pub struct RenewalPolicy {
    /// Renewal fires this long before the access token expires.
    pub lead_time: Duration,
    /// Timeout applied to each request against the token endpoint.
    pub request_timeout: Duration,
    /// Backoff used to re-arm a background renewal that failed.
    pub retry: RetryPlan,
}

impl RenewalPolicy {
    pub fn new(
        lead_time: Duration,
        request_timeout: Duration,
        retry: RetryPlan,
    ) -> Result<Self, Error> {
        if request_timeout.is_zero() {
            return Err(Error::Config("Request timeout must be > 0".into()));
        }
        if request_timeout >= lead_time && !lead_time.is_zero() {
            return Err(Error::Config(
                "Request timeout must be lower than the renewal lead time".into(),
            ));
        }
        Ok(Self {
            lead_time,
            request_timeout,
            retry,
        })
    }
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            lead_time: RENEWAL_LEAD_TIME,
            request_timeout: REQUEST_TIMEOUT,
            retry: RetryPlan::default_plan(),
        }
    }
}
