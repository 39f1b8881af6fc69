use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// The single pending renewal owned by a scheduler.
struct RenewalTask {
    generation: u64,
    fire_at: Timestamp,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    /// Generations at or below this were cancelled; a callback still running
    /// under one of them may not arm a new renewal.
    revoked_through: u64,
    task: Option<RenewalTask>,
}

tokio::task_local! {
    static RUNNING_GENERATION: u64;
}

/// Owns at most one cancellable delayed renewal.
///
/// Arming a new renewal aborts the previous one before the new task is
/// spawned, so two renewals are never live at once.
pub struct RenewalScheduler {
    lead_time: Duration,
    clock: Arc<dyn Clock>,
    slot: Arc<Mutex<Slot>>,
}

impl RenewalScheduler {
    pub fn new(lead_time: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            lead_time,
            clock,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    /// Instant at which a renewal for a token expiring at `expire_date`
    /// should fire. An invalid token renews immediately.
    pub fn fire_time(&self, expire_date: Timestamp, token_valid: bool) -> Timestamp {
        let now = self.clock.now();
        if !token_valid {
            return now;
        }
        let lead = SignedDuration::try_from(self.lead_time).unwrap_or(SignedDuration::MAX);
        expire_date.checked_sub(lead).unwrap_or(Timestamp::MIN)
    }

    /// Arms a renewal `lead_time` ahead of `expire_date`, replacing any
    /// pending one. Returns `None` when called from a cancelled renewal.
    pub fn schedule<F, Fut>(
        &self,
        expire_date: Timestamp,
        token_valid: bool,
        callback: F,
    ) -> Option<Timestamp>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fire_at = self.fire_time(expire_date, token_valid);
        if token_valid {
            info!(expire_date = %expire_date, renew_at = %fire_at, "scheduling renewal");
        } else {
            warn!("access token is not valid, renewing now");
        }
        self.schedule_at(fire_at, callback).then_some(fire_at)
    }

    /// Arms a renewal for an explicit instant, replacing any pending one.
    /// Instants in the past fire immediately.
    ///
    /// Returns `false` without arming when the caller is a renewal callback
    /// whose task was cancelled while it ran.
    pub fn schedule_at<F, Fut>(&self, fire_at: Timestamp, callback: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = delay_until(fire_at, self.clock.now());
        let mut slot = self.lock();
        let revoked_caller = RUNNING_GENERATION
            .try_with(|running| *running <= slot.revoked_through)
            .unwrap_or(false);
        if revoked_caller {
            debug!("renewal was cancelled while running, not re-arming");
            return false;
        }
        abort_superseded(&mut slot);
        slot.generation += 1;
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                debug!(delay_secs = delay.as_secs(), "renewal armed");
                tokio::time::sleep(delay).await;
            }
            {
                let slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
                // A superseded or cancelled task may still be polled once after abort.
                if slot.task.as_ref().map(|t| t.generation) != Some(generation) {
                    return;
                }
            }
            RUNNING_GENERATION
                .scope(generation, async move { callback().await })
                .await;
            let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.task.as_ref().map(|t| t.generation) == Some(generation) {
                slot.task = None;
            }
        });
        slot.task = Some(RenewalTask {
            generation,
            fire_at,
            handle,
        });
        true
    }

    /// Cancels the pending renewal, if any, including one whose callback is
    /// already running. Idempotent.
    pub fn cancel(&self) {
        let mut slot = self.lock();
        slot.revoked_through = slot.generation;
        if let Some(task) = slot.task.take() {
            debug!(fire_at = %task.fire_at, "cancelling renewal");
            task.handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().task.is_some()
    }

    pub fn next_fire_at(&self) -> Option<Timestamp> {
        self.lock().task.as_ref().map(|t| t.fire_at)
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Aborts the pending task unless it is the one currently running, which
/// happens when a firing renewal re-arms the scheduler from its own callback.
fn abort_superseded(slot: &mut Slot) {
    let Some(task) = slot.task.take() else {
        return;
    };
    let running_here = tokio::task::try_id() == Some(task.handle.id());
    if !running_here {
        task.handle.abort();
    }
}

fn delay_until(fire_at: Timestamp, now: Timestamp) -> Duration {
    Duration::try_from(fire_at.duration_since(now)).unwrap_or(Duration::ZERO)
}
