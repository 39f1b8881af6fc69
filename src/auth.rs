use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use jiff::{SignedDuration, Timestamp};
use rand::{SeedableRng, rngs::StdRng};
use tracing::{error, info, warn};

use crate::backend::BackendSelector;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::Error;
use crate::fetcher::{Grant, Identity, TokenFetcher};
use crate::store::CredentialStore;
use crate::telemetry::refresh::{RefreshTelemetry, RenewalTrigger};
use crate::token::{Credential, RenewalPolicy, RenewalScheduler};

type RenewalFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type RenewalCallback = Box<dyn FnOnce() -> RenewalFuture + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Renewing,
}

/// Holds one authenticated session and keeps its access token valid.
///
/// Clones share the same session. Dropping the last clone cancels the
/// pending renewal.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: TokenFetcher,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    scheduler: RenewalScheduler,
    policy: RenewalPolicy,
    credential: RwLock<Option<Credential>>,
    state: Mutex<SessionState>,
    // Serializes fetches; readers never take it.
    auth_lock: tokio::sync::Mutex<()>,
    rng: Mutex<StdRng>,
}

impl AuthManager {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::with_parts(
            config.backend(),
            config.identity(),
            config.store(),
            Arc::new(SystemClock),
            config.policy()?,
        )
    }

    pub fn with_parts(
        backend: BackendSelector,
        identity: Identity,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        policy: RenewalPolicy,
    ) -> Result<Self, Error> {
        let fetcher = TokenFetcher::new(
            backend,
            identity,
            Arc::clone(&clock),
            policy.request_timeout,
        )?;
        let scheduler = RenewalScheduler::new(policy.lead_time, Arc::clone(&clock));
        Ok(Self {
            inner: Arc::new(Inner {
                fetcher,
                store,
                clock,
                scheduler,
                policy,
                credential: RwLock::new(None),
                state: Mutex::new(SessionState::Unauthenticated),
                auth_lock: tokio::sync::Mutex::new(()),
                rng: Mutex::new(StdRng::from_entropy()),
            }),
        })
    }

    /// Fetches a fresh credential, using the held refresh token when there is
    /// one and the password otherwise.
    ///
    /// On success the credential is installed, persisted and its renewal
    /// scheduled. A persistence failure is returned as an error, but the new
    /// credential stays installed. On any other failure the previous
    /// credential is left untouched.
    pub async fn do_auth(&self) -> Result<(), Error> {
        let telemetry = RefreshTelemetry::new(RenewalTrigger::Explicit);
        match self.inner.authenticate(&telemetry).await? {
            Some(store_err) => Err(store_err),
            None => Ok(()),
        }
    }

    /// Restores the persisted credential, renewing it now if it is missing or
    /// expired. A valid stored credential is scheduled without a network call.
    pub async fn load_session(&self) -> Result<(), Error> {
        let needs_auth = {
            let _guard = self.inner.auth_lock.lock().await;
            let now = self.inner.clock.now();
            match self.inner.store.load()? {
                Some(credential) if credential.is_valid_at(now) => {
                    info!(expire_date = %credential.expire_date(), "restored session from store");
                    self.inner.install(credential);
                    false
                }
                Some(credential) => {
                    info!("access token expired, renewing");
                    // Keep the stale record so its refresh token is used.
                    *self.inner.write_credential() = Some(credential);
                    true
                }
                None => true,
            }
        };
        if needs_auth {
            self.do_auth().await
        } else {
            Ok(())
        }
    }

    pub fn is_token_valid(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .read_credential()
            .as_ref()
            .is_some_and(|c| c.is_valid_at(now))
    }

    /// The access token, if a valid one is held.
    pub fn get_access_token(&self) -> Option<String> {
        let now = self.inner.clock.now();
        self.inner
            .read_credential()
            .as_ref()
            .filter(|c| c.is_valid_at(now))
            .map(|c| c.access_token().to_string())
    }

    pub fn get_said_list(&self) -> Option<serde_json::Value> {
        self.inner
            .read_credential()
            .as_ref()
            .map(|c| c.said_list().clone())
            .filter(|said| !said.is_null())
    }

    pub fn get_account_id(&self) -> Option<String> {
        self.inner
            .read_credential()
            .as_ref()
            .map(|c| c.account_id().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.read_credential().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn next_renewal_at(&self) -> Option<Timestamp> {
        self.inner.scheduler.next_fire_at()
    }

    /// Stops background renewal. Call on session teardown.
    pub fn cancel_renewal(&self) {
        self.inner.scheduler.cancel();
    }
}

/// Settles the session state once an authentication attempt ends, including
/// when its future is dropped mid-fetch by a cancel or a caller's timeout.
struct SettleState<'a>(&'a Inner);

impl Drop for SettleState<'_> {
    fn drop(&mut self) {
        let inner = self.0;
        let now = inner.clock.now();
        let valid = inner
            .read_credential()
            .as_ref()
            .is_some_and(|c| c.is_valid_at(now));
        inner.set_state(if valid {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        });
    }
}

impl Inner {
    /// Returns `Ok(Some(err))` when the credential was installed but could
    /// not be persisted.
    async fn authenticate(
        self: &Arc<Self>,
        telemetry: &RefreshTelemetry,
    ) -> Result<Option<Error>, Error> {
        let _guard = self.auth_lock.lock().await;
        let grant = match self.read_credential().as_ref() {
            Some(c) if c.has_refresh_token() => Grant::RefreshToken(c.refresh_token().to_string()),
            _ => Grant::Password,
        };
        self.set_state(match telemetry.trigger() {
            RenewalTrigger::Explicit => SessionState::Authenticating,
            _ => SessionState::Renewing,
        });
        let _settle = SettleState(self.as_ref());
        telemetry.emit_start(grant.kind());

        let fetched = self.fetcher.fetch(&grant, telemetry).await.and_then(|c| {
            if c.is_valid_at(self.clock.now()) {
                Ok(c)
            } else {
                Err(Error::ExpiredOnArrival)
            }
        });
        let credential = match fetched {
            Ok(credential) => credential,
            Err(err) => {
                telemetry.emit_failure(&err);
                return Err(err);
            }
        };

        let persisted = self.store.save(&credential);
        let expire_date = credential.expire_date();
        let renew_at = self.install(credential);
        telemetry.emit_success(expire_date, renew_at);
        match persisted {
            Ok(()) => Ok(None),
            Err(err) => {
                warn!(error = %err, "could not persist credential; continuing in memory");
                Ok(Some(err))
            }
        }
    }

    /// Replaces the credential and re-arms renewal as one step. No renewal is
    /// armed when this runs inside a renewal that was cancelled meanwhile.
    fn install(self: &Arc<Self>, credential: Credential) -> Option<Timestamp> {
        let mut slot = self.write_credential();
        let valid = credential.is_valid_at(self.clock.now());
        let expire_date = credential.expire_date();
        *slot = Some(credential);
        let renew_at = self
            .scheduler
            .schedule(expire_date, valid, self.renewal_callback(1));
        drop(slot);
        self.set_state(SessionState::Authenticated);
        renew_at
    }

    fn renewal_callback(self: &Arc<Self>, attempt: u8) -> RenewalCallback {
        let weak: Weak<Inner> = Arc::downgrade(self);
        Box::new(move || -> RenewalFuture {
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.renew_in_background(attempt).await;
                }
            })
        })
    }

    async fn renew_in_background(self: Arc<Self>, attempt: u8) {
        let trigger = if attempt <= 1 {
            RenewalTrigger::Scheduled
        } else {
            RenewalTrigger::Retry(attempt)
        };
        let telemetry = RefreshTelemetry::new(trigger);
        match self.authenticate(&telemetry).await {
            Ok(_) => {}
            Err(_) if self.policy.retry.allows(attempt) => {
                let next = attempt + 1;
                let delay = {
                    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                    self.policy.retry.delay_for_attempt(next, &mut *rng)
                };
                telemetry.emit_retry(next, delay);
                let step = SignedDuration::try_from(delay).unwrap_or(SignedDuration::MAX);
                let fire_at = self
                    .clock
                    .now()
                    .checked_add(step)
                    .unwrap_or(Timestamp::MAX);
                if !self
                    .scheduler
                    .schedule_at(fire_at, self.renewal_callback(next))
                {
                    info!("renewal cancelled, dropping retry");
                }
            }
            Err(err) => {
                error!(
                    attempts = attempt,
                    error = %err,
                    "renewal retries exhausted; session will not renew until re-authenticated"
                );
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn read_credential(&self) -> std::sync::RwLockReadGuard<'_, Option<Credential>> {
        self.credential.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_credential(&self) -> std::sync::RwLockWriteGuard<'_, Option<Credential>> {
        self.credential.write().unwrap_or_else(PoisonError::into_inner)
    }
}
