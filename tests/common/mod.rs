#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tempfile::TempDir;
use whirlpool_session::clock::ManualClock;
use whirlpool_session::fetcher::Identity;
use whirlpool_session::retry::{JitterStrategy, RetryPlan};
use whirlpool_session::token::RenewalPolicy;
use whirlpool_session::{
    AuthManager, BackendSelector, Brand, ClientCredentials, Credential, CredentialStore, Region,
};
use wiremock::MockServer;

pub const USERNAME: &str = "user@example.com";
pub const PASSWORD: &str = "hunter2";

pub fn at(secs: i64) -> Timestamp {
    Timestamp::from_second(secs).expect("valid timestamp")
}

pub fn plus(time: Timestamp, secs: i64) -> Timestamp {
    time.checked_add(SignedDuration::from_secs(secs))
        .expect("timestamp in range")
}

/// A manual clock parked on a whole second close to real time.
pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(at(Timestamp::now().as_second())))
}

pub fn token_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "accountId": 12345,
        "SAID": ["WPR1", "WPR2"],
    })
}

pub fn credential(access: &str, refresh: &str, expire_date: Timestamp) -> Credential {
    Credential::new(
        access,
        refresh,
        expire_date,
        "12345",
        serde_json::json!(["WPR1"]),
    )
}

pub fn backend(server: &MockServer) -> BackendSelector {
    BackendSelector::new(Brand::Whirlpool, Region::EU)
        .with_base_url(server.uri())
        .with_client_credentials(vec![ClientCredentials::new("test_client", "test_secret")])
}

pub fn identity() -> Identity {
    Identity::new(USERNAME, PASSWORD)
}

pub fn quick_retry_policy(max_attempts: u8) -> RenewalPolicy {
    RenewalPolicy {
        retry: RetryPlan::new(
            max_attempts,
            Duration::from_millis(50),
            1.0,
            Duration::from_millis(50),
            JitterStrategy::None,
        ),
        ..RenewalPolicy::default()
    }
}

pub fn manager(
    server: &MockServer,
    store: Arc<dyn CredentialStore>,
    clock: Arc<ManualClock>,
) -> AuthManager {
    manager_with_policy(server, store, clock, RenewalPolicy::default())
}

pub fn manager_with_policy(
    server: &MockServer,
    store: Arc<dyn CredentialStore>,
    clock: Arc<ManualClock>,
    policy: RenewalPolicy,
) -> AuthManager {
    AuthManager::with_parts(backend(server), identity(), store, clock, policy)
        .expect("manager builds")
}

/// A store path inside a fresh temp dir; the dir is removed when dropped.
pub fn temp_store(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join(format!("{}.json", name));
    (dir, path)
}

pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|r| r.len())
        .unwrap_or(0)
}

/// Polls `check` on real time until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + within;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
