//! Session credentials for the Whirlpool appliance cloud.
//!
//! [`AuthManager`] obtains an access/refresh token pair, persists it, and
//! keeps it valid by scheduling its own renewal ahead of expiry.

mod auth;
pub mod backend;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod token;

pub use auth::{AuthManager, SessionState};
pub use backend::{BackendSelector, Brand, ClientCredentials, Region};
pub use config::Config;
pub use errors::Error;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::{Credential, RENEWAL_LEAD_TIME};

#[cfg(test)]
mod tests;
