pub(crate) mod credential;
mod policy;
mod scheduler;

pub use credential::{Credential, CredentialSnapshot};
pub use policy::{REQUEST_TIMEOUT, RENEWAL_LEAD_TIME, RenewalPolicy};
pub use scheduler::RenewalScheduler;
