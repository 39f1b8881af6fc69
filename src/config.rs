//! Session configuration from a file, the environment, or AWS Secrets Manager.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use serde::Deserialize;

use crate::backend::{BackendSelector, Brand, ClientCredentials, Region};
use crate::errors::Error;
use crate::fetcher::Identity;
use crate::retry::{JitterStrategy, RetryPlan};
use crate::store::{
    CredentialStore, DEFAULT_CREDENTIAL_PATH, FileCredentialStore, MemoryCredentialStore,
};
use crate::token::{REQUEST_TIMEOUT, RENEWAL_LEAD_TIME, RenewalPolicy};

const SECRET_ARN_VAR: &str = "WHIRLPOOL_CONFIG_SECRET_ARN";

#[derive(Clone, Deserialize)]
pub struct Config {
    pub username: String,
    pub password: String,
    #[serde(default = "default_brand")]
    pub brand: Brand,
    #[serde(default = "default_region")]
    pub region: Region,
    #[serde(default)]
    pub country: Option<String>,
    /// Overrides the region's base URL; the token endpoint is `{base}/oauth/token`.
    #[serde(default)]
    pub auth_base_url: Option<String>,
    #[serde(default)]
    pub client_credentials: Option<Vec<ClientCredentials>>,
    /// `null` keeps the credential in memory only.
    #[serde(default = "default_credential_path")]
    pub credential_path: Option<PathBuf>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub renewal_lead_secs: Option<u64>,
    #[serde(default)]
    pub renewal_retry_attempts: Option<u8>,
    #[serde(default)]
    pub renewal_retry_jitter: Option<String>,
}

fn default_brand() -> Brand {
    Brand::Whirlpool
}

fn default_region() -> Region {
    Region::EU
}

fn default_credential_path() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_CREDENTIAL_PATH))
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("brand", &self.brand)
            .field("region", &self.region)
            .field("country", &self.country)
            .field("auth_base_url", &self.auth_base_url)
            .field("client_credentials", &self.client_credentials)
            .field("credential_path", &self.credential_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("renewal_lead_secs", &self.renewal_lead_secs)
            .field("renewal_retry_attempts", &self.renewal_retry_attempts)
            .field("renewal_retry_jitter", &self.renewal_retry_jitter)
            .finish()
    }
}

impl Config {
    pub fn from_values(
        username: impl Into<String>,
        password: impl Into<String>,
        brand: Brand,
        region: Region,
        credential_path: Option<PathBuf>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            brand,
            region,
            country: None,
            auth_base_url: None,
            client_credentials: None,
            credential_path,
            request_timeout_secs: None,
            renewal_lead_secs: None,
            renewal_retry_attempts: None,
            renewal_retry_jitter: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Reads `WHIRLPOOL_*` environment variables.
    /// # ENV Vars
    /// * `WHIRLPOOL_USERNAME`, `WHIRLPOOL_PASSWORD` - required account identity
    /// * `WHIRLPOOL_BRAND`, `WHIRLPOOL_REGION`, `WHIRLPOOL_COUNTRY` - backend selection
    /// * `WHIRLPOOL_AUTH_URL` - base URL override
    /// * `WHIRLPOOL_AUTH_FILE` - credential path; empty disables persistence
    /// * `WHIRLPOOL_CLIENT_ID`, `WHIRLPOOL_CLIENT_SECRET` - a single client pair
    ///   replacing the backend's known ones; both or neither
    /// * `WHIRLPOOL_REQUEST_TIMEOUT_SECS`, `WHIRLPOOL_RENEWAL_LEAD_SECS`
    /// * `WHIRLPOOL_RENEWAL_RETRY_ATTEMPTS`, `WHIRLPOOL_RENEWAL_RETRY_JITTER`
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("Missing {} env var", key)))
        };
        let parse_secs = |key: &str| -> Result<Option<u64>, Error> {
            lookup(key)
                .map(|v| {
                    v.parse::<u64>()
                        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", key, v, e)))
                })
                .transpose()
        };

        let mut config = Self::from_values(
            required("WHIRLPOOL_USERNAME")?,
            required("WHIRLPOOL_PASSWORD")?,
            lookup("WHIRLPOOL_BRAND")
                .map(|b| b.parse())
                .transpose()?
                .unwrap_or_else(default_brand),
            lookup("WHIRLPOOL_REGION")
                .map(|r| r.parse())
                .transpose()?
                .unwrap_or_else(default_region),
            match lookup("WHIRLPOOL_AUTH_FILE") {
                Some(path) if path.is_empty() => None,
                Some(path) => Some(PathBuf::from(path)),
                None => default_credential_path(),
            },
        );
        config.country = lookup("WHIRLPOOL_COUNTRY");
        config.auth_base_url = lookup("WHIRLPOOL_AUTH_URL");
        config.request_timeout_secs = parse_secs("WHIRLPOOL_REQUEST_TIMEOUT_SECS")?;
        config.renewal_lead_secs = parse_secs("WHIRLPOOL_RENEWAL_LEAD_SECS")?;
        config.renewal_retry_attempts = lookup("WHIRLPOOL_RENEWAL_RETRY_ATTEMPTS")
            .map(|v| {
                v.parse::<u8>().map_err(|e| {
                    Error::Config(format!(
                        "Invalid WHIRLPOOL_RENEWAL_RETRY_ATTEMPTS '{}': {}",
                        v, e
                    ))
                })
            })
            .transpose()?;
        config.renewal_retry_jitter = lookup("WHIRLPOOL_RENEWAL_RETRY_JITTER");
        config.client_credentials = match (
            lookup("WHIRLPOOL_CLIENT_ID"),
            lookup("WHIRLPOOL_CLIENT_SECRET"),
        ) {
            (Some(id), Some(secret)) => Some(vec![ClientCredentials::new(id, secret)]),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "WHIRLPOOL_CLIENT_ID and WHIRLPOOL_CLIENT_SECRET must be set together".into(),
                ));
            }
        };
        Ok(config)
    }

    /// Reads a JSON config stored in the secret named by `WHIRLPOOL_CONFIG_SECRET_ARN`.
    pub async fn from_secret() -> Result<Self, Error> {
        let secret_arn = std::env::var(SECRET_ARN_VAR)
            .map_err(|_| Error::Config(format!("Missing {} env var", SECRET_ARN_VAR)))?;
        let client = aws_sdk_secretsmanager::Client::new(
            &aws_config::load_defaults(BehaviorVersion::latest()).await,
        );
        let resp = client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| Error::Config(format!("Failed to get secret: {}", e)))?;
        let secret = resp.secret_string().ok_or_else(|| {
            Error::Config("Failed to get secret string, returned None".to_string())
        })?;
        Ok(serde_json::from_str(secret)?)
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.username.clone(), self.password.clone())
    }

    pub fn backend(&self) -> BackendSelector {
        let mut backend = BackendSelector::new(self.brand, self.region);
        if let Some(base) = &self.auth_base_url {
            backend = backend.with_base_url(base.clone());
        }
        if let Some(country) = &self.country {
            backend = backend.with_country(country.clone());
        }
        if let Some(credentials) = &self.client_credentials {
            backend = backend.with_client_credentials(credentials.clone());
        }
        backend
    }

    pub fn policy(&self) -> Result<RenewalPolicy, Error> {
        let mut retry = RetryPlan::default_plan();
        if let Some(attempts) = self.renewal_retry_attempts {
            if attempts == 0 {
                return Err(Error::Config("renewal_retry_attempts must be >= 1".into()));
            }
            retry.max_attempts = attempts;
        }
        if let Some(jitter) = &self.renewal_retry_jitter {
            retry.jitter = jitter.parse::<JitterStrategy>()?;
        }
        RenewalPolicy::new(
            self.renewal_lead_secs
                .map(Duration::from_secs)
                .unwrap_or(RENEWAL_LEAD_TIME),
            self.request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(REQUEST_TIMEOUT),
            retry,
        )
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        match &self.credential_path {
            Some(path) => Arc::new(FileCredentialStore::new(path.clone())),
            None => Arc::new(MemoryCredentialStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_requires_identity() {
        let err = Config::from_lookup(lookup(&[("WHIRLPOOL_USERNAME", "me")]))
            .expect_err("password is required");
        assert!(matches!(err, Error::Config(msg) if msg.contains("WHIRLPOOL_PASSWORD")));
    }

    #[test]
    fn env_defaults_to_whirlpool_eu_file_store() {
        let config = Config::from_lookup(lookup(&[
            ("WHIRLPOOL_USERNAME", "me"),
            ("WHIRLPOOL_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(config.brand, Brand::Whirlpool);
        assert_eq!(config.region, Region::EU);
        assert_eq!(
            config.credential_path.as_deref(),
            Some(Path::new(DEFAULT_CREDENTIAL_PATH))
        );
    }

    #[test]
    fn empty_auth_file_disables_persistence() {
        let config = Config::from_lookup(lookup(&[
            ("WHIRLPOOL_USERNAME", "me"),
            ("WHIRLPOOL_PASSWORD", "pw"),
            ("WHIRLPOOL_BRAND", "maytag"),
            ("WHIRLPOOL_REGION", "us"),
            ("WHIRLPOOL_AUTH_FILE", ""),
            ("WHIRLPOOL_RENEWAL_LEAD_SECS", "600"),
        ]))
        .unwrap();
        assert_eq!(config.brand, Brand::Maytag);
        assert_eq!(config.region, Region::US);
        assert!(config.credential_path.is_none());
        assert_eq!(config.policy().unwrap().lead_time, Duration::from_secs(600));
    }

    #[test]
    fn env_reads_retry_tunables_and_client_pair() {
        let config = Config::from_lookup(lookup(&[
            ("WHIRLPOOL_USERNAME", "me"),
            ("WHIRLPOOL_PASSWORD", "pw"),
            ("WHIRLPOOL_BRAND", "kitchenaid"),
            ("WHIRLPOOL_CLIENT_ID", "kitchenaid_ios"),
            ("WHIRLPOOL_CLIENT_SECRET", "s3cret"),
            ("WHIRLPOOL_RENEWAL_RETRY_ATTEMPTS", "2"),
            ("WHIRLPOOL_RENEWAL_RETRY_JITTER", "decorrelated"),
        ]))
        .unwrap();
        let policy = config.policy().unwrap();
        assert_eq!(policy.retry.max_attempts, 2);
        assert_eq!(policy.retry.jitter, JitterStrategy::Decorrelated);
        let backend = config.backend();
        assert_eq!(backend.client_credentials().len(), 1);
        assert_eq!(backend.client_credentials()[0].client_id, "kitchenaid_ios");
        assert!(backend.validate().is_ok());
    }

    #[test]
    fn env_rejects_half_a_client_pair_and_bad_attempts() {
        let half = Config::from_lookup(lookup(&[
            ("WHIRLPOOL_USERNAME", "me"),
            ("WHIRLPOOL_PASSWORD", "pw"),
            ("WHIRLPOOL_CLIENT_ID", "lonely"),
        ]))
        .expect_err("secret missing");
        assert!(matches!(half, Error::Config(msg) if msg.contains("WHIRLPOOL_CLIENT_SECRET")));

        let attempts = Config::from_lookup(lookup(&[
            ("WHIRLPOOL_USERNAME", "me"),
            ("WHIRLPOOL_PASSWORD", "pw"),
            ("WHIRLPOOL_RENEWAL_RETRY_ATTEMPTS", "many"),
        ]))
        .expect_err("not a number");
        assert!(matches!(attempts, Error::Config(_)));
    }

    #[test]
    fn json_null_path_and_overrides() {
        let config: Config = serde_json::from_str(
            r#"{
                "username": "me",
                "password": "pw",
                "region": "US",
                "auth_base_url": "http://localhost:1234",
                "client_credentials": [{"client_id": "a", "client_secret": "b"}],
                "credential_path": null,
                "renewal_retry_jitter": "none"
            }"#,
        )
        .unwrap();
        assert!(config.credential_path.is_none());
        let backend = config.backend();
        assert_eq!(backend.auth_url(), "http://localhost:1234/oauth/token");
        assert_eq!(backend.client_credentials()[0].client_id, "a");
        assert_eq!(config.policy().unwrap().retry.jitter, JitterStrategy::None);
    }

    #[test]
    fn debug_redacts_password() {
        let config = Config::from_values("me", "hunter2", Brand::Whirlpool, Region::EU, None);
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
