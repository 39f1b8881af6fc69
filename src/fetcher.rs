use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backend::{BackendSelector, ClientCredentials};
use crate::clock::Clock;
use crate::errors::Error;
use crate::telemetry::refresh::RefreshTelemetry;
use crate::token::Credential;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The account identity used for password grants.
#[derive(Clone)]
pub struct Identity {
    pub username: String,
    pub password: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    Password,
    RefreshToken(String),
}

impl Grant {
    pub fn kind(&self) -> &'static str {
        match self {
            Grant::Password => "password",
            Grant::RefreshToken(_) => "refresh_token",
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(
        rename = "accountId",
        default,
        deserialize_with = "crate::token::credential::string_or_number"
    )]
    account_id: String,
    #[serde(rename = "SAID", default)]
    said_list: serde_json::Value,
}

/// Exchanges a password or refresh token for a fresh [`Credential`].
pub struct TokenFetcher {
    http_client: Client,
    backend: BackendSelector,
    identity: Identity,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl TokenFetcher {
    pub fn new(
        backend: BackendSelector,
        identity: Identity,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        backend.validate()?;
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            backend,
            identity,
            clock,
            timeout,
        })
    }

    pub fn backend(&self) -> &BackendSelector {
        &self.backend
    }

    /// Runs `grant` against the token endpoint.
    ///
    /// A rejected refresh grant falls back to the password grant exactly once;
    /// a rejected password grant is terminal.
    pub async fn fetch(
        &self,
        grant: &Grant,
        telemetry: &RefreshTelemetry,
    ) -> Result<Credential, Error> {
        match grant {
            Grant::Password => self.password_grant().await,
            Grant::RefreshToken(token) => {
                info!("fetching auth with refresh token");
                let fields = [("grant_type", "refresh_token"), ("refresh_token", token.as_str())];
                match self.exchange(&fields).await {
                    Err(Error::Auth { status, .. }) => {
                        telemetry.emit_fallback(status);
                        self.password_grant().await
                    }
                    other => other,
                }
            }
        }
    }

    async fn password_grant(&self) -> Result<Credential, Error> {
        info!(username = %self.identity.username, "fetching auth with user/pass");
        let fields = [
            ("grant_type", "password"),
            ("username", self.identity.username.as_str()),
            ("password", self.identity.password.as_str()),
        ];
        self.exchange(&fields).await
    }

    /// Posts `fields` once per client credential until one is accepted.
    async fn exchange(&self, fields: &[(&str, &str)]) -> Result<Credential, Error> {
        let url = self.backend.auth_url();
        let mut rejection = None;
        for client in self.backend.client_credentials() {
            let mut request = self
                .http_client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE);
            for (name, value) in self.backend.headers() {
                request = request.header(name, value);
            }
            let resp = request
                .body(encode_form(client, fields))
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = resp.status();
            debug!(client_id = %client.client_id, status = %status, "auth status");
            if status == StatusCode::OK {
                let body = resp.text().await.map_err(|e| self.transport_error(e))?;
                let parsed: TokenResponse = serde_json::from_str(&body)?;
                return self.build_credential(parsed);
            }

            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    debug!(status = %status, error = %err, "could not read rejection body");
                    String::new()
                }
            };
            warn!(
                client_id = %client.client_id,
                status = %status,
                "token endpoint rejected grant"
            );
            rejection = Some(Error::Auth { status, body });
        }
        Err(rejection
            .unwrap_or_else(|| Error::Config("No client credentials configured".to_string())))
    }

    fn build_credential(&self, resp: TokenResponse) -> Result<Credential, Error> {
        if resp.expires_in.is_none() {
            warn!("token response has no expires_in; treating token as already expired");
        }
        Credential::issued(
            resp.access_token,
            resp.refresh_token,
            resp.expires_in,
            self.clock.now(),
            resp.account_id,
            resp.said_list,
        )
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::Http(err)
        }
    }
}

fn encode_form(client: &ClientCredentials, fields: &[(&str, &str)]) -> String {
    let client_fields = [
        ("client_id", client.client_id.as_str()),
        ("client_secret", client.client_secret.as_str()),
    ];
    client_fields
        .iter()
        .chain(fields.iter())
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
