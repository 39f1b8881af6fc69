use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::Error;

/// On-disk form of a [`Credential`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Epoch seconds. Fractional values written by older clients are floored;
    /// a missing value reads as the epoch, i.e. long expired.
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub expire_date: i64,
    #[serde(rename = "accountId", default, deserialize_with = "string_or_number")]
    pub account_id: String,
    #[serde(rename = "SAID", default)]
    pub said_list: serde_json::Value,
}

/// An access/refresh token pair plus the account metadata returned with it.
///
/// Credentials are never mutated; a renewal produces a new value that
/// replaces the old one wholesale.
#[derive(Clone, Debug, PartialEq)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    expire_date: Timestamp,
    account_id: String,
    said_list: serde_json::Value,
}

impl Credential {
    /// Builds a credential, truncating `expire_date` to whole seconds so it
    /// survives the persisted representation unchanged.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expire_date: Timestamp,
        account_id: impl Into<String>,
        said_list: serde_json::Value,
    ) -> Self {
        let expire_date =
            Timestamp::from_second(expire_date.as_second()).unwrap_or(expire_date);
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expire_date,
            account_id: account_id.into(),
            said_list,
        }
    }

    /// Computes `expire_date` as `now + lifetime`. A missing lifetime yields a
    /// credential that is already expired at `now`.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        lifetime_secs: Option<u64>,
        now: Timestamp,
        account_id: impl Into<String>,
        said_list: serde_json::Value,
    ) -> Result<Self, Error> {
        let expire_date = match lifetime_secs {
            Some(secs) => {
                let secs = i64::try_from(secs)
                    .map_err(|_| Error::Config(format!("token lifetime {secs}s out of range")))?;
                now.checked_add(SignedDuration::from_secs(secs))?
            }
            None => now,
        };
        Ok(Self::new(
            access_token,
            refresh_token,
            expire_date,
            account_id,
            said_list,
        ))
    }

    pub fn from_snapshot(snapshot: CredentialSnapshot) -> Result<Self, Error> {
        let CredentialSnapshot {
            access_token,
            refresh_token,
            expire_date,
            account_id,
            said_list,
        } = snapshot;
        Ok(Self::new(
            access_token,
            refresh_token,
            Timestamp::from_second(expire_date)?,
            account_id,
            said_list,
        ))
    }

    pub fn to_snapshot(&self) -> CredentialSnapshot {
        CredentialSnapshot {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expire_date: self.expire_date.as_second(),
            account_id: self.account_id.clone(),
            said_list: self.said_list.clone(),
        }
    }

    /// Bearer token for API calls; empty means absent.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    pub fn expire_date(&self) -> Timestamp {
        self.expire_date
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn said_list(&self) -> &serde_json::Value {
        &self.said_list
    }

    /// A credential is valid when it carries an access token and its expiry
    /// lies strictly after `now`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        !self.access_token.is_empty() && self.expire_date > now
    }
}

fn epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() {
        return Err(serde::de::Error::custom("expire_date is not a finite number"));
    }
    let secs = secs.floor();
    let (min, max) = (Timestamp::MIN.as_second(), Timestamp::MAX.as_second());
    if secs < min as f64 || secs > max as f64 {
        return Err(serde::de::Error::custom(format!(
            "expire_date {} outside [{}, {}]",
            secs, min, max
        )));
    }
    Ok(secs as i64)
}

/// The service reports `accountId` as a number; older files stored it as a string.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for accountId, got {}",
            other
        ))),
    }
}
