use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Timeout(Duration),
    /// The token endpoint rejected every attempted grant.
    Auth { status: StatusCode, body: String },
    /// The server answered 200 but the credential is not valid at arrival,
    /// typically because `expires_in` was missing.
    ExpiredOnArrival,
    CorruptStore {
        path: PathBuf,
        source: serde_json::Error,
    },
    Config(String),
    Time(jiff::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::Http(err) => write!(f, "http error: {}", err),
            Error::Timeout(after) => write!(f, "request timed out after {:?}", after),
            Error::Auth { status, body } => {
                write!(f, "could not authorize: status={} body='{}'", status, body)
            }
            Error::ExpiredOnArrival => {
                write!(f, "could not authorize: server returned an already-expired token")
            }
            Error::CorruptStore { path, source } => write!(
                f,
                "corrupt credential store at '{}': {}",
                path.display(),
                source
            ),
            Error::Config(msg) => write!(f, "config error: {}", msg),
            Error::Time(err) => write!(f, "time error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Http(err) => Some(err),
            Error::CorruptStore { source, .. } => Some(source),
            Error::Time(err) => Some(err),
            _ => None,
        }
    }
}

impl Error {
    /// True when the failure came from the token endpoint refusing the grant,
    /// as opposed to transport or local storage problems.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, Error::Auth { .. } | Error::ExpiredOnArrival)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<jiff::Error> for Error {
    fn from(err: jiff::Error) -> Self {
        Error::Time(err)
    }
}
