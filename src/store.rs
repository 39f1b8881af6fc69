//! Persistence of the credential record.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::errors::Error;
use crate::token::{Credential, CredentialSnapshot};

/// Default location of the persisted record, relative to the working directory.
pub const DEFAULT_CREDENTIAL_PATH: &str = ".whirlpool_auth.json";

pub trait CredentialStore: Send + Sync {
    /// Returns `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<Credential>, Error>;

    fn save(&self, credential: &Credential) -> Result<(), Error>;
}

/// JSON file store. Writes go to a sibling temp file that is renamed over the
/// target, so readers never see a truncated record.
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_CREDENTIAL_PATH.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, Error> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no persisted credential at '{}'", self.path.display());
                return Ok(None);
            }
            Err(err) => return Err(Error::Io(err)),
        };
        let snapshot: CredentialSnapshot =
            serde_json::from_str(&contents).map_err(|source| Error::CorruptStore {
                path: self.path.clone(),
                source,
            })?;
        info!("loaded credential from '{}'", self.path.display());
        Ok(Some(Credential::from_snapshot(snapshot)?))
    }

    fn save(&self, credential: &Credential) -> Result<(), Error> {
        let body = serde_json::to_vec(&credential.to_snapshot())?;
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::Io(err));
        }
        debug!("persisted credential to '{}'", self.path.display());
        Ok(())
    }
}

/// Keeps the record in process memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>, Error> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), Error> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }
}
