//! Encrypted at-rest storage for the bearer credential

use crate::encryption::{SealedToken, TokenCipher};
use std::path::{Path, PathBuf};
use threatfeed_core::{Error, Result};
use tracing::{debug, info, warn};

pub const CREDENTIAL_FILE: &str = "credential.json";

/// One encrypted bearer token in a JSON file
pub struct CredentialStore {
    path: PathBuf,
    cipher: TokenCipher,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, cipher: TokenCipher) -> Self {
        Self {
            path: path.into(),
            cipher,
        }
    }

    /// Store under `data_dir/credential.json`, keyed to this machine
    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        Ok(Self::new(
            data_dir.join(CREDENTIAL_FILE),
            TokenCipher::machine_bound()?,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(Error::InvalidData("bearer token is empty".into()));
        }

        let sealed = self.cipher.seal(token.trim())?;
        let body = serde_json::to_vec(&sealed)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::InvalidData(format!("create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| Error::InvalidData(format!("write {}: {}", self.path.display(), e)))?;

        info!(path = %self.path.display(), "Credential stored");
        Ok(())
    }

    /// `Ok(None)` when nothing is stored
    pub async fn load(&self) -> Result<Option<String>> {
        let body = match tokio::fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored credential");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::InvalidData(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let sealed: SealedToken = serde_json::from_slice(&body)?;
        match self.cipher.open(&sealed) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(path = %self.path.display(), "Stored credential cannot be decrypted on this machine");
                Err(e)
            }
        }
    }

    /// Remove the stored token; missing file is fine
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Credential removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::InvalidData(format!(
                "remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
