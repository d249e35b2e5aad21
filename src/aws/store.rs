use std::{
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, info};

use super::Credential;
use crate::{constants, error::StoreError};

/// File-backed cache of temporary credentials, one JSON document per profile
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the user data directory (or `CLVM_DATA_DIR`)
    pub fn from_env() -> Result<Self, StoreError> {
        constants::get_data_dir()
            .map(Self::new)
            .ok_or(StoreError::NoDataDir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, profile: &str) -> PathBuf {
        self.dir.join(format!("aws-{profile}-credentials.json"))
    }

    /// Load the cached record for `profile`, expired or not
    ///
    /// A missing file is `Ok(None)`.
    pub async fn fetch(&self, profile: &str) -> Result<Option<Credential>, StoreError> {
        let path = self.path_for(profile);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cached credentials at {}", path.display());
                return Ok(None);
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupted { path, source })
    }

    /// Persist `credential` for `profile`, replacing any previous record
    pub async fn save(&self, profile: &str, credential: &Credential) -> Result<(), StoreError> {
        let path = self.path_for(profile);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let content = serde_json::to_string_pretty(credential).map_err(|source| {
            StoreError::Corrupted {
                path: path.clone(),
                source,
            }
        })?;

        // Readers either see the old document or the new one.
        let dir = self.dir.clone();
        let target = path.clone();
        let prefix = format!(".aws-{profile}-");
        tokio::task::spawn_blocking(move || {
            write_private(&dir, &prefix, &target, content.as_bytes())
        })
        .await
        .map_err(|e| io_err(io::Error::other(e)))?
        .map_err(io_err)?;

        info!("Credentials cached for profile: {}", profile);
        Ok(())
    }

    /// Remove the cached record; returns whether a file was deleted
    pub async fn remove(&self, profile: &str) -> Result<bool, StoreError> {
        let path = self.path_for(profile);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Write `content` to a uniquely named owner-only file in `dir`, then move it
/// over `target`
fn write_private(dir: &Path, prefix: &str, target: &Path, content: &[u8]) -> io::Result<()> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(dir)?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| e.error)?;
    Ok(())
}
