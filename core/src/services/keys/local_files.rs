//! RSA keypair persistence on the local filesystem
//!
//! Used only while the secret backend is disabled. Both files are written
//! with owner-only permissions and replaced through a rename so a reader
//! never sees a half-written key.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use ks_shared::config::KeySourceConfig;

use crate::domain::entities::keys::RsaKeyPair;
use crate::errors::{KeyError, SecretStoreError};

/// Pair of PEM files holding the RSA keypair
#[derive(Debug, Clone)]
pub struct LocalKeyFiles {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
}

impl LocalKeyFiles {
    pub fn new(private_key_path: impl Into<PathBuf>, public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: public_key_path.into(),
        }
    }

    pub fn from_config(config: &KeySourceConfig) -> Self {
        Self::new(&config.private_key_path, &config.public_key_path)
    }

    /// Returns the paths to the key files
    pub fn key_paths(&self) -> (&Path, &Path) {
        (&self.private_key_path, &self.public_key_path)
    }

    /// Load the stored pair and the time it was written.
    ///
    /// # Returns
    /// * `Ok(Some(..))` - Both files present and valid
    /// * `Ok(None)` - Neither file present, or only one of them
    /// * `Err(KeyError)` - Files unreadable or not a matching pair
    pub async fn load(&self) -> Result<Option<(RsaKeyPair, DateTime<Utc>)>, KeyError> {
        let private_exists = path_exists(&self.private_key_path).await;
        let public_exists = path_exists(&self.public_key_path).await;

        match (private_exists, public_exists) {
            (false, false) => return Ok(None),
            (true, true) => {}
            _ => {
                warn!(
                    private_key_path = %self.private_key_path.display(),
                    public_key_path = %self.public_key_path.display(),
                    "Only one half of the local RSA keypair exists, ignoring it"
                );
                return Ok(None);
            }
        }

        let private_pem = read_file(&self.private_key_path).await?;
        let public_pem = read_file(&self.public_key_path).await?;
        let pair = RsaKeyPair::from_pem(&private_pem, &public_pem)?;

        let modified = tokio::fs::metadata(&self.private_key_path)
            .await
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|e| KeyError::from(SecretStoreError::from(e)))?;

        debug!(
            private_key_path = %self.private_key_path.display(),
            key_id = pair.key_id(),
            "Loaded RSA keypair from local files"
        );

        Ok(Some((pair, modified)))
    }

    /// Write both halves of `pair`, replacing any previous files.
    ///
    /// Both halves are staged before either is moved into place, so a failed
    /// write leaves the previous pair untouched.
    pub async fn store(&self, pair: &RsaKeyPair) -> Result<(), SecretStoreError> {
        let private_staging = stage_owner_only(&self.private_key_path, pair.private_pem()).await?;
        let public_staging = match stage_owner_only(&self.public_key_path, pair.public_pem()).await {
            Ok(staging) => staging,
            Err(e) => {
                let _ = tokio::fs::remove_file(&private_staging).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&private_staging, &self.private_key_path).await?;
        tokio::fs::rename(&public_staging, &self.public_key_path).await?;

        debug!(
            private_key_path = %self.private_key_path.display(),
            key_id = pair.key_id(),
            "Stored RSA keypair to local files"
        );
        Ok(())
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn read_file(path: &Path) -> Result<String, KeyError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| KeyError::PersistenceFailure {
            message: format!("Failed to read {}: {}", path.display(), e),
        })
}

/// Write `contents` next to `path` and return the staging file
async fn stage_owner_only(path: &Path, contents: &str) -> Result<PathBuf, SecretStoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&staging).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, contents.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    // The staging file may predate this call with wider permissions.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(staging)
}
