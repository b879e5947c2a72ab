//! Process-wide 32-byte secret.
//!
//! Precedence: operator passphrase, then the durable `secret.key` file, then
//! a freshly generated value that is persisted for the next start.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::crypto::KEY_LEN;
use crate::error::Error;

pub const SECRET_FILE_NAME: &str = "secret.key";

/// Where the secret came from. Logged at startup, never the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Passphrase,
    File,
    Generated,
}

#[derive(Clone)]
pub struct Secret {
    bytes: [u8; KEY_LEN],
    source: SecretSource,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("bytes", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

impl Secret {
    /// Derives the secret from an operator passphrase (`SHA-256`).
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));
        Self {
            bytes,
            source: SecretSource::Passphrase,
        }
    }

    /// Loads the secret following the passphrase → file → generate precedence.
    ///
    /// An on-disk value of the wrong length is discarded and regenerated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the data directory or the secret file cannot
    /// be created.
    pub fn load(data_dir: &Path, passphrase: Option<&str>) -> Result<Self, Error> {
        if let Some(passphrase) = passphrase.filter(|p| !p.is_empty()) {
            return Ok(Self::from_passphrase(passphrase));
        }

        let path = secret_path(data_dir);
        match fs::read(&path) {
            Ok(bytes) if bytes.len() == KEY_LEN => {
                let mut arr = [0u8; KEY_LEN];
                arr.copy_from_slice(&bytes);
                return Ok(Self {
                    bytes: arr,
                    source: SecretSource::File,
                });
            }
            Ok(bytes) => {
                tracing::warn!(
                    path = %path.display(),
                    len = bytes.len(),
                    "Secret file has wrong length, regenerating"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let bytes: [u8; KEY_LEN] = rand::rng().random();
        fs::create_dir_all(data_dir)?;
        write_owner_only(&path, &bytes)?;
        tracing::info!(path = %path.display(), "Generated new process secret");

        Ok(Self {
            bytes,
            source: SecretSource::Generated,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    #[must_use]
    pub fn source(&self) -> SecretSource {
        self.source
    }
}

#[must_use]
pub fn secret_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SECRET_FILE_NAME)
}

/// Writes `bytes` to `path` via a sibling temp file and rename, with mode
/// `0600` on Unix.
pub(crate) fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_takes_priority_over_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(secret_path(dir.path()), [1u8; KEY_LEN]).unwrap();

        let secret = Secret::load(dir.path(), Some("hunter2")).unwrap();
        assert_eq!(secret.source(), SecretSource::Passphrase);
        assert_eq!(secret.as_bytes(), Secret::from_passphrase("hunter2").as_bytes());
        assert_ne!(secret.as_bytes(), &[1u8; KEY_LEN]);
    }

    #[test]
    fn empty_passphrase_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let secret = Secret::load(dir.path(), Some("")).unwrap();
        assert_eq!(secret.source(), SecretSource::Generated);
    }

    #[test]
    fn generated_secret_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let first = Secret::load(dir.path(), None).unwrap();
        assert_eq!(first.source(), SecretSource::Generated);

        let second = Secret::load(dir.path(), None).unwrap();
        assert_eq!(second.source(), SecretSource::File);
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(fs::read(secret_path(dir.path())).unwrap().len(), KEY_LEN);
    }

    #[test]
    fn wrong_length_file_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(secret_path(dir.path()), b"short").unwrap();

        let secret = Secret::load(dir.path(), None).unwrap();
        assert_eq!(secret.source(), SecretSource::Generated);
        assert_eq!(fs::read(secret_path(dir.path())).unwrap(), secret.as_bytes());
    }

    #[test]
    fn creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        Secret::load(&nested, None).unwrap();
        assert!(secret_path(&nested).exists());
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        Secret::load(dir.path(), None).unwrap();
        let mode = fs::metadata(secret_path(dir.path())).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn debug_redacts_bytes() {
        let secret = Secret::from_passphrase("x");
        let rendered = format!("{secret:?}");
        assert!(rendered.contains("<redacted>"));
    }
}
