//! Single-tenant, encrypted-at-rest store for the upstream credential.
//!
//! One JSON record per deployment. Writers hold the store lock for the whole
//! read-modify-write and replace the file atomically (temp file + rename), so
//! a reader never observes a partial record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::crypto;
use crate::error::Error;
use crate::secret::Secret;
use crate::types::Member;

pub const CREDENTIAL_FILE_NAME: &str = "credential.json";

/// The persisted record.
///
/// `session_digest` is the HMAC of the current local session token; the raw
/// token only ever lives in the browser cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub session_digest: String,
    /// Base64 of `nonce || tag || ciphertext`.
    pub encrypted_credential: String,
    pub profile: Member,
    pub saved_at: i64,
}

/// Plaintext inside the sealed envelope.
#[derive(Serialize, Deserialize)]
struct CredentialPayload {
    cookie: String,
}

pub struct CredentialStore {
    path: PathBuf,
    secret: Arc<Secret>,
    lock: Mutex<()>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(data_dir: &Path, secret: Arc<Secret>) -> Self {
        Self {
            path: data_dir.join(CREDENTIAL_FILE_NAME),
            secret,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypts and persists `credential` with the cached `profile`,
    /// replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the record cannot be written.
    pub async fn save(
        &self,
        session_digest: &str,
        credential: &str,
        profile: &Member,
    ) -> Result<(), Error> {
        let payload = serde_json::to_vec(&CredentialPayload {
            cookie: credential.to_string(),
        })?;
        let sealed = crypto::seal(self.secret.as_bytes(), &payload)
            .ok_or(Error::Encryption)?;

        let record = StoredCredential {
            session_digest: session_digest.to_string(),
            encrypted_credential: STANDARD.encode(sealed),
            profile: profile.clone(),
            saved_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&self.path, &bytes).await?;
        tracing::debug!(path = %self.path.display(), "Credential record saved");
        Ok(())
    }

    /// Loads the raw record. Missing or unparsable files read as `None`.
    pub async fn record(&self) -> Option<StoredCredential> {
        let _guard = self.lock.lock().await;
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Credential record unreadable");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Credential record corrupt");
                None
            }
        }
    }

    /// Decrypts the stored upstream credential.
    ///
    /// Fails closed: a bad tag, truncated buffer or malformed payload all
    /// yield `None`.
    pub async fn read(&self) -> Option<String> {
        let record = self.record().await?;
        self.decrypt(&record)
    }

    /// Cached profile of the stored credential's owner.
    pub async fn profile(&self) -> Option<Member> {
        self.record().await.map(|r| r.profile)
    }

    pub(crate) fn decrypt(&self, record: &StoredCredential) -> Option<String> {
        let sealed = STANDARD.decode(&record.encrypted_credential).ok()?;
        let plaintext = crypto::open(self.secret.as_bytes(), &sealed)?;
        let payload: CredentialPayload = serde_json::from_slice(&plaintext).ok()?;
        Some(payload.cookie)
    }

    /// Deletes the record. Deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!("Credential record cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
    }
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> CredentialStore {
        CredentialStore::new(dir, Arc::new(Secret::from_passphrase("test")))
    }

    #[tokio::test]
    async fn save_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let profile = Member::named("alice");

        store.save("digest", "A2=abc; PB3_SESSION=\"x\"", &profile).await.unwrap();

        assert_eq!(store.read().await.as_deref(), Some("A2=abc; PB3_SESSION=\"x\""));
        assert_eq!(store.profile().await.unwrap().username, "alice");
        assert_eq!(store.record().await.unwrap().session_digest, "digest");
    }

    #[tokio::test]
    async fn credential_is_not_stored_in_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save("digest", "A2=supersecretvalue", &Member::named("alice")).await.unwrap();

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(!raw.contains("supersecretvalue"));
        assert!(!dir.path().join("credential.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_record_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.read().await.is_none());
        assert!(store.profile().await.is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        tokio::fs::write(store.path(), b"{ not json").await.unwrap();
        assert!(store.read().await.is_none());
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save("digest", "A2=abc", &Member::named("alice")).await.unwrap();

        let mut record = store.record().await.unwrap();
        let mut sealed = STANDARD.decode(&record.encrypted_credential).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        record.encrypted_credential = STANDARD.encode(sealed);
        tokio::fs::write(store.path(), serde_json::to_vec(&record).unwrap())
            .await
            .unwrap();

        assert!(store.read().await.is_none());
        // Profile is not sensitive and still readable.
        assert!(store.profile().await.is_some());
    }

    #[tokio::test]
    async fn other_secret_cannot_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path())
            .save("digest", "A2=abc", &Member::named("alice"))
            .await
            .unwrap();

        let other = CredentialStore::new(dir.path(), Arc::new(Secret::from_passphrase("other")));
        assert!(other.read().await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save("digest", "A2=abc", &Member::named("alice")).await.unwrap();
        store.clear().await.unwrap();
        assert!(!store.path().exists());
        assert!(store.read().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn record_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save("digest", "A2=abc", &Member::named("alice")).await.unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
