//! Local session tokens gating access to the stored credential.
//!
//! The browser holds the raw token; the server only ever keeps
//! `HMAC-SHA256(secret, token)` inside the credential record.

use std::sync::Arc;

use rand::Rng;

use crate::credential::{CredentialStore, StoredCredential};
use crate::crypto;
use crate::error::Error;
use crate::secret::Secret;

pub const TOKEN_BYTES: usize = 32;

/// A freshly issued session: the raw token goes into the cookie, the digest
/// into the credential record.
#[derive(Clone)]
pub struct IssuedSession {
    pub token: String,
    pub digest: String,
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("token", &"<redacted>")
            .field("digest", &self.digest)
            .finish()
    }
}

pub struct SessionAuthority {
    secret: Arc<Secret>,
    store: Arc<CredentialStore>,
}

impl SessionAuthority {
    #[must_use]
    pub fn new(secret: Arc<Secret>, store: Arc<CredentialStore>) -> Self {
        Self { secret, store }
    }

    /// Generates 32 random bytes, hex-encoded, and their digest.
    #[must_use]
    pub fn issue(&self) -> IssuedSession {
        let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
        let token = hex::encode(bytes);
        let digest = self.digest(&token);
        IssuedSession { token, digest }
    }

    #[must_use]
    pub fn digest(&self, token: &str) -> String {
        crypto::hmac_hex(self.secret.as_bytes(), token.as_bytes())
    }

    /// Checks a presented cookie value against the stored digest.
    ///
    /// Never errors: a missing cookie, a missing or corrupt record and a
    /// malformed token all read as `false`.
    pub async fn verify(&self, presented: Option<&str>) -> bool {
        self.authorize(presented).await.is_some()
    }

    /// Verifies the presented token and returns the record it unlocks.
    ///
    /// Verification and the returned record come from one read, so a
    /// concurrent re-login cannot hand this caller the new credential.
    pub async fn authorize(&self, presented: Option<&str>) -> Option<StoredCredential> {
        let token = presented.filter(|t| is_well_formed(t))?;
        let record = self.store.record().await?;
        digests_match(&self.digest(token), &record.session_digest).then_some(record)
    }

    /// Decrypted upstream credential for a verified session.
    pub async fn credential(&self, presented: Option<&str>) -> Option<String> {
        let record = self.authorize(presented).await?;
        self.store.decrypt(&record)
    }

    /// Deletes the stored record, invalidating every outstanding cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the record exists but cannot be removed.
    pub async fn revoke(&self) -> Result<(), Error> {
        self.store.clear().await
    }
}

/// Constant-time digest comparison. Unequal lengths short-circuit: digest
/// length is fixed and carries no secret.
#[must_use]
pub fn digests_match(computed: &str, stored: &str) -> bool {
    crypto::constant_time_eq(computed.as_bytes(), stored.as_bytes())
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}
