//! Symmetric primitives keyed by the process [`Secret`](crate::secret::Secret).
//!
//! Sealed layout: `nonce (12) || tag (16) || ciphertext`.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// Encrypts `plaintext` under `key` with a fresh random nonce.
///
/// Returns `None` only if the AEAD refuses the input (plaintext beyond the
/// GCM length limit).
#[must_use]
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Option<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut buffer = plaintext.to_vec();
    let tag = cipher.encrypt_in_place_detached(nonce, b"", &mut buffer).ok()?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&tag);
    sealed.extend_from_slice(&buffer);
    Some(sealed)
}

/// Decrypts a buffer produced by [`seal`].
///
/// Fails closed: truncation or any authentication failure yields `None`.
#[must_use]
pub fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return None;
    }
    let (nonce_bytes, rest) = sealed.split_at(NONCE_LEN);
    let (tag_bytes, ciphertext) = rest.split_at(TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce_bytes),
            b"",
            &mut buffer,
            Tag::from_slice(tag_bytes),
        )
        .ok()?;
    Some(buffer)
}

/// `HMAC-SHA256(key, message)` as lowercase hex.
#[must_use]
pub fn hmac_hex(key: &[u8; KEY_LEN], message: &[u8]) -> String {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Compares two byte strings in time independent of their content.
///
/// Lengths are compared first; length is not secret-dependent here because
/// every digest this crate compares has a fixed size.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
