//! Authenticated encryption envelope for sealed credential fields (C1).
//!
//! Each sealed value is AES-256-GCM under a key derived per-value via
//! PBKDF2-HMAC-SHA256 from the process master key and a random salt. The
//! envelope is `hex(salt):hex(iv):hex(ciphertext):hex(tag)`, joined with
//! `:`. Decryption is fail-closed: a malformed envelope or a failed AEAD
//! tag check both return [`CryptoError`], never partial plaintext.

use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;

const SALT_LEN: usize = 64;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PBKDF2_ITERATIONS: u32 = 100_000;
const PBKDF2_KEY_LEN: usize = 32;

#[derive(Debug)]
pub enum CryptoError {
    MalformedEnvelope(&'static str),
    DecryptionFailed,
    EncryptionFailed,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::MalformedEnvelope(reason) => {
                write!(f, "malformed credential envelope: {reason}")
            }
            CryptoError::DecryptionFailed => {
                write!(f, "credential envelope failed integrity check")
            }
            CryptoError::EncryptionFailed => write!(f, "credential encryption failed"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Derives a per-value 256-bit key from the master key and a random salt.
fn derive_key(master_key: &[u8; 32], salt: &[u8]) -> [u8; PBKDF2_KEY_LEN] {
    let mut key = [0u8; PBKDF2_KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(master_key, salt, PBKDF2_ITERATIONS, &mut key)
        .expect("PBKDF2_KEY_LEN matches HMAC-SHA256 output block requirements");
    key
}

/// Seals `plaintext` under `master_key`, returning the hex envelope.
pub fn seal(master_key: &[u8; 32], plaintext: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let key = derive_key(master_key, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::EncryptionFailed)?;
    let nonce = Nonce::from_slice(&iv);

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(nonce, b"", &mut buffer)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok([
        hex::encode(salt),
        hex::encode(iv),
        hex::encode(&buffer),
        hex::encode(tag),
    ]
    .join(":"))
}

/// Opens an envelope produced by [`seal`]. Any tampering, truncation, or
/// wrong master key fails closed with [`CryptoError`].
pub fn unseal(master_key: &[u8; 32], envelope: &str) -> Result<String, CryptoError> {
    let mut parts = envelope.split(':');
    let salt_hex = parts
        .next()
        .ok_or(CryptoError::MalformedEnvelope("missing salt"))?;
    let iv_hex = parts
        .next()
        .ok_or(CryptoError::MalformedEnvelope("missing iv"))?;
    let ciphertext_hex = parts
        .next()
        .ok_or(CryptoError::MalformedEnvelope("missing ciphertext"))?;
    let tag_hex = parts
        .next()
        .ok_or(CryptoError::MalformedEnvelope("missing tag"))?;
    if parts.next().is_some() {
        return Err(CryptoError::MalformedEnvelope("unexpected trailing segment"));
    }

    let salt = hex::decode(salt_hex).map_err(|_| CryptoError::MalformedEnvelope("salt not hex"))?;
    let iv = hex::decode(iv_hex).map_err(|_| CryptoError::MalformedEnvelope("iv not hex"))?;
    let mut ciphertext =
        hex::decode(ciphertext_hex).map_err(|_| CryptoError::MalformedEnvelope("ciphertext not hex"))?;
    let tag = hex::decode(tag_hex).map_err(|_| CryptoError::MalformedEnvelope("tag not hex"))?;

    if iv.len() != IV_LEN {
        return Err(CryptoError::MalformedEnvelope("iv has wrong length"));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::MalformedEnvelope("tag has wrong length"));
    }

    let key = derive_key(master_key, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(&iv);
    let tag = aes_gcm::Tag::from_slice(&tag);

    cipher
        .decrypt_in_place_detached(nonce, b"", &mut ciphertext, tag)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(ciphertext).map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        let mut k = [0u8; 32];
        k.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        k
    }

    #[test]
    fn round_trips() {
        let k = key();
        let envelope = seal(&k, "postgres://user:pw@host/db").unwrap();
        assert_eq!(envelope.split(':').count(), 4);
        let plain = unseal(&k, &envelope).unwrap();
        assert_eq!(plain, "postgres://user:pw@host/db");
    }

    #[test]
    fn distinct_salts_and_ivs_each_seal() {
        let k = key();
        let a = seal(&k, "same-secret").unwrap();
        let b = seal(&k, "same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let k = key();
        let mut envelope = seal(&k, "sensitive-value").unwrap();
        let last = envelope.pop().unwrap();
        let replacement = if last == '0' { '1' } else { '0' };
        envelope.push(replacement);
        assert!(matches!(
            unseal(&k, &envelope),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn wrong_master_key_fails_closed() {
        let k = key();
        let envelope = seal(&k, "sensitive-value").unwrap();
        let mut other = key();
        other[0] ^= 0xFF;
        assert!(matches!(
            unseal(&other, &envelope),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn malformed_envelope_shapes_are_rejected() {
        let k = key();
        assert!(matches!(
            unseal(&k, "only:three:parts"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            unseal(&k, "zz:zz:zz:zz"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            unseal(&k, "a:b:c:d:e"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
