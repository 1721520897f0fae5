//! Passphrase-based authenticated encryption.
//!
//! Payload layout, base64 (standard alphabet) encoded:
//!
//! ```text
//! salt (16 bytes) || nonce (12 bytes) || AES-256-GCM ciphertext + tag
//! ```
//!
//! The key is derived per call with scrypt (N = 2^15, r = 8, p = 1). The
//! format carries no version tag, so changing any of these is a breaking change.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to base64-decode ciphertext: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("payload too short to contain {part}: need {expected} bytes, got {actual}")]
    Truncated {
        part: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Wrong passphrase and corrupted ciphertext are deliberately indistinguishable.
    #[error("failed to decrypt data: authentication failed")]
    Authentication,
    #[error("entropy source unavailable: {0}")]
    Randomness(#[from] rand::Error),
    #[error("failed to derive key: {0}")]
    KeyDerivation(String),
    #[error("cipher failure: {0}")]
    Cipher(String),
}

/// Encrypt `plaintext` under `passphrase`, returning the base64 payload.
pub fn encrypt_data(passphrase: &str, plaintext: &[u8]) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt)?;

    let key = derive_key(passphrase, &salt)?;
    let cipher = build_cipher(&key)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.try_fill_bytes(&mut nonce)?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Cipher(format!("encrypt failed: {e}")))?;

    let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(payload))
}

/// Decrypt a payload produced by [`encrypt_data`].
/// Surrounding whitespace is ignored.
pub fn decrypt_data(passphrase: &str, encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let payload = STANDARD.decode(encoded.trim())?;
    if payload.len() < SALT_LEN {
        return Err(CryptoError::Truncated {
            part: "salt",
            expected: SALT_LEN,
            actual: payload.len(),
        });
    }

    let (salt, rest) = payload.split_at(SALT_LEN);
    if rest.len() < NONCE_LEN {
        return Err(CryptoError::Truncated {
            part: "nonce",
            expected: SALT_LEN + NONCE_LEN,
            actual: payload.len(),
        });
    }

    let key = derive_key(passphrase, salt)?;
    let cipher = build_cipher(&key)?;

    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid scrypt params: {e}")))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

fn build_cipher(key: &[u8; KEY_LEN]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Cipher(format!("cipher init failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_hides_plaintext() {
        let encoded = encrypt_data("testpass", b"secret message").expect("encrypt");
        assert!(!encoded.contains("secret message"));

        let decrypted = decrypt_data("testpass", &encoded).expect("decrypt");
        assert_eq!(decrypted, b"secret message");
    }

    #[test]
    fn payload_layout_is_salt_nonce_ciphertext_tag() {
        let encoded = encrypt_data("pw", b"abc").expect("encrypt");
        let raw = STANDARD.decode(&encoded).expect("base64");
        // 16-byte GCM tag follows the ciphertext.
        assert_eq!(raw.len(), SALT_LEN + NONCE_LEN + 3 + 16);
    }

    #[test]
    fn salt_and_nonce_are_fresh_per_call() {
        let first = STANDARD
            .decode(encrypt_data("pw", b"same").expect("encrypt"))
            .expect("base64");
        let second = STANDARD
            .decode(encrypt_data("pw", b"same").expect("encrypt"))
            .expect("base64");

        assert_ne!(first[..SALT_LEN], second[..SALT_LEN]);
        assert_ne!(
            first[SALT_LEN..SALT_LEN + NONCE_LEN],
            second[SALT_LEN..SALT_LEN + NONCE_LEN]
        );
    }

    #[test]
    fn empty_passphrase_and_payload_round_trip() {
        let encoded = encrypt_data("", b"").expect("encrypt");
        assert_eq!(decrypt_data("", &encoded).expect("decrypt"), b"");
    }

    #[test]
    fn wrong_passphrase_fails_authentication() {
        let encoded = encrypt_data("passphrase-a", b"payload").expect("encrypt");
        let err = decrypt_data("passphrase-b", &encoded).expect_err("wrong passphrase");
        assert!(matches!(err, CryptoError::Authentication));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let encoded = encrypt_data("pw", b"payload").expect("encrypt");
        let mut raw = STANDARD.decode(&encoded).expect("base64");
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        let err = decrypt_data("pw", &STANDARD.encode(raw)).expect_err("tampered");
        assert!(matches!(err, CryptoError::Authentication));
    }

    #[test]
    fn trailing_newline_is_tolerated() {
        let encoded = encrypt_data("pw", b"line").expect("encrypt");
        let decrypted = decrypt_data("pw", &format!("{encoded}\n")).expect("decrypt");
        assert_eq!(decrypted, b"line");
    }

    #[test]
    fn rejects_malformed_base64() {
        let err = decrypt_data("pw", "not base64!!").expect_err("malformed");
        assert!(matches!(err, CryptoError::Encoding(_)));
    }

    #[test]
    fn rejects_payload_shorter_than_salt() {
        let err = decrypt_data("pw", &STANDARD.encode([0u8; 8])).expect_err("short");
        assert!(matches!(
            err,
            CryptoError::Truncated {
                part: "salt",
                actual: 8,
                ..
            }
        ));
    }

    #[test]
    fn rejects_payload_missing_nonce() {
        let err = decrypt_data("pw", &STANDARD.encode([0u8; SALT_LEN + 4])).expect_err("short");
        assert!(matches!(
            err,
            CryptoError::Truncated {
                part: "nonce",
                actual: 20,
                ..
            }
        ));
    }
}
