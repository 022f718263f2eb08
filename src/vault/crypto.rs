// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PIN-based authenticated encryption for the vault blob.
//!
//! # Security Properties
//!
//! - **Key Derivation**: PBKDF2-HMAC-SHA256, 100,000 iterations, 128-bit salt
//! - **Confidentiality + Integrity**: AES-256-GCM; a wrong key or a modified
//!   ciphertext fails the tag check instead of producing garbage
//! - **Unique Nonces**: fresh random 96-bit nonce per encryption
//!
//! # Blob Format
//!
//! ```text
//! { "ciphertext": base64(ct || tag), "iv": base64(12 bytes), "salt": base64(16 bytes) }
//! ```

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = aead::NONCE_LEN;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;
pub const PIN_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("random number generator failure")]
    Rng,
    #[error("encryption failed")]
    Encrypt,
    /// Wrong key or tampered ciphertext. Deliberately indistinguishable.
    #[error("decryption failed")]
    Decrypt,
    #[error("malformed blob field '{0}'")]
    Malformed(&'static str),
}

/// A 256-bit symmetric key, zeroized on drop.
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Persisted form of the encrypted seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVaultBlob {
    pub ciphertext: String,
    pub iv: String,
    pub salt: String,
}

impl EncryptedVaultBlob {
    fn from_parts(ciphertext: &[u8], iv: &[u8], salt: &[u8]) -> Self {
        Self {
            ciphertext: Base64::encode_string(ciphertext),
            iv: Base64::encode_string(iv),
            salt: Base64::encode_string(salt),
        }
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        Base64::decode_vec(&self.salt).map_err(|_| CryptoError::Malformed("salt"))
    }
}

/// Exactly six ASCII digits.
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LEN && pin.bytes().all(|b| b.is_ascii_digit())
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut bytes = [0u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CryptoError::Rng)?;
    Ok(bytes)
}

pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    random_bytes()
}

/// PBKDF2-HMAC-SHA256 over the PIN. CPU-bound: run off the async executor.
pub fn derive_key(pin: &str, salt: &[u8]) -> DerivedKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        pin.as_bytes(),
        &mut key[..],
    );
    key
}

fn aead_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, CryptoError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| CryptoError::Encrypt)
}

/// Encrypt under `key` with a fresh nonce. The `salt` is carried in the blob
/// so the key can be re-derived later.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    salt: &[u8],
) -> Result<EncryptedVaultBlob, CryptoError> {
    let sealing = aead_key(key)?;
    let iv: [u8; IV_LEN] = random_bytes()?;

    let mut in_out = Zeroizing::new(plaintext.to_vec());
    sealing
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(iv),
            Aad::empty(),
            &mut *in_out,
        )
        .map_err(|_| CryptoError::Encrypt)?;

    Ok(EncryptedVaultBlob::from_parts(&in_out, &iv, salt))
}

/// Authenticated decryption. Fails on wrong key or any modified byte.
pub fn decrypt(
    blob: &EncryptedVaultBlob,
    key: &[u8; KEY_LEN],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let ciphertext =
        Base64::decode_vec(&blob.ciphertext).map_err(|_| CryptoError::Malformed("ciphertext"))?;
    let iv = Base64::decode_vec(&blob.iv).map_err(|_| CryptoError::Malformed("iv"))?;
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::Malformed("ciphertext"));
    }
    let nonce = Nonce::try_assume_unique_for_key(&iv).map_err(|_| CryptoError::Malformed("iv"))?;

    let opening = aead_key(key)?;
    let mut in_out = Zeroizing::new(ciphertext);
    let plaintext_len = opening
        .open_in_place(nonce, Aad::empty(), &mut *in_out)
        .map_err(|_| CryptoError::Decrypt)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

/// Fresh salt, derived key, fresh nonce.
pub fn encrypt_with_pin(plaintext: &[u8], pin: &str) -> Result<EncryptedVaultBlob, CryptoError> {
    let salt = generate_salt()?;
    let key = derive_key(pin, &salt);
    encrypt(plaintext, &key, &salt)
}

pub fn decrypt_with_pin(
    blob: &EncryptedVaultBlob,
    pin: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let salt = blob.salt_bytes()?;
    let key = derive_key(pin, &salt);
    decrypt(blob, &key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = "abandon ability able about above absent absorb abstract absurd abuse access accident";

    #[test]
    fn pin_format() {
        assert!(is_valid_pin("123456"));
        assert!(is_valid_pin("000000"));
        assert!(!is_valid_pin("12345"));
        assert!(!is_valid_pin("1234567"));
        assert!(!is_valid_pin("12a456"));
        assert!(!is_valid_pin("١٢٣٤٥٦"));
        assert!(!is_valid_pin(""));
    }

    #[test]
    fn key_derivation_is_deterministic_per_salt() {
        let salt = [7u8; SALT_LEN];
        assert_eq!(*derive_key("123456", &salt), *derive_key("123456", &salt));
        assert_ne!(*derive_key("123456", &salt), *derive_key("654321", &salt));
        assert_ne!(*derive_key("123456", &salt), *derive_key("123456", &[8u8; SALT_LEN]));
    }

    #[test]
    fn pin_round_trip() {
        let blob = encrypt_with_pin(SEED.as_bytes(), "123456").unwrap();
        let plain = decrypt_with_pin(&blob, "123456").unwrap();
        assert_eq!(plain.as_slice(), SEED.as_bytes());

        assert_eq!(Base64::decode_vec(&blob.iv).unwrap().len(), IV_LEN);
        assert_eq!(blob.salt_bytes().unwrap().len(), SALT_LEN);
        assert_eq!(
            Base64::decode_vec(&blob.ciphertext).unwrap().len(),
            SEED.len() + TAG_LEN
        );
    }

    #[test]
    fn wrong_pin_fails_authentication() {
        let blob = encrypt_with_pin(SEED.as_bytes(), "123456").unwrap();
        assert!(matches!(
            decrypt_with_pin(&blob, "654321"),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = Zeroizing::new([9u8; KEY_LEN]);
        let blob = encrypt(b"secret", &key, &[0u8; SALT_LEN]).unwrap();

        let mut bytes = Base64::decode_vec(&blob.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        let tampered = EncryptedVaultBlob {
            ciphertext: Base64::encode_string(&bytes),
            ..blob.clone()
        };
        assert!(matches!(decrypt(&tampered, &key), Err(CryptoError::Decrypt)));
        assert_eq!(decrypt(&blob, &key).unwrap().as_slice(), b"secret");
    }

    #[test]
    fn nonces_and_salts_are_fresh() {
        let a = encrypt_with_pin(b"same", "123456").unwrap();
        let b = encrypt_with_pin(b"same", "123456").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn malformed_fields_are_reported() {
        let blob = EncryptedVaultBlob {
            ciphertext: "!!!".to_string(),
            iv: String::new(),
            salt: String::new(),
        };
        let key = Zeroizing::new([0u8; KEY_LEN]);
        assert!(matches!(
            decrypt(&blob, &key),
            Err(CryptoError::Malformed("ciphertext"))
        ));

        let short_iv = EncryptedVaultBlob {
            ciphertext: Base64::encode_string(&[0u8; 32]),
            iv: Base64::encode_string(&[0u8; 4]),
            salt: String::new(),
        };
        assert!(matches!(
            decrypt(&short_iv, &key),
            Err(CryptoError::Malformed("iv"))
        ));
    }
}
