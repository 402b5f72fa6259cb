//! Key management for encrypted configuration values
//!
//! A [`KeyManager`] is constructed once by the process and handed to
//! [`crate::SsoConfig::decrypt_with`] by reference.

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
const MAC_KEY_LABEL: &[u8] = b"ssoconfig value mac";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    #[error("Integrity check failed")]
    IntegrityCheckFailed,

    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

/// Decrypts (and encrypts) configuration secrets
pub trait KeyManager: Send + Sync + fmt::Debug {
    fn encrypt(&self, plaintext: &str) -> Result<String, KeyError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, KeyError>;
}

/// AES-128-CBC with an HMAC-SHA256 tag
///
/// Wire form: `base64(iv || ciphertext || tag)` where the tag covers
/// `iv || ciphertext` under a label-separated HMAC of the same key.
pub struct AesKeyManager {
    key: [u8; 16],
}

impl fmt::Debug for AesKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesKeyManager").finish_non_exhaustive()
    }
}

impl AesKeyManager {
    pub fn new(key: [u8; 16]) -> Self {
        Self { key }
    }

    /// Build from a base64-encoded 16-byte key (as stored in a key file or env var)
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidKey(format!("invalid base64: {}", e)))?;
        let key: [u8; 16] = raw.as_slice().try_into().map_err(|_| {
            KeyError::InvalidKey(format!("expected 16 bytes, got {}", raw.len()))
        })?;
        Ok(Self::new(key))
    }

    fn tag(&self, data: &[u8]) -> Result<HmacSha256, KeyError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| KeyError::Crypto(format!("HMAC key error: {}", e)))?;
        mac.update(MAC_KEY_LABEL);
        mac.update(data);
        Ok(mac)
    }
}

impl KeyManager for AesKeyManager {
    fn encrypt(&self, plaintext: &str) -> Result<String, KeyError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let cipher = Aes128CbcEnc::new(&self.key.into(), &iv.into());
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        let tag = self.tag(&out)?.finalize().into_bytes();
        out.extend_from_slice(&tag);

        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, KeyError> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| KeyError::Malformed(format!("invalid base64: {}", e)))?;
        if raw.len() < IV_LEN + 16 + TAG_LEN {
            return Err(KeyError::Malformed(format!(
                "{} bytes is too short",
                raw.len()
            )));
        }

        let (body, tag) = raw.split_at(raw.len() - TAG_LEN);
        self.tag(body)?
            .verify_slice(tag)
            .map_err(|_| KeyError::IntegrityCheckFailed)?;

        let (iv, data) = body.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| KeyError::Malformed("bad IV".to_string()))?;
        let cipher = Aes128CbcDec::new(&self.key.into(), &iv.into());
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|e| KeyError::Crypto(format!("AES decryption failed: {:?}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| KeyError::Malformed(format!("plaintext is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let km = AesKeyManager::new(*b"0123456789abcdef");
        let sealed = km.encrypt("ldap-bind-password").unwrap();

        assert_ne!(sealed, "ldap-bind-password");
        assert_eq!(km.decrypt(&sealed).unwrap(), "ldap-bind-password");
    }

    #[test]
    fn test_random_iv() {
        let km = AesKeyManager::new([9u8; 16]);
        assert_ne!(km.encrypt("same").unwrap(), km.encrypt("same").unwrap());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let km = AesKeyManager::new([3u8; 16]);
        let sealed = km.encrypt("value").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        raw[IV_LEN] ^= 0x01;

        assert!(matches!(
            km.decrypt(&STANDARD.encode(raw)),
            Err(KeyError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn test_short_or_garbage_input() {
        let km = AesKeyManager::new([3u8; 16]);
        assert!(matches!(km.decrypt("AAAA"), Err(KeyError::Malformed(_))));
        assert!(matches!(km.decrypt("!!!"), Err(KeyError::Malformed(_))));
    }

    #[test]
    fn test_from_base64() {
        let km = AesKeyManager::from_base64(&STANDARD.encode([5u8; 16])).unwrap();
        let sealed = km.encrypt("x").unwrap();
        assert_eq!(AesKeyManager::new([5u8; 16]).decrypt(&sealed).unwrap(), "x");

        assert!(matches!(
            AesKeyManager::from_base64(&STANDARD.encode([5u8; 8])),
            Err(KeyError::InvalidKey(_))
        ));
    }
}
