//! Credential encryption using AES-256-GCM
//!
//! Auth credentials attached to an API registration are stored as an
//! encrypted blob in the database. Encryption uses AES-256-GCM with
//! additional authenticated data (AAD) binding the blob to its
//! registration id and auth type.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("no crypto key configured")]
    NoKeyConfigured,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Plaintext auth credentials as accepted on registration requests.
///
/// Exactly one shape per auth type is meaningful; unused fields are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct AuthCredentials {
    /// API key value (auth_type = api_key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Header or query parameter the key is sent in (default: X-API-Key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_location: Option<String>,
    /// Bearer token value (auth_type = bearer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Basic auth username (auth_type = basic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic auth password (auth_type = basic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidFormat);
    }

    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

fn credential_aad(registration_id: Uuid, auth_type: &str) -> String {
    format!("{}|{}", registration_id, auth_type)
}

/// Encrypt registration credentials into a storable blob.
pub fn encrypt_credentials(
    key: &CryptoKey,
    registration_id: Uuid,
    auth_type: &str,
    credentials: &AuthCredentials,
) -> Result<Vec<u8>, CryptoError> {
    let aad = credential_aad(registration_id, auth_type);
    let plaintext = serde_json::to_vec(credentials)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    encrypt_bytes(key, aad.as_bytes(), &plaintext)
}

/// Decrypt a stored credential blob back into its plaintext form.
pub fn decrypt_credentials(
    key: &CryptoKey,
    registration_id: Uuid,
    auth_type: &str,
    blob: &[u8],
) -> Result<AuthCredentials, CryptoError> {
    let aad = credential_aad(registration_id, auth_type);
    let plaintext = decrypt_bytes(key, aad.as_bytes(), blob)?;
    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, aad, &encrypted).expect("decryption succeeds");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_different_aad_fails() {
        let key = test_key();
        let plaintext = b"secret message";

        let encrypted = encrypt_bytes(&key, b"aad-1", plaintext).expect("encryption succeeds");
        let result = decrypt_bytes(&key, b"aad-2", &encrypted);

        assert!(result.is_err());
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let aad = b"test-aad";

        let mut encrypted = encrypt_bytes(&key, aad, b"secret message").expect("encryption succeeds");
        encrypted[13] ^= 0x01;

        let result = decrypt_bytes(&key, aad, &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted1 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let encrypted2 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");

        // Nonces (bytes 1-13) should differ
        assert_ne!(&encrypted1[1..13], &encrypted2[1..13]);
    }

    #[test]
    fn test_non_versioned_payload_rejected() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"test-aad", &[0xFF, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn test_insufficient_ciphertext_length() {
        let key = test_key();
        let short_ciphertext = vec![VERSION_ENCRYPTED, 0x02];

        let result = decrypt_bytes(&key, b"test-aad", &short_ciphertext);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_credentials_bound_to_registration() {
        let key = test_key();
        let registration_id = Uuid::new_v4();
        let credentials = AuthCredentials {
            api_key: Some("sk-12345".to_string()),
            key_location: Some("X-API-Key".to_string()),
            ..Default::default()
        };

        let blob = encrypt_credentials(&key, registration_id, "api_key", &credentials)
            .expect("encryption succeeds");

        let decrypted = decrypt_credentials(&key, registration_id, "api_key", &blob)
            .expect("decryption succeeds");
        assert_eq!(decrypted, credentials);

        // A different registration id must not decrypt the blob.
        let result = decrypt_credentials(&key, Uuid::new_v4(), "api_key", &blob);
        assert!(result.is_err());

        // Nor a different auth type.
        let result = decrypt_credentials(&key, registration_id, "bearer", &blob);
        assert!(result.is_err());
    }
}
