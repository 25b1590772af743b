use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with a fresh random IV.
/// Returns the stored form `ivBase64:cipherBase64`.
pub fn encrypt_text(key: &[u8; 32], plaintext: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    Ok(format!("{}:{}", B64.encode(nonce_bytes), B64.encode(ciphertext)))
}

/// Decrypt a payload produced by [`encrypt_text`].
pub fn decrypt_text(key: &[u8; 32], payload: &str) -> Result<String> {
    let (iv, body) = payload
        .split_once(':')
        .ok_or_else(|| anyhow!("Payload has no IV prefix"))?;

    let nonce_bytes = B64.decode(iv)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(anyhow!("Bad IV length {}", nonce_bytes.len()));
    }
    let ciphertext = B64.decode(body)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|e| anyhow!("Decryption failed: {}", e))?;

    Ok(String::from_utf8(plaintext)?)
}

/// Server-wide cipher for message text.
#[derive(Clone)]
pub struct MessageCipher {
    key: [u8; 32],
}

impl MessageCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        encrypt_text(&self.key, plaintext)
    }

    /// Best-effort decryption: a malformed or missing payload yields `None`.
    pub fn open(&self, payload: Option<&str>) -> Option<String> {
        decrypt_text(&self.key, payload?).ok()
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageCipher { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_key();
        for text in ["Hello from Courier!", "", "Բարեւ 👋 ünïcødé", "a:b:c"] {
            let payload = encrypt_text(&key, text).unwrap();
            assert_eq!(decrypt_text(&key, &payload).unwrap(), text);
        }
    }

    #[test]
    fn payload_format_is_iv_colon_cipher() {
        let key = generate_key();
        let payload = encrypt_text(&key, "hi").unwrap();
        let (iv, body) = payload.split_once(':').unwrap();
        assert_eq!(B64.decode(iv).unwrap().len(), NONCE_LEN);
        assert!(!body.is_empty());
    }

    #[test]
    fn fresh_iv_per_message() {
        let key = generate_key();
        let a = encrypt_text(&key, "same").unwrap();
        let b = encrypt_text(&key, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let payload = encrypt_text(&generate_key(), "Secret message").unwrap();
        assert!(decrypt_text(&generate_key(), &payload).is_err());
    }

    #[test]
    fn malformed_payload_opens_to_none() {
        let cipher = MessageCipher::new(generate_key());
        assert_eq!(cipher.open(None), None);
        assert_eq!(cipher.open(Some("")), None);
        assert_eq!(cipher.open(Some("no-separator")), None);
        assert_eq!(cipher.open(Some("!!!:???")), None);
        assert_eq!(cipher.open(Some("plain text from an old row")), None);

        let sealed = cipher.seal("ok").unwrap();
        assert_eq!(cipher.open(Some(&sealed)).as_deref(), Some("ok"));
    }
}
