use super::{CryptoError, KEY_LEN, NONCE_LEN};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroizing;

/// Widen the 16-byte wire nonce into the 24-byte XChaCha20 nonce.
///
/// The trailing 8 bytes are zero; uniqueness comes entirely from the
/// random wire nonce.
fn extended_nonce(nonce: &[u8; NONCE_LEN]) -> XNonce {
    let mut full = [0u8; 24];
    full[..NONCE_LEN].copy_from_slice(nonce);
    XNonce::from(full)
}

/// Encrypt plaintext under `key` with the caller's nonce.
///
/// Returns ciphertext with the tag appended.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .encrypt(&extended_nonce(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt ciphertext (tag appended) under `key`.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let plaintext = cipher
        .decrypt(&extended_nonce(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TAG_LEN;

    #[test]
    fn seal_open_roundtrip() {
        let key = [9u8; KEY_LEN];
        let nonce = [1u8; NONCE_LEN];

        let ct = seal(&key, &nonce, b"ballot").unwrap();
        assert_eq!(ct.len(), b"ballot".len() + TAG_LEN);

        let pt = open(&key, &nonce, &ct).unwrap();
        assert_eq!(pt.as_slice(), b"ballot");
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = [9u8; KEY_LEN];
        let nonce = [1u8; NONCE_LEN];

        let mut ct = seal(&key, &nonce, b"ballot").unwrap();
        ct[0] ^= 0x80;

        assert_eq!(open(&key, &nonce, &ct), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let key = [9u8; KEY_LEN];
        let ct = seal(&key, &[1u8; NONCE_LEN], b"ballot").unwrap();

        assert!(open(&key, &[2u8; NONCE_LEN], &ct).is_err());
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let key = [9u8; KEY_LEN];
        let nonce = [1u8; NONCE_LEN];

        assert!(open(&key, &nonce, &[0u8; TAG_LEN - 1]).is_err());
    }
}
