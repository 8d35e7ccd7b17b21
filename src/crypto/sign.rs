use super::{CryptoError, DIGEST_LEN, KEY_LEN, SIGNATURE_LEN};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};

/// Sign a digest with the Ed25519 key seeded by `secret`.
pub fn sign_digest(secret: &[u8; KEY_LEN], digest: &[u8; DIGEST_LEN]) -> [u8; SIGNATURE_LEN] {
    let signing_key = SigningKey::from_bytes(secret);
    signing_key.sign(digest).to_bytes()
}

/// Verify `signature` over `digest` against the public half of `secret`.
pub fn verify_digest(
    secret: &[u8; KEY_LEN],
    digest: &[u8; DIGEST_LEN],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let signature = Signature::from_slice(signature)
        .map_err(|_| CryptoError::MalformedSignature(signature.len()))?;

    SigningKey::from_bytes(secret)
        .verifying_key()
        .verify(digest, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_under_same_secret() {
        let secret = [5u8; KEY_LEN];
        let digest = [1u8; DIGEST_LEN];

        let sig = sign_digest(&secret, &digest);
        assert!(verify_digest(&secret, &digest, &sig).is_ok());
    }

    #[test]
    fn signature_fails_under_other_secret() {
        let digest = [1u8; DIGEST_LEN];
        let sig = sign_digest(&[5u8; KEY_LEN], &digest);

        assert_eq!(
            verify_digest(&[6u8; KEY_LEN], &digest, &sig),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn short_signature_is_malformed() {
        let secret = [5u8; KEY_LEN];
        assert_eq!(
            verify_digest(&secret, &[0u8; DIGEST_LEN], &[0u8; 10]),
            Err(CryptoError::MalformedSignature(10))
        );
    }
}
