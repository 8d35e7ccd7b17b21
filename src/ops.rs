//! Crypto orchestration: module operations composed from primitives.
//!
//! Every function here bumps `operation_count` on success and leaves
//! `error_count` alone. Failure accounting belongs to the caller.

use crate::crypto::entropy::random_array;
use crate::crypto::{
    self, DIGEST_LEN, EntropySource, NONCE_LEN, SIGNATURE_LEN, sha256, sign_digest,
    verify_digest,
};
use crate::error::HsmError;
use crate::state::ModuleState;
use zeroize::Zeroizing;

/// Encrypt under the session key with a fresh nonce.
///
/// Output is `nonce || ciphertext || tag`.
pub fn encrypt(
    state: &mut ModuleState,
    source: &mut dyn EntropySource,
    plaintext: &[u8],
    max_payload: usize,
) -> Result<Vec<u8>, HsmError> {
    if plaintext.len() > max_payload {
        return Err(HsmError::PayloadTooLarge {
            len: plaintext.len(),
            max: max_payload,
        });
    }

    let nonce: [u8; NONCE_LEN] = random_array(source)?;
    let ciphertext = crypto::seal(state.session_key(), &nonce, plaintext)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);

    state.record_operation();
    Ok(out)
}

/// Split the nonce prefix off `input` and decrypt the rest under the
/// session key.
pub fn decrypt(state: &mut ModuleState, input: &[u8]) -> Result<Zeroizing<Vec<u8>>, HsmError> {
    let Some((nonce, ciphertext)) = input.split_first_chunk::<NONCE_LEN>() else {
        return Err(HsmError::InvalidData("ciphertext shorter than nonce"));
    };

    let plaintext = crypto::open(state.session_key(), nonce, ciphertext)?;

    state.record_operation();
    Ok(plaintext)
}

/// Hash `message`, then sign the digest under the master key.
pub fn sign(state: &mut ModuleState, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], HsmError> {
    let digest = sha256(message);
    let signature = sign_digest(state.master_key(), &digest);

    state.record_operation();
    Ok(signature)
}

/// Hash `message`, then check `signature` over the digest under the
/// master key.
pub fn verify(state: &mut ModuleState, message: &[u8], signature: &[u8]) -> Result<(), HsmError> {
    let digest = sha256(message);
    verify_digest(state.master_key(), &digest, signature)?;

    state.record_operation();
    Ok(())
}

pub fn hash(state: &mut ModuleState, message: &[u8]) -> Result<[u8; DIGEST_LEN], HsmError> {
    if message.is_empty() {
        return Err(HsmError::InvalidData("nothing to hash"));
    }

    let digest = sha256(message);

    state.record_operation();
    Ok(digest)
}

/// Random bytes straight from the module's source. Not counted as an
/// operation.
pub fn random(
    source: &mut dyn EntropySource,
    len: usize,
    max_payload: usize,
) -> Result<Zeroizing<Vec<u8>>, HsmError> {
    if len > max_payload {
        return Err(HsmError::InvalidData("random length exceeds working buffer"));
    }

    let mut out = Zeroizing::new(vec![0u8; len]);
    source.fill(&mut out)?;
    Ok(out)
}
