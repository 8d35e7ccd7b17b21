//! Cryptographic primitives used by the module.
//!
//! These are black boxes to the rest of the crate: pure functions over byte
//! buffers plus an injectable random source. Nothing outside this module
//! touches a cipher, hash or signature type directly.

pub mod aead;
pub mod entropy;
pub mod erase;
pub mod hash;
pub mod sign;

pub use aead::{open, seal};
pub use entropy::{EntropySource, OsEntropy};
pub use erase::secure_erase;
pub use hash::sha256;
pub use sign::{sign_digest, verify_digest};

use thiserror::Error;

/// Length of every symmetric key and the master secret (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the nonce carried on the wire (16 bytes).
pub const NONCE_LEN: usize = 16;
/// Length of the AEAD authentication tag (16 bytes, Poly1305).
pub const TAG_LEN: usize = 16;
/// Length of a message digest (32 bytes, SHA-256).
pub const DIGEST_LEN: usize = 32;
/// Length of a signature (64 bytes, Ed25519).
pub const SIGNATURE_LEN: usize = 64;

/// Failures reported by a primitive.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("random source unavailable")]
    EntropyUnavailable,

    #[error("random source failed its health check")]
    EntropyDegraded,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed: authentication tag mismatch or corrupted data")]
    DecryptionFailed,

    #[error("signature must be {SIGNATURE_LEN} bytes, got {0}")]
    MalformedSignature(usize),

    #[error("signature does not match message")]
    InvalidSignature,
}
