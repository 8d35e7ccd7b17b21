//! Random source for key material, nonces and erase passes.
//!
//! The module never calls the OS generator directly; it draws through an
//! [`EntropySource`] so a hardware RNG or a scripted test source can stand in.

use super::CryptoError;

/// Sample size for the maintenance health probe.
const PROBE_LEN: usize = 64;

/// Identical consecutive bytes tolerated before the source is declared stuck.
const REPETITION_CUTOFF: usize = 8;

/// A source of cryptographically secure random bytes.
pub trait EntropySource: Send {
    /// Short identifier used in log lines.
    fn name(&self) -> &'static str;

    /// Fill `dest` entirely with random bytes.
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), CryptoError>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn name(&self) -> &'static str {
        "os"
    }

    fn fill(&mut self, dest: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::fill(dest).map_err(|_| CryptoError::EntropyUnavailable)
    }
}

/// Draw a fixed-size array from `source`.
pub fn random_array<const N: usize>(
    source: &mut dyn EntropySource,
) -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    source.fill(&mut buf)?;
    Ok(buf)
}

/// Draw a big-endian `u32` from `source`.
pub fn random_u32(source: &mut dyn EntropySource) -> Result<u32, CryptoError> {
    random_array::<4>(source).map(u32::from_be_bytes)
}

/// Repetition-count health probe.
///
/// Draws a small sample and fails if any byte value repeats
/// [`REPETITION_CUTOFF`] times in a row. Returns a fresh `u32` folded from the
/// sample on success.
pub fn health_probe(source: &mut dyn EntropySource) -> Result<u32, CryptoError> {
    let sample: [u8; PROBE_LEN] = random_array(source)?;

    let mut run = 1;
    for pair in sample.windows(2) {
        if pair[0] == pair[1] {
            run += 1;
            if run >= REPETITION_CUTOFF {
                return Err(CryptoError::EntropyDegraded);
            }
        } else {
            run = 1;
        }
    }

    Ok(sample
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .fold(0, |acc, word| acc.rotate_left(5) ^ word))
}
