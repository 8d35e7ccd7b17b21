use super::EntropySource;
use tracing::warn;
use zeroize::Zeroize;

/// Minimum number of random overwrite passes before the final zero fill.
pub const MIN_ERASE_PASSES: u8 = 3;

/// Overwrite `buf` with fresh random data `passes` times, then zero it.
///
/// Fewer than [`MIN_ERASE_PASSES`] passes are never performed. If the random
/// source fails, the remaining random passes are skipped but the zero fill
/// always happens.
pub fn secure_erase(buf: &mut [u8], passes: u8, source: &mut dyn EntropySource) {
    for pass in 0..passes.max(MIN_ERASE_PASSES) {
        if let Err(e) = source.fill(buf) {
            warn!(pass, source = source.name(), error = %e, "random overwrite pass failed");
            break;
        }
    }
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoError;
    use crate::crypto::entropy::testing::FailingEntropy;

    struct CountingEntropy {
        fills: usize,
    }

    impl EntropySource for CountingEntropy {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn fill(&mut self, dest: &mut [u8]) -> Result<(), CryptoError> {
            self.fills += 1;
            dest.fill(0xA5);
            Ok(())
        }
    }

    #[test]
    fn erase_leaves_zeroes() {
        let mut buf = [0x42u8; 64];
        let mut source = CountingEntropy { fills: 0 };
        secure_erase(&mut buf, 3, &mut source);
        assert_eq!(buf, [0u8; 64]);
    }

    #[test]
    fn erase_enforces_minimum_passes() {
        let mut buf = [1u8; 8];
        let mut source = CountingEntropy { fills: 0 };
        secure_erase(&mut buf, 1, &mut source);
        assert_eq!(source.fills, MIN_ERASE_PASSES as usize);
    }

    #[test]
    fn erase_honours_extra_passes() {
        let mut buf = [1u8; 8];
        let mut source = CountingEntropy { fills: 0 };
        secure_erase(&mut buf, 7, &mut source);
        assert_eq!(source.fills, 7);
    }

    #[test]
    fn erase_zeroes_even_when_source_fails() {
        let mut buf = [0x42u8; 16];
        secure_erase(&mut buf, 3, &mut FailingEntropy);
        assert_eq!(buf, [0u8; 16]);
    }
}
