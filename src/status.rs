use serde::{Deserialize, Serialize};

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const VERSION_PATCH: u8 = 0;

/// Diagnostics snapshot reported by the STATUS opcode.
///
/// Wire layout (16 bytes):
/// ```text
/// MAJOR | MINOR | PATCH | 0 | KEY_COUNT (4, BE) | OPERATION_COUNT (4, BE) | ERROR_COUNT (4, BE)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub version: [u8; 3],
    pub key_count: u32,
    pub operation_count: u32,
    pub error_count: u32,
}

impl Status {
    pub const LEN: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[..3].copy_from_slice(&self.version);
        buf[4..8].copy_from_slice(&self.key_count.to_be_bytes());
        buf[8..12].copy_from_slice(&self.operation_count.to_be_bytes());
        buf[12..16].copy_from_slice(&self.error_count.to_be_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let data: &[u8; Self::LEN] = data.try_into().ok()?;
        let word =
            |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        Some(Self {
            version: [data[0], data[1], data[2]],
            key_count: word(4),
            operation_count: word(8),
            error_count: word(12),
        })
    }
}
