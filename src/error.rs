use crate::crypto::CryptoError;
use crate::keystore::Permissions;
use crate::protocol::ResultCode;
use thiserror::Error;

/// Every way a request can fail inside the module.
///
/// None of these are fatal: the dispatcher turns each one into a
/// [`ResultCode`] and the module keeps serving.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HsmError {
    #[error("module is not initialized")]
    NotInitialized,

    #[error("unknown opcode 0x{0:02x}")]
    InvalidCommand(u8),

    #[error("malformed payload: {0}")]
    InvalidData(&'static str),

    #[error("key {0} not found")]
    KeyNotFound(u32),

    #[error("key {0} already exists")]
    DuplicateKey(u32),

    #[error("key table full ({0} active keys)")]
    MemoryFull(usize),

    #[error("authentication failed")]
    AuthFailed,

    #[error("host session is not authenticated")]
    NotAuthenticated,

    #[error("key {id} lacks {required} permission")]
    PermissionDenied { id: u32, required: Permissions },

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error(transparent)]
    Primitive(#[from] CryptoError),
}

impl HsmError {
    /// Result code reported to the host for this failure.
    pub fn result_code(&self) -> ResultCode {
        match self {
            HsmError::NotInitialized
            | HsmError::DuplicateKey(_)
            | HsmError::PayloadTooLarge { .. }
            | HsmError::Primitive(_) => ResultCode::Error,
            HsmError::InvalidCommand(_) => ResultCode::InvalidCmd,
            HsmError::InvalidData(_) => ResultCode::InvalidData,
            HsmError::KeyNotFound(_) => ResultCode::KeyNotFound,
            HsmError::MemoryFull(_) => ResultCode::MemoryFull,
            HsmError::AuthFailed
            | HsmError::NotAuthenticated
            | HsmError::PermissionDenied { .. } => ResultCode::AuthFailed,
        }
    }

    /// Whether this failure is counted in the audit `error_count`.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            HsmError::AuthFailed
                | HsmError::NotAuthenticated
                | HsmError::PermissionDenied { .. }
                | HsmError::Primitive(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_maps_to_generic_error() {
        assert_eq!(HsmError::DuplicateKey(7).result_code(), ResultCode::Error);
        assert!(!HsmError::DuplicateKey(7).is_security_event());
    }

    #[test]
    fn authorization_failures_share_auth_failed_code() {
        let denied = HsmError::PermissionDenied {
            id: 1,
            required: Permissions::SIGN,
        };
        assert_eq!(denied.result_code(), ResultCode::AuthFailed);
        assert_eq!(HsmError::NotAuthenticated.result_code(), ResultCode::AuthFailed);
        assert!(denied.is_security_event());
    }

    #[test]
    fn primitive_failures_are_audited() {
        let err = HsmError::from(CryptoError::DecryptionFailed);
        assert_eq!(err.result_code(), ResultCode::Error);
        assert!(err.is_security_event());
    }

    #[test]
    fn lookup_misses_are_not_audited() {
        assert!(!HsmError::KeyNotFound(3).is_security_event());
        assert!(!HsmError::InvalidData("short").is_security_event());
    }
}
