use crate::crypto::KEY_LEN;
use crate::error::HsmError;
use crate::state::ModuleState;
use subtle::ConstantTimeEq;

/// Check a host-presented secret against the master key.
///
/// The secret must be exactly [`KEY_LEN`] bytes. On a match the session is
/// marked authenticated. The caller owns audit accounting for failures.
pub fn authenticate(state: &mut ModuleState, secret: &[u8]) -> Result<(), HsmError> {
    if secret.len() != KEY_LEN {
        return Err(HsmError::InvalidData("secret must be 32 bytes"));
    }

    if !constant_time_eq(secret, state.master_key()) {
        return Err(HsmError::AuthFailed);
    }

    state.set_authenticated();
    Ok(())
}

// Runtime depends only on length, never on where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
