//! Module-wide state: root secrets, session flags and audit counters.

use crate::crypto::entropy::{random_array, random_u32};
use crate::crypto::{CryptoError, EntropySource, KEY_LEN, secure_erase};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct ModuleState {
    initialized: bool,
    authenticated: bool,
    master_key: [u8; KEY_LEN],
    session_key: [u8; KEY_LEN],
    random_seed: u32,
    error_count: u32,
    operation_count: u32,
}

impl ModuleState {
    /// Boot sequence: draw the master key, session key and seed.
    pub fn boot(source: &mut dyn EntropySource) -> Result<Self, CryptoError> {
        let master_key = random_array(source)?;
        let session_key = random_array(source)?;
        let random_seed = random_u32(source)?;

        Ok(Self {
            initialized: true,
            authenticated: false,
            master_key,
            session_key,
            random_seed,
            error_count: 0,
            operation_count: 0,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn set_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub(crate) fn master_key(&self) -> &[u8; KEY_LEN] {
        &self.master_key
    }

    pub(crate) fn session_key(&self) -> &[u8; KEY_LEN] {
        &self.session_key
    }

    #[cfg(test)]
    pub(crate) fn random_seed(&self) -> u32 {
        self.random_seed
    }

    pub(crate) fn reseed(&mut self, mix: u32) {
        self.random_seed = self.random_seed.rotate_left(13) ^ mix;
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn operation_count(&self) -> u32 {
        self.operation_count
    }

    pub(crate) fn record_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub(crate) fn record_operation(&mut self) {
        self.operation_count = self.operation_count.saturating_add(1);
    }

    /// Overwrite both secrets with random passes, then clear everything.
    ///
    /// Leaves the state uninitialized.
    pub fn secure_erase(&mut self, passes: u8, source: &mut dyn EntropySource) {
        secure_erase(&mut self.master_key, passes, source);
        secure_erase(&mut self.session_key, passes, source);
        self.zeroize();
    }
}

impl fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleState")
            .field("initialized", &self.initialized)
            .field("authenticated", &self.authenticated)
            .field("error_count", &self.error_count)
            .field("operation_count", &self.operation_count)
            .finish_non_exhaustive()
    }
}
