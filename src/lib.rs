mod auth;
pub mod client;
mod config;
pub mod crypto;
mod dispatch;
mod error;
mod keystore;
mod ops;
pub mod protocol;
pub mod selftest;
pub mod server;
mod state;
mod status;

pub use crate::client::{ClientError, HsmClient};
pub use crate::config::{AccessPolicy, HsmConfig, MAX_DATA_SIZE, MAX_KEY_CAPACITY};
pub use crate::crypto::{EntropySource, OsEntropy};
pub use crate::dispatch::Command;
pub use crate::error::HsmError;
pub use crate::keystore::{KeyRecord, MAX_KEYS, Permissions};
pub use crate::protocol::{Opcode, Request, Response, ResultCode};
pub use crate::server::{Loopback, Server};
pub use crate::status::Status;

use crate::crypto::entropy::health_probe;
use crate::crypto::{DIGEST_LEN, SIGNATURE_LEN};
use crate::keystore::KeyStore;
use crate::state::ModuleState;
use std::fmt;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

/// The security module: root secrets, key table and the random source that
/// feeds them.
///
/// Every handler takes `&mut self`; the owner serializes access.
pub struct Hsm {
    state: ModuleState,
    keys: KeyStore,
    config: HsmConfig,
    entropy: Box<dyn EntropySource>,
}

impl Hsm {
    /// Boot with default configuration and the OS random source.
    pub fn boot() -> Result<Self, HsmError> {
        Self::boot_with(HsmConfig::default(), Box::new(OsEntropy))
    }

    pub fn boot_with(
        config: HsmConfig,
        mut entropy: Box<dyn EntropySource>,
    ) -> Result<Self, HsmError> {
        let state = ModuleState::boot(entropy.as_mut())?;
        info!(
            source = entropy.name(),
            capacity = config.key_capacity(),
            "module initialized"
        );

        Ok(Self {
            state,
            keys: KeyStore::new(config.key_capacity()),
            config,
            entropy,
        })
    }

    pub fn config(&self) -> &HsmConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn find_key(&self, id: u32) -> Option<&KeyRecord> {
        self.keys.find(id)
    }

    /// Present a secret to the authentication gate.
    pub fn authenticate(&mut self, secret: &[u8]) -> Result<(), HsmError> {
        self.ensure_initialized()?;
        let result = auth::authenticate(&mut self.state, secret);
        match &result {
            Ok(()) => info!("host authenticated"),
            Err(e) => warn!(error = %e, "authentication rejected"),
        }
        self.audit(result)
    }

    pub fn generate_key(&mut self, id: u32, permissions: Permissions) -> Result<(), HsmError> {
        let result = self.ensure_session().and_then(|()| {
            self.keys
                .generate(id, permissions, self.entropy.as_mut())
                .map(|slot| debug!(id, slot, %permissions, "key generated"))
        });
        self.audit(result)
    }

    /// Encrypt under the session key. `key_id` must name an active key.
    pub fn encrypt(&mut self, key_id: u32, plaintext: &[u8]) -> Result<Vec<u8>, HsmError> {
        let result = self.authorize(key_id, Permissions::ENCRYPT).and_then(|()| {
            ops::encrypt(
                &mut self.state,
                self.entropy.as_mut(),
                plaintext,
                self.config.max_payload(),
            )
        });
        self.audit(result)
    }

    pub fn decrypt(
        &mut self,
        key_id: u32,
        sealed: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, HsmError> {
        let result = self
            .authorize(key_id, Permissions::DECRYPT)
            .and_then(|()| ops::decrypt(&mut self.state, sealed));
        self.audit(result)
    }

    pub fn sign(&mut self, key_id: u32, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], HsmError> {
        let result = self
            .authorize(key_id, Permissions::SIGN)
            .and_then(|()| ops::sign(&mut self.state, message));
        self.audit(result)
    }

    pub fn verify(
        &mut self,
        key_id: u32,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), HsmError> {
        let result = self
            .authorize(key_id, Permissions::VERIFY)
            .and_then(|()| ops::verify(&mut self.state, message, signature));
        self.audit(result)
    }

    pub fn hash(&mut self, message: &[u8]) -> Result<[u8; DIGEST_LEN], HsmError> {
        let result = self
            .ensure_initialized()
            .and_then(|()| ops::hash(&mut self.state, message));
        self.audit(result)
    }

    pub fn random(&mut self, len: usize) -> Result<Zeroizing<Vec<u8>>, HsmError> {
        let result = self
            .ensure_initialized()
            .and_then(|()| ops::random(self.entropy.as_mut(), len, self.config.max_payload()));
        self.audit(result)
    }

    pub fn status(&self) -> Status {
        Status {
            version: [
                status::VERSION_MAJOR,
                status::VERSION_MINOR,
                status::VERSION_PATCH,
            ],
            key_count: u32::try_from(self.keys.len()).unwrap_or(u32::MAX),
            operation_count: self.state.operation_count(),
            error_count: self.state.error_count(),
        }
    }

    /// Wipe every secret and key, then boot again with fresh secrets.
    ///
    /// If the reboot cannot draw randomness the module stays wiped and
    /// uninitialized.
    pub fn reset(&mut self) -> Result<(), HsmError> {
        let passes = self.config.erase_passes();
        if !self.keys.is_empty() {
            debug!(keys = self.keys.len(), passes, "erasing key table");
        }
        self.state.secure_erase(passes, self.entropy.as_mut());
        self.keys.secure_erase(passes, self.entropy.as_mut());

        match ModuleState::boot(self.entropy.as_mut()) {
            Ok(state) => {
                self.state = state;
                info!("module reset");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "reboot after reset failed; module left uninitialized");
                Err(e.into())
            }
        }
    }

    /// One bounded background step between requests: probe the random
    /// source and fold the sample into the seed.
    pub fn maintain(&mut self) {
        if !self.state.is_initialized() {
            return;
        }
        match health_probe(self.entropy.as_mut()) {
            Ok(mix) => self.state.reseed(mix),
            Err(e) => {
                error!(source = self.entropy.name(), error = %e, "entropy health probe failed");
                self.state.record_error();
            }
        }
    }

    fn ensure_initialized(&self) -> Result<(), HsmError> {
        if self.state.is_initialized() {
            Ok(())
        } else {
            Err(HsmError::NotInitialized)
        }
    }

    fn ensure_session(&self) -> Result<(), HsmError> {
        self.ensure_initialized()?;
        if self.config.policy().require_authentication && !self.state.is_authenticated() {
            return Err(HsmError::NotAuthenticated);
        }
        Ok(())
    }

    /// Session check, key lookup, then the permission check if enabled.
    fn authorize(&self, key_id: u32, required: Permissions) -> Result<(), HsmError> {
        self.ensure_session()?;
        let record = self.keys.require(key_id)?;
        if self.config.policy().enforce_permissions && !record.permissions().contains(required) {
            return Err(HsmError::PermissionDenied {
                id: key_id,
                required,
            });
        }
        Ok(())
    }

    fn audit<T>(&mut self, result: Result<T, HsmError>) -> Result<T, HsmError> {
        if matches!(&result, Err(e) if e.is_security_event()) {
            self.state.record_error();
        }
        result
    }
}

impl fmt::Debug for Hsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hsm")
            .field("state", &self.state)
            .field("keys", &self.keys)
            .field("config", &self.config)
            .field("entropy", &self.entropy.name())
            .finish()
    }
}
