use crate::crypto::erase::MIN_ERASE_PASSES;
use crate::keystore::MAX_KEYS;
use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Largest request payload and working buffer size (4 KiB).
pub const MAX_DATA_SIZE: usize = 4096;

/// Upper bound on configurable key slots.
pub const MAX_KEY_CAPACITY: usize = 65_536;

/// Which authorization checks the dispatcher applies to privileged opcodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Reject key generation and key operations until INIT has succeeded.
    pub require_authentication: bool,
    /// Reject key operations the key's permission mask does not allow.
    pub enforce_permissions: bool,
}

impl AccessPolicy {
    /// Both checks on.
    pub fn strict() -> Self {
        Self {
            require_authentication: true,
            enforce_permissions: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsmConfig {
    max_payload: usize,
    key_capacity: usize,
    erase_passes: u8,
    policy: AccessPolicy,
}

impl Default for HsmConfig {
    fn default() -> Self {
        Self {
            max_payload: MAX_DATA_SIZE,
            key_capacity: MAX_KEYS,
            erase_passes: MIN_ERASE_PASSES,
            policy: AccessPolicy::default(),
        }
    }
}

impl HsmConfig {
    pub fn new(
        max_payload: usize,
        key_capacity: usize,
        erase_passes: u8,
        policy: AccessPolicy,
    ) -> anyhow::Result<Self> {
        let config = Self {
            max_payload,
            key_capacity,
            erase_passes,
            policy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    pub fn key_capacity(&self) -> usize {
        self.key_capacity
    }

    pub fn erase_passes(&self) -> u8 {
        self.erase_passes
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_payload == 0 {
            bail!("max payload must be at least 1 byte");
        }
        if self.max_payload > u16::MAX as usize {
            bail!("max payload cannot exceed the 16-bit length field");
        }
        if self.key_capacity == 0 {
            bail!("key table needs at least one slot");
        }
        if self.key_capacity > MAX_KEY_CAPACITY {
            bail!("key table cannot exceed {MAX_KEY_CAPACITY} slots");
        }
        if self.erase_passes < MIN_ERASE_PASSES {
            bail!("secure erase needs at least {MIN_ERASE_PASSES} random passes");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_module_constants() {
        let config = HsmConfig::default();
        assert_eq!(config.max_payload(), 4096);
        assert_eq!(config.key_capacity(), 1000);
        assert_eq!(config.erase_passes(), 3);
        assert_eq!(config.policy(), AccessPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn too_few_erase_passes_fail() {
        assert!(HsmConfig::new(4096, 1000, 2, AccessPolicy::default()).is_err());
    }

    #[test]
    fn oversized_payload_limit_fails() {
        assert!(HsmConfig::new(70_000, 1000, 3, AccessPolicy::default()).is_err());
    }

    #[test]
    fn huge_capacity_fails() {
        assert!(HsmConfig::new(4096, 4_000_000_000, 3, AccessPolicy::default()).is_err());
        assert!(HsmConfig::new(4096, MAX_KEY_CAPACITY + 1, 3, AccessPolicy::default()).is_err());
        assert!(HsmConfig::new(4096, MAX_KEY_CAPACITY, 3, AccessPolicy::default()).is_ok());
    }

    #[test]
    fn zero_capacity_fails() {
        assert!(HsmConfig::new(4096, 0, 3, AccessPolicy::default()).is_err());
    }

    #[test]
    fn strict_policy_enables_both_checks() {
        let policy = AccessPolicy::strict();
        assert!(policy.require_authentication);
        assert!(policy.enforce_permissions);
    }
}
