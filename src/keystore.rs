//! Fixed-capacity table of key records.

use crate::crypto::{EntropySource, KEY_LEN, secure_erase};
use crate::error::HsmError;
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default number of key slots.
pub const MAX_KEYS: usize = 1000;

/// Operations a key is authorized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Zeroize)]
pub struct Permissions(u32);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const ENCRYPT: Self = Self(0x01);
    pub const DECRYPT: Self = Self(0x02);
    pub const SIGN: Self = Self(0x04);
    pub const VERIFY: Self = Self(0x08);
    pub const ALL: Self = Self(0x0F);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ENCRYPT, "encrypt"),
            (Self::DECRYPT, "decrypt"),
            (Self::SIGN, "sign"),
            (Self::VERIFY, "verify"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// One slot of the key table.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct KeyRecord {
    id: u32,
    key_material: [u8; KEY_LEN],
    permissions: Permissions,
    active: bool,
}

impl KeyRecord {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub(crate) fn key_material(&self) -> &[u8; KEY_LEN] {
        &self.key_material
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("id", &self.id)
            .field("permissions", &self.permissions)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Key table with lowest-free-slot allocation and an id index for lookups.
pub struct KeyStore {
    slots: Vec<KeyRecord>,
    index: HashMap<u32, usize>,
}

impl KeyStore {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, KeyRecord::default);
        Self {
            slots,
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Create a key with fresh random material in the lowest free slot.
    ///
    /// Returns the slot index used.
    pub fn generate(
        &mut self,
        id: u32,
        permissions: Permissions,
        source: &mut dyn EntropySource,
    ) -> Result<usize, HsmError> {
        if self.index.contains_key(&id) {
            return Err(HsmError::DuplicateKey(id));
        }

        let slot = self
            .slots
            .iter()
            .position(|record| !record.active)
            .ok_or(HsmError::MemoryFull(self.slots.len()))?;

        let record = &mut self.slots[slot];
        if let Err(e) = source.fill(&mut record.key_material) {
            record.zeroize();
            return Err(e.into());
        }
        record.id = id;
        record.permissions = permissions;
        record.active = true;
        self.index.insert(id, slot);

        Ok(slot)
    }

    pub fn find(&self, id: u32) -> Option<&KeyRecord> {
        self.index
            .get(&id)
            .map(|&slot| &self.slots[slot])
            .filter(|record| record.active && record.id == id)
    }

    /// Look up a key, failing with [`HsmError::KeyNotFound`] on a miss.
    pub fn require(&self, id: u32) -> Result<&KeyRecord, HsmError> {
        self.find(id).ok_or(HsmError::KeyNotFound(id))
    }

    /// Number of active keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Overwrite every slot, active or not, and forget all ids.
    pub fn secure_erase(&mut self, passes: u8, source: &mut dyn EntropySource) {
        for record in &mut self.slots {
            secure_erase(&mut record.key_material, passes, source);
            record.zeroize();
        }
        self.index.clear();
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("active", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoError;
    use crate::crypto::OsEntropy;
    use crate::crypto::entropy::testing::FailingEntropy;

    #[test]
    fn new_store_is_empty() {
        let store = KeyStore::new(MAX_KEYS);
        assert_eq!(store.len(), 0);
        assert_eq!(store.capacity(), MAX_KEYS);
        assert!(store.find(0).is_none());
    }

    #[test]
    fn generate_then_find_works() {
        let mut store = KeyStore::new(4);
        let perms = Permissions::ENCRYPT | Permissions::DECRYPT;
        store.generate(7, perms, &mut OsEntropy).unwrap();

        let record = store.find(7).unwrap();
        assert_eq!(record.id(), 7);
        assert_eq!(record.permissions(), perms);
        assert!(record.is_active());
        assert_ne!(record.key_material(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn generate_existing_id_fails() {
        let mut store = KeyStore::new(4);
        store.generate(1, Permissions::ALL, &mut OsEntropy).unwrap();
        match store.generate(1, Permissions::SIGN, &mut OsEntropy) {
            Err(HsmError::DuplicateKey(id)) => assert_eq!(id, 1),
            other => panic!("expected DuplicateKey, got: {other:?}"),
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.find(1).unwrap().permissions(), Permissions::ALL);
    }

    #[test]
    fn full_store_fails() {
        let mut store = KeyStore::new(3);
        for id in 0..3 {
            store.generate(id, Permissions::ALL, &mut OsEntropy).unwrap();
        }
        match store.generate(99, Permissions::ALL, &mut OsEntropy) {
            Err(HsmError::MemoryFull(cap)) => assert_eq!(cap, 3),
            other => panic!("expected MemoryFull, got: {other:?}"),
        }
    }

    #[test]
    fn capacity_is_exactly_max_keys() {
        let mut store = KeyStore::new(MAX_KEYS);
        for id in 0..MAX_KEYS as u32 {
            store.generate(id, Permissions::ALL, &mut OsEntropy).unwrap();
        }
        assert_eq!(store.len(), MAX_KEYS);
        assert!(matches!(
            store.generate(MAX_KEYS as u32, Permissions::ALL, &mut OsEntropy),
            Err(HsmError::MemoryFull(MAX_KEYS))
        ));
    }

    #[test]
    fn slots_fill_lowest_first() {
        let mut store = KeyStore::new(4);
        assert_eq!(store.generate(10, Permissions::ALL, &mut OsEntropy).unwrap(), 0);
        assert_eq!(store.generate(20, Permissions::ALL, &mut OsEntropy).unwrap(), 1);
        assert_eq!(store.generate(30, Permissions::ALL, &mut OsEntropy).unwrap(), 2);
    }

    #[test]
    fn distinct_keys_get_distinct_material() {
        let mut store = KeyStore::new(4);
        store.generate(1, Permissions::ALL, &mut OsEntropy).unwrap();
        store.generate(2, Permissions::ALL, &mut OsEntropy).unwrap();
        assert_ne!(
            store.find(1).unwrap().key_material(),
            store.find(2).unwrap().key_material()
        );
    }

    #[test]
    fn failed_generation_leaves_slot_free() {
        let mut store = KeyStore::new(2);
        assert_eq!(
            store.generate(1, Permissions::ALL, &mut FailingEntropy),
            Err(HsmError::Primitive(CryptoError::EntropyUnavailable))
        );
        assert!(store.find(1).is_none());
        assert_eq!(store.len(), 0);
        assert_eq!(store.generate(1, Permissions::ALL, &mut OsEntropy).unwrap(), 0);
    }

    #[test]
    fn erase_forgets_every_key() {
        let mut store = KeyStore::new(4);
        store.generate(1, Permissions::ALL, &mut OsEntropy).unwrap();
        store.generate(2, Permissions::ALL, &mut OsEntropy).unwrap();

        store.secure_erase(3, &mut OsEntropy);

        assert!(store.is_empty());
        assert!(store.find(1).is_none());
        assert!(store.find(2).is_none());
        assert!(store.slots.iter().all(|r| r.key_material == [0u8; KEY_LEN] && !r.active));
    }

    #[test]
    fn permissions_contains_and_display() {
        let p = Permissions::ENCRYPT | Permissions::SIGN;
        assert!(p.contains(Permissions::ENCRYPT));
        assert!(!p.contains(Permissions::DECRYPT));
        assert!(Permissions::ALL.contains(p));
        assert_eq!(p.to_string(), "encrypt|sign");
        assert_eq!(Permissions::NONE.to_string(), "none");
    }

    #[test]
    fn debug_hides_key_material() {
        let mut store = KeyStore::new(1);
        store.generate(5, Permissions::ALL, &mut OsEntropy).unwrap();
        let rendered = format!("{:?}", store.find(5).unwrap());
        assert!(!rendered.contains("key_material"));
    }
}
