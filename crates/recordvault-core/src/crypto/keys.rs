#![forbid(unsafe_code)]

use std::fmt;
use std::sync::RwLock;

use memsafe::MemSafe;
use rand::RngCore;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Length of every data key, in bytes.
pub const KEY_SIZE: usize = 32;

/// Error type for key access operations.
///
/// This error can occur when accessing protected key material, either due to
/// memory protection failures or lock poisoning (a thread panicked while holding the lock).
#[derive(Debug, Error)]
pub enum KeyAccessError {
    /// Memory protection operation failed (mlock, mprotect, etc.)
    #[error("Memory protection operation failed: {0}")]
    MemoryProtection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Lock was poisoned (a thread panicked while holding it)
    #[error("Key lock was poisoned")]
    LockPoisoned,
}

impl KeyAccessError {
    /// Create a memory protection error from any error type.
    pub fn memory_protection<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        KeyAccessError::MemoryProtection(Box::new(err))
    }
}

/// The named secrets held by [`DataKeys`], in their persisted order.
///
/// Every site that persists or restores data keys iterates [`KeySlot::ALL`]
/// and matches exhaustively on the slot, so introducing a new slot is a
/// compile error until each of them handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    /// Block cipher key for record encryption.
    Encryption,
    /// HMAC key for record authentication.
    Mac,
}

impl KeySlot {
    /// Number of slots.
    pub const COUNT: usize = 2;

    /// All slots in envelope order: encryption key first, then MAC key.
    pub const ALL: [KeySlot; Self::COUNT] = [KeySlot::Encryption, KeySlot::Mac];

    /// Human-readable slot name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            KeySlot::Encryption => "encryption",
            KeySlot::Mac => "mac",
        }
    }
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A principal's two long-term data keys.
///
/// Both keys are random and independent of the password; on disk they only
/// ever exist inside the KEK-encrypted envelope managed by
/// [`KeyVault`](crate::vault::KeyVault).
///
/// # Security
///
/// Key bytes live in `memsafe::MemSafe` containers: locked in RAM, protected
/// with `PROT_NONE` while not in use, excluded from core dumps where the
/// platform allows it, and zeroed on drop. Access only happens through the
/// scoped `with_*` methods, and `Debug` never prints key material.
///
/// # Thread Safety
///
/// `DataKeys` is `Send + Sync`; share it with `Arc<DataKeys>`. Each
/// container sits behind an `RwLock`, and a poisoned lock makes the key
/// inaccessible rather than exposing it.
pub struct DataKeys {
    encryption_key: RwLock<MemSafe<[u8; KEY_SIZE]>>,
    mac_key: RwLock<MemSafe<[u8; KEY_SIZE]>>,
}

impl fmt::Debug for DataKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKeys([REDACTED])")
    }
}

impl DataKeys {
    /// Generate a fresh pair of random data keys.
    ///
    /// # Errors
    ///
    /// Returns a `KeyAccessError` if memory protection initialization fails
    /// (for example when the mlock limit is exceeded).
    pub fn random() -> Result<Self, KeyAccessError> {
        let mut slots = Zeroizing::new([[0u8; KEY_SIZE]; KeySlot::COUNT]);
        for key in slots.iter_mut() {
            rand::rng().fill_bytes(key);
        }
        Self::from_slots(*slots)
    }

    /// Build data keys from raw key material.
    ///
    /// The arrays are copied into protected containers; the caller is
    /// responsible for zeroing its own copies.
    pub fn new(encryption_key: [u8; KEY_SIZE], mac_key: [u8; KEY_SIZE]) -> Result<Self, KeyAccessError> {
        Ok(DataKeys {
            encryption_key: RwLock::new(
                MemSafe::new(encryption_key).map_err(KeyAccessError::memory_protection)?,
            ),
            mac_key: RwLock::new(MemSafe::new(mac_key).map_err(KeyAccessError::memory_protection)?),
        })
    }

    /// Build data keys from one key per slot, indexed in [`KeySlot::ALL`] order.
    pub fn from_slots(mut slots: [[u8; KEY_SIZE]; KeySlot::COUNT]) -> Result<Self, KeyAccessError> {
        let [encryption_key, mac_key] = slots;
        let keys = Self::new(encryption_key, mac_key);
        slots.zeroize();
        keys
    }

    fn cell(&self, slot: KeySlot) -> &RwLock<MemSafe<[u8; KEY_SIZE]>> {
        match slot {
            KeySlot::Encryption => &self.encryption_key,
            KeySlot::Mac => &self.mac_key,
        }
    }

    /// Execute a function with access to the key in `slot`.
    ///
    /// Memory permissions are elevated only for the duration of the callback.
    ///
    /// # Errors
    ///
    /// Returns a `KeyAccessError` if the lock is poisoned or if
    /// memory protection operations fail.
    pub fn with_key<F, R>(&self, slot: KeySlot, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; KEY_SIZE]) -> R,
    {
        let mut lock = self
            .cell(slot)
            .write()
            .map_err(|_| KeyAccessError::LockPoisoned)?;
        let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
        Ok(f(&guard))
    }

    /// Execute a function with access to the encryption key.
    pub fn with_encryption_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; KEY_SIZE]) -> R,
    {
        self.with_key(KeySlot::Encryption, f)
    }

    /// Execute a function with access to the MAC key.
    pub fn with_mac_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; KEY_SIZE]) -> R,
    {
        self.with_key(KeySlot::Mac, f)
    }

    fn copy_key(&self, slot: KeySlot) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeyAccessError> {
        self.with_key(slot, |key| Zeroizing::new(*key))
    }

    /// Try to clone the keys into new protected containers.
    pub fn try_clone(&self) -> Result<Self, KeyAccessError> {
        let encryption_key = self.copy_key(KeySlot::Encryption)?;
        let mac_key = self.copy_key(KeySlot::Mac)?;
        Self::new(*encryption_key, *mac_key)
    }

    /// Compare two key pairs in constant time.
    pub fn ct_eq(&self, other: &DataKeys) -> Result<bool, KeyAccessError> {
        let mut equal = Choice::from(1u8);
        for slot in KeySlot::ALL {
            let ours = self.copy_key(slot)?;
            let theirs = other.copy_key(slot)?;
            equal &= ours[..].ct_eq(&theirs[..]);
        }
        Ok(equal.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_access() {
        let keys = DataKeys::new([1u8; KEY_SIZE], [2u8; KEY_SIZE]).unwrap();

        keys.with_encryption_key(|key| assert_eq!(key, &[1u8; KEY_SIZE]))
            .unwrap();
        keys.with_mac_key(|key| assert_eq!(key, &[2u8; KEY_SIZE])).unwrap();
        keys.with_key(KeySlot::Mac, |key| assert_eq!(key, &[2u8; KEY_SIZE]))
            .unwrap();
    }

    #[test]
    fn test_from_slots_follows_slot_order() {
        let keys = DataKeys::from_slots([[7u8; KEY_SIZE], [9u8; KEY_SIZE]]).unwrap();
        assert_eq!(KeySlot::ALL[0], KeySlot::Encryption);
        keys.with_encryption_key(|key| assert_eq!(key[0], 7)).unwrap();
        keys.with_mac_key(|key| assert_eq!(key[0], 9)).unwrap();
    }

    #[test]
    fn test_random_keys_are_independent() {
        let keys = DataKeys::random().unwrap();
        let enc = keys.with_encryption_key(|key| *key).unwrap();
        let mac = keys.with_mac_key(|key| *key).unwrap();
        assert_ne!(enc, mac);

        let other = DataKeys::random().unwrap();
        assert!(!keys.ct_eq(&other).unwrap());
    }

    #[test]
    fn test_try_clone_and_ct_eq() {
        let keys = DataKeys::random().unwrap();
        let clone = keys.try_clone().unwrap();
        assert!(keys.ct_eq(&clone).unwrap());
        assert!(keys.ct_eq(&keys).unwrap());
    }

    #[test]
    fn test_debug_is_redacted() {
        let keys = DataKeys::new([0xAB; KEY_SIZE], [0xCD; KEY_SIZE]).unwrap();
        let rendered = format!("{keys:?}");
        assert_eq!(rendered, "DataKeys([REDACTED])");
        assert!(!rendered.contains("171"));
        assert!(!rendered.to_lowercase().contains("abab"));
    }
}
