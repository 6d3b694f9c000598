//! Cryptographic primitives: data keys, password-based key derivation and
//! the block cipher mode shared by key envelopes and records.

pub mod block;
pub mod kdf;
pub mod keys;
mod thread_safety; // Send + Sync impls for DataKeys

use thiserror::Error;

/// Errors raised by the low-level primitives.
///
/// Wrong-password and tampering conditions are not reported here; they are
/// detected one layer up (login pre-check, record MAC) where the caller has
/// enough context to classify them.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// scrypt failed to produce a key.
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// The configured scrypt cost parameters are invalid.
    ///
    /// **[PROGRAMMING ERROR]** Indicates a bad configuration value.
    #[error("Invalid KDF parameters: {0}")]
    InvalidKdfParams(String),

    /// A buffer handed to CBC was not a whole number of blocks.
    #[error("Input of {len} bytes is not a multiple of the {block_size}-byte block size")]
    UnalignedInput { len: usize, block_size: usize },

    /// Key access failed due to memory protection error or lock poisoning.
    ///
    /// **[SYSTEM ERROR]** This indicates a failure in the memory protection
    /// subsystem (mlock, mprotect).
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

// Re-export commonly used types
pub use block::BLOCK_SIZE;
pub use kdf::KdfParams;
pub use keys::{DataKeys, KEY_SIZE, KeyAccessError, KeySlot};
