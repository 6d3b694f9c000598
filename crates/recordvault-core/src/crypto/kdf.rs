#![forbid(unsafe_code)]

//! Password-based key derivation.
//!
//! Both secrets a password yields (the login pre-check digest and the
//! key-encrypting key) come from the same scrypt work factor with different
//! salts, so neither can be computed from the other.

use secrecy::SecretBox;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use super::CryptoError;

/// Length of every derived key, in bytes.
pub const DERIVED_KEY_SIZE: usize = 32;

/// Default scrypt cost parameter, N = 2^15 = 32768.
const DEFAULT_SCRYPT_COST_PARAM_LOG2: u8 = 15;
const DEFAULT_SCRYPT_BLOCK_SIZE: u32 = 8;
const DEFAULT_SCRYPT_PARALLELIZATION: u32 = 1;

/// Fast scrypt cost parameter for testing (N = 2^10 = 1024).
const FAST_SCRYPT_COST_PARAM_LOG2: u8 = 10;

/// scrypt work-factor parameters.
///
/// A derivation costs roughly `128 * r * 2^log_n` bytes of memory and tens
/// to hundreds of milliseconds of CPU with the defaults. Callers on a
/// latency-sensitive path should run it on a blocking worker.
///
/// The same parameters must be used for every derivation of one principal;
/// they are configuration, not persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// log2 of the scrypt cost parameter N.
    pub log_n: u8,
    /// scrypt block size parameter r.
    pub r: u32,
    /// scrypt parallelization parameter p.
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: DEFAULT_SCRYPT_COST_PARAM_LOG2,
            r: DEFAULT_SCRYPT_BLOCK_SIZE,
            p: DEFAULT_SCRYPT_PARALLELIZATION,
        }
    }
}

impl KdfParams {
    /// Weak parameters (N = 2^10) for tests and local development.
    ///
    /// **WARNING**: Never use for real principals.
    pub const fn fast() -> Self {
        Self {
            log_n: FAST_SCRYPT_COST_PARAM_LOG2,
            r: DEFAULT_SCRYPT_BLOCK_SIZE,
            p: DEFAULT_SCRYPT_PARALLELIZATION,
        }
    }

    fn scrypt_params(&self) -> Result<scrypt::Params, CryptoError> {
        scrypt::Params::new(self.log_n, self.r, self.p, DERIVED_KEY_SIZE).map_err(|e| {
            CryptoError::InvalidKdfParams(format!(
                "Invalid scrypt parameters (N=2^{}, r={}, p={}): {}",
                self.log_n, self.r, self.p, e
            ))
        })
    }

    /// Check that scrypt accepts these parameters.
    pub fn validate(&self) -> Result<(), CryptoError> {
        self.scrypt_params().map(|_| ())
    }

    /// Derive a 256-bit key from `password` and `salt`.
    ///
    /// The password is NFC-normalized first, so composed and decomposed
    /// spellings of the same text derive the same key.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidKdfParams`: scrypt rejected the parameters
    /// - `CryptoError::KeyDerivationFailed`: the derivation itself failed
    #[instrument(level = "trace", skip(self, password, salt), fields(log_n = self.log_n))]
    pub fn derive(&self, password: &str, salt: &[u8]) -> Result<SecretBox<[u8; DERIVED_KEY_SIZE]>, CryptoError> {
        let params = self.scrypt_params()?;
        let normalized = Zeroizing::new(password.nfc().collect::<String>());

        let mut key = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
        scrypt::scrypt(normalized.as_bytes(), salt, &params, &mut key[..])
            .map_err(|e| CryptoError::KeyDerivationFailed(format!("Scrypt derivation failed: {e}")))?;

        trace!("derived key");
        Ok(SecretBox::new(Box::new(*key)))
    }
}
