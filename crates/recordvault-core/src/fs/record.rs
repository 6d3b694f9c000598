#![forbid(unsafe_code)]

//! Authenticated record encryption.
//!
//! A record is `MAC(32) ‖ IV(16) ‖ Ciphertext`, where the ciphertext is
//! AES-256-CBC over the PKCS#7-padded plaintext and the MAC is HMAC-SHA256
//! over `IV ‖ Ciphertext`. The MAC is verified, in constant time, before any
//! byte is decrypted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ring::hmac;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, instrument, trace};
use zeroize::Zeroizing;

use crate::crypto::block::{BLOCK_SIZE, cbc_decrypt, cbc_encrypt, random_iv};
use crate::crypto::keys::{DataKeys, KeyAccessError};
use crate::crypto::CryptoError;
use crate::fs::atomic::write_atomic;

/// Size of the HMAC-SHA256 tag leading every record.
pub const MAC_SIZE: usize = 32;

/// Smallest possible record: a MAC and an IV with no ciphertext.
pub const HEADER_SIZE: usize = MAC_SIZE + BLOCK_SIZE;

/// Context for record operations, included in error messages.
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    /// The record name the caller asked for (if known)
    pub name: Option<String>,
    /// The file on disk
    pub path: Option<PathBuf>,
}

impl RecordContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for RecordContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref name) = self.name {
            parts.push(format!("record '{name}'"));
        }
        if let Some(ref path) = self.path {
            parts.push(format!("at {:?}", path.display()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors from sealing, opening, saving or loading a record.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record is structurally invalid: too short, or the ciphertext is
    /// not block-aligned.
    ///
    /// **[INTEGRITY VIOLATION]** Truncation or corruption on disk.
    #[error("Corrupted {context}: {reason}")]
    Corrupted {
        reason: String,
        context: RecordContext,
    },

    /// The stored MAC does not match the one recomputed over `IV ‖ Ciphertext`.
    ///
    /// **[INTEGRITY VIOLATION]** The record was modified, or it was written
    /// under different keys.
    #[error("Authentication failed for {context}: MAC mismatch - possible tampering or wrong key")]
    AuthenticationFailed { context: RecordContext },

    /// The padding of an authenticated record is malformed.
    ///
    /// **[INTEGRITY VIOLATION]** Never distinguish this from
    /// `AuthenticationFailed` in anything shown to a user.
    #[error("Invalid padding in {context}")]
    InvalidPadding { context: RecordContext },

    /// Reading or writing the record file failed.
    #[error("IO error accessing {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: RecordContext,
    },

    /// Key access failed due to memory protection error or lock poisoning
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

impl From<io::Error> for RecordError {
    fn from(source: io::Error) -> Self {
        RecordError::Io {
            source,
            context: RecordContext::new(),
        }
    }
}

/// Message shown to users for every integrity failure.
pub const UNREADABLE_MESSAGE: &str = "record unreadable";

impl RecordError {
    /// Whether this error means the stored bytes cannot be trusted.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            RecordError::Corrupted { .. }
                | RecordError::AuthenticationFailed { .. }
                | RecordError::InvalidPadding { .. }
        )
    }

    /// A message safe to show to an end user.
    ///
    /// All integrity failures render as the same [`UNREADABLE_MESSAGE`], so
    /// a client cannot tell a MAC failure from a padding failure.
    pub fn user_message(&self) -> String {
        match self {
            RecordError::Corrupted { .. }
            | RecordError::AuthenticationFailed { .. }
            | RecordError::InvalidPadding { .. } => UNREADABLE_MESSAGE.to_string(),
            RecordError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                "record not found".to_string()
            }
            RecordError::Io { .. } => "record could not be accessed".to_string(),
            RecordError::KeyAccess(_) => "keys unavailable".to_string(),
        }
    }

    /// Replace the context carried by this error.
    #[must_use]
    pub fn with_context(self, context: RecordContext) -> Self {
        match self {
            RecordError::Corrupted { reason, .. } => RecordError::Corrupted { reason, context },
            RecordError::AuthenticationFailed { .. } => RecordError::AuthenticationFailed { context },
            RecordError::InvalidPadding { .. } => RecordError::InvalidPadding { context },
            RecordError::Io { source, .. } => RecordError::Io { source, context },
            other @ RecordError::KeyAccess(_) => other,
        }
    }

    fn from_crypto(err: CryptoError, context: RecordContext) -> Self {
        match err {
            CryptoError::KeyAccess(e) => RecordError::KeyAccess(e),
            other => RecordError::Corrupted {
                reason: other.to_string(),
                context,
            },
        }
    }
}

/// Encrypts and authenticates records under a principal's [`DataKeys`].
///
/// The cryptor shares the keys rather than owning them; it stays usable for
/// as long as the session holding the `Arc` keeps it alive. `save` and `load`
/// may run concurrently on different paths. Concurrent access to the *same*
/// path must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct RecordCryptor {
    keys: Arc<DataKeys>,
}

impl RecordCryptor {
    pub fn new(keys: Arc<DataKeys>) -> Self {
        Self { keys }
    }

    /// The keys this cryptor encrypts under.
    pub fn keys(&self) -> &Arc<DataKeys> {
        &self.keys
    }

    fn compute_mac(&self, iv: &[u8], ciphertext: &[u8]) -> Result<hmac::Tag, KeyAccessError> {
        self.keys.with_mac_key(|key| {
            let key = hmac::Key::new(hmac::HMAC_SHA256, key);
            let mut ctx = hmac::Context::with_key(&key);
            ctx.update(iv);
            ctx.update(ciphertext);
            ctx.sign()
        })
    }

    /// Encrypt and authenticate `plaintext` in memory.
    ///
    /// Every call draws a fresh IV, so sealing the same plaintext twice
    /// yields different records.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, RecordError> {
        // 1..=BLOCK_SIZE, so the cast cannot truncate
        #[allow(clippy::cast_possible_truncation)]
        let pad_len = (BLOCK_SIZE - plaintext.len() % BLOCK_SIZE) as u8;

        let mut padded = Zeroizing::new(Vec::with_capacity(plaintext.len() + BLOCK_SIZE));
        padded.extend_from_slice(plaintext);
        padded.resize(plaintext.len() + usize::from(pad_len), pad_len);

        self.seal_padded(&padded)
    }

    /// Encrypt an already block-aligned buffer and prepend `MAC ‖ IV`.
    fn seal_padded(&self, padded: &[u8]) -> Result<Vec<u8>, RecordError> {
        let iv = random_iv();
        let ciphertext = self
            .keys
            .with_encryption_key(|key| cbc_encrypt(key, &iv, padded))?
            .map_err(|e| RecordError::from_crypto(e, RecordContext::new()))?;
        let mac = self.compute_mac(&iv, &ciphertext)?;

        let mut record = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        record.extend_from_slice(mac.as_ref());
        record.extend_from_slice(&iv);
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    /// Authenticate and decrypt a record held in memory.
    pub fn open(&self, record: &[u8]) -> Result<Vec<u8>, RecordError> {
        self.open_with_context(record, RecordContext::new())
    }

    fn open_with_context(&self, record: &[u8], context: RecordContext) -> Result<Vec<u8>, RecordError> {
        let Some((stored_mac, rest)) = record.split_first_chunk::<MAC_SIZE>() else {
            return Err(short_record(record.len(), context));
        };
        let Some((iv, ciphertext)) = rest.split_first_chunk::<BLOCK_SIZE>() else {
            return Err(short_record(record.len(), context));
        };
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(RecordError::Corrupted {
                reason: format!(
                    "ciphertext of {} bytes is not a multiple of the {BLOCK_SIZE}-byte block size",
                    ciphertext.len()
                ),
                context,
            });
        }

        let expected_mac = self.compute_mac(iv, ciphertext)?;
        if !bool::from(expected_mac.as_ref().ct_eq(stored_mac.as_slice())) {
            debug!(%context, "record MAC mismatch");
            return Err(RecordError::AuthenticationFailed { context });
        }

        let mut padded = Zeroizing::new(
            self.keys
                .with_encryption_key(|key| cbc_decrypt(key, iv, ciphertext))?
                .map_err(|e| RecordError::from_crypto(e, context.clone()))?,
        );

        let Some(plaintext_len) = unpadded_len(&padded) else {
            debug!(%context, "authenticated record has invalid padding");
            return Err(RecordError::InvalidPadding { context });
        };
        padded.truncate(plaintext_len);

        trace!(len = plaintext_len, "opened record");
        Ok(padded.to_vec())
    }

    /// Encrypt `plaintext` and write it to `path`, replacing any existing file.
    #[instrument(level = "debug", skip(self, plaintext), fields(path = %path.display(), len = plaintext.len()))]
    pub fn save(&self, path: &Path, plaintext: &[u8]) -> Result<(), RecordError> {
        let record = self
            .seal(plaintext)
            .map_err(|e| e.with_context(RecordContext::new().with_path(path)))?;
        write_atomic(path, &record).map_err(|source| RecordError::Io {
            source,
            context: RecordContext::new().with_path(path),
        })?;
        debug!(size = record.len(), "saved record");
        Ok(())
    }

    /// Read the record at `path`, verify it and return the plaintext.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn load(&self, path: &Path) -> Result<Vec<u8>, RecordError> {
        let context = RecordContext::new().with_path(path);
        let record = fs::read(path).map_err(|source| RecordError::Io {
            source,
            context: context.clone(),
        })?;
        self.open_with_context(&record, context)
    }
}

fn short_record(len: usize, context: RecordContext) -> RecordError {
    RecordError::Corrupted {
        reason: format!("record is {len} bytes, shorter than the {HEADER_SIZE}-byte header"),
        context,
    }
}

/// Length of the plaintext inside a decrypted, padded buffer, or `None` if
/// the padding is malformed.
///
/// The pad length is bounded by the cipher's block size, not by the MAC's
/// internal block size.
fn unpadded_len(padded: &[u8]) -> Option<usize> {
    let pad_len = usize::from(*padded.last()?);
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > padded.len() {
        return None;
    }
    let (plaintext, padding) = padded.split_at(padded.len() - pad_len);
    padding
        .iter()
        .all(|&b| usize::from(b) == pad_len)
        .then_some(plaintext.len())
}
