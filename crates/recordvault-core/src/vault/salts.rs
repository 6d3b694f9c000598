#![forbid(unsafe_code)]

//! Per-principal salts, persisted in cleartext.
//!
//! The salts file holds one lowercase hex line per salt, in slot order.
//! Salts are not secret; they only need to be unique per principal, so they
//! are generated once at sign-up and never rewritten.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::fs::atomic::write_atomic;

/// Smallest salt the store accepts, in bytes.
pub const MIN_SALT_SIZE: usize = 16;

/// Salt size used for new principals, in bytes.
pub const DEFAULT_SALT_SIZE: usize = 32;

/// The named salts a key vault uses, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaltSlot {
    /// Salt for the key-encrypting key.
    Cipher,
    /// Salt for the login pre-check digest.
    Password,
}

impl SaltSlot {
    /// Number of slots.
    pub const COUNT: usize = 2;

    /// All slots in file order.
    pub const ALL: [SaltSlot; Self::COUNT] = [SaltSlot::Cipher, SaltSlot::Password];

    /// Line index of this slot in the salts file.
    pub fn index(self) -> usize {
        match self {
            SaltSlot::Cipher => 0,
            SaltSlot::Password => 1,
        }
    }
}

/// Errors from generating or loading salts.
#[derive(Error, Debug)]
pub enum SaltError {
    /// Salts were already generated or loaded on this instance.
    #[error("Salts already loaded")]
    AlreadyLoaded,

    /// The salts file is missing or malformed.
    #[error("Corrupted salts file: {reason}")]
    Corrupted { reason: String },

    /// The salts file could not be written.
    #[error("IO error writing salts file {path:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Generates, persists and loads a fixed number of fixed-size salts.
///
/// An instance is one-shot: once it holds salts, through either
/// [`generate`](Self::generate) or [`load`](Self::load), both operations
/// fail with [`SaltError::AlreadyLoaded`]. There is no cross-process
/// locking; sign-up for a principal must be externally exclusive.
pub struct SaltStore {
    path: PathBuf,
    count: usize,
    size: usize,
    salts: Vec<Vec<u8>>,
}

impl fmt::Debug for SaltStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaltStore")
            .field("path", &self.path)
            .field("count", &self.count)
            .field("size", &self.size)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl SaltStore {
    /// A store for `count` salts of `size` bytes each, persisted at `path`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or `size` is below [`MIN_SALT_SIZE`].
    pub fn new(path: impl Into<PathBuf>, count: usize, size: usize) -> Self {
        assert!(count > 0, "salt count must be positive");
        assert!(
            size >= MIN_SALT_SIZE,
            "salt size {size} is below the {MIN_SALT_SIZE}-byte minimum"
        );
        Self {
            path: path.into(),
            count,
            size,
            salts: Vec::new(),
        }
    }

    /// A store with one salt per [`SaltSlot`].
    pub fn for_slots(path: impl Into<PathBuf>, size: usize) -> Self {
        Self::new(path, SaltSlot::COUNT, size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        !self.salts.is_empty()
    }

    /// Create fresh random salts, write them to disk and keep them resident.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display(), count = self.count))]
    pub fn generate(&mut self) -> Result<(), SaltError> {
        if self.is_loaded() {
            return Err(SaltError::AlreadyLoaded);
        }

        let mut rng = rand::rng();
        let salts: Vec<Vec<u8>> = (0..self.count)
            .map(|_| {
                let mut salt = vec![0u8; self.size];
                rng.fill_bytes(&mut salt);
                salt
            })
            .collect();

        let mut contents = String::with_capacity(self.count * (self.size * 2 + 1));
        for salt in &salts {
            contents.push_str(&hex::encode(salt));
            contents.push('\n');
        }
        write_atomic(&self.path, contents.as_bytes()).map_err(|source| SaltError::Io {
            source,
            path: self.path.clone(),
        })?;

        self.salts = salts;
        debug!("generated salts");
        Ok(())
    }

    /// Read the persisted salts into memory.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&mut self) -> Result<(), SaltError> {
        if self.is_loaded() {
            return Err(SaltError::AlreadyLoaded);
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| SaltError::Corrupted {
            reason: format!("cannot read {:?}: {e}", self.path.display()),
        })?;

        let mut lines = contents.lines();
        let mut salts = Vec::with_capacity(self.count);
        for index in 0..self.count {
            let line = lines.next().ok_or_else(|| SaltError::Corrupted {
                reason: format!("expected {} salts, found {index}", self.count),
            })?;
            let salt = hex::decode(line).map_err(|e| SaltError::Corrupted {
                reason: format!("salt #{index} is not valid hex: {e}"),
            })?;
            if salt.len() != self.size {
                return Err(SaltError::Corrupted {
                    reason: format!("salt #{index} is {} bytes, expected {}", salt.len(), self.size),
                });
            }
            salts.push(salt);
        }
        if lines.next().is_some() {
            return Err(SaltError::Corrupted {
                reason: format!("trailing data after {} salts", self.count),
            });
        }

        self.salts = salts;
        debug!("loaded salts");
        Ok(())
    }

    /// The salt at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the salts have not been generated or loaded, or if `index`
    /// is out of range. Both are programming errors.
    pub fn get(&self, index: usize) -> &[u8] {
        assert!(self.is_loaded(), "salts read before generate() or load()");
        assert!(
            index < self.count,
            "salt #{index} requested, only {} salts exist",
            self.count
        );
        &self.salts[index]
    }

    /// The salt for a named slot. See [`get`](Self::get) for panics.
    pub fn slot(&self, slot: SaltSlot) -> &[u8] {
        self.get(slot.index())
    }
}
