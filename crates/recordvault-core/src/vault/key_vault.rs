#![forbid(unsafe_code)]

//! Password-protected storage of a principal's data keys.
//!
//! The private directory holds three files:
//!
//! ```text
//! salts         hex salts, one per line (cipher, then password)
//! passwordhash  hex scrypt(password, password salt), login pre-check only
//! keys          one hex line per key slot: IV ‖ AES-256-CBC(KEK, key)
//! ```
//!
//! The KEK is scrypt(password, cipher salt) and is never written to disk.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::crypto::block::{BLOCK_SIZE, cbc_decrypt, cbc_encrypt, random_iv};
use crate::crypto::kdf::{DERIVED_KEY_SIZE, KdfParams};
use crate::crypto::keys::{DataKeys, KEY_SIZE, KeyAccessError, KeySlot};
use crate::crypto::CryptoError;
use crate::fs::atomic::write_atomic;
use crate::vault::salts::{DEFAULT_SALT_SIZE, MIN_SALT_SIZE, SaltError, SaltSlot, SaltStore};

/// File name of the salts inside the private directory.
pub const SALTS_FILE: &str = "salts";
/// File name of the login pre-check digest.
pub const PASSWORD_HASH_FILE: &str = "passwordhash";
/// File name of the encrypted data keys.
pub const KEYS_FILE: &str = "keys";

type Kek = SecretBox<[u8; DERIVED_KEY_SIZE]>;

/// Errors from key vault operations.
#[derive(Error, Debug)]
pub enum KeyVaultError {
    /// A one-shot operation ran twice: sign-up for an existing principal,
    /// or sign-up/login on an already unlocked instance.
    #[error("Already loaded: {0}")]
    AlreadyLoaded(&'static str),

    /// The password does not match the stored pre-check digest.
    #[error("Wrong password")]
    WrongPassword,

    /// A file in the private directory is missing, short or malformed.
    #[error("Private state corrupted: {reason}")]
    PrivateStateCorrupted { reason: String },

    /// Keys were requested before `sign_up` or `login`.
    #[error("Key vault is locked")]
    Locked,

    /// The vault parameters are unusable, e.g. salts shorter than the minimum.
    #[error("Invalid vault layout: {reason}")]
    InvalidLayout { reason: String },

    /// Key derivation or key handling failed.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Creating or writing the private state failed.
    #[error("IO error at {path:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

impl From<KeyAccessError> for KeyVaultError {
    fn from(err: KeyAccessError) -> Self {
        KeyVaultError::Crypto(CryptoError::KeyAccess(err))
    }
}

impl From<SaltError> for KeyVaultError {
    fn from(err: SaltError) -> Self {
        match err {
            SaltError::AlreadyLoaded => KeyVaultError::AlreadyLoaded("salts already loaded"),
            SaltError::Corrupted { reason } => KeyVaultError::PrivateStateCorrupted {
                reason: format!("salts: {reason}"),
            },
            SaltError::Io { source, path } => KeyVaultError::Io { source, path },
        }
    }
}

fn corrupted(reason: impl Into<String>) -> KeyVaultError {
    KeyVaultError::PrivateStateCorrupted {
        reason: reason.into(),
    }
}

/// Per-principal vault parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultLayout {
    /// Size of each salt in bytes.
    pub salt_size: usize,
    /// scrypt parameters for both the pre-check and the KEK.
    pub kdf: KdfParams,
}

impl Default for VaultLayout {
    fn default() -> Self {
        Self {
            salt_size: DEFAULT_SALT_SIZE,
            kdf: KdfParams::default(),
        }
    }
}

impl VaultLayout {
    #[must_use]
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Reject salt sizes below [`MIN_SALT_SIZE`] and invalid scrypt parameters.
    pub fn validate(&self) -> Result<(), KeyVaultError> {
        if self.salt_size < MIN_SALT_SIZE {
            return Err(KeyVaultError::InvalidLayout {
                reason: format!(
                    "salt size {} is below the {MIN_SALT_SIZE}-byte minimum",
                    self.salt_size
                ),
            });
        }
        self.kdf.validate()?;
        Ok(())
    }
}

/// A principal's key-encrypting key and the data keys it protects.
///
/// A vault starts locked. [`sign_up`](Self::sign_up) or
/// [`login`](Self::login) unlocks it for the rest of the instance's life;
/// there is no way to lock it again or log in a second time.
///
/// Every method that takes a password runs scrypt and blocks for tens to
/// hundreds of milliseconds. Callers must serialize
/// `sign_up`/`login`/`change_password` per principal.
pub struct KeyVault {
    private_dir: PathBuf,
    layout: VaultLayout,
    salts: Option<SaltStore>,
    kek: Option<Kek>,
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("private_dir", &self.private_dir)
            .field("layout", &self.layout)
            .field("unlocked", &self.is_unlocked())
            .finish_non_exhaustive()
    }
}

impl KeyVault {
    /// A locked vault over `private_dir`. Performs no I/O.
    ///
    /// The layout is checked by `sign_up` and `login`.
    pub fn new(private_dir: impl Into<PathBuf>, layout: VaultLayout) -> Self {
        Self {
            private_dir: private_dir.into(),
            layout,
            salts: None,
            kek: None,
        }
    }

    pub fn private_dir(&self) -> &Path {
        &self.private_dir
    }

    pub fn layout(&self) -> &VaultLayout {
        &self.layout
    }

    pub fn is_unlocked(&self) -> bool {
        self.kek.is_some()
    }

    /// Whether the private directory exists.
    ///
    /// An existing but unreadable directory still counts; `login` reports
    /// what is wrong with it.
    pub fn has_signed_up(&self) -> bool {
        self.private_dir.exists()
    }

    fn file(&self, name: &str) -> PathBuf {
        self.private_dir.join(name)
    }

    fn io_error(source: io::Error, path: PathBuf) -> KeyVaultError {
        KeyVaultError::Io { source, path }
    }

    fn salt_store(&self) -> SaltStore {
        SaltStore::for_slots(self.file(SALTS_FILE), self.layout.salt_size)
    }

    fn loaded_salts(&self) -> Result<&SaltStore, KeyVaultError> {
        self.salts.as_ref().ok_or(KeyVaultError::Locked)
    }

    /// Create the principal: salts, pre-check digest and fresh data keys.
    ///
    /// Creating the private directory acts as the sign-up lock: if it
    /// already exists this fails with `AlreadyLoaded` and touches nothing.
    /// If a later step fails the directory is removed again.
    #[instrument(level = "debug", skip(self, password), fields(dir = %self.private_dir.display()))]
    pub fn sign_up(&mut self, password: &str) -> Result<(), KeyVaultError> {
        if self.is_unlocked() {
            return Err(KeyVaultError::AlreadyLoaded("vault already unlocked"));
        }
        self.layout.validate()?;

        if let Some(parent) = self.private_dir.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(e, parent.to_path_buf()))?;
        }
        match fs::create_dir(&self.private_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(KeyVaultError::AlreadyLoaded("principal already signed up"));
            }
            Err(e) => return Err(Self::io_error(e, self.private_dir.clone())),
        }

        match self.initialize(password) {
            Ok((salts, kek)) => {
                self.salts = Some(salts);
                self.kek = Some(kek);
                debug!("signed up");
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&self.private_dir) {
                    warn!(error = %cleanup, "failed to remove partial private directory");
                }
                Err(e)
            }
        }
    }

    fn initialize(&self, password: &str) -> Result<(SaltStore, Kek), KeyVaultError> {
        let mut salts = self.salt_store();
        salts.generate()?;

        let check = self.layout.kdf.derive(password, salts.slot(SaltSlot::Password))?;
        let path = self.file(PASSWORD_HASH_FILE);
        write_atomic(&path, hex::encode(check.expose_secret()).as_bytes())
            .map_err(|e| Self::io_error(e, path))?;

        let keys = DataKeys::random()?;
        let kek = self.layout.kdf.derive(password, salts.slot(SaltSlot::Cipher))?;
        self.write_envelope(&kek, &keys)?;
        Ok((salts, kek))
    }

    /// Unlock an existing principal.
    ///
    /// The password is first checked against the stored digest; a missing
    /// or unreadable digest is `PrivateStateCorrupted`, never a pass.
    #[instrument(level = "debug", skip(self, password), fields(dir = %self.private_dir.display()))]
    pub fn login(&mut self, password: &str) -> Result<(), KeyVaultError> {
        if self.is_unlocked() {
            return Err(KeyVaultError::AlreadyLoaded("vault already unlocked"));
        }
        self.layout.validate()?;
        let mut salts = self.salt_store();
        salts.load()?;

        let stored = self.read_password_check()?;
        let candidate = self.layout.kdf.derive(password, salts.slot(SaltSlot::Password))?;
        if !bool::from(candidate.expose_secret()[..].ct_eq(&stored[..])) {
            debug!("password pre-check failed");
            return Err(KeyVaultError::WrongPassword);
        }

        self.kek = Some(self.layout.kdf.derive(password, salts.slot(SaltSlot::Cipher))?);
        self.salts = Some(salts);
        debug!("logged in");
        Ok(())
    }

    fn read_password_check(&self) -> Result<Zeroizing<Vec<u8>>, KeyVaultError> {
        let path = self.file(PASSWORD_HASH_FILE);
        let contents = fs::read_to_string(&path)
            .map_err(|e| corrupted(format!("cannot read password check {:?}: {e}", path.display())))?;
        let digest = Zeroizing::new(
            hex::decode(contents.trim())
                .map_err(|e| corrupted(format!("password check is not valid hex: {e}")))?,
        );
        if digest.len() != DERIVED_KEY_SIZE {
            return Err(corrupted(format!(
                "password check is {} bytes, expected {DERIVED_KEY_SIZE}",
                digest.len()
            )));
        }
        Ok(digest)
    }

    /// Decrypt the data keys. May be called any number of times once unlocked.
    #[instrument(level = "debug", skip(self), fields(dir = %self.private_dir.display()))]
    pub fn load_keys(&self) -> Result<DataKeys, KeyVaultError> {
        let kek = self.kek.as_ref().ok_or(KeyVaultError::Locked)?;
        let path = self.file(KEYS_FILE);
        let contents = fs::read_to_string(&path)
            .map_err(|e| corrupted(format!("cannot read keys {:?}: {e}", path.display())))?;
        decode_envelope(kek.expose_secret(), &contents)
    }

    /// Re-encrypt the data keys under a KEK derived from `new_password`.
    ///
    /// The data keys themselves, and therefore every record, are unchanged.
    /// The cipher salt is reused. The key envelope and the pre-check digest
    /// are each replaced atomically, envelope first. A crash between the two
    /// writes leaves the old password's digest beside the new envelope: the
    /// new password fails the pre-check, and the old one unwraps keys under
    /// which every record fails authentication.
    #[instrument(level = "debug", skip(self, new_password), fields(dir = %self.private_dir.display()))]
    pub fn change_password(&mut self, new_password: &str) -> Result<(), KeyVaultError> {
        let keys = self.load_keys()?;
        let salts = self.loaded_salts()?;

        let new_kek = self.layout.kdf.derive(new_password, salts.slot(SaltSlot::Cipher))?;
        let new_check = self.layout.kdf.derive(new_password, salts.slot(SaltSlot::Password))?;

        self.write_envelope(&new_kek, &keys)?;
        let path = self.file(PASSWORD_HASH_FILE);
        write_atomic(&path, hex::encode(new_check.expose_secret()).as_bytes())
            .map_err(|e| Self::io_error(e, path))?;

        self.kek = Some(new_kek);
        debug!("password changed");
        Ok(())
    }

    fn write_envelope(&self, kek: &Kek, keys: &DataKeys) -> Result<(), KeyVaultError> {
        let contents = encode_envelope(kek.expose_secret(), keys)?;
        let path = self.file(KEYS_FILE);
        write_atomic(&path, contents.as_bytes()).map_err(|e| Self::io_error(e, path))
    }

    /// Permanently delete the private directory.
    ///
    /// Every record encrypted under this principal's keys becomes
    /// unrecoverable. Deleting a principal that does not exist succeeds.
    #[instrument(level = "debug", skip(self), fields(dir = %self.private_dir.display()))]
    pub fn destroy(self) -> Result<(), KeyVaultError> {
        match fs::remove_dir_all(&self.private_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(e, self.private_dir.clone())),
        }
    }
}

/// One hex line per slot in [`KeySlot::ALL`] order, each `IV ‖ CBC(kek, key)`.
fn encode_envelope(kek: &[u8; DERIVED_KEY_SIZE], keys: &DataKeys) -> Result<String, KeyVaultError> {
    let mut contents = String::with_capacity(KeySlot::COUNT * ((BLOCK_SIZE + KEY_SIZE) * 2 + 1));
    for slot in KeySlot::ALL {
        let iv = random_iv();
        let ciphertext = keys.with_key(slot, |key| cbc_encrypt(kek, &iv, key))??;

        let mut entry = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        entry.extend_from_slice(&iv);
        entry.extend_from_slice(&ciphertext);
        contents.push_str(&hex::encode(entry));
        contents.push('\n');
    }
    Ok(contents)
}

fn decode_envelope(kek: &[u8; DERIVED_KEY_SIZE], contents: &str) -> Result<DataKeys, KeyVaultError> {
    let mut lines = contents.lines();
    let mut slots = Zeroizing::new([[0u8; KEY_SIZE]; KeySlot::COUNT]);

    for (index, slot) in KeySlot::ALL.into_iter().enumerate() {
        let line = lines
            .next()
            .ok_or_else(|| corrupted(format!("keys file is missing the {slot} key")))?;
        let entry =
            hex::decode(line).map_err(|e| corrupted(format!("{slot} key is not valid hex: {e}")))?;
        let Some((iv, ciphertext)) = entry.split_first_chunk::<BLOCK_SIZE>() else {
            return Err(corrupted(format!("{slot} key entry is {} bytes", entry.len())));
        };

        let decrypted = Zeroizing::new(
            cbc_decrypt(kek, iv, ciphertext).map_err(|e| corrupted(format!("{slot} key: {e}")))?,
        );
        if decrypted.len() != KEY_SIZE {
            return Err(corrupted(format!(
                "{slot} key decrypts to {} bytes, expected {KEY_SIZE}",
                decrypted.len()
            )));
        }
        slots[index].copy_from_slice(&decrypted);
    }
    if lines.next().is_some() {
        return Err(corrupted("trailing data in keys file"));
    }

    Ok(DataKeys::from_slots(*slots)?)
}
