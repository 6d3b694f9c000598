#![forbid(unsafe_code)]

//! A principal's record area: a key vault plus the records it protects.
//!
//! ```text
//! <root>/
//!   secrets/   key vault private directory
//!   data/      encrypted records, addressed by confined relative names
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::fs::path::confine;
use crate::fs::record::{RecordContext, RecordCryptor, RecordError};
use crate::vault::key_vault::{KeyVault, KeyVaultError, VaultLayout};

/// Directory under the root holding encrypted records.
pub const DATA_DIR: &str = "data";
/// Directory under the root holding the key vault.
pub const SECRETS_DIR: &str = "secrets";

/// Errors from record store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record operation ran before `sign_up` or `login`.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The record name confines to the data directory itself.
    #[error("Invalid record name {name:?}")]
    InvalidName { name: String },

    #[error(transparent)]
    Vault(#[from] KeyVaultError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("IO error at {path:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Records of one principal, encrypted under keys held by its [`KeyVault`].
///
/// Every record name goes through [`confine`], so no name can address a
/// file outside `<root>/data`.
#[derive(Debug)]
pub struct RecordStore {
    root: PathBuf,
    data_dir: PathBuf,
    vault: KeyVault,
    cryptor: Option<RecordCryptor>,
}

impl RecordStore {
    /// A locked store rooted at `root`. Performs no I/O.
    pub fn new(root: impl Into<PathBuf>, layout: VaultLayout) -> Self {
        let root = root.into();
        let data_dir = root.join(DATA_DIR);
        let vault = KeyVault::new(root.join(SECRETS_DIR), layout);
        Self {
            root,
            data_dir,
            vault,
            cryptor: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    pub fn has_signed_up(&self) -> bool {
        self.vault.has_signed_up()
    }

    pub fn is_authenticated(&self) -> bool {
        self.cryptor.is_some()
    }

    /// The cryptor for this principal's records.
    pub fn cryptor(&self) -> Result<&RecordCryptor, StoreError> {
        self.cryptor.as_ref().ok_or(StoreError::NotAuthenticated)
    }

    /// Create the principal and unlock the store.
    ///
    /// The store is unlocked before the data directory is created, so a
    /// failure to create it leaves an authenticated store; `save` creates
    /// missing directories again.
    #[instrument(level = "debug", skip(self, password), fields(root = %self.root.display()))]
    pub fn sign_up(&mut self, password: &str) -> Result<(), StoreError> {
        self.vault.sign_up(password)?;
        self.unlock()?;
        fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::Io {
            source,
            path: self.data_dir.clone(),
        })
    }

    /// Unlock an existing principal.
    #[instrument(level = "debug", skip(self, password), fields(root = %self.root.display()))]
    pub fn login(&mut self, password: &str) -> Result<(), StoreError> {
        self.vault.login(password)?;
        self.unlock()
    }

    /// Change the password. Existing records stay readable.
    pub fn change_password(&mut self, new_password: &str) -> Result<(), StoreError> {
        self.vault.change_password(new_password)?;
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), StoreError> {
        let keys = self.vault.load_keys()?;
        self.cryptor = Some(RecordCryptor::new(Arc::new(keys)));
        debug!("record store unlocked");
        Ok(())
    }

    /// The on-disk location of the record `name`.
    pub fn record_path(&self, name: &str) -> PathBuf {
        confine(&self.data_dir, name)
    }

    fn checked_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let path = self.record_path(name);
        if path == self.data_dir {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(path)
    }

    fn context(name: &str, path: &Path) -> RecordContext {
        RecordContext::new().with_name(name).with_path(path)
    }

    /// Encrypt `plaintext` into the record `name`, creating parent
    /// directories as needed and replacing any existing record.
    pub fn save(&self, name: &str, plaintext: &[u8]) -> Result<(), StoreError> {
        let cryptor = self.cryptor()?;
        let path = self.checked_path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                source,
                path: parent.to_path_buf(),
            })?;
        }
        cryptor
            .save(&path, plaintext)
            .map_err(|e| e.with_context(Self::context(name, &path)))?;
        Ok(())
    }

    /// Decrypt the record `name`.
    pub fn load(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let cryptor = self.cryptor()?;
        let path = self.checked_path(name)?;
        Ok(cryptor
            .load(&path)
            .map_err(|e| e.with_context(Self::context(name, &path)))?)
    }

    /// Whether a record file exists for `name`.
    pub fn exists(&self, name: &str) -> bool {
        self.checked_path(name).is_ok_and(|path| path.is_file())
    }

    /// Delete the record `name`.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.cryptor()?;
        let path = self.checked_path(name)?;
        fs::remove_file(&path).map_err(|source| {
            StoreError::Record(RecordError::Io {
                source,
                context: Self::context(name, &path),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use tempfile::TempDir;

    fn layout() -> VaultLayout {
        VaultLayout::default().with_kdf(KdfParams::fast())
    }

    fn signed_up(dir: &TempDir) -> RecordStore {
        let mut store = RecordStore::new(dir.path().join("alice"), layout());
        store.sign_up("correct-horse").unwrap();
        store
    }

    #[test]
    fn test_sign_up_unlocks_even_if_data_dir_cannot_be_created() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("alice");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(DATA_DIR), b"in the way").unwrap();

        let mut store = RecordStore::new(&root, layout());
        assert!(matches!(store.sign_up("correct-horse"), Err(StoreError::Io { .. })));
        assert!(store.has_signed_up());
        assert!(store.is_authenticated());
        assert!(store.cryptor().is_ok());

        fs::remove_file(root.join(DATA_DIR)).unwrap();
        store.save("note", b"after recovery").unwrap();
        assert_eq!(store.load("note").unwrap(), b"after recovery");
    }

    #[test]
    fn test_operations_require_authentication() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().join("alice"), layout());
        assert!(matches!(store.save("note", b"x"), Err(StoreError::NotAuthenticated)));
        assert!(matches!(store.load("note"), Err(StoreError::NotAuthenticated)));
        assert!(matches!(store.remove("note"), Err(StoreError::NotAuthenticated)));
        assert!(matches!(store.cryptor(), Err(StoreError::NotAuthenticated)));
    }

    #[test]
    fn test_save_load_across_sessions() {
        let dir = TempDir::new().unwrap();
        let store = signed_up(&dir);
        store.save("2024/03/payments", b"[]").unwrap();
        assert!(store.exists("2024/03/payments"));
        drop(store);

        let mut store = RecordStore::new(dir.path().join("alice"), layout());
        store.login("correct-horse").unwrap();
        assert_eq!(store.load("2024/03/payments").unwrap(), b"[]");
    }

    #[test]
    fn test_names_are_confined_to_data_dir() {
        let dir = TempDir::new().unwrap();
        let store = signed_up(&dir);
        store.save("../../secrets/keys", b"overwrite?").unwrap();

        let expected = dir.path().join("alice").join(DATA_DIR).join("secrets/keys");
        assert_eq!(store.record_path("../../secrets/keys"), expected);
        assert!(expected.is_file());

        // the vault itself is untouched
        let mut again = RecordStore::new(dir.path().join("alice"), layout());
        again.login("correct-horse").unwrap();
        assert_eq!(again.load("/secrets/keys").unwrap(), b"overwrite?");
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = signed_up(&dir);
        for name in ["", "/", "..", "./."] {
            assert!(matches!(store.save(name, b"x"), Err(StoreError::InvalidName { .. })));
            assert!(!store.exists(name));
        }
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = signed_up(&dir);
        store.save("note", b"hello").unwrap();
        store.remove("note").unwrap();
        assert!(!store.exists("note"));
        assert!(matches!(
            store.remove("note"),
            Err(StoreError::Record(RecordError::Io { .. }))
        ));
    }

    #[test]
    fn test_tampered_record_reports_name() {
        let dir = TempDir::new().unwrap();
        let store = signed_up(&dir);
        store.save("note", b"hello").unwrap();

        let path = store.record_path("note");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        match store.load("note") {
            Err(StoreError::Record(err @ RecordError::AuthenticationFailed { .. })) => {
                assert!(err.to_string().contains("record 'note'"));
            }
            other => panic!("expected AuthenticationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_change_password_keeps_records_readable() {
        let dir = TempDir::new().unwrap();
        let mut store = signed_up(&dir);
        store.save("note", b"hello").unwrap();
        store.change_password("battery-staple").unwrap();
        assert_eq!(store.load("note").unwrap(), b"hello");

        let mut fresh = RecordStore::new(dir.path().join("alice"), layout());
        fresh.login("battery-staple").unwrap();
        assert_eq!(fresh.load("note").unwrap(), b"hello");
    }

    #[test]
    fn test_wrong_password_does_not_unlock() {
        let dir = TempDir::new().unwrap();
        signed_up(&dir);
        let mut store = RecordStore::new(dir.path().join("alice"), layout());
        assert!(matches!(
            store.login("wrong"),
            Err(StoreError::Vault(KeyVaultError::WrongPassword))
        ));
        assert!(!store.is_authenticated());
    }
}
