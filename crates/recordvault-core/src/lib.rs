//! Password-protected, tamper-evident record storage.
//!
//! A principal's password unlocks a [`KeyVault`], which yields the
//! [`DataKeys`] a [`RecordCryptor`] encrypts records under. Record names are
//! confined below a root directory with [`confine`], and [`TokenCodec`]
//! signs session claims for the client to carry.

pub mod crypto;
pub mod error;
pub mod fs;
pub mod session;
pub mod vault;

pub use crypto::{DataKeys, KdfParams, KeySlot};
pub use fs::{RecordCryptor, confine};
pub use session::{SessionClaims, Sessions, TokenCodec};
pub use vault::{KeyVault, RecordStore, SaltStore, VaultLayout};
