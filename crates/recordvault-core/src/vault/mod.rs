//! Per-principal secret state: salts, the key vault and the record store
//! built on top of it.

pub mod key_vault;
pub mod salts;
pub mod store;

pub use key_vault::{KeyVault, KeyVaultError, VaultLayout};
pub use salts::{SaltError, SaltSlot, SaltStore};
pub use store::{RecordStore, StoreError};
