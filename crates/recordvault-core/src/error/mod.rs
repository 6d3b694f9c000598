//! Error types for the core crate
//!
//! This module re-exports every error type and its context structure so
//! callers can match on them from one place.

pub use crate::crypto::{CryptoError, KeyAccessError};
pub use crate::fs::record::{RecordContext, RecordError};
pub use crate::session::{SessionError, TokenError};
pub use crate::vault::{KeyVaultError, SaltError, StoreError};
