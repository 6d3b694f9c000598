//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use hex_literal::hex;
use recordvault_core::crypto::{DataKeys, KdfParams};
use recordvault_core::fs::RecordCryptor;
use recordvault_core::vault::VaultLayout;
use tempfile::TempDir;

pub const TEST_PASSWORD: &str = "correct-horse";

pub const ENCRYPTION_KEY: [u8; 32] =
    hex!("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4");
pub const MAC_KEY: [u8; 32] =
    hex!("2b7e151628aed2a6abf7158809cf4f3c762e7160f38b4da56a784d9045190cfe");

/// Weak scrypt parameters so tests that sign up stay fast.
pub fn fast_layout() -> VaultLayout {
    VaultLayout::default().with_kdf(KdfParams::fast())
}

/// Deterministic data keys.
pub fn fixed_keys() -> DataKeys {
    DataKeys::new(ENCRYPTION_KEY, MAC_KEY).unwrap()
}

pub fn fixed_cryptor() -> RecordCryptor {
    RecordCryptor::new(Arc::new(fixed_keys()))
}

pub fn temp_root() -> TempDir {
    TempDir::new().unwrap()
}

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
