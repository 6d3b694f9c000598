//! Round-trip and tamper-detection properties of encrypted records.

mod common;

use std::fs;
use std::sync::Arc;

use common::{fixed_cryptor, temp_root};
use proptest::prelude::*;
use recordvault_core::crypto::{BLOCK_SIZE, DataKeys};
use recordvault_core::fs::record::{HEADER_SIZE, MAC_SIZE, UNREADABLE_MESSAGE};
use recordvault_core::fs::{RecordCryptor, RecordError};

#[test]
fn test_block_boundary_lengths_roundtrip() {
    let cryptor = fixed_cryptor();
    for len in (0..=4 * BLOCK_SIZE + 1).chain([1024, 4096, 65_537]) {
        let plaintext = vec![0x5Au8; len];
        let record = cryptor.seal(&plaintext).unwrap();
        assert_eq!(record.len(), HEADER_SIZE + (len / BLOCK_SIZE + 1) * BLOCK_SIZE);
        assert_eq!(cryptor.open(&record).unwrap(), plaintext);
    }
}

#[test]
fn test_saved_file_layout() {
    let root = temp_root();
    let path = root.path().join("note");
    let cryptor = fixed_cryptor();
    cryptor.save(&path, b"hello").unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), MAC_SIZE + BLOCK_SIZE + BLOCK_SIZE);
    assert_eq!(cryptor.open(&bytes).unwrap(), b"hello");
}

#[test]
fn test_truncated_file_is_unreadable() {
    let root = temp_root();
    let path = root.path().join("note");
    let cryptor = fixed_cryptor();
    cryptor.save(&path, b"some longer content that spans blocks").unwrap();
    let bytes = fs::read(&path).unwrap();

    for cut in [1, BLOCK_SIZE, bytes.len() - HEADER_SIZE + 1, bytes.len()] {
        fs::write(&path, &bytes[..bytes.len() - cut]).unwrap();
        let err = cryptor.load(&path).unwrap_err();
        assert!(err.is_integrity_violation(), "cut {cut}: {err}");
        assert_eq!(err.user_message(), UNREADABLE_MESSAGE);
    }
}

#[test]
fn test_record_swapped_between_principals_is_rejected() {
    let alice = fixed_cryptor();
    let bob = RecordCryptor::new(Arc::new(DataKeys::random().unwrap()));
    let record = alice.seal(b"alice's data").unwrap();
    assert!(matches!(
        bob.open(&record),
        Err(RecordError::AuthenticationFailed { .. })
    ));
}

#[test]
fn test_shared_cryptor_across_threads() {
    let root = temp_root();
    let cryptor = Arc::new(fixed_cryptor());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cryptor = Arc::clone(&cryptor);
            let path = root.path().join(format!("record-{i}"));
            std::thread::spawn(move || {
                for round in 0..10 {
                    let data = format!("thread {i} round {round}").into_bytes();
                    cryptor.save(&path, &data).unwrap();
                    assert_eq!(cryptor.load(&path).unwrap(), data);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_seal_open_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let cryptor = fixed_cryptor();
        let record = cryptor.seal(&plaintext).unwrap();
        prop_assert_eq!(record.len() % BLOCK_SIZE, 0);
        prop_assert_eq!(cryptor.open(&record).unwrap(), plaintext);
    }

    #[test]
    fn prop_single_bit_flip_never_returns_plaintext(
        plaintext in proptest::collection::vec(any::<u8>(), 0..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let cryptor = fixed_cryptor();
        let mut record = cryptor.seal(&plaintext).unwrap();
        let index = position.index(record.len());
        record[index] ^= 1 << bit;

        let err = cryptor.open(&record).unwrap_err();
        prop_assert!(err.is_integrity_violation());
        let is_auth = matches!(err, RecordError::AuthenticationFailed { .. });
        prop_assert!(is_auth, "{err:?}");
    }

    #[test]
    fn prop_random_bytes_never_open(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let cryptor = fixed_cryptor();
        let err = cryptor.open(&bytes).unwrap_err();
        prop_assert!(err.is_integrity_violation());
    }

    #[test]
    fn prop_same_plaintext_never_repeats_ciphertext(plaintext in proptest::collection::vec(any::<u8>(), 0..64)) {
        let cryptor = fixed_cryptor();
        let a = cryptor.seal(&plaintext).unwrap();
        let b = cryptor.seal(&plaintext).unwrap();
        prop_assert_ne!(&a[MAC_SIZE..HEADER_SIZE], &b[MAC_SIZE..HEADER_SIZE]);
        prop_assert_eq!(cryptor.open(&a).unwrap(), cryptor.open(&b).unwrap());
    }
}
