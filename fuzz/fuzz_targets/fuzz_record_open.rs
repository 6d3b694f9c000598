//! Fuzz target for opening encrypted records
//!
//! Arbitrary bytes must never panic and never authenticate. A sealed record
//! with one flipped bit must be rejected.

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use hex_literal::hex;
use libfuzzer_sys::fuzz_target;
use recordvault_core::crypto::DataKeys;
use recordvault_core::fs::RecordCryptor;

fn fixed_cryptor() -> RecordCryptor {
    let keys = DataKeys::new(
        hex!("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"),
        hex!("202122232425262728292a2b2c2d2e2f303132333435363738393a3b3c3d3e3f"),
    )
    .expect("fixed keys");
    RecordCryptor::new(Arc::new(keys))
}

#[derive(Arbitrary, Debug)]
enum FuzzInput {
    /// Open arbitrary bytes as a record
    Raw(Vec<u8>),
    /// Seal a plaintext, flip one bit, then open
    FlipBit { plaintext: Vec<u8>, position: usize, bit: u8 },
}

fuzz_target!(|input: FuzzInput| {
    let cryptor = fixed_cryptor();

    match input {
        FuzzInput::Raw(data) => {
            if data.len() > 1024 * 1024 {
                return;
            }
            let err = cryptor.open(&data).expect_err("forged record authenticated");
            assert!(err.is_integrity_violation());
        }

        FuzzInput::FlipBit { plaintext, position, bit } => {
            if plaintext.len() > 64 * 1024 {
                return;
            }
            let mut record = cryptor.seal(&plaintext).expect("seal");
            assert_eq!(cryptor.open(&record).expect("roundtrip"), plaintext);

            let index = position % record.len();
            record[index] ^= 1 << (bit % 8);
            let err = cryptor.open(&record).expect_err("tampered record authenticated");
            assert!(err.is_integrity_violation());
        }
    }
});
