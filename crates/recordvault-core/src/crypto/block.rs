#![forbid(unsafe_code)]

//! AES-256 in CBC mode over block-aligned buffers.
//!
//! Padding is deliberately not handled here: key envelopes hold exactly two
//! blocks and need none, while records apply and verify their own padding so
//! that the padding check can be reported separately from a MAC failure.

use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use rand::RngCore;

use super::CryptoError;

/// The cipher's native block size (AES, 128-bit blocks).
pub const BLOCK_SIZE: usize = 16;

/// Key size for AES-256.
pub const CIPHER_KEY_SIZE: usize = 32;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Generate a fresh random IV. Called once per encryption; IVs are never reused.
pub fn random_iv() -> [u8; BLOCK_SIZE] {
    let mut iv = [0u8; BLOCK_SIZE];
    rand::rng().fill_bytes(&mut iv);
    iv
}

fn check_aligned(len: usize) -> Result<(), CryptoError> {
    if len % BLOCK_SIZE == 0 {
        Ok(())
    } else {
        Err(CryptoError::UnalignedInput {
            len,
            block_size: BLOCK_SIZE,
        })
    }
}

/// Encrypt block-aligned `plaintext` with AES-256-CBC.
pub fn cbc_encrypt(
    key: &[u8; CIPHER_KEY_SIZE],
    iv: &[u8; BLOCK_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_aligned(plaintext.len())?;
    Ok(Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<NoPadding>(plaintext))
}

/// Decrypt block-aligned `ciphertext` with AES-256-CBC.
pub fn cbc_decrypt(
    key: &[u8; CIPHER_KEY_SIZE],
    iv: &[u8; BLOCK_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_aligned(ciphertext.len())?;
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::UnalignedInput {
            len: ciphertext.len(),
            block_size: BLOCK_SIZE,
        })
}
