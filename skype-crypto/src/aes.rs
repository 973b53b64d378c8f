//! AES-256 in counter mode, as used by the UIC handshake frames.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Outbound IV: all zeroes.
pub const IV_OUTBOUND: [u8; 16] = [0; 16];

/// Inbound IV: bytes 3 and 7 set to 1.
pub const IV_INBOUND: [u8; 16] = [0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];

/// XOR `buffer` in-place with the AES-256-CTR keystream.
///
/// The whole 16-byte IV is treated as a big-endian counter. Encryption and
/// decryption are the same operation.
pub fn ctr_apply(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 16]) {
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(buffer);
}
