//! Cryptographic primitives for the Skype notification protocol.
//!
//! Provides:
//! - AES-256-CTR keystream application
//! - SHA-1 / MD5 hash macros
//! - Raw (unpadded) RSA with the hardcoded server key and ephemeral local keys
//! - Table-driven CRC-32
//! - The legacy `MSGR\CHALLENGE` solver
//! - Session key generation and AES key derivation for the UIC handshake

#![deny(unsafe_code)]

pub mod aes;
pub mod challenge;
pub mod crc;
pub mod rsa;
mod sha;

#[doc(hidden)]
pub use ::md5 as __md5;
#[doc(hidden)]
pub use ::sha1 as __sha1;

/// Length of the UIC session key.
pub const SESSION_KEY_LEN: usize = 0xc0;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Failures of the primitives in this crate.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The system random source failed.
    Random(String),
    /// RSA key pair generation failed.
    KeyGeneration(String),
    /// Key material is malformed (zero modulus, bad encoding).
    InvalidKey,
    /// The RSA input is not smaller than the modulus.
    MessageTooLarge,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Random(e)        => write!(f, "random source failure: {e}"),
            Self::KeyGeneration(e) => write!(f, "RSA key generation failed: {e}"),
            Self::InvalidKey       => write!(f, "invalid RSA key"),
            Self::MessageTooLarge  => write!(f, "RSA input not below modulus"),
        }
    }
}
impl std::error::Error for Error {}

// ─── Session key ──────────────────────────────────────────────────────────────

/// Fill `buf` from the operating system's random source.
pub fn random_bytes(buf: &mut [u8]) -> Result<(), Error> {
    getrandom::getrandom(buf).map_err(|e| Error::Random(e.to_string()))
}

/// Generate a random session key whose first byte is forced to 1, keeping it
/// below any server modulus.
pub fn generate_session_key() -> Result<[u8; SESSION_KEY_LEN], Error> {
    let mut key = [0u8; SESSION_KEY_LEN];
    random_bytes(&mut key)?;
    key[0] = 1;
    Ok(key)
}

/// Derive the 32-byte AES key from a session key.
///
/// `SHA1(0u32 ‖ key)` supplies the first 20 bytes and the first 12 bytes of
/// `SHA1(1u32 ‖ key)` the rest.
pub fn derive_aes_key(session_key: &[u8]) -> [u8; 32] {
    let h0 = sha1!(&0u32.to_be_bytes(), session_key);
    let h1 = sha1!(&1u32.to_be_bytes(), session_key);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h0);
    key[20..].copy_from_slice(&h1[..12]);
    key
}
