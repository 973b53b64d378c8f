//! Raw (unpadded) RSA as spoken by the UIC handshake.
//!
//! Both directions use textbook `m^e mod n`: the server key encrypts the
//! session key, and a freshly generated local key signs the challenge block.

use num_bigint::BigUint;
use num_traits::Zero;
use rand::rngs::OsRng;
use ::rsa::traits::{PrivateKeyParts, PublicKeyParts};

use crate::Error;

/// The common public exponent F4.
pub const EXPONENT: u32 = 65537;

/// An RSA public key (n, e).
#[derive(Clone, Debug)]
pub struct Key {
    n: BigUint,
    e: BigUint,
}

impl Key {
    /// Parse a hexadecimal modulus with the given public exponent.
    pub fn from_hex(n: &str, e: u32) -> Option<Self> {
        let n = BigUint::parse_bytes(n.as_bytes(), 16)?;
        if n.is_zero() {
            return None;
        }
        Some(Self { n, e: BigUint::from(e) })
    }

    /// Modulus size in bytes.
    pub fn size(&self) -> usize {
        ((self.n.bits() + 7) / 8) as usize
    }

    /// Encrypt `data` as a big-endian integer, output padded to [`Key::size`].
    pub fn encrypt_raw(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        modpow_padded(data, &self.e, &self.n, self.size())
    }
}

/// A local RSA key pair kept as plain big integers.
#[derive(Clone)]
pub struct KeyPair {
    n: BigUint,
    e: BigUint,
    d: BigUint,
}

impl KeyPair {
    /// Generate a fresh key pair of `bits` bits with exponent 65537.
    pub fn generate(bits: usize) -> Result<Self, Error> {
        let key = ::rsa::RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        Ok(Self {
            n: BigUint::from_bytes_be(&key.n().to_bytes_be()),
            e: BigUint::from_bytes_be(&key.e().to_bytes_be()),
            d: BigUint::from_bytes_be(&key.d().to_bytes_be()),
        })
    }

    /// Build a key pair from big-endian `n`, `e` and `d`.
    pub fn from_components(n: &[u8], e: &[u8], d: &[u8]) -> Result<Self, Error> {
        let n = BigUint::from_bytes_be(n);
        if n.is_zero() {
            return Err(Error::InvalidKey);
        }
        Ok(Self { n, e: BigUint::from_bytes_be(e), d: BigUint::from_bytes_be(d) })
    }

    /// Modulus size in bytes.
    pub fn size(&self) -> usize {
        ((self.n.bits() + 7) / 8) as usize
    }

    /// The modulus as exactly `len` big-endian bytes.
    ///
    /// Longer encodings keep their low-order `len` bytes; shorter ones are
    /// left-padded with zeroes.
    pub fn modulus_bytes(&self, len: usize) -> Vec<u8> {
        fit(self.n.to_bytes_be(), len)
    }

    /// The public half of this pair.
    pub fn public(&self) -> Key {
        Key { n: self.n.clone(), e: self.e.clone() }
    }

    /// Raw private-key operation `m^d mod n`, output padded to [`KeyPair::size`].
    pub fn sign_raw(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        modpow_padded(data, &self.d, &self.n, self.size())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair(bits={})", self.n.bits())
    }
}

fn modpow_padded(data: &[u8], exp: &BigUint, n: &BigUint, len: usize) -> Result<Vec<u8>, Error> {
    let m = BigUint::from_bytes_be(data);
    if &m >= n {
        return Err(Error::MessageTooLarge);
    }
    Ok(fit(m.modpow(exp, n).to_bytes_be(), len))
}

fn fit(mut bytes: Vec<u8>, len: usize) -> Vec<u8> {
    if bytes.len() > len {
        bytes.drain(..bytes.len() - len);
    }
    while bytes.len() < len { bytes.insert(0, 0); }
    bytes
}
