//! Sans-IO UIC token handshake.
//!
//! The token presented in `ATH` is minted by a short binary exchange with a
//! dedicated login server. This module builds every outbound frame and
//! interprets every inbound one; the caller owns the socket.
//!
//! # Flow
//!
//! ```text
//! send hello()                       // 16 03 01 00 00
//! recv 5 bytes, check_hello()        // 17 03 01 xx xx
//! let hs = Handshake::new()?;
//! send hs.key_exchange_frame()?
//! send hs.credentials_frame(&account)?
//! recv 5 bytes, response_payload_len()
//! recv payload, hs.open_response(&mut payload)
//! let token = hs.finish(&payload, nonce)?;
//! ```

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use skype_crypto::{aes, crc, derive_aes_key, generate_session_key, rsa, sha1, SESSION_KEY_LEN};

use crate::tlv::{self, Writer};

/// Magic of the hello and key exchange frames.
pub const HELLO_MAGIC: [u8; 3] = [0x16, 0x03, 0x01];
/// Magic of encrypted data frames, and of every server reply.
pub const DATA_MAGIC: [u8; 3] = [0x17, 0x03, 0x01];

/// The login server's RSA modulus (1536 bits, exponent 65537).
pub const SERVER_MODULUS: &str = concat!(
    "a8f223612f4f5fc81ef1ca5e310b0b21532a72df6c1af0fbec87304aec983aab",
    "5d74a14cc72e53ef7752a248c0e5abe09484b597692015e796350989c88b3cae",
    "140ca82ccd9914e540468cf0edb35dcba4c352890e7a9eafac550b3978627651",
    "ad0a804f385ef5f4093ac6ee66b23e1f8202c61c6c0375eeb713852397ced2e1",
    "99492aa61a3eab163d4c2625c873e95cafd95b80dd2d8732c8e25638a2007acf",
    "a6c8f1ff31cc2bc4ca8f4446f51da404335a48c955aaa3a4b57250d7ba29700b",
);

/// Size of the ephemeral local RSA key.
pub const LOCAL_KEY_BITS: usize = 1024;
/// Bytes of the local modulus carried in the credential record.
pub const LOCAL_MODULUS_LEN: usize = 128;
/// Status value of a successful login.
pub const LOGIN_OK: u32 = 4200;
/// Salt mixed into the challenge.
pub const SALT: &[u8] = b"WS-SecureConversationSESSION KEY TOKEN";
/// Client version string announced in the credential record.
pub const CLIENT_VERSION: &str = "0/7.44.0.104";
/// Default locale announced in the credential record.
pub const DEFAULT_LOCALE: &str = "en";

const PROTOCOL_VERSION: u32 = 0x1399;
const LOOPBACK: u32 = 0x7f00_0001;
const ID_STATUS: u32 = 0x01;
const ID_SIGNED_CREDENTIALS: u32 = 0x24;
const BLOCK_LEN: usize = 0x80;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Handshake failures.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A cryptographic primitive failed.
    Crypto(skype_crypto::Error),
    /// A frame did not start with the expected magic.
    BadMagic { expected: [u8; 3], got: [u8; 3] },
    /// A reply frame is too short to hold its checksum.
    FrameTooShort { len: usize },
    /// The server reported a login status other than [`LOGIN_OK`].
    LoginRejected { code: u32 },
    /// The reply carried no signed credentials record.
    MissingCredentials,
    /// The reply's TLV stream is malformed.
    Tlv(tlv::Error),
    /// The nonce does not fit in the challenge block.
    NonceTooLong { len: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto(e)              => write!(f, "crypto failure: {e}"),
            Self::BadMagic { expected, got }
                => write!(f, "bad frame magic: got {got:02x?}, expected {expected:02x?}"),
            Self::FrameTooShort { len }  => write!(f, "reply frame length {len} is too short"),
            Self::LoginRejected { code } => write!(f, "login rejected with status {code}"),
            Self::MissingCredentials     => write!(f, "reply has no signed credentials"),
            Self::Tlv(e)                 => write!(f, "malformed reply: {e}"),
            Self::NonceTooLong { len }   => write!(f, "nonce of {len} bytes does not fit the challenge block"),
        }
    }
}

impl std::error::Error for Error {}

impl From<skype_crypto::Error> for Error {
    fn from(e: skype_crypto::Error) -> Self { Self::Crypto(e) }
}

impl From<tlv::Error> for Error {
    fn from(e: tlv::Error) -> Self { Self::Tlv(e) }
}

impl Error {
    /// Whether the failure came from a cryptographic primitive.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Crypto(_))
    }
}

// ─── Framing ──────────────────────────────────────────────────────────────────

/// The 5-byte hello: magic and a zero length.
pub fn hello() -> [u8; 5] {
    frame_header(HELLO_MAGIC, 0)
}

/// Check the first three bytes of the hello reply.
pub fn check_hello(reply: [u8; 3]) -> Result<(), Error> {
    check_magic(DATA_MAGIC, reply)
}

fn check_magic(expected: [u8; 3], got: [u8; 3]) -> Result<(), Error> {
    if got == expected { Ok(()) } else { Err(Error::BadMagic { expected, got }) }
}

/// Magic followed by a big-endian 16-bit length.
pub fn frame_header(magic: [u8; 3], len: u16) -> [u8; 5] {
    let [hi, lo] = len.to_be_bytes();
    [magic[0], magic[1], magic[2], hi, lo]
}

/// Validate a reply header and return how many payload bytes follow it.
///
/// The declared length includes a 2-byte checksum that is not part of the
/// payload.
pub fn response_payload_len(header: [u8; 5]) -> Result<usize, Error> {
    check_magic(DATA_MAGIC, [header[0], header[1], header[2]])?;
    let len = u16::from_be_bytes([header[3], header[4]]) as usize;
    len.checked_sub(2).ok_or(Error::FrameTooShort { len })
}

// ─── Handshake ────────────────────────────────────────────────────────────────

/// Account details written into the credential record.
#[derive(Clone, Debug)]
pub struct Account<'a> {
    pub username:    &'a str,
    /// Password, or a federation token for federated accounts.
    pub secret:      &'a str,
    pub hardware_id: [u8; 8],
    pub locale:      &'a str,
}

/// Key material of one token acquisition. Never reused.
pub struct Handshake {
    session_key: [u8; SESSION_KEY_LEN],
    aes_key:     [u8; 32],
    keypair:     rsa::KeyPair,
}

impl Handshake {
    /// Fresh session key and a fresh 1024-bit local key pair.
    pub fn new() -> Result<Self, Error> {
        let session_key = generate_session_key()?;
        let keypair = rsa::KeyPair::generate(LOCAL_KEY_BITS)?;
        Ok(Self::from_parts(session_key, keypair))
    }

    /// Assemble from existing key material.
    pub fn from_parts(session_key: [u8; SESSION_KEY_LEN], keypair: rsa::KeyPair) -> Self {
        let aes_key = derive_aes_key(&session_key);
        Self { session_key, aes_key, keypair }
    }

    pub fn aes_key(&self) -> &[u8; 32] {
        &self.aes_key
    }

    /// The session key encrypted under the server key, as a hello-magic frame.
    pub fn key_exchange_frame(&self) -> Result<Vec<u8>, Error> {
        let server = rsa::Key::from_hex(SERVER_MODULUS, rsa::EXPONENT)
            .ok_or(Error::Crypto(skype_crypto::Error::InvalidKey))?;
        let encrypted = server.encrypt_raw(&self.session_key)?;

        let mut body = Writer::new();
        body.object(3)
            .number(0x09, 0x2000)
            .blob(0x08, &encrypted)
            .number(0x0c, 0x01);
        Ok(frame(HELLO_MAGIC, body.as_bytes(), None))
    }

    /// The encrypted credential record with its checksum trailer.
    pub fn credentials_frame(&self, account: &Account<'_>) -> Result<Vec<u8>, Error> {
        let modulus = self.keypair.modulus_bytes(LOCAL_MODULUS_LEN);
        let mut record = credentials_record(account, &modulus);
        aes::ctr_apply(&mut record, &self.aes_key, &aes::IV_OUTBOUND);
        let trailer = crc::trailer(&record);
        Ok(frame(DATA_MAGIC, &record, Some(trailer)))
    }

    /// Decrypt a reply payload in place.
    pub fn open_response(&self, payload: &mut [u8]) {
        aes::ctr_apply(payload, &self.aes_key, &aes::IV_INBOUND);
    }

    /// Turn the decrypted reply into the base64 token.
    pub fn finish(&self, decrypted: &[u8], nonce: &str) -> Result<String, Error> {
        let signed = parse_response(decrypted)?;
        let block = challenge_block(&signed, nonce)?;
        let signature = self.keypair.sign_raw(&block)?;
        Ok(assemble_token(&signed, &signature))
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake").field("keypair", &self.keypair).finish_non_exhaustive()
    }
}

fn frame(magic: [u8; 3], body: &[u8], trailer: Option<[u8; 2]>) -> Vec<u8> {
    let trailer_len = trailer.map_or(0, |t| t.len());
    let len = (body.len() + trailer_len) as u16;
    let mut out = Vec::with_capacity(5 + body.len() + trailer_len);
    out.extend_from_slice(&frame_header(magic, len));
    out.extend_from_slice(body);
    if let Some(t) = trailer {
        out.extend_from_slice(&t);
    }
    out
}

/// MD5 of `username \n skyper \n secret`.
pub fn login_hash(username: &str, secret: &str) -> [u8; 16] {
    skype_crypto::md5!(username.as_bytes(), b"\nskyper\n", secret.as_bytes())
}

/// First 8 bytes of SHA-1 over a MAC address, or 8 random bytes.
pub fn hardware_id(mac: Option<&[u8]>) -> Result<[u8; 8], Error> {
    let mut id = [0u8; 8];
    match mac {
        Some(mac) => id.copy_from_slice(&sha1!(mac)[..8]),
        None => skype_crypto::random_bytes(&mut id)?,
    }
    Ok(id)
}

/// The plaintext credential record.
pub fn credentials_record(account: &Account<'_>, local_modulus: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.object(4)
        .number(0x00, PROTOCOL_VERSION)
        .number(0x02, 0x01)
        .string(0x04, account.username)
        .blob(0x05, &login_hash(account.username, account.secret));
    w.object(6)
        .blob(0x21, local_modulus)
        .fixed8(0x31, &account.hardware_id)
        .string(0x36, account.locale)
        .array(0x33, &[0; 5])
        .string(0x0d, CLIENT_VERSION)
        .number(0x0e, LOOPBACK);
    w.into_bytes()
}

/// Scan a decrypted reply for the login status and the signed credentials.
///
/// Parsing stops at the credentials record or at the first record of an
/// unknown family.
pub fn parse_response(buf: &[u8]) -> Result<Vec<u8>, Error> {
    let mut pos = 0;
    while pos < buf.len() {
        pos += 1; // object marker
        let count = tlv::read_varint(buf, &mut pos)?;
        for _ in 0..count {
            let family = tlv::read_u8(buf, &mut pos)?;
            let id = tlv::read_varint(buf, &mut pos)?;
            match family {
                tlv::FAMILY_NUMBER => {
                    let value = tlv::read_varint(buf, &mut pos)?;
                    if id == ID_STATUS && value != LOGIN_OK {
                        return Err(Error::LoginRejected { code: value });
                    }
                }
                tlv::FAMILY_BLOB => {
                    let size = tlv::read_varint(buf, &mut pos)? as usize;
                    let data = tlv::read_bytes(buf, &mut pos, size)?;
                    if id == ID_SIGNED_CREDENTIALS {
                        return Ok(data.to_vec());
                    }
                }
                _ => return Err(Error::MissingCredentials),
            }
        }
    }
    Err(Error::MissingCredentials)
}

/// The 128-byte block signed with the local key.
///
/// ```text
/// 4B BB … BB BA <challenge> SHA1(challenge) BC
/// challenge = SHA1(signed ‖ SALT) ‖ SALT ‖ nonce
/// ```
pub fn challenge_block(signed: &[u8], nonce: &str) -> Result<[u8; BLOCK_LEN], Error> {
    let mut challenge = Vec::with_capacity(20 + SALT.len() + nonce.len());
    challenge.extend_from_slice(&sha1!(signed, SALT));
    challenge.extend_from_slice(SALT);
    challenge.extend_from_slice(nonce.as_bytes());

    let fill_end = BLOCK_LEN
        .checked_sub(challenge.len() + 22)
        .filter(|&end| end >= 1)
        .ok_or(Error::NonceTooLong { len: nonce.len() })?;

    let mut block = [0xbbu8; BLOCK_LEN];
    block[0] = 0x4b;
    block[fill_end] = 0xba;
    let start = fill_end + 1;
    block[start..start + challenge.len()].copy_from_slice(&challenge);
    let digest_at = start + challenge.len();
    block[digest_at..digest_at + 20].copy_from_slice(&sha1!(&challenge));
    block[BLOCK_LEN - 1] = 0xbc;
    Ok(block)
}

/// `base64(len(signed) as u32 BE ‖ signed ‖ signature)`.
pub fn assemble_token(signed: &[u8], signature: &[u8]) -> String {
    let mut raw = Vec::with_capacity(4 + signed.len() + signature.len());
    raw.extend_from_slice(&(signed.len() as u32).to_be_bytes());
    raw.extend_from_slice(signed);
    raw.extend_from_slice(signature);
    STANDARD.encode(raw)
}
