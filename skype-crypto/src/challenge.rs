//! Legacy MSNP-style challenge/response (`PUT MSGR\CHALLENGE`).

use crate::md5;

/// Application identifier sent alongside the response.
pub const PRODUCT_ID: &str = "PROD0090YUAUV{2B";

/// Key mixed into the nonce digest.
pub const PRODUCT_KEY: &str = "YMM8C_H7KCQ2S_KL";

const MODULUS: u64 = 0x7fff_ffff;
const MULTIPLIER: u64 = 0x0e79_a9c1;

/// Compute the 32-hex-digit response to a server `nonce`.
pub fn solve(nonce: &str) -> String {
    let digest = md5!(nonce.as_bytes(), PRODUCT_KEY.as_bytes());

    let mut md5 = [0u64; 4];
    for (i, word) in md5.iter_mut().enumerate() {
        let le = u32::from_le_bytes([digest[4 * i], digest[4 * i + 1], digest[4 * i + 2], digest[4 * i + 3]]);
        *word = (le & 0x7fff_ffff) as u64;
    }

    let mut chl = Vec::with_capacity(nonce.len() + PRODUCT_ID.len() + 8);
    chl.extend_from_slice(nonce.as_bytes());
    chl.extend_from_slice(PRODUCT_ID.as_bytes());
    while chl.len() % 8 != 0 {
        chl.push(b'0');
    }

    let words: Vec<u64> = chl
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as u64)
        .collect();

    let mut high: u64 = 0;
    let mut low: u64 = 0;
    for pair in words.chunks_exact(2) {
        let mut temp = pair[0] * MULTIPLIER % MODULUS;
        temp += high;
        temp = md5[0] * temp + md5[1];
        temp %= MODULUS;

        high = (pair[1] + temp) % MODULUS;
        high = md5[2] * high + md5[3];
        high %= MODULUS;

        low += high + temp;
    }

    let high = (((high + md5[1]) % MODULUS) as u32).swap_bytes();
    let low = (((low + md5[3]) % MODULUS) as u32).swap_bytes();

    let mut out = String::with_capacity(32);
    for (i, key) in [high, low, high, low].into_iter().enumerate() {
        let word = u32::from_be_bytes([digest[4 * i], digest[4 * i + 1], digest[4 * i + 2], digest[4 * i + 3]]);
        out.push_str(&format!("{:08x}", word ^ key));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_shape() {
        for nonce in ["", "1", "29409134351025259292", "a-rather-long-nonce-that-spans-several-blocks"] {
            let out = solve(nonce);
            assert_eq!(out.len(), 32);
            assert!(out.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn known_answers() {
        assert_eq!(solve("22210219642164014968"), "85ecb0db8f32113df79ce0892b9a102c");
        assert_eq!(solve("29409134351025259292"), "e08f0c6cdbfa1248c9dbcbd409b651e6");
    }

    #[test]
    fn deterministic() {
        assert_eq!(solve("22210219642164014968"), solve("22210219642164014968"));
        assert_ne!(solve("22210219642164014968"), solve("22210219642164014969"));
    }
}
