//! Table-driven CRC-32 (reflected IEEE 802.3 polynomial).
//!
//! The UIC frame trailer uses the raw register (initial value `0xFFFFFFFF`,
//! no final inversion). [`checksum`] is the standard CRC-32 built on the same
//! table.

const POLY: u32 = 0xedb8_8320;

/// The 256-entry lookup table, computed at compile time.
pub const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Run the CRC register over `data` without the final XOR.
pub fn register(data: &[u8]) -> u32 {
    data.iter().fold(0xffff_ffff, |crc, &b| {
        TABLE[((crc ^ b as u32) & 0xff) as usize] ^ (crc >> 8)
    })
}

/// Standard CRC-32 of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    register(data) ^ 0xffff_ffff
}

/// The two-byte frame trailer: low byte of the register first.
pub fn trailer(data: &[u8]) -> [u8; 2] {
    let crc = register(data);
    [crc as u8, (crc >> 8) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn crc32_bitwise(data: &[u8]) -> u32 {
        let mut crc: u32 = 0xffffffff;
        for &byte in data {
            let mut b = byte as u32;
            for _ in 0..8 {
                let mix = (crc ^ b) & 1;
                crc >>= 1;
                if mix != 0 { crc ^= POLY; }
                b >>= 1;
            }
        }
        crc ^ 0xffffffff
    }

    #[test]
    fn table_spot_values() {
        assert_eq!(TABLE[0], 0x0000_0000);
        assert_eq!(TABLE[1], 0x7707_3096);
        assert_eq!(TABLE[128], 0xedb8_8320);
        assert_eq!(TABLE[255], 0x2d02_ef8d);
    }

    #[test]
    fn check_value() {
        assert_eq!(checksum(b"123456789"), 0xcbf4_3926);
        assert_eq!(register(b"123456789"), !0xcbf4_3926);
    }

    #[test]
    fn trailer_is_low_bytes_of_register() {
        let reg = register(b"123456789");
        assert_eq!(trailer(b"123456789"), [reg as u8, (reg >> 8) as u8]);
        assert_eq!(trailer(&[]), [0xff, 0xff]);
    }

    proptest! {
        #[test]
        fn table_matches_bitwise(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(checksum(&data), crc32_bitwise(&data));
        }
    }
}
