/// Calculate the SHA-1 hash of one or more byte slices concatenated.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ ) => {{
        use $crate::__sha1::{Digest, Sha1};
        let mut h = Sha1::new();
        $( h.update($x); )+
        let out: [u8; 20] = h.finalize().into();
        out
    }};
}

/// Calculate the MD5 hash of one or more byte slices concatenated.
#[macro_export]
macro_rules! md5 {
    ( $( $x:expr ),+ ) => {{
        use $crate::__md5::{Digest, Md5};
        let mut h = Md5::new();
        $( h.update($x); )+
        let out: [u8; 16] = h.finalize().into();
        out
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn sha1_concatenates_inputs() {
        assert_eq!(sha1!(b"ab", b"c"), sha1!(b"abc"));
        assert_eq!(
            sha1!(b"abc"),
            [
                0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e,
                0x25, 0x71, 0x78, 0x50, 0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d,
            ]
        );
    }

    #[test]
    fn md5_known_vector() {
        assert_eq!(
            md5!(b"abc"),
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0,
                0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1, 0x7f, 0x72,
            ]
        );
        assert_eq!(md5!(b"a", b"bc"), md5!(b"abc"));
    }
}
