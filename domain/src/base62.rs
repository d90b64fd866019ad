//! Base62 encoding utilities used for short code generation.

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Returns the base62 alphabet as bytes.
pub fn alphabet() -> &'static [u8] {
    &ALPHABET[..]
}

/// Encode an unsigned 128-bit integer into a base62 string using the alphabet
/// 0-9, A-Z, a-z. Zero encodes to "0".
pub fn encode_u128(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    // 62^22 > 2^128
    let mut buf = [0u8; 22];
    let mut i = buf.len();
    while n > 0 {
        let rem = (n % 62) as usize;
        i -= 1;
        buf[i] = ALPHABET[rem];
        n /= 62;
    }
    buf[i..].iter().map(|&b| b as char).collect()
}
