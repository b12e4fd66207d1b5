//! Passkey generation.
//!
//! A passkey is [`PASSKEY_BYTES`] bytes from the OS-seeded CSPRNG, rendered as
//! unpadded RFC 4648 base32 so it survives headers, query strings and shells.

use std::collections::HashSet;

use rand::RngCore;

use crate::types::Passkey;

/// Random bytes per passkey.
pub const PASSKEY_BYTES: usize = 16;

/// Generate one fresh passkey.
pub fn generate_passkey() -> Passkey {
    let mut bytes = [0u8; PASSKEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    Passkey::new(base32_encode(&bytes))
}

/// Generate `quantity` passkeys, distinct within the batch.
pub fn generate_batch(quantity: usize) -> Vec<Passkey> {
    let mut seen = HashSet::with_capacity(quantity);
    let mut batch = Vec::with_capacity(quantity);

    while batch.len() < quantity {
        let passkey = generate_passkey();
        if seen.insert(passkey.clone()) {
            batch.push(passkey);
        }
    }

    batch
}

// RFC 4648 Base32 encoding (uppercase, no padding)
fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut result = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | (byte as u64);
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base32_encode() {
        // Test vectors from RFC 4648, padding stripped
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"fo"), "MZXQ");
        assert_eq!(base32_encode(b"foo"), "MZXW6");
        assert_eq!(base32_encode(b"foob"), "MZXW6YQ");
        assert_eq!(base32_encode(b"fooba"), "MZXW6YTB");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn test_passkey_shape() {
        let passkey = generate_passkey();
        // 128 bits / 5 bits per char, rounded up
        assert_eq!(passkey.as_str().len(), 26);
        assert!(passkey
            .as_str()
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn test_batch_is_distinct() {
        let batch = generate_batch(64);
        assert_eq!(batch.len(), 64);
        let unique: HashSet<_> = batch.iter().collect();
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn test_empty_batch() {
        assert!(generate_batch(0).is_empty());
    }
}
