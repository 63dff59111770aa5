//! Named key storage.
//!
//! Key files are plain `name = hex` text files, one key per line. Blank lines,
//! `;` / `#` comments and `[Section]` headers are ignored. Names are matched
//! case-insensitively.

use super::{ecb_decrypt_block, Key, VERIFY_PLAINTEXT};
use crate::Error;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A set of named AES-128 keys.
#[derive(Debug, Default, Clone)]
pub struct KeyStore {
    keys: HashMap<String, Key>,
}

impl KeyStore {
    /// Creates an empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a key file.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut store = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }

            let (name, value) = match line.split_once('=') {
                Some(pair) => pair,
                None => {
                    return Err(Error::Malformed(format!(
                        "key file line {}: expected `name = value`",
                        lineno + 1
                    )))
                }
            };
            let key = decode_hex_16(value.trim()).ok_or_else(|| {
                Error::Malformed(format!(
                    "key file line {}: `{}` is not a 128-bit hex key",
                    lineno + 1,
                    value.trim()
                ))
            })?;
            store.insert(name.trim(), key);
        }

        debug!("loaded {} keys", store.keys.len());
        Ok(store)
    }

    /// Reads and parses a key file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn insert(&mut self, name: &str, key: Key) {
        self.keys.insert(name.to_ascii_lowercase(), key);
    }

    pub fn get(&self, name: &str) -> Option<Key> {
        self.keys.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up a key and checks it against its verification block.
    ///
    /// The key is accepted when `verify` decrypts to `AES-128-ECB-TEST` in
    /// ECB mode.
    pub fn get_verified(&self, name: &str, verify: &[u8; 16]) -> Result<Key, Error> {
        let key = self
            .get(name)
            .ok_or_else(|| Error::KeyUnavailable(name.to_string()))?;
        if &ecb_decrypt_block(&key, verify) == VERIFY_PLAINTEXT {
            Ok(key)
        } else {
            Err(Error::Malformed(format!("key `{}` failed verification", name)))
        }
    }
}

fn decode_hex_16(s: &str) -> Option<Key> {
    if s.len() != 32 || !s.is_ascii() {
        return None;
    }
    let mut out = [0; 16];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(s.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_file() {
        let store = KeyStore::parse(
            "; comment\n\
             [Keys]\n\
             \n\
             Xbox360-XEX-Retail = 000102030405060708090a0b0c0d0e0f\n\
             other=FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\n",
        )
        .unwrap();
        let key = store.get("xbox360-xex-retail").unwrap();
        assert_eq!(key[1], 1);
        assert_eq!(key[15], 0x0f);
        assert_eq!(store.get("OTHER"), Some([0xFF; 16]));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(KeyStore::parse("a = 0011").is_err());
        assert!(KeyStore::parse("a = zz0102030405060708090a0b0c0d0e0f").is_err());
        assert!(KeyStore::parse("no equals sign").is_err());
    }

    #[test]
    fn verification() {
        // FIPS-197 C.1 key; the verify block is the encryption of the test string
        // computed with the same cipher.
        use aes::cipher::generic_array::GenericArray;
        use aes::cipher::{BlockEncrypt, KeyInit};

        let key: Key = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ];
        let mut block = GenericArray::clone_from_slice(VERIFY_PLAINTEXT);
        aes::Aes128::new(GenericArray::from_slice(&key)).encrypt_block(&mut block);
        let mut verify = [0; 16];
        verify.copy_from_slice(&block);

        let mut store = KeyStore::new();
        store.insert("good", key);
        store.insert("bad", [0; 16]);
        assert_eq!(store.get_verified("good", &verify).unwrap(), key);
        assert_eq!(store.get_verified("bad", &verify).unwrap_err().code(), -5);
        assert!(store.get_verified("absent", &verify).unwrap_err().is_not_found());
    }
}
