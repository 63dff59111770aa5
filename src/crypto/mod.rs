//! AES-128 primitives used for encrypted sections.
//!
//! Only decryption is needed. CBC is used by XEX title keys, CTR by 3DS
//! NCCH partitions. ECB single-block decryption exists for key verification.

mod keys;
mod scrambler;

pub use self::keys::KeyStore;
pub use self::scrambler::ctr_scramble;

use crate::Error;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};

use std::fmt;

/// An AES-128 key.
pub type Key = [u8; 16];

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Plaintext a key's verification block must decrypt to.
pub const VERIFY_PLAINTEXT: &[u8; 16] = b"AES-128-ECB-TEST";

fn cipher(key: &Key) -> Aes128 {
    Aes128::new(GenericArray::from_slice(key))
}

/// Decrypts a single block in ECB mode.
pub fn ecb_decrypt_block(key: &Key, block: &[u8; 16]) -> [u8; 16] {
    let mut buf = Block::clone_from_slice(block);
    cipher(key).decrypt_block(&mut buf);
    let mut out = [0; 16];
    out.copy_from_slice(&buf);
    out
}

/// AES-128 in cipher block chaining mode.
#[derive(Clone)]
pub struct Aes128Cbc {
    cipher: Aes128,
}

impl Aes128Cbc {
    pub fn new(key: &Key) -> Self {
        Self { cipher: cipher(key) }
    }

    /// Decrypts `data` in place.
    ///
    /// `iv` is the chaining value for the first block: either the section IV
    /// or the ciphertext block preceding `data`. The length of `data` must be
    /// a multiple of the block size.
    pub fn decrypt(&self, iv: &[u8; 16], data: &mut [u8]) -> Result<(), Error> {
        if data.len() % BLOCK_SIZE != 0 {
            return Err(Error::Malformed(format!(
                "CBC data length {} is not a multiple of the block size",
                data.len()
            )));
        }

        let mut chain = *iv;
        for chunk in data.chunks_mut(BLOCK_SIZE) {
            let mut next = [0; 16];
            next.copy_from_slice(chunk);

            let mut block = Block::clone_from_slice(chunk);
            self.cipher.decrypt_block(&mut block);
            for ((dest, plain), prev) in chunk.iter_mut().zip(block.iter()).zip(chain.iter()) {
                *dest = plain ^ prev;
            }
            chain = next;
        }
        Ok(())
    }
}

impl fmt::Debug for Aes128Cbc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Aes128Cbc { .. }")
    }
}

/// AES-128 in counter mode.
///
/// The counter is a 128-bit big-endian integer incremented once per block.
#[derive(Clone)]
pub struct Aes128Ctr {
    cipher: Aes128,
}

impl Aes128Ctr {
    pub fn new(key: &Key) -> Self {
        Self { cipher: cipher(key) }
    }

    /// Decrypts (or encrypts, which is the same operation) `data` in place.
    ///
    /// `counter` is the counter value of the block `data` starts in, and
    /// `skip` is the number of bytes of that block that precede `data`.
    pub fn apply(&self, counter: u128, skip: usize, data: &mut [u8]) {
        let mut counter = counter;
        let mut skip = skip % BLOCK_SIZE;
        let mut data = data;
        while !data.is_empty() {
            let mut block = Block::clone_from_slice(&counter.to_be_bytes());
            self.cipher.encrypt_block(&mut block);

            let take = (BLOCK_SIZE - skip).min(data.len());
            let (head, rest) = data.split_at_mut(take);
            for (byte, key) in head.iter_mut().zip(block.iter().skip(skip)) {
                *byte ^= key;
            }

            data = rest;
            skip = 0;
            counter = counter.wrapping_add(1);
        }
    }
}

impl fmt::Debug for Aes128Ctr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Aes128Ctr { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS-197 appendix C.1
    const KEY: Key = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];
    const PLAIN: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];
    const CIPHER: [u8; 16] = [
        0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4, 0xc5,
        0x5a,
    ];

    fn encrypt_block(key: &Key, block: &[u8; 16]) -> [u8; 16] {
        let mut buf = Block::clone_from_slice(block);
        cipher(key).encrypt_block(&mut buf);
        let mut out = [0; 16];
        out.copy_from_slice(&buf);
        out
    }

    #[test]
    fn ecb_known_answer() {
        assert_eq!(ecb_decrypt_block(&KEY, &CIPHER), PLAIN);
    }

    #[test]
    fn cbc_chains_blocks() {
        let iv = [0x5A; 16];
        let p0 = *b"first block 0123";
        let p1 = *b"second block 456";

        let mut x0 = p0;
        x0.iter_mut().zip(iv.iter()).for_each(|(a, b)| *a ^= b);
        let c0 = encrypt_block(&KEY, &x0);
        let mut x1 = p1;
        x1.iter_mut().zip(c0.iter()).for_each(|(a, b)| *a ^= b);
        let c1 = encrypt_block(&KEY, &x1);

        let mut data = c0.to_vec();
        data.extend_from_slice(&c1);
        Aes128Cbc::new(&KEY).decrypt(&iv, &mut data).unwrap();
        assert_eq!(&data[..16], &p0);
        assert_eq!(&data[16..], &p1);

        // decrypting only the second block needs the first ciphertext block as IV
        let mut second = c1.to_vec();
        Aes128Cbc::new(&KEY).decrypt(&c0, &mut second).unwrap();
        assert_eq!(&second[..], &p1);
    }

    #[test]
    fn cbc_rejects_partial_blocks() {
        let mut data = [0; 15];
        assert!(Aes128Cbc::new(&KEY).decrypt(&[0; 16], &mut data).is_err());
    }

    #[test]
    fn ctr_random_access_matches_stream() {
        let ctr = Aes128Ctr::new(&KEY);
        let counter = 0x0102_0304_0506_0708_0000_0000_0000_0000u128;
        let original: Vec<u8> = (0..100u8).collect();

        let mut whole = original.clone();
        ctr.apply(counter, 0, &mut whole);
        assert_ne!(whole, original);

        // decrypt bytes 37..70 on their own
        let mut part = whole[37..70].to_vec();
        ctr.apply(counter + 2, 5, &mut part);
        assert_eq!(&part[..], &original[37..70]);

        ctr.apply(counter, 0, &mut whole);
        assert_eq!(whole, original);
    }
}
