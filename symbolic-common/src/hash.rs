//! Streaming 128-bit content hash.
//!
//! [`ContentHasher`] implements the x64 128-bit variant of MurmurHash3. It is
//! used to derive a stable identifier for files that carry no identity of
//! their own, so the digest must not depend on how the input is chunked: data
//! can be fed in arbitrarily sized pieces and produces the same digest as a
//! single call with the concatenation.

use std::fmt::Write as _;
use std::io;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;
const BLOCK_SIZE: usize = 16;

/// An incremental MurmurHash3 x64-128 hasher.
///
/// # Example
///
/// ```
/// use symbolic_common::ContentHasher;
///
/// let mut hasher = ContentHasher::new();
/// hasher.update(b"hello ");
/// hasher.update(b"world");
///
/// assert_eq!(hasher.finalize(), ContentHasher::hash128(0, b"hello world"));
/// ```
#[derive(Clone, Debug)]
pub struct ContentHasher {
    h1: u64,
    h2: u64,
    length: u64,
    tail: [u8; BLOCK_SIZE],
    tail_len: usize,
}

impl ContentHasher {
    /// Creates a hasher with seed `0`.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Creates a hasher with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            h1: seed,
            h2: seed,
            length: 0,
            tail: [0; BLOCK_SIZE],
            tail_len: 0,
        }
    }

    /// Hashes `data` in one go.
    pub fn hash128(seed: u64, data: &[u8]) -> [u8; 16] {
        let mut hasher = Self::with_seed(seed);
        hasher.update(data);
        hasher.finalize()
    }

    /// Returns the number of bytes fed into the hasher so far.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Returns `true` if no bytes have been fed into the hasher.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Feeds a chunk of data into the hasher.
    pub fn update(&mut self, mut data: &[u8]) {
        self.length += data.len() as u64;

        if self.tail_len > 0 {
            let take = (BLOCK_SIZE - self.tail_len).min(data.len());
            self.tail[self.tail_len..self.tail_len + take].copy_from_slice(&data[..take]);
            self.tail_len += take;
            data = &data[take..];

            if self.tail_len < BLOCK_SIZE {
                return;
            }

            let block = self.tail;
            self.mix_block(&block);
            self.tail_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_SIZE);
        for block in &mut blocks {
            self.mix_block(block);
        }

        let rest = blocks.remainder();
        self.tail[..rest.len()].copy_from_slice(rest);
        self.tail_len = rest.len();
    }

    /// Consumes the hasher and returns the 16 byte digest.
    ///
    /// The digest is `h1` followed by `h2`, both little-endian.
    pub fn finalize(mut self) -> [u8; 16] {
        if self.tail_len > 0 {
            let tail = &self.tail[..self.tail_len];
            if tail.len() > 8 {
                let k2 = read_partial(&tail[8..]);
                self.h2 ^= mix_k2(k2);
            }
            let k1 = read_partial(&tail[..tail.len().min(8)]);
            self.h1 ^= mix_k1(k1);
        }

        self.h1 ^= self.length;
        self.h2 ^= self.length;

        self.h1 = self.h1.wrapping_add(self.h2);
        self.h2 = self.h2.wrapping_add(self.h1);

        self.h1 = fmix64(self.h1);
        self.h2 = fmix64(self.h2);

        self.h1 = self.h1.wrapping_add(self.h2);
        self.h2 = self.h2.wrapping_add(self.h1);

        let mut digest = [0; 16];
        digest[..8].copy_from_slice(&self.h1.to_le_bytes());
        digest[8..].copy_from_slice(&self.h2.to_le_bytes());
        digest
    }

    /// Consumes the hasher and returns the digest as 32 lowercase hex digits.
    pub fn finalize_hex(self) -> String {
        let digest = self.finalize();
        let mut hex = String::with_capacity(32);
        for byte in digest {
            // writing into a String cannot fail
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    fn mix_block(&mut self, block: &[u8]) {
        let k1 = read_partial(&block[..8]);
        let k2 = read_partial(&block[8..]);

        self.h1 ^= mix_k1(k1);
        self.h1 = self
            .h1
            .rotate_left(27)
            .wrapping_add(self.h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        self.h2 ^= mix_k2(k2);
        self.h2 = self
            .h2
            .rotate_left(31)
            .wrapping_add(self.h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads up to eight bytes as a little-endian integer.
fn read_partial(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}
