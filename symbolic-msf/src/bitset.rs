//! The free page map of an MSF container.
//!
//! Each bit stands for one page. A set bit marks the page as *free*, so that
//! words appended when the map grows start out with every page available.

use std::fmt;
use std::io::{Read, Write};

use crate::error::MsfError;

const WORD_BITS: usize = 32;

/// A growable set of bits stored in 32-bit words.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u32>,
}

impl BitSet {
    /// Creates an empty bit set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bit set of `count` zero words.
    pub fn with_words(count: usize) -> Self {
        Self {
            words: vec![0; count],
        }
    }

    /// Creates a bit set from raw words.
    pub fn from_words(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// The raw words.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Returns `true` if the set contains no words at all.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The number of addressable bits.
    pub fn bit_len(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Returns the bit at `index`. Bits beyond the end are `false`.
    pub fn get(&self, index: usize) -> bool {
        match self.words.get(index / WORD_BITS) {
            Some(word) => word & (1 << (index % WORD_BITS)) != 0,
            None => false,
        }
    }

    /// Sets the bit at `index`, growing the set with zero words if needed.
    pub fn set(&mut self, index: usize, value: bool) {
        let word = index / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }

        let mask = 1 << (index % WORD_BITS);
        if value {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    /// Claims the lowest free page and returns its index.
    ///
    /// If no page is free, a new word is appended with all but its first page
    /// free, and the first page of that word is returned.
    pub fn allocate(&mut self) -> u32 {
        for (index, word) in self.words.iter_mut().enumerate() {
            if *word != 0 {
                let lowest = *word & word.wrapping_neg();
                *word &= !lowest;
                return (index * WORD_BITS) as u32 + log2(lowest);
            }
        }

        let index = self.words.len() * WORD_BITS;
        self.words.push(u32::MAX ^ 1);
        index as u32
    }

    /// Returns a page to the free pool.
    ///
    /// Pages that are already free are left alone.
    pub fn deallocate(&mut self, index: u32) {
        let index = index as usize;
        if self.get(index) {
            tracing::warn!(page = index, "deallocating a page that is already free");
            return;
        }
        self.set(index, true);
    }

    /// Reads a bit set as a little-endian word count followed by the words.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, MsfError> {
        let count = read_u32(reader)?;
        let count = i32::try_from(count)
            .map_err(|_| MsfError::corrupt("negative bit set length"))? as usize;

        // the count is untrusted, so grow as words actually arrive
        let mut words = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            words.push(read_u32(reader)?);
        }

        Ok(Self { words })
    }

    /// Writes the word count followed by the words, all little-endian.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), MsfError> {
        let count = u32::try_from(self.words.len())
            .map_err(|_| MsfError::unsupported("bit set too large"))?;
        writer.write_all(&count.to_le_bytes())?;
        for word in &self.words {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Serialized size in bytes, including the count.
    pub fn encoded_len(&self) -> usize {
        4 + self.words.len() * 4
    }
}

impl fmt::Display for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in 0..self.bit_len() {
            if index > 0 {
                f.write_str(" ")?;
            }
            f.write_str(if self.get(index) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Returns the position of the single set bit in `value`.
pub fn log2(value: u32) -> u32 {
    debug_assert_eq!(value.count_ones(), 1);
    value.trailing_zeros()
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, MsfError> {
    let mut buf = [0; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
