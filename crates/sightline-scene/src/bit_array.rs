//! Fixed-length bitset backed by 32-bit words.
//!
//! Parallel stages split the word slice with `chunks_mut` so every task owns a
//! disjoint run of 32-object groups.

/// Bits stored in one word.
pub const BITS_PER_WORD: usize = 32;

/// A fixed-length array of bits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitArray {
    words: Vec<u32>,
    len: usize,
}

impl BitArray {
    /// A cleared bitset holding `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; Self::word_count_for(len)],
            len,
        }
    }

    /// Words needed to hold `len` bits.
    #[inline]
    pub fn word_count_for(len: usize) -> usize {
        len.div_ceil(BITS_PER_WORD)
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads bit `index`. Panics when out of range.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.len, "bit {index} out of range for {}", self.len);
        self.words[index / BITS_PER_WORD] & (1 << (index % BITS_PER_WORD)) != 0
    }

    /// Writes bit `index`. Panics when out of range.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.len, "bit {index} out of range for {}", self.len);
        let mask = 1u32 << (index % BITS_PER_WORD);
        let word = &mut self.words[index / BITS_PER_WORD];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Mutable access to the backing words. Bits past `len` in the last word
    /// must stay clear.
    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        iter_word_ones(&self.words, 0)
    }

    /// Bitwise OR of `other` into `self`. Both must have the same length.
    pub fn or_assign(&mut self, other: &BitArray) {
        assert_eq!(self.len, other.len, "bitset length mismatch");
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            *dst |= *src;
        }
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}

/// Indices of set bits in `words`, offset as if `words[0]` were word
/// `first_word` of a larger bitset.
pub fn iter_word_ones(words: &[u32], first_word: usize) -> impl Iterator<Item = usize> + '_ {
    words.iter().enumerate().flat_map(move |(i, &word)| {
        let base = (first_word + i) * BITS_PER_WORD;
        let mut remaining = word;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let bit = remaining.trailing_zeros() as usize;
            remaining &= remaining - 1;
            Some(base + bit)
        })
    })
}
