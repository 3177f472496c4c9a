//  A Bloom filter guarding each slice.

use crate::{bitmap::Bitmap, error::StrDicError, hash::HashFunction};

/// A fixed-size Bloom filter, using 4 distinct hash functions.
///
/// No false negatives: once `set`, a key always `test`s positive until `clear`. False positives are possible; at
/// about 10 bits per key the rate sits around 1%.
#[derive(Clone, Debug)]
pub(crate) struct BloomFilter {
    bits: Bitmap,
}

impl BloomFilter {
    /// The hash functions, chosen for their uncorrelated failures.
    pub(crate) const FUNCTIONS: [HashFunction; 4] =
        [HashFunction::Additive, HashFunction::Xor, HashFunction::Rotate, HashFunction::Sax];

    /// Creates a filter of `number_bits` bits.
    ///
    /// A filter of 0 bits is promoted to a single word, so that positions are always computable.
    pub(crate) fn new(number_bits: usize) -> Result<Self, StrDicError> {
        let bits = Bitmap::new(number_bits.max(MINIMUM_BITS))?;

        Ok(Self { bits })
    }

    /// Returns the recommended number of bits for `capacity` keys: 10 bits per key, rounded up to a whole word.
    pub(crate) fn bits_for(capacity: usize) -> usize {
        (capacity.saturating_mul(BITS_PER_KEY)).div_ceil(MINIMUM_BITS) * MINIMUM_BITS
    }

    /// Returns the number of bits.
    pub(crate) fn number_bits(&self) -> usize {
        self.bits.len()
    }

    /// Adds the key.
    pub(crate) fn set(&mut self, key: &[u8]) {
        for position in self.positions(key) {
            self.bits.set(position);
        }
    }

    /// Returns whether the key may have been added.
    pub(crate) fn test(&self, key: &[u8]) -> bool {
        self.positions(key).into_iter().all(|position| self.bits.get(position))
    }

    /// Returns whether the key may have been added, then adds it.
    pub(crate) fn test_and_set(&mut self, key: &[u8]) -> bool {
        let mut present = true;

        for position in self.positions(key) {
            present &= self.bits.set(position);
        }

        present
    }

    /// Forgets all keys.
    pub(crate) fn clear(&mut self) {
        self.bits.clear();
    }

    fn positions(&self, key: &[u8]) -> [usize; 4] {
        let number_bits = self.bits.len() as u64;

        Self::FUNCTIONS.map(|function| (function.hash(key) % number_bits) as usize)
    }
}

//
//  Implementation
//

const BITS_PER_KEY: usize = 10;
const MINIMUM_BITS: usize = u64::BITS as usize;

// mod tests
