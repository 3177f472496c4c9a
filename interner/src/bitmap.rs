//  A fixed-size packed bit vector.

use crate::error::StrDicError;

/// A fixed number of bits, packed in `u64` words.
#[derive(Clone, Eq, PartialEq)]
pub(crate) struct Bitmap {
    words: Box<[u64]>,
    len: usize,
}

impl Bitmap {
    /// Creates a bitmap of `len` bits, all unset.
    pub(crate) fn new(len: usize) -> Result<Self, StrDicError> {
        let number_words = len.div_ceil(WORD_BITS);

        let mut words = Vec::new();
        words.try_reserve_exact(number_words)?;
        words.resize(number_words, 0);

        Ok(Self { words: words.into_boxed_slice(), len })
    }

    /// Returns the number of bits.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns the value of the bit at `index`.
    ///
    /// #   Panics
    ///
    /// If `index` is out of bounds.
    #[inline(always)]
    pub(crate) fn get(&self, index: usize) -> bool {
        let (word, mask) = self.locate(index);

        self.words[word] & mask != 0
    }

    /// Sets the bit at `index`, returning its previous value.
    ///
    /// #   Panics
    ///
    /// If `index` is out of bounds.
    #[inline(always)]
    pub(crate) fn set(&mut self, index: usize) -> bool {
        let (word, mask) = self.locate(index);

        let previous = self.words[word] & mask != 0;
        self.words[word] |= mask;

        previous
    }

    /// Unsets all bits.
    pub(crate) fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Returns the number of set bits.
    pub(crate) fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[inline(always)]
    fn locate(&self, index: usize) -> (usize, u64) {
        assert!(index < self.len, "bit {index} out of {} bits", self.len);

        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "Bitmap({}/{})", self.count_ones(), self.len)
    }
}

const WORD_BITS: usize = u64::BITS as usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let mut bitmap = Bitmap::new(130).unwrap();

        assert_eq!(130, bitmap.len());
        assert_eq!(0, bitmap.count_ones());

        for index in [0, 63, 64, 129] {
            assert!(!bitmap.set(index));
            assert!(bitmap.get(index));
        }

        assert!(bitmap.set(64));
        assert_eq!(4, bitmap.count_ones());

        assert!(!bitmap.get(1));
        assert!(!bitmap.get(128));

        bitmap.clear();
        assert_eq!(0, bitmap.count_ones());
    }

    #[test]
    #[should_panic]
    fn out_of_bounds() {
        let bitmap = Bitmap::new(64).unwrap();

        bitmap.get(64);
    }

    #[test]
    fn empty() {
        let bitmap = Bitmap::new(0).unwrap();

        assert_eq!(0, bitmap.len());
        assert_eq!("Bitmap(0/0)", format!("{bitmap:?}"));
    }
} // mod tests
