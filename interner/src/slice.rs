//  A fixed-capacity, cache-resident, group of keys.
//
//  A slice stores its keys in three parallel columns: the keys themselves, their hashes, and their ids. Hashes are
//  looked-up first, and only on a hash match are the keys compared.
//
//  Slices start as appenders, using a linear scan over the hashes column, 4 lanes at a time. Once full, they are
//  sealed: a static 5-ary search tree is built over their sorted and deduplicated hashes, and is used for lookups from
//  then on.

use std::{fmt, ops::Range};

use crate::error::StrDicError;

/// Minimum and maximum hash of the keys of a slice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct HashBounds {
    min: u64,
    max: u64,
}

impl HashBounds {
    /// Creates bounds containing no hash.
    pub(crate) const fn empty() -> Self {
        Self {
            min: u64::MAX,
            max: u64::MIN,
        }
    }

    /// Widens the bounds to contain `hash`.
    #[inline(always)]
    pub(crate) fn include(&mut self, hash: u64) {
        self.min = self.min.min(hash);
        self.max = self.max.max(hash);
    }

    /// Returns whether `hash` is within the bounds.
    #[inline(always)]
    pub(crate) fn contains(&self, hash: u64) -> bool {
        self.min <= hash && hash <= self.max
    }

    /// Returns the minimum and maximum, if any hash was included.
    pub(crate) fn range(&self) -> Option<(u64, u64)> {
        (self.min <= self.max).then_some((self.min, self.max))
    }
}

/// Read counters of a slice.
///
/// All counters only ever grow.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct SliceDescriptor {
    /// Number of lookups which reached this slice.
    pub(crate) reads_all: u64,
    /// Number of lookups which found their key in this slice.
    pub(crate) reads_hit: u64,
    /// Number of lookups skipped by the hash bounds.
    pub(crate) skipped_by_bounds: u64,
    /// Number of lookups skipped by the Bloom filter.
    pub(crate) skipped_by_bloom: u64,
}

/// The columns of a slice.
pub(crate) struct Columns {
    keys: Vec<Box<str>>,
    hashes: Vec<u64>,
    ids: Vec<u64>,
}

impl Columns {
    fn with_capacity(capacity: usize) -> Result<Self, StrDicError> {
        let (mut keys, mut hashes, mut ids) = (Vec::new(), Vec::new(), Vec::new());

        keys.try_reserve_exact(capacity)?;
        hashes.try_reserve_exact(capacity)?;
        ids.try_reserve_exact(capacity)?;

        Ok(Self { keys, hashes, ids })
    }

    fn len(&self) -> usize {
        debug_assert_eq!(self.keys.len(), self.hashes.len());
        debug_assert_eq!(self.keys.len(), self.ids.len());

        self.keys.len()
    }
}

/// How to find a key within the columns of a slice.
pub(crate) trait LookupStrategy {
    /// Returns the slot of `key`, whose hash is `hash`, if present.
    fn find(&self, columns: &Columns, hash: u64, key: &str) -> Option<usize>;
}

/// Linear scan of the hashes, 4 lanes at a time.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ScanStrategy;

impl LookupStrategy for ScanStrategy {
    fn find(&self, columns: &Columns, hash: u64, key: &str) -> Option<usize> {
        scan(columns, 0..columns.len(), hash, key)
    }
}

/// A static 5-ary search tree over the sorted, deduplicated, hashes of a sealed slice.
///
/// Node `n` holds 4 hashes, at `[4n, 4n + 4)`, and its children are nodes `5n + 1` to `5n + 5`. The tree is always
/// complete, padded with `u64::MAX` as necessary, hence holds `5^h - 1` hashes for some height `h`.
pub(crate) struct SealedTreeStrategy {
    //  Hashes, in tree order.
    tree: Vec<u64>,
    //  For each tree position, the index of the unique hash, or PADDING.
    uniques: Vec<u32>,
    //  For each unique hash, the position within `order` of its first occurrence.
    first: Vec<u32>,
    //  For each unique hash, its number of occurrences.
    duplicates: Vec<u32>,
    //  Slots, sorted by hash.
    order: Vec<u32>,
    //  Number of slots covered by the tree; the slots after are scanned.
    indexed: usize,
}

impl SealedTreeStrategy {
    /// Builds the tree over the given hashes.
    pub(crate) fn build(hashes: &[u64]) -> Result<Self, StrDicError> {
        let Ok(_) = u32::try_from(hashes.len()) else { return Err(StrDicError::CapacityExceeded) };

        let mut order: Vec<u32> = (0..hashes.len() as u32).collect();
        order.sort_by_key(|&slot| hashes[slot as usize]);

        let (mut sorted, mut first, mut duplicates) = (Vec::new(), Vec::new(), Vec::<u32>::new());

        for (position, &slot) in order.iter().enumerate() {
            let hash = hashes[slot as usize];

            if sorted.last() == Some(&hash) {
                if let Some(count) = duplicates.last_mut() {
                    *count += 1;
                }

                continue;
            }

            sorted.push(hash);
            first.push(position as u32);
            duplicates.push(1);
        }

        let total: usize = duplicates.iter().map(|&d| d as usize).sum();

        if total != hashes.len() {
            return Err(StrDicError::Corrupted("sealed tree lost track of duplicates"));
        }

        let number_uniques = sorted.len();
        let size = complete_size(number_uniques);

        sorted.try_reserve_exact(size - number_uniques)?;
        sorted.resize(size, u64::MAX);

        let mut tree = Vec::new();
        let mut uniques = Vec::new();

        tree.try_reserve_exact(size)?;
        uniques.try_reserve_exact(size)?;

        tree.resize(size, u64::MAX);
        uniques.resize(size, PADDING);

        let mut builder = TreeBuilder {
            sorted: &sorted,
            number_uniques,
            tree: &mut tree,
            uniques: &mut uniques,
        };

        builder.linearize(0, size, 0);

        Ok(Self {
            tree,
            uniques,
            first,
            duplicates,
            order,
            indexed: hashes.len(),
        })
    }

    /// Returns the number of distinct hashes in the tree, excluding padding.
    pub(crate) fn number_uniques(&self) -> usize {
        self.first.len()
    }

    /// Returns the number of hashes in the tree, including padding.
    pub(crate) fn tree_size(&self) -> usize {
        self.tree.len()
    }

    //  Returns the tree position of the smallest hash not less than `hash`, if any.
    fn lower_bound(&self, hash: u64) -> Option<usize> {
        let number_nodes = self.tree.len() / NODE_KEYS;

        let mut node = 0;
        let mut candidate = None;

        while node < number_nodes {
            let start = node * NODE_KEYS;
            let keys = &self.tree[start..start + NODE_KEYS];

            let branch = keys.iter().take_while(|&&k| k < hash).count();

            if branch < NODE_KEYS {
                candidate = Some(start + branch);
            }

            node = child_offset(node, branch);
        }

        candidate
    }
}

impl LookupStrategy for SealedTreeStrategy {
    fn find(&self, columns: &Columns, hash: u64, key: &str) -> Option<usize> {
        let found = self
            .lower_bound(hash)
            .filter(|&position| self.tree[position] == hash)
            .map(|position| self.uniques[position])
            .filter(|&unique| unique != PADDING)
            .and_then(|unique| {
                let unique = unique as usize;
                let first = self.first[unique] as usize;
                let count = self.duplicates[unique] as usize;

                self.order[first..first + count]
                    .iter()
                    .map(|&slot| slot as usize)
                    .find(|&slot| &*columns.keys[slot] == key)
            });

        //  Anything not covered by the tree is only reachable by scanning.
        found.or_else(|| scan(columns, self.indexed..columns.len(), hash, key))
    }
}

/// The lookup strategy of a slice.
pub(crate) enum Strategy {
    /// Appender, or not yet full.
    Scan(ScanStrategy),
    /// Sealed.
    SealedSearch(SealedTreeStrategy),
}

impl Strategy {
    fn as_lookup(&self) -> &dyn LookupStrategy {
        match self {
            Self::Scan(strategy) => strategy,
            Self::SealedSearch(strategy) => strategy,
        }
    }
}

/// A fixed-capacity slice of keys.
pub(crate) struct Slice {
    columns: Columns,
    capacity: usize,
    cache: Option<u32>,
    strategy: Strategy,
}

impl Slice {
    /// Creates a new, empty, appender slice.
    pub(crate) fn new(capacity: usize) -> Result<Self, StrDicError> {
        let columns = Columns::with_capacity(capacity)?;

        Ok(Self {
            columns,
            capacity,
            cache: None,
            strategy: Strategy::Scan(ScanStrategy),
        })
    }

    /// Returns the number of keys.
    pub(crate) fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns whether there is no key.
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether no more key can be appended.
    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Returns whether the slice is sealed.
    pub(crate) fn is_sealed(&self) -> bool {
        matches!(self.strategy, Strategy::SealedSearch(_))
    }

    /// Returns the key at `slot`.
    pub(crate) fn key(&self, slot: usize) -> &str {
        &self.columns.keys[slot]
    }

    /// Returns the id at `slot`.
    pub(crate) fn id(&self, slot: usize) -> u64 {
        self.columns.ids[slot]
    }

    /// Returns the hashes of the keys, in slot order.
    pub(crate) fn hashes(&self) -> &[u64] {
        &self.columns.hashes
    }

    /// Returns the keys, in slot order.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys.iter().map(|k| &**k)
    }

    /// Returns the `(key, id)` pairs, in slot order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.columns.keys.iter().map(|k| &**k).zip(self.columns.ids.iter().copied())
    }

    /// Appends a key, returning its slot.
    ///
    /// Fails if the slice is full, or sealed.
    pub(crate) fn append(&mut self, key: &str, hash: u64, id: u64) -> Result<usize, StrDicError> {
        if self.is_full() {
            return Err(StrDicError::CapacityExceeded);
        }

        if self.is_sealed() {
            return Err(StrDicError::Corrupted("append to a sealed slice"));
        }

        let slot = self.len();

        self.columns.keys.push(key.into());
        self.columns.hashes.push(hash);
        self.columns.ids.push(id);

        Ok(slot)
    }

    /// Finds the slot of `key`, whose hash is `hash`.
    pub(crate) fn find(&mut self, hash: u64, key: &str) -> Option<usize> {
        if let Some(slot) = self.cache.map(|c| c as usize) {
            if self.columns.hashes[slot] == hash && &*self.columns.keys[slot] == key {
                return Some(slot);
            }
        }

        let slot = self.strategy.as_lookup().find(&self.columns, hash, key)?;

        self.cache = Some(slot as u32);

        Some(slot)
    }

    /// Seals the slice, switching lookups to a search tree.
    ///
    /// Fails if already sealed.
    pub(crate) fn seal(&mut self) -> Result<(), StrDicError> {
        if self.is_sealed() {
            return Err(StrDicError::Corrupted("slice sealed twice"));
        }

        let tree = SealedTreeStrategy::build(&self.columns.hashes)?;

        self.strategy = Strategy::SealedSearch(tree);

        Ok(())
    }

    /// Removes the key at `slot`, shifting the following slots left, and returns its key and id.
    ///
    /// A sealed slice has its tree rebuilt.
    pub(crate) fn remove(&mut self, slot: usize) -> Result<(Box<str>, u64), StrDicError> {
        if slot >= self.len() {
            return Err(StrDicError::Corrupted("removal of a vacant slot"));
        }

        let key = self.columns.keys.remove(slot);
        self.columns.hashes.remove(slot);
        let id = self.columns.ids.remove(slot);

        self.cache = None;

        if self.is_sealed() {
            let tree = SealedTreeStrategy::build(&self.columns.hashes)?;

            self.strategy = Strategy::SealedSearch(tree);
        }

        Ok((key, id))
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let mut debug = f.debug_struct("Slice");

        debug.field("len", &self.len()).field("capacity", &self.capacity);

        match &self.strategy {
            Strategy::Scan(_) => debug.field("strategy", &"Scan"),
            Strategy::SealedSearch(tree) => debug
                .field("strategy", &"SealedSearch")
                .field("uniques", &tree.number_uniques())
                .field("tree", &tree.tree_size()),
        };

        debug.finish()
    }
}

//
//  Implementation
//

/// Fan-out of the sealed tree.
pub(crate) const FAN_OUT: usize = 5;

const NODE_KEYS: usize = FAN_OUT - 1;
const LANES: usize = 4;
const PADDING: u32 = u32::MAX;

/// Returns the index of the `branch`-th child of `node`.
#[inline(always)]
pub(crate) fn child_offset(node: usize, branch: usize) -> usize {
    debug_assert!(branch < FAN_OUT);

    node * FAN_OUT + 1 + branch
}

/// Returns the smallest complete tree size, eg. `5^h - 1`, which can hold `count` hashes.
pub(crate) fn complete_size(count: usize) -> usize {
    let mut size = 0;

    while size < count {
        size = size * FAN_OUT + NODE_KEYS;
    }

    size
}

struct TreeBuilder<'a> {
    sorted: &'a [u64],
    number_uniques: usize,
    tree: &'a mut [u64],
    uniques: &'a mut [u32],
}

impl TreeBuilder<'_> {
    //  Lays out `sorted[low..low + size]` as the subtree rooted at `node`.
    //
    //  `size` is a complete size: the `NODE_KEYS` evenly spaced pivots go in `node`, and the `FAN_OUT` ranges in
    //  between go to its children.
    fn linearize(&mut self, low: usize, size: usize, node: usize) {
        if size == 0 {
            return;
        }

        debug_assert_eq!(0, (size - NODE_KEYS) % FAN_OUT);

        let child = (size - NODE_KEYS) / FAN_OUT;

        for index in 0..NODE_KEYS {
            let pivot = low + (index + 1) * child + index;
            let position = node * NODE_KEYS + index;

            self.tree[position] = self.sorted[pivot];
            self.uniques[position] = if pivot < self.number_uniques { pivot as u32 } else { PADDING };
        }

        for branch in 0..FAN_OUT {
            self.linearize(low + branch * (child + 1), child, child_offset(node, branch));
        }
    }
}

//  Scans `range` of the columns, comparing `LANES` hashes at a time.
fn scan(columns: &Columns, range: Range<usize>, hash: u64, key: &str) -> Option<usize> {
    let is_match = |slot: usize| &*columns.keys[slot] == key;

    let hashes = &columns.hashes[range.clone()];

    let mut chunks = hashes.chunks_exact(LANES);
    let mut base = range.start;

    for chunk in &mut chunks {
        let mut mask = chunk
            .iter()
            .enumerate()
            .fold(0u32, |mask, (lane, &h)| mask | (u32::from(h == hash) << lane));

        while mask != 0 {
            let slot = base + mask.trailing_zeros() as usize;

            if is_match(slot) {
                return Some(slot);
            }

            mask &= mask - 1;
        }

        base += LANES;
    }

    chunks
        .remainder()
        .iter()
        .enumerate()
        .filter(|&(_, &h)| h == hash)
        .map(|(offset, _)| base + offset)
        .find(|&slot| is_match(slot))
}

// mod tests
