//  A bucket: an append-only list of slices.
//
//  Each slice comes with a Bloom filter and hash bounds, both consulted before the slice itself, and with read
//  counters. Only the last slice of the list accepts new keys; once full it is sealed and a fresh slice takes over.

use std::ops::AddAssign;

use tracing::{debug, trace};

use crate::{
    bloom::BloomFilter,
    error::StrDicError,
    lock::{SpinLock, SpinLockGuard},
    slice::{HashBounds, Slice, SliceDescriptor},
};

/// Aggregated counters of a table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    /// Number of buckets.
    pub buckets: usize,
    /// Number of slices, sealed or not.
    pub slices: usize,
    /// Number of sealed slices.
    pub sealed_slices: usize,
    /// Number of distinct keys.
    pub distinct: usize,
    /// Number of bits of all Bloom filters.
    pub bloom_bits: usize,
    /// Number of slice lookups attempted.
    pub reads_all: u64,
    /// Number of slice lookups which found their key.
    pub reads_hit: u64,
    /// Number of slice lookups avoided thanks to the hash bounds.
    pub skipped_by_bounds: u64,
    /// Number of slice lookups avoided thanks to the Bloom filters.
    pub skipped_by_bloom: u64,
}

impl AddAssign for Statistics {
    fn add_assign(&mut self, other: Self) {
        self.buckets += other.buckets;
        self.slices += other.slices;
        self.sealed_slices += other.sealed_slices;
        self.distinct += other.distinct;
        self.bloom_bits += other.bloom_bits;
        self.reads_all += other.reads_all;
        self.reads_hit += other.reads_hit;
        self.skipped_by_bounds += other.skipped_by_bounds;
        self.skipped_by_bloom += other.skipped_by_bloom;
    }
}

/// The location of a key within a `SliceList`, and its id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Handle {
    /// Index of the slice.
    pub(crate) slice: u32,
    /// Index of the slot within the slice.
    pub(crate) slot: u32,
    /// Id of the key.
    pub(crate) id: u64,
}

/// The outcome of a removal.
#[derive(Debug)]
pub(crate) struct Removed {
    /// The removed key.
    pub(crate) key: Box<str>,
    /// The handles of the keys which were shifted to fill the gap, with their new location.
    pub(crate) moved: Vec<Handle>,
}

/// A list of slices, guarded by a spin lock.
#[derive(Debug)]
pub(crate) struct SliceList {
    slices: SpinLock<Slices>,
}

impl SliceList {
    /// Creates a list with a single, empty, appender slice.
    pub(crate) fn new(slice_capacity: usize, bloom_bits: usize) -> Result<Self, StrDicError> {
        let slices = Slices::new(slice_capacity, bloom_bits)?;

        Ok(Self {
            slices: SpinLock::new(slices),
        })
    }

    /// Locks the list, for a sequence of operations.
    pub(crate) fn lock(&self) -> SpinLockGuard<'_, Slices> {
        self.slices.lock()
    }

    /// Inserts the keys, with their hashes and ids, returning their handles.
    ///
    /// A key already present keeps its handle, and must have been given the same id.
    pub(crate) fn insert(&self, keys: &[&str], hashes: &[u64], ids: &[u64]) -> Result<Vec<Handle>, StrDicError> {
        if keys.len() != hashes.len() || keys.len() != ids.len() {
            return Err(StrDicError::NullArgument);
        }

        let mut slices = self.lock();

        let mut handles = Vec::new();
        handles.try_reserve_exact(keys.len())?;

        for ((&key, &hash), &id) in keys.iter().zip(hashes).zip(ids) {
            let handle = match slices.lookup_by_key(key, hash) {
                Some(handle) if handle.id != id => {
                    return Err(StrDicError::IdMismatch {
                        requested: id,
                        stored: handle.id,
                    })
                }
                Some(handle) => handle,
                None => slices.append(key, hash, id)?,
            };

            handles.push(handle);
        }

        Ok(handles)
    }

    /// Looks up a key.
    pub(crate) fn lookup_by_key(&self, key: &str, hash: u64) -> Option<Handle> {
        self.lock().lookup_by_key(key, hash)
    }

    /// Removes the key designated by `handle`.
    pub(crate) fn remove(&self, handle: Handle) -> Result<Removed, StrDicError> {
        self.lock().remove(handle)
    }

    /// Returns whether the list holds no key.
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the number of keys.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns the counters of this list.
    pub(crate) fn statistics(&self) -> Statistics {
        self.lock().statistics()
    }
}

/// The slices of a `SliceList`, with their co-indexed filters, bounds, and descriptors.
pub(crate) struct Slices {
    slices: Vec<Slice>,
    descriptors: Vec<SliceDescriptor>,
    filters: Vec<BloomFilter>,
    bounds: Vec<HashBounds>,
    appender: usize,
    slice_capacity: usize,
    bloom_bits: usize,
}

impl Slices {
    fn new(slice_capacity: usize, bloom_bits: usize) -> Result<Self, StrDicError> {
        if slice_capacity == 0 {
            return Err(StrDicError::InvalidConfiguration("slice capacity must be positive"));
        }

        let mut this = Self {
            slices: Vec::new(),
            descriptors: Vec::new(),
            filters: Vec::new(),
            bounds: Vec::new(),
            appender: 0,
            slice_capacity,
            bloom_bits,
        };

        this.push_appender()?;

        Ok(this)
    }

    /// Returns whether there is no key.
    pub(crate) fn is_empty(&self) -> bool {
        self.slices.iter().all(Slice::is_empty)
    }

    /// Returns the number of keys.
    pub(crate) fn len(&self) -> usize {
        self.slices.iter().map(Slice::len).sum()
    }

    /// Returns the number of slices.
    pub(crate) fn number_slices(&self) -> usize {
        self.slices.len()
    }

    /// Returns the slice at `index`.
    pub(crate) fn slice(&self, index: usize) -> Option<&Slice> {
        self.slices.get(index)
    }

    /// Returns the key and id at the given location, if any.
    pub(crate) fn get(&self, slice: u32, slot: u32) -> Option<(&str, u64)> {
        let slice = self.slices.get(slice as usize)?;
        let slot = slot as usize;

        (slot < slice.len()).then(|| (slice.key(slot), slice.id(slot)))
    }

    /// Iterates over all keys, oldest slices first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Handle, &str)> + '_ {
        self.slices.iter().enumerate().flat_map(|(index, slice)| {
            slice.entries().enumerate().map(move |(slot, (key, id))| {
                let handle = Handle {
                    slice: index as u32,
                    slot: slot as u32,
                    id,
                };

                (handle, key)
            })
        })
    }

    /// Looks up a key, oldest slices first.
    pub(crate) fn lookup_by_key(&mut self, key: &str, hash: u64) -> Option<Handle> {
        let guards = self.bounds.iter().zip(&self.filters);
        let slices = self.slices.iter_mut().zip(self.descriptors.iter_mut());

        for (index, ((slice, descriptor), (bounds, filter))) in slices.zip(guards).enumerate() {
            descriptor.reads_all += 1;

            if !bounds.contains(hash) {
                descriptor.skipped_by_bounds += 1;
                continue;
            }

            if !filter.test(key.as_bytes()) {
                descriptor.skipped_by_bloom += 1;
                continue;
            }

            let Some(slot) = slice.find(hash, key) else { continue };

            descriptor.reads_hit += 1;

            return Some(Handle {
                slice: index as u32,
                slot: slot as u32,
                id: slice.id(slot),
            });
        }

        None
    }

    /// Appends a key, known to be absent, to the appender slice.
    ///
    /// If this fills the appender, it is sealed and a new appender is created.
    pub(crate) fn append(&mut self, key: &str, hash: u64, id: u64) -> Result<Handle, StrDicError> {
        let index = self.appender;

        let slot = self.slices[index].append(key, hash, id)?;

        self.bounds[index].include(hash);

        if self.filters[index].test_and_set(key.as_bytes()) {
            trace!(slice = index, "bloom filter false positive on append");
        }

        if self.slices[index].is_full() {
            self.slices[index].seal()?;

            debug!(slice = index, len = self.slices[index].len(), "slice sealed");

            self.push_appender()?;
        }

        Ok(Handle {
            slice: index as u32,
            slot: slot as u32,
            id,
        })
    }

    /// Removes the key designated by `handle`.
    ///
    /// Bloom filters cannot forget keys, hence the filter and bounds of the slice are rebuilt from its remaining keys.
    pub(crate) fn remove(&mut self, handle: Handle) -> Result<Removed, StrDicError> {
        let index = handle.slice as usize;
        let slot = handle.slot as usize;

        let Some(slice) = self.slices.get_mut(index) else {
            return Err(StrDicError::Corrupted("handle to an unknown slice"));
        };

        if slot >= slice.len() || slice.id(slot) != handle.id {
            return Err(StrDicError::Corrupted("stale handle"));
        }

        let (key, _) = slice.remove(slot)?;

        let mut moved = Vec::new();
        moved.try_reserve_exact(slice.len() - slot)?;

        moved.extend((slot..slice.len()).map(|slot| Handle {
            slice: handle.slice,
            slot: slot as u32,
            id: slice.id(slot),
        }));

        let filter = &mut self.filters[index];
        filter.clear();

        slice.keys().for_each(|key| filter.set(key.as_bytes()));

        let mut bounds = HashBounds::empty();
        slice.hashes().iter().for_each(|&hash| bounds.include(hash));

        self.bounds[index] = bounds;

        trace!(slice = index, slot, moved = moved.len(), bounds = ?bounds.range(), "key removed");

        Ok(Removed { key, moved })
    }

    /// Returns the counters of this list.
    pub(crate) fn statistics(&self) -> Statistics {
        let mut statistics = Statistics {
            buckets: 1,
            slices: self.number_slices(),
            sealed_slices: self.slices.iter().filter(|s| s.is_sealed()).count(),
            distinct: self.len(),
            bloom_bits: self.filters.iter().map(BloomFilter::number_bits).sum(),
            ..Statistics::default()
        };

        for descriptor in &self.descriptors {
            statistics.reads_all += descriptor.reads_all;
            statistics.reads_hit += descriptor.reads_hit;
            statistics.skipped_by_bounds += descriptor.skipped_by_bounds;
            statistics.skipped_by_bloom += descriptor.skipped_by_bloom;
        }

        statistics
    }

    fn push_appender(&mut self) -> Result<(), StrDicError> {
        self.slices.try_reserve(1)?;
        self.descriptors.try_reserve(1)?;
        self.filters.try_reserve(1)?;
        self.bounds.try_reserve(1)?;

        let slice = Slice::new(self.slice_capacity)?;
        let filter = BloomFilter::new(self.bloom_bits)?;

        self.appender = self.slices.len();

        self.slices.push(slice);
        self.descriptors.push(SliceDescriptor::default());
        self.filters.push(filter);
        self.bounds.push(HashBounds::empty());

        Ok(())
    }
}

impl std::fmt::Debug for Slices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("Slices")
            .field("appender", &self.appender)
            .field("slices", &self.slices)
            .field("descriptors", &self.descriptors)
            .field("bounds", &self.bounds)
            .finish()
    }
}

// mod tests
