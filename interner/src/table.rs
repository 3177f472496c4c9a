//  Implementation of the `StringTable`.

use std::{collections::HashMap, fmt, hash::BuildHasher};

use tracing::trace;

use crate::{
    bloom::BloomFilter,
    error::StrDicError,
    hash::{self, DefaultFxBuildHasher},
    id::GlobalId,
    list::{Handle, SliceList, Statistics},
};

/// The result of a bulk lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Lookup {
    /// The id of each key, in input order; unspecified if the key was not found.
    pub ids: Vec<u64>,
    /// Whether each key was found, in input order.
    pub found: Vec<bool>,
    /// The number of keys not found.
    pub not_found: usize,
}

impl Lookup {
    /// Creates a result for `len` keys, none of which found yet.
    pub(crate) fn with_len(len: usize) -> Result<Self, StrDicError> {
        let (mut ids, mut found) = (Vec::new(), Vec::new());

        ids.try_reserve_exact(len)?;
        found.try_reserve_exact(len)?;

        ids.resize(len, 0);
        found.resize(len, false);

        Ok(Self {
            ids,
            found,
            not_found: len,
        })
    }

    /// Records that the key at `index` was found with `id`.
    pub(crate) fn record(&mut self, index: usize, id: u64) {
        debug_assert!(!self.found[index]);

        self.ids[index] = id;
        self.found[index] = true;
        self.not_found -= 1;
    }
}

/// A string dictionary, mapping each distinct string to a dense integer id.
///
/// The keys are distributed over a fixed number of buckets, by hash. Each bucket is a list of fixed-capacity slices,
/// each guarded by a Bloom filter and the bounds of its hashes.
///
/// Lookups and extractions only require shared access, and may be performed from multiple threads in parallel;
/// insertions and removals require exclusive access.
pub struct StringTable<H = DefaultFxBuildHasher> {
    hasher: H,
    buckets: Box<[SliceList]>,
    locations: HashMap<u64, Location, DefaultFxBuildHasher>,
    next_id: u64,
}

impl<H> StringTable<H> {
    /// Creates a new table, with default configuration.
    ///
    /// To customize the table, use the `with()` method instead.
    pub fn new() -> Result<Self, StrDicError>
    where
        H: Default,
    {
        Self::with(H::default()).build()
    }

    /// Creates a builder for the table, allowing finer-grained tuning.
    pub fn with(hasher: H) -> StringTableBuilder<H> {
        StringTableBuilder {
            hasher,
            number_buckets: DEFAULT_NUMBER_BUCKETS,
            slice_capacity: DEFAULT_SLICE_CAPACITY,
            bloom_bits: None,
        }
    }

    /// Returns the number of buckets.
    pub fn number_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of distinct keys.
    pub fn num_distinct(&self) -> usize {
        self.buckets.iter().map(SliceList::len).sum()
    }

    /// Returns whether the table holds no key.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(SliceList::is_empty)
    }

    /// Returns the aggregated counters of all buckets.
    pub fn statistics(&self) -> Statistics {
        let mut statistics = Statistics::default();

        for bucket in self.buckets.iter() {
            statistics += bucket.statistics();
        }

        statistics
    }

    /// Returns all `(id, key)` pairs, in no particular order.
    pub fn contents(&self) -> Result<Vec<(u64, String)>, StrDicError> {
        let mut contents = Vec::new();
        contents.try_reserve_exact(self.locations.len())?;

        for bucket in self.buckets.iter() {
            let slices = bucket.lock();

            contents.extend(slices.iter().map(|(handle, key)| (handle.id, key.to_owned())));
        }

        Ok(contents)
    }

    /// Returns the key of each id, in input order, or `None` if the id is unknown.
    pub fn extract(&self, ids: &[u64]) -> Result<Vec<Option<String>>, StrDicError> {
        let mut result = Vec::new();
        result.try_reserve_exact(ids.len())?;

        for &id in ids {
            result.push(self.extract_one(id)?);
        }

        Ok(result)
    }

    /// Returns the key of each id, in input order.
    ///
    /// Fails with `UnknownId` on the first unknown id.
    pub fn extract_exact(&self, ids: &[u64]) -> Result<Vec<String>, StrDicError> {
        let mut result = Vec::new();
        result.try_reserve_exact(ids.len())?;

        for &id in ids {
            let key = self.extract_one(id)?.ok_or(StrDicError::UnknownId { id })?;

            result.push(key);
        }

        Ok(result)
    }

    /// Removes the keys of the given ids, returning how many were removed.
    ///
    /// Unknown ids are ignored. The ids of removed keys are never reused.
    pub fn remove_ids(&mut self, ids: &[u64]) -> Result<usize, StrDicError> {
        let mut removed = 0;

        for &id in ids {
            let Some(&location) = self.locations.get(&id) else { continue };

            let handle = Handle {
                slice: location.slice,
                slot: location.slot,
                id,
            };

            self.remove_handle(location.bucket, handle)?;

            removed += 1;
        }

        Ok(removed)
    }

    fn extract_one(&self, id: u64) -> Result<Option<String>, StrDicError> {
        let Some(location) = self.locations.get(&id) else { return Ok(None) };

        let slices = self.buckets[location.bucket as usize].lock();

        match slices.get(location.slice, location.slot) {
            Some((key, stored)) if stored == id => Ok(Some(key.to_owned())),
            _ => Err(StrDicError::Corrupted("location out of sync with bucket")),
        }
    }

    fn remove_handle(&mut self, bucket: u32, handle: Handle) -> Result<(), StrDicError> {
        let removed = self.buckets[bucket as usize].remove(handle)?;

        trace!(bucket, id = handle.id, key = &*removed.key, "removed");

        self.locations.remove(&handle.id);

        for moved in removed.moved {
            let location = Location {
                bucket,
                slice: moved.slice,
                slot: moved.slot,
            };

            self.locations.insert(moved.id, location);
        }

        Ok(())
    }
}

impl<H> StringTable<H>
where
    H: BuildHasher,
{
    /// Returns the index of the bucket of `key`.
    pub fn bucket_index(&self, key: &str) -> usize {
        self.bucket_of(hash::hash_key(&self.hasher, key))
    }

    /// Inserts the keys, returning their ids in input order.
    ///
    /// Keys already present keep their id; new keys are assigned increasing ids.
    pub fn insert_bulk(&mut self, keys: &[&str]) -> Result<Vec<u64>, StrDicError> {
        let hashes = self.hash_all(keys)?;

        self.insert_hashed(keys, &hashes, None)
    }

    /// Inserts the keys with the given ids, returning their ids in input order.
    ///
    /// Fails with `IdMismatch` if a key is already present with a different id, or if an id is already taken by
    /// another key, in which case nothing is inserted.
    pub fn insert_bulk_with_ids(&mut self, keys: &[&str], ids: &[u64]) -> Result<Vec<u64>, StrDicError> {
        let hashes = self.hash_all(keys)?;

        self.insert_hashed(keys, &hashes, Some(ids))
    }

    /// Looks up the keys.
    pub fn get_bulk(&self, keys: &[&str]) -> Result<Lookup, StrDicError> {
        let hashes = self.hash_all(keys)?;

        self.get_hashed(keys, &hashes)
    }

    /// Looks up the keys, all of which are expected to be present, returning their ids in input order.
    ///
    /// Fails with `KeyNotFound` on the first missing key.
    pub fn get_bulk_exact(&self, keys: &[&str]) -> Result<Vec<u64>, StrDicError> {
        let lookup = self.get_bulk(keys)?;

        if let Some(index) = lookup.found.iter().position(|found| !found) {
            return Err(StrDicError::KeyNotFound { index });
        }

        Ok(lookup.ids)
    }

    /// Removes the keys, returning how many were removed.
    ///
    /// Absent keys are ignored.
    pub fn remove_bulk(&mut self, keys: &[&str]) -> Result<usize, StrDicError> {
        let hashes = self.hash_all(keys)?;

        self.remove_hashed(keys, &hashes)
    }

    /// Inserts pre-hashed keys, with optional ids.
    pub(crate) fn insert_hashed(
        &mut self,
        keys: &[&str],
        hashes: &[u64],
        ids: Option<&[u64]>,
    ) -> Result<Vec<u64>, StrDicError> {
        let planned = self.plan_ids(keys, hashes, ids)?;

        self.insert_planned(keys, hashes, &planned)
    }

    /// Determines the id of each pre-hashed key, in input order, without modifying the table.
    ///
    /// Given ids are checked, and returned as is. Otherwise, present keys keep their id, and each new key is assigned
    /// the next id on its first occurrence.
    pub(crate) fn plan_ids(&self, keys: &[&str], hashes: &[u64], ids: Option<&[u64]>) -> Result<Vec<u64>, StrDicError> {
        if keys.len() != hashes.len() || ids.is_some_and(|ids| ids.len() != keys.len()) {
            return Err(StrDicError::NullArgument);
        }

        let mut planned = Vec::new();
        planned.try_reserve_exact(keys.len())?;

        if let Some(ids) = ids {
            self.check_given_ids(keys, hashes, ids)?;

            planned.extend_from_slice(ids);

            return Ok(planned);
        }

        let mut fresh: HashMap<&str, u64, DefaultFxBuildHasher> = HashMap::default();
        let mut next_id = self.next_id;

        for (&key, &hash) in keys.iter().zip(hashes) {
            if let Some(handle) = self.buckets[self.bucket_of(hash)].lookup_by_key(key, hash) {
                planned.push(handle.id);
                continue;
            }

            if let Some(&id) = fresh.get(key) {
                planned.push(id);
                continue;
            }

            if next_id > GlobalId::MAX_LOCAL_ID {
                return Err(StrDicError::UnsupportedOperation("id space exhausted"));
            }

            fresh.try_reserve(1)?;
            fresh.insert(key, next_id);

            planned.push(next_id);
            next_id += 1;
        }

        Ok(planned)
    }

    /// Inserts pre-hashed keys with the ids of `plan_ids`.
    pub(crate) fn insert_planned(
        &mut self,
        keys: &[&str],
        hashes: &[u64],
        ids: &[u64],
    ) -> Result<Vec<u64>, StrDicError> {
        if keys.len() != hashes.len() || keys.len() != ids.len() {
            return Err(StrDicError::NullArgument);
        }

        let mut result = Vec::new();
        result.try_reserve_exact(keys.len())?;
        result.resize(keys.len(), 0);

        let groups = BucketGroups::new(hashes, self.buckets.len())?;

        let (mut group_keys, mut group_hashes, mut group_ids) = (Vec::new(), Vec::new(), Vec::new());

        for (bucket, indexes) in groups.iter() {
            group_keys.clear();
            group_hashes.clear();
            group_ids.clear();

            group_keys.extend(indexes.iter().map(|&index| keys[index]));
            group_hashes.extend(indexes.iter().map(|&index| hashes[index]));
            group_ids.extend(indexes.iter().map(|&index| ids[index]));

            let handles = self.buckets[bucket].insert(&group_keys, &group_hashes, &group_ids)?;

            self.locations.try_reserve(handles.len())?;

            for (&index, handle) in indexes.iter().zip(handles) {
                let location = Location {
                    bucket: bucket as u32,
                    slice: handle.slice,
                    slot: handle.slot,
                };

                self.locations.insert(handle.id, location);

                result[index] = handle.id;
            }
        }

        if let Some(&max) = ids.iter().max() {
            self.next_id = self.next_id.max(max + 1);
        }

        trace!(keys = keys.len(), distinct = self.locations.len(), "bulk insert");

        Ok(result)
    }

    /// Looks up pre-hashed keys.
    pub(crate) fn get_hashed(&self, keys: &[&str], hashes: &[u64]) -> Result<Lookup, StrDicError> {
        if keys.len() != hashes.len() {
            return Err(StrDicError::NullArgument);
        }

        let mut lookup = Lookup::with_len(keys.len())?;

        for (index, (&key, &hash)) in keys.iter().zip(hashes).enumerate() {
            let bucket = self.bucket_of(hash);

            if let Some(handle) = self.buckets[bucket].lookup_by_key(key, hash) {
                lookup.record(index, handle.id);
            }
        }

        Ok(lookup)
    }

    /// Removes pre-hashed keys.
    pub(crate) fn remove_hashed(&mut self, keys: &[&str], hashes: &[u64]) -> Result<usize, StrDicError> {
        if keys.len() != hashes.len() {
            return Err(StrDicError::NullArgument);
        }

        let mut removed = 0;

        for (&key, &hash) in keys.iter().zip(hashes) {
            let bucket = self.bucket_of(hash);

            let Some(handle) = self.buckets[bucket].lookup_by_key(key, hash) else { continue };

            self.remove_handle(bucket as u32, handle)?;

            removed += 1;
        }

        Ok(removed)
    }

    //  Ensures that every given id is either the id of its key, or unclaimed by any other key, be it already present
    //  or part of this call.
    fn check_given_ids(&self, keys: &[&str], hashes: &[u64], ids: &[u64]) -> Result<(), StrDicError> {
        let mut claimed: HashMap<u64, &str, DefaultFxBuildHasher> = HashMap::default();
        let mut requested: HashMap<&str, u64, DefaultFxBuildHasher> = HashMap::default();

        claimed.try_reserve(ids.len())?;
        requested.try_reserve(keys.len())?;

        for ((&key, &hash), &id) in keys.iter().zip(hashes).zip(ids) {
            let conflict = StrDicError::IdMismatch {
                requested: id,
                stored: id,
            };

            if *claimed.entry(id).or_insert(key) != key {
                return Err(conflict);
            }

            if id > GlobalId::MAX_LOCAL_ID {
                return Err(StrDicError::UnsupportedOperation("id beyond the local id space"));
            }

            let previous = *requested.entry(key).or_insert(id);

            if previous != id {
                return Err(StrDicError::IdMismatch {
                    requested: id,
                    stored: previous,
                });
            }

            if let Some(handle) = self.buckets[self.bucket_of(hash)].lookup_by_key(key, hash) {
                if handle.id != id {
                    return Err(StrDicError::IdMismatch {
                        requested: id,
                        stored: handle.id,
                    });
                }

                continue;
            }

            //  The key is absent, hence any key holding the id is another key.
            if self.locations.contains_key(&id) {
                return Err(conflict);
            }
        }

        Ok(())
    }

    fn hash_all(&self, keys: &[&str]) -> Result<Vec<u64>, StrDicError> {
        let mut hashes = Vec::new();
        hashes.try_reserve_exact(keys.len())?;

        hashes.extend(keys.iter().map(|key| hash::hash_key(&self.hasher, key)));

        Ok(hashes)
    }

    #[inline(always)]
    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }
}

impl<H> fmt::Debug for StringTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{{ next_id: {}, buckets: [", self.next_id)?;

        for (index, bucket) in self.buckets.iter().enumerate() {
            let separator = if index > 0 { ", " } else { "" };

            write!(f, "{separator}[")?;

            let slices = bucket.lock();

            for (index, (handle, key)) in slices.iter().enumerate() {
                let separator = if index > 0 { ", " } else { "" };

                let sealed = slices
                    .slice(handle.slice as usize)
                    .is_some_and(|slice| slice.is_sealed());

                write!(
                    f,
                    "{separator}({}{}, {}) -> {} -> {key:?}",
                    handle.slice,
                    if sealed { "*" } else { "" },
                    handle.slot,
                    handle.id,
                )?;
            }

            write!(f, "]")?;
        }

        write!(f, "] }}")
    }
}

/// A builder for the `StringTable`.
pub struct StringTableBuilder<H> {
    hasher: H,
    number_buckets: usize,
    slice_capacity: usize,
    bloom_bits: Option<usize>,
}

impl<H> StringTableBuilder<H> {
    /// Sets the number of buckets.
    ///
    /// The number of buckets is fixed for the lifetime of the table.
    pub fn set_number_buckets(&mut self, number_buckets: usize) -> &mut Self {
        self.number_buckets = number_buckets;
        self
    }

    /// Sets the capacity of each slice, eg. the number of keys after which a slice is sealed.
    ///
    /// The default, 300, keeps the hashes column of a slice within a typical L1 cache.
    pub fn set_slice_capacity(&mut self, slice_capacity: usize) -> &mut Self {
        self.slice_capacity = slice_capacity;
        self
    }

    /// Sets the number of bits of the Bloom filter of each slice.
    ///
    /// Defaults to about 10 bits per key of slice capacity.
    pub fn set_bloom_bits(&mut self, bloom_bits: usize) -> &mut Self {
        self.bloom_bits = Some(bloom_bits);
        self
    }

    /// Attempts to build a table with the current configuration.
    ///
    /// This may fail if the configuration is invalid, or if memory cannot be allocated.
    pub fn build(self) -> Result<StringTable<H>, StrDicError> {
        self.config().build(self.hasher)
    }

    pub(crate) fn into_parts(self) -> (H, TableConfig) {
        let config = self.config();

        (self.hasher, config)
    }

    fn config(&self) -> TableConfig {
        TableConfig {
            number_buckets: self.number_buckets,
            slice_capacity: self.slice_capacity,
            bloom_bits: self.bloom_bits,
        }
    }
}

/// The configuration of a `StringTable`, minus its hasher.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TableConfig {
    pub(crate) number_buckets: usize,
    pub(crate) slice_capacity: usize,
    pub(crate) bloom_bits: Option<usize>,
}

impl TableConfig {
    pub(crate) fn validate(&self) -> Result<(), StrDicError> {
        if self.number_buckets == 0 || u32::try_from(self.number_buckets).is_err() {
            return Err(StrDicError::InvalidConfiguration("number of buckets must be within [1, 2^32)"));
        }

        if self.slice_capacity == 0 || u32::try_from(self.slice_capacity).is_err() {
            return Err(StrDicError::InvalidConfiguration("slice capacity must be within [1, 2^32)"));
        }

        Ok(())
    }

    pub(crate) fn build<H>(&self, hasher: H) -> Result<StringTable<H>, StrDicError> {
        self.validate()?;

        let bloom_bits = self
            .bloom_bits
            .unwrap_or_else(|| BloomFilter::bits_for(self.slice_capacity));

        let mut buckets = Vec::new();
        buckets.try_reserve_exact(self.number_buckets)?;

        for _ in 0..self.number_buckets {
            buckets.push(SliceList::new(self.slice_capacity, bloom_bits)?);
        }

        Ok(StringTable {
            hasher,
            buckets: buckets.into_boxed_slice(),
            locations: HashMap::default(),
            next_id: 0,
        })
    }
}

//
//  Implementation
//

const DEFAULT_NUMBER_BUCKETS: usize = 1024;
const DEFAULT_SLICE_CAPACITY: usize = 300;

//  Where a key lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Location {
    bucket: u32,
    slice: u32,
    slot: u32,
}

//  Input indexes, grouped by bucket, preserving input order within each bucket.
struct BucketGroups {
    offsets: Vec<usize>,
    indexes: Vec<usize>,
}

impl BucketGroups {
    fn new(hashes: &[u64], number_buckets: usize) -> Result<Self, StrDicError> {
        let bucket_of = |hash: u64| (hash % number_buckets as u64) as usize;

        let mut offsets = Vec::new();
        offsets.try_reserve_exact(number_buckets + 1)?;
        offsets.resize(number_buckets + 1, 0);

        for &hash in hashes {
            offsets[bucket_of(hash) + 1] += 1;
        }

        for bucket in 0..number_buckets {
            offsets[bucket + 1] += offsets[bucket];
        }

        let mut cursors = offsets.clone();

        let mut indexes = Vec::new();
        indexes.try_reserve_exact(hashes.len())?;
        indexes.resize(hashes.len(), 0);

        for (index, &hash) in hashes.iter().enumerate() {
            let cursor = &mut cursors[bucket_of(hash)];

            indexes[*cursor] = index;
            *cursor += 1;
        }

        Ok(Self { offsets, indexes })
    }

    //  Iterates over non-empty buckets.
    fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.offsets
            .windows(2)
            .enumerate()
            .filter(|(_, window)| window[0] < window[1])
            .map(|(bucket, window)| (bucket, &self.indexes[window[0]..window[1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_send<T: Send>() {}
    fn ensure_sync<T: Sync>() {}

    fn table(number_buckets: usize, slice_capacity: usize) -> StringTable {
        let mut builder = StringTable::with(DefaultFxBuildHasher::default());

        builder
            .set_number_buckets(number_buckets)
            .set_slice_capacity(slice_capacity);

        builder.build().unwrap()
    }

    #[test]
    fn string_table_send_sync() {
        ensure_send::<StringTable>();
        ensure_sync::<StringTable>();
    }

    #[test]
    fn invalid_configuration() {
        let mut builder = StringTable::with(DefaultFxBuildHasher::default());
        builder.set_number_buckets(0);

        assert!(matches!(builder.build(), Err(StrDicError::InvalidConfiguration(_))));

        let mut builder = StringTable::with(DefaultFxBuildHasher::default());
        builder.set_slice_capacity(0);

        assert!(matches!(builder.build(), Err(StrDicError::InvalidConfiguration(_))));
    }

    #[test]
    fn single_bucket_ids() {
        let mut table = table(1, 300);

        assert!(table.is_empty());
        assert_eq!(vec![0, 1, 0, 2], table.insert_bulk(&["a", "b", "a", "c"]).unwrap());
        assert_eq!(3, table.num_distinct());

        //  Known keys keep their ids across calls.
        assert_eq!(vec![2, 3, 0], table.insert_bulk(&["c", "d", "a"]).unwrap());
        assert_eq!(4, table.num_distinct());
    }

    #[test]
    fn dense_ids_many_buckets() {
        let mut table = table(64, 8);

        let keys: Vec<String> = (0..1000).map(|i| format!("dense-{}", i % 700)).collect();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();

        let ids = table.insert_bulk(&keys).unwrap();

        //  First occurrences come first, hence are numbered in input order regardless of their bucket.
        assert_eq!((0..700).collect::<Vec<u64>>(), ids[..700]);
        assert_eq!(700, table.num_distinct());

        for (index, key) in keys.iter().enumerate() {
            assert_eq!(ids[index % 700], ids[index], "{key}");
        }
    }

    #[test]
    fn lookup_and_extract() {
        let mut table = table(16, 4);

        let keys: Vec<String> = (0..100).map(|i| format!("round-trip-{i}")).collect();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();

        let ids = table.insert_bulk(&keys).unwrap();

        assert_eq!(ids, table.get_bulk_exact(&keys).unwrap());

        let extracted = table.extract_exact(&ids).unwrap();

        assert_eq!(keys, extracted.iter().map(|k| k.as_str()).collect::<Vec<_>>());

        let mut contents = table.contents().unwrap();
        contents.sort();

        assert_eq!(100, contents.len());
        assert!(contents.iter().all(|(id, key)| keys[*id as usize] == key));
    }

    #[test]
    fn missing_key() {
        let mut table = table(4, 4);

        table.insert_bulk(&["present"]).unwrap();

        let lookup = table.get_bulk(&["present", "absent"]).unwrap();

        assert_eq!(vec![true, false], lookup.found);
        assert_eq!(1, lookup.not_found);
        assert_eq!(0, lookup.ids[0]);

        assert_eq!(
            Err(StrDicError::KeyNotFound { index: 1 }),
            table.get_bulk_exact(&["present", "absent"])
        );
    }

    #[test]
    fn unknown_id() {
        let mut table = table(4, 4);

        table.insert_bulk(&["present"]).unwrap();

        assert_eq!(vec![Some("present".to_owned()), None], table.extract(&[0, 7]).unwrap());
        assert_eq!(Err(StrDicError::UnknownId { id: 7 }), table.extract_exact(&[0, 7]));
    }

    #[test]
    fn given_ids() {
        let mut table = table(4, 4);

        assert_eq!(vec![10, 20], table.insert_bulk_with_ids(&["x", "y"], &[10, 20]).unwrap());

        //  Auto-assigned ids continue past the given ones.
        assert_eq!(vec![21], table.insert_bulk(&["z"]).unwrap());

        assert_eq!(
            Err(StrDicError::IdMismatch { requested: 11, stored: 10 }),
            table.insert_bulk_with_ids(&["x"], &[11])
        );
        assert_eq!(
            Err(StrDicError::IdMismatch { requested: 20, stored: 20 }),
            table.insert_bulk_with_ids(&["w"], &[20])
        );
        assert_eq!(Err(StrDicError::NullArgument), table.insert_bulk_with_ids(&["w"], &[]));

        assert_eq!(vec![10], table.insert_bulk_with_ids(&["x"], &[10]).unwrap());

        //  Conflicts within a call are caught before anything is inserted.
        assert_eq!(
            Err(StrDicError::IdMismatch { requested: 31, stored: 30 }),
            table.insert_bulk_with_ids(&["v", "u", "v"], &[30, 32, 31])
        );
        assert_eq!(
            Err(StrDicError::IdMismatch { requested: 40, stored: 40 }),
            table.insert_bulk_with_ids(&["s", "t"], &[40, 40])
        );
        assert_eq!(3, table.num_distinct());
        assert_eq!(4, table.get_bulk(&["u", "v", "s", "t"]).unwrap().not_found);
    }

    #[test]
    fn fresh_ids_in_input_order() {
        let mut table = table(64, 8);

        assert_eq!(vec![0, 0], table.insert_bulk(&["k3", "k3"]).unwrap());

        let keys = ["k0", "k1", "k2", "k3", "k4", "k1", "k5", "k6", "k7"];

        assert_eq!(vec![1, 2, 3, 0, 4, 2, 5, 6, 7], table.insert_bulk(&keys).unwrap());
        assert_eq!(8, table.num_distinct());
    }

    #[test]
    fn id_space_limit() {
        let mut table = table(4, 4);

        assert_eq!(
            Err(StrDicError::UnsupportedOperation("id beyond the local id space")),
            table.insert_bulk_with_ids(&["over"], &[GlobalId::MAX_LOCAL_ID + 1])
        );

        table.insert_bulk_with_ids(&["last"], &[GlobalId::MAX_LOCAL_ID]).unwrap();

        assert_eq!(
            Err(StrDicError::UnsupportedOperation("id space exhausted")),
            table.insert_bulk(&["last", "next"])
        );

        assert_eq!(1, table.num_distinct());
        assert_eq!(vec![GlobalId::MAX_LOCAL_ID], table.insert_bulk(&["last"]).unwrap());
    }

    #[test]
    fn remove_by_key_and_id() {
        let mut table = table(2, 4);

        let keys: Vec<String> = (0..40).map(|i| format!("remove-{i}")).collect();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();

        let ids = table.insert_bulk(&keys).unwrap();

        assert_eq!(2, table.remove_bulk(&[keys[3], keys[17], "absent"]).unwrap());
        assert_eq!(1, table.remove_ids(&[ids[25], ids[25], 12345]).unwrap());
        assert_eq!(37, table.num_distinct());

        let lookup = table.get_bulk(&keys).unwrap();

        assert_eq!(3, lookup.not_found);

        for (index, found) in lookup.found.iter().enumerate() {
            let removed = [3, 17, 25].contains(&index);

            assert_eq!(!removed, *found, "{index}");

            if *found {
                assert_eq!(ids[index], lookup.ids[index]);
                assert_eq!(vec![Some(keys[index].to_owned())], table.extract(&[ids[index]]).unwrap());
            } else {
                assert_eq!(vec![None], table.extract(&[ids[index]]).unwrap());
            }
        }

        //  Removed ids are not reused.
        let id = table.insert_bulk(&[keys[3]]).unwrap()[0];

        assert_eq!(40, id);
    }

    #[test]
    fn statistics() {
        let mut table = table(1, 300);

        let keys: Vec<String> = (0..301).map(|i| format!("stat-{i}")).collect();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();

        table.insert_bulk(&keys).unwrap();

        let statistics = table.statistics();

        assert_eq!(1, statistics.buckets);
        assert_eq!(2, statistics.slices);
        assert_eq!(1, statistics.sealed_slices);
        assert_eq!(301, statistics.distinct);
    }

    #[test]
    fn bucket_groups() {
        let groups = BucketGroups::new(&[5, 2, 7, 4, 1], 3).unwrap();

        let collected: Vec<(usize, Vec<usize>)> = groups.iter().map(|(b, i)| (b, i.to_vec())).collect();

        assert_eq!(vec![(1, vec![3, 4]), (2, vec![0, 1, 2])], collected);
    }

    #[test]
    fn debug() {
        let mut table = table(2, 1);

        table.insert_bulk(&["a"]).unwrap();

        let debug = format!("{table:?}");

        assert!(debug.starts_with("{ next_id: 1, buckets: ["), "{debug}");
        assert!(debug.contains("(0*, 0) -> 0 -> \"a\""), "{debug}");
    }
} // mod tests
