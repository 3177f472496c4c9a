//  Implementation of the `ThreadedStringTable`.

use std::{
    fmt,
    hash::BuildHasher,
    panic::{self, AssertUnwindSafe},
    thread,
};

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace, warn};

use crate::{
    error::StrDicError,
    hash::{self, DefaultFxBuildHasher},
    id::GlobalId,
    list::Statistics,
    table::{Lookup, StringTable, StringTableBuilder},
};

/// A string dictionary, sharded across a number of carriers, each owning a private `StringTable`.
///
/// Each bulk operation is split by carrier, the parts are executed in parallel on a persistent pool of threads, one
/// per carrier, and the results are reassembled in input order.
///
/// The ids returned are `GlobalId`s in their encoded form, embedding the index of their carrier.
///
/// #   Concurrency
///
/// All operations take `&self`, and may be invoked from any number of threads. Bulk operations are serialized: a
/// single lock guards all carriers for the duration of each bulk operation, parallelism only occurs within one.
///
/// #   Inline mode
///
/// With 0 threads, a single carrier executes all operations on the calling thread, and its global ids are equal to its
/// local ids.
pub struct ThreadedStringTable<H = DefaultFxBuildHasher> {
    hasher: H,
    number_threads: usize,
    carriers: Mutex<Vec<Carrier<H>>>,
    pool: Option<ThreadPool>,
}

impl<H> ThreadedStringTable<H> {
    /// Creates a new table, with default configuration.
    ///
    /// To customize the table, use the `with()` method instead.
    pub fn new() -> Result<Self, StrDicError>
    where
        H: Clone + Default,
    {
        Self::with(H::default()).build()
    }

    /// Creates a builder for the table, allowing finer-grained tuning.
    pub fn with(hasher: H) -> ThreadedStringTableBuilder<H> {
        let number_threads = thread::available_parallelism()
            .map_or(1, |threads| threads.get())
            .min(GlobalId::MAX_OWNERS);

        ThreadedStringTableBuilder {
            table: StringTable::with(hasher),
            number_threads,
        }
    }

    /// Returns the number of worker threads, 0 in inline mode.
    pub fn number_threads(&self) -> usize {
        self.number_threads
    }

    /// Returns the number of distinct keys, across all carriers.
    pub fn num_distinct(&self) -> usize {
        self.carriers.lock().iter().map(|carrier| carrier.table.num_distinct()).sum()
    }

    /// Returns whether the table holds no key.
    pub fn is_empty(&self) -> bool {
        self.carriers.lock().iter().all(|carrier| carrier.table.is_empty())
    }

    /// Returns the aggregated counters of all carriers.
    pub fn statistics(&self) -> Statistics {
        let mut statistics = Statistics::default();

        for carrier in self.carriers.lock().iter() {
            statistics += carrier.table.statistics();
        }

        statistics
    }

    /// Returns all `(global id, key)` pairs, in no particular order.
    pub fn contents(&self) -> Result<Vec<(u64, String)>, StrDicError> {
        let carriers = self.carriers.lock();

        let mut contents = Vec::new();

        for (owner, carrier) in carriers.iter().enumerate() {
            let local = carrier.table.contents()?;

            contents.try_reserve(local.len())?;

            for (id, key) in local {
                contents.push((GlobalId::new(owner, id)?.encode(), key));
            }
        }

        Ok(contents)
    }
}

impl<H> ThreadedStringTable<H>
where
    H: BuildHasher + Send + Sync,
{
    /// Inserts the keys, returning their global ids in input order.
    pub fn insert(&self, keys: &[&str]) -> Result<Vec<u64>, StrDicError> {
        self.insert_impl(keys, None)
    }

    /// Inserts the keys with the given global ids, returning their global ids in input order.
    ///
    /// Each id must designate the carrier the key is routed to, as is the case for the ids of `contents()` when
    /// re-inserted into a table with the same hasher and number of threads. Fails with `IdMismatch` otherwise, or
    /// if a key is already present with another id, or an id already taken by another key.
    pub fn insert_with_ids(&self, keys: &[&str], ids: &[u64]) -> Result<Vec<u64>, StrDicError> {
        if keys.len() != ids.len() {
            return Err(StrDicError::NullArgument);
        }

        self.insert_impl(keys, Some(ids))
    }

    /// Looks up the keys.
    pub fn get(&self, keys: &[&str]) -> Result<Lookup, StrDicError> {
        let mut carriers = self.carriers.lock();

        let shards = self.assign_keys(keys, None, carriers.len())?;

        let locals = self.dispatch("get", &mut carriers[..], &shards, |_, table, shard| {
            table.get_hashed(&shard.keys, &shard.hashes)
        })?;

        let mut lookup = Lookup::with_len(keys.len())?;

        for (owner, (shard, local)) in shards.iter().zip(locals).enumerate() {
            for (position, &index) in shard.indexes.iter().enumerate() {
                if local.found[position] {
                    lookup.record(index, GlobalId::new(owner, local.ids[position])?.encode());
                }
            }
        }

        Ok(lookup)
    }

    /// Looks up the keys, all of which are expected to be present, returning their global ids in input order.
    ///
    /// Fails with `KeyNotFound` on the first missing key.
    pub fn get_exact(&self, keys: &[&str]) -> Result<Vec<u64>, StrDicError> {
        let lookup = self.get(keys)?;

        if let Some(index) = lookup.found.iter().position(|found| !found) {
            return Err(StrDicError::KeyNotFound { index });
        }

        Ok(lookup.ids)
    }

    /// Returns the key of each global id, in input order, or `None` if the id is unknown.
    pub fn extract(&self, ids: &[u64]) -> Result<Vec<Option<String>>, StrDicError> {
        let mut carriers = self.carriers.lock();

        let shards = assign_ids(ids, carriers.len())?;

        let locals = self.dispatch("extract", &mut carriers[..], &shards, |_, table, shard| {
            table.extract(&shard.ids)
        })?;

        let mut result = Vec::new();
        result.try_reserve_exact(ids.len())?;
        result.resize_with(ids.len(), || None);

        for (shard, keys) in shards.iter().zip(locals) {
            for (&index, key) in shard.indexes.iter().zip(keys) {
                result[index] = key;
            }
        }

        Ok(result)
    }

    /// Returns the key of each global id, in input order.
    ///
    /// Fails with `UnknownId` on the first unknown id.
    pub fn extract_exact(&self, ids: &[u64]) -> Result<Vec<String>, StrDicError> {
        self.extract(ids)?
            .into_iter()
            .zip(ids)
            .map(|(key, &id)| key.ok_or(StrDicError::UnknownId { id }))
            .collect()
    }

    /// Removes the keys of the given global ids, returning how many were removed.
    ///
    /// Unknown ids are ignored.
    pub fn remove(&self, ids: &[u64]) -> Result<usize, StrDicError> {
        let mut carriers = self.carriers.lock();

        let shards = assign_ids(ids, carriers.len())?;

        let removed = self.dispatch("remove", &mut carriers[..], &shards, |_, table, shard| {
            table.remove_ids(&shard.ids)
        })?;

        Ok(removed.into_iter().sum())
    }

    /// Removes the keys, returning how many were removed.
    ///
    /// Absent keys are ignored.
    pub fn remove_keys(&self, keys: &[&str]) -> Result<usize, StrDicError> {
        let mut carriers = self.carriers.lock();

        let shards = self.assign_keys(keys, None, carriers.len())?;

        let removed = self.dispatch("remove_keys", &mut carriers[..], &shards, |_, table, shard| {
            table.remove_hashed(&shard.keys, &shard.hashes)
        })?;

        Ok(removed.into_iter().sum())
    }

    fn insert_impl(&self, keys: &[&str], ids: Option<&[u64]>) -> Result<Vec<u64>, StrDicError> {
        let mut carriers = self.carriers.lock();

        let shards = self.assign_keys(keys, ids, carriers.len())?;

        //  All carriers plan their ids first, so that a failure in any of them leaves all of them untouched.
        let plans = self.dispatch("plan", &mut carriers[..], &shards, |owner, table, shard| {
            let given = ids.map(|_| shard.ids.as_slice());

            table
                .plan_ids(&shard.keys, &shard.hashes, given)
                .map_err(|error| globalize(owner, error))
        })?;

        let locals = self.dispatch("insert", &mut carriers[..], &shards, |owner, table, shard| {
            table
                .insert_planned(&shard.keys, &shard.hashes, &plans[owner])
                .map_err(|error| globalize(owner, error))
        })?;

        let mut result = Vec::new();
        result.try_reserve_exact(keys.len())?;
        result.resize(keys.len(), 0);

        for (owner, (shard, locals)) in shards.iter().zip(locals).enumerate() {
            for (&index, local) in shard.indexes.iter().zip(locals) {
                result[index] = GlobalId::new(owner, local)?.encode();
            }
        }

        Ok(result)
    }

    //  Splits the keys by carrier.
    //
    //  If ids are given, they must designate the carrier of their key, and only their local part is kept.
    fn assign_keys<'k>(
        &self,
        keys: &[&'k str],
        ids: Option<&[u64]>,
        number_carriers: usize,
    ) -> Result<Vec<Shard<'k>>, StrDicError> {
        let mut hashes = Vec::new();
        hashes.try_reserve_exact(keys.len())?;
        hashes.extend(keys.iter().map(|key| hash::hash_key(&self.hasher, key)));

        let mut counts = Vec::new();
        counts.try_reserve_exact(number_carriers)?;
        counts.resize(number_carriers, 0);

        for &hash in &hashes {
            counts[owner_of(hash, number_carriers)] += 1;
        }

        let mut shards = Vec::new();
        shards.try_reserve_exact(number_carriers)?;

        for count in counts {
            shards.push(Shard::with_capacity(count, ids.is_some())?);
        }

        for (index, (&key, &hash)) in keys.iter().zip(&hashes).enumerate() {
            let owner = owner_of(hash, number_carriers);
            let shard = &mut shards[owner];

            if let Some(ids) = ids {
                let given = GlobalId::decode(ids[index]);

                if given.owner() != owner {
                    return Err(StrDicError::IdMismatch {
                        requested: ids[index],
                        stored: GlobalId::new(owner, given.local())?.encode(),
                    });
                }

                shard.ids.push(given.local());
            }

            shard.keys.push(key);
            shard.hashes.push(hash);
            shard.indexes.push(index);
        }

        Ok(shards)
    }

    //  Runs `work` on every carrier, in parallel, and waits for all of them.
    //
    //  Returns the result of each carrier, in carrier order, or all the failures.
    fn dispatch<T, F>(
        &self,
        operation: &'static str,
        carriers: &mut [Carrier<H>],
        shards: &[Shard<'_>],
        work: F,
    ) -> Result<Vec<T>, StrDicError>
    where
        T: Send,
        F: Fn(usize, &mut StringTable<H>, &Shard<'_>) -> Result<T, StrDicError> + Sync,
    {
        debug_assert_eq!(carriers.len(), shards.len());

        debug!(
            operation,
            carriers = carriers.len(),
            keys = shards.iter().map(Shard::len).sum::<usize>(),
            "dispatch"
        );

        let mut outcomes: Vec<Option<Result<T, StrDicError>>> = Vec::new();
        outcomes.try_reserve_exact(carriers.len())?;
        outcomes.resize_with(carriers.len(), || None);

        let tasks = carriers.iter_mut().zip(shards).zip(outcomes.iter_mut()).enumerate();

        match &self.pool {
            Some(pool) => pool.scope(|scope| {
                for (index, ((carrier, shard), outcome)) in tasks {
                    let work = &work;

                    scope.spawn(move |_| *outcome = Some(carrier.run(index, operation, shard, work)));
                }
            }),
            None => {
                for (index, ((carrier, shard), outcome)) in tasks {
                    *outcome = Some(carrier.run(index, operation, shard, &work));
                }
            }
        }

        let mut results = Vec::new();
        results.try_reserve_exact(outcomes.len())?;

        let mut failures = Vec::new();

        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(result)) => results.push(result),
                Some(Err(error)) => {
                    warn!(operation, carrier = index, %error, "worker failed");

                    failures.push((index, error));
                }
                None => failures.push((index, StrDicError::Corrupted("worker did not report"))),
            }
        }

        if !failures.is_empty() {
            return Err(StrDicError::Workers(failures));
        }

        Ok(results)
    }
}

impl<H> fmt::Debug for ThreadedStringTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let carriers = self.carriers.lock();

        f.debug_struct("ThreadedStringTable")
            .field("number_threads", &self.number_threads)
            .field("carriers", &*carriers)
            .finish()
    }
}

/// A builder for the `ThreadedStringTable`.
pub struct ThreadedStringTableBuilder<H> {
    table: StringTableBuilder<H>,
    number_threads: usize,
}

impl<H> ThreadedStringTableBuilder<H> {
    /// Sets the number of worker threads, eg. the number of carriers.
    ///
    /// Defaults to the available parallelism. With 0, all operations are executed on the calling thread. At most
    /// `GlobalId::MAX_OWNERS` threads are supported.
    pub fn set_number_threads(&mut self, number_threads: usize) -> &mut Self {
        self.number_threads = number_threads;
        self
    }

    /// Sets the number of buckets of each carrier.
    pub fn set_number_buckets(&mut self, number_buckets: usize) -> &mut Self {
        self.table.set_number_buckets(number_buckets);
        self
    }

    /// Sets the capacity of each slice, eg. the number of keys after which a slice is sealed.
    pub fn set_slice_capacity(&mut self, slice_capacity: usize) -> &mut Self {
        self.table.set_slice_capacity(slice_capacity);
        self
    }

    /// Sets the number of bits of the Bloom filter of each slice.
    pub fn set_bloom_bits(&mut self, bloom_bits: usize) -> &mut Self {
        self.table.set_bloom_bits(bloom_bits);
        self
    }

    /// Attempts to build a table with the current configuration.
    ///
    /// This may fail if the configuration is invalid, if memory cannot be allocated, or if the threads cannot be
    /// spawned.
    pub fn build(self) -> Result<ThreadedStringTable<H>, StrDicError>
    where
        H: Clone,
    {
        let number_threads = self.number_threads;

        if number_threads > GlobalId::MAX_OWNERS {
            return Err(StrDicError::ThreadLimitExceeded {
                requested: number_threads,
            });
        }

        let (hasher, config) = self.table.into_parts();

        config.validate()?;

        let number_carriers = number_threads.max(1);

        let mut carriers = Vec::new();
        carriers.try_reserve_exact(number_carriers)?;

        for _ in 0..number_carriers {
            let table = config.build(hasher.clone())?;

            carriers.push(Carrier { table, did_work: false });
        }

        let pool = if number_threads == 0 {
            None
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(number_threads)
                .thread_name(|index| format!("strdic-carrier-{index}"))
                .build()
                .map_err(|_| StrDicError::AllocationFailure)?;

            Some(pool)
        };

        debug!(number_threads, ?config, "threaded string table built");

        Ok(ThreadedStringTable {
            hasher,
            number_threads,
            carriers: Mutex::new(carriers),
            pool,
        })
    }
}

//
//  Implementation
//

//  A private table, and whether it had anything to do during the last bulk operation.
struct Carrier<H> {
    table: StringTable<H>,
    did_work: bool,
}

impl<H> Carrier<H> {
    fn run<T, F>(
        &mut self,
        index: usize,
        operation: &'static str,
        shard: &Shard<'_>,
        work: &F,
    ) -> Result<T, StrDicError>
    where
        F: Fn(usize, &mut StringTable<H>, &Shard<'_>) -> Result<T, StrDicError>,
    {
        self.did_work = !shard.is_empty();

        trace!(operation, carrier = index, keys = shard.len(), "carrier run");

        let table = &mut self.table;

        //  A panicking carrier may leave its table half-updated, yet other carriers are unaffected.
        match panic::catch_unwind(AssertUnwindSafe(|| work(index, table, shard))) {
            Ok(result) => result,
            Err(_) => Err(StrDicError::WorkerPanicked { carrier: index }),
        }
    }
}

impl<H> fmt::Debug for Carrier<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Carrier")
            .field("did_work", &self.did_work)
            .field("table", &self.table)
            .finish()
    }
}

//  The part of a bulk operation assigned to one carrier.
//
//  `indexes` maps each element back to its position in the input.
#[derive(Debug, Default)]
struct Shard<'k> {
    keys: Vec<&'k str>,
    hashes: Vec<u64>,
    ids: Vec<u64>,
    indexes: Vec<usize>,
}

impl Shard<'_> {
    fn with_capacity(count: usize, with_ids: bool) -> Result<Self, StrDicError> {
        let mut shard = Self::default();

        shard.keys.try_reserve_exact(count)?;
        shard.hashes.try_reserve_exact(count)?;
        shard.indexes.try_reserve_exact(count)?;

        if with_ids {
            shard.ids.try_reserve_exact(count)?;
        }

        Ok(shard)
    }

    fn len(&self) -> usize {
        self.indexes.len()
    }

    fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

//  Splits the global ids by carrier, keeping their local part.
//
//  Ids designating a non-existing carrier cannot be known, and are left out.
fn assign_ids(ids: &[u64], number_carriers: usize) -> Result<Vec<Shard<'static>>, StrDicError> {
    let mut shards = Vec::new();
    shards.try_reserve_exact(number_carriers)?;
    shards.resize_with(number_carriers, Shard::default);

    for (index, &id) in ids.iter().enumerate() {
        let id = GlobalId::decode(id);

        let Some(shard) = shards.get_mut(id.owner()) else { continue };

        shard.ids.try_reserve(1)?;
        shard.indexes.try_reserve(1)?;

        shard.ids.push(id.local());
        shard.indexes.push(index);
    }

    Ok(shards)
}

//  The high bits of the hash pick the carrier, the low bits pick the bucket within it.
#[inline(always)]
fn owner_of(hash: u64, number_carriers: usize) -> usize {
    ((hash >> 32) % number_carriers as u64) as usize
}

//  Converts the local ids embedded in an error of carrier `owner` into global ids.
fn globalize(owner: usize, error: StrDicError) -> StrDicError {
    let encode = |local: u64| GlobalId::new(owner, local).map_or(local, |id| id.encode());

    match error {
        StrDicError::IdMismatch { requested, stored } => StrDicError::IdMismatch {
            requested: encode(requested),
            stored: encode(stored),
        },
        StrDicError::UnknownId { id } => StrDicError::UnknownId { id: encode(id) },
        error => error,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;

    fn ensure_send<T: Send>() {}
    fn ensure_sync<T: Sync>() {}

    fn table(number_threads: usize, number_buckets: usize) -> ThreadedStringTable {
        let mut builder = ThreadedStringTable::with(DefaultFxBuildHasher::default());

        builder
            .set_number_threads(number_threads)
            .set_number_buckets(number_buckets)
            .set_slice_capacity(16);

        builder.build().unwrap()
    }

    fn words(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{prefix}-{i}")).collect()
    }

    fn as_strs(words: &[String]) -> Vec<&str> {
        words.iter().map(|w| w.as_str()).collect()
    }

    #[test]
    fn threaded_string_table_send_sync() {
        ensure_send::<ThreadedStringTable>();
        ensure_sync::<ThreadedStringTable>();
    }

    #[test]
    fn thread_limit() {
        let mut builder = ThreadedStringTable::with(DefaultFxBuildHasher::default());
        builder.set_number_threads(GlobalId::MAX_OWNERS + 1);

        assert_eq!(
            Some(StrDicError::ThreadLimitExceeded { requested: 1025 }),
            builder.build().err()
        );
    }

    #[test]
    fn invalid_configuration() {
        let mut builder = ThreadedStringTable::with(DefaultFxBuildHasher::default());
        builder.set_number_threads(2).set_slice_capacity(0);

        assert!(matches!(builder.build(), Err(StrDicError::InvalidConfiguration(_))));
    }

    #[test]
    fn single_thread_single_bucket() {
        for threads in [0, 1] {
            let table = table(threads, 1);

            assert_eq!(vec![0, 1, 0, 2], table.insert(&["a", "b", "a", "c"]).unwrap());
            assert_eq!(3, table.num_distinct());
        }
    }

    #[test]
    fn sharded_insert_extract() {
        let table = table(4, 8);

        let keys = words("sharded", 1000);
        let keys = as_strs(&keys);

        let ids = table.insert(&keys).unwrap();

        assert_eq!(1000, table.num_distinct());
        assert_eq!(1000, ids.iter().collect::<HashSet<_>>().len());
        assert!(ids.iter().all(|&id| GlobalId::decode(id).owner() < 4));

        let extracted = table.extract_exact(&ids).unwrap();

        assert_eq!(keys, as_strs(&extracted));
    }

    #[test]
    fn global_id_routes_to_owner() {
        let table = table(4, 8);

        let keys = words("owner", 200);
        let keys = as_strs(&keys);

        let ids = table.insert(&keys).unwrap();

        let carriers = table.carriers.lock();

        for (key, &id) in keys.iter().zip(&ids) {
            let id = GlobalId::decode(id);

            let local = carriers[id.owner()].table.extract_exact(&[id.local()]).unwrap();

            assert_eq!(vec![key.to_string()], local);
        }
    }

    #[test]
    fn order_preservation() {
        let keys = words("order", 500);
        let keys = as_strs(&keys);

        for threads in [0, 1, 2, 3, 8] {
            let table = table(threads, 4);

            let ids = table.insert(&keys).unwrap();

            assert_eq!(ids, table.insert(&keys).unwrap(), "{threads}");
            assert_eq!(ids, table.get_exact(&keys).unwrap(), "{threads}");
            assert_eq!(keys, as_strs(&table.extract_exact(&ids).unwrap()), "{threads}");
        }
    }

    #[test]
    fn missing_key() {
        let table = table(3, 4);

        table.insert(&["present"]).unwrap();

        let lookup = table.get(&["absent", "present"]).unwrap();

        assert_eq!(vec![false, true], lookup.found);
        assert_eq!(1, lookup.not_found);

        assert_eq!(
            Err(StrDicError::KeyNotFound { index: 0 }),
            table.get_exact(&["absent", "present"])
        );
    }

    #[test]
    fn unknown_id() {
        let table = table(3, 4);

        let ids = table.insert(&["present"]).unwrap();

        let beyond = GlobalId::new(1000, 0).unwrap().encode();

        assert_eq!(
            vec![None, Some("present".to_owned()), None],
            table.extract(&[beyond, ids[0], ids[0] + 1]).unwrap()
        );
        assert_eq!(Err(StrDicError::UnknownId { id: beyond }), table.extract_exact(&[ids[0], beyond]));
    }

    #[test]
    fn remove_by_id_and_key() {
        let table = table(2, 4);

        let keys = words("remove", 100);
        let keys = as_strs(&keys);

        let ids = table.insert(&keys).unwrap();

        assert_eq!(10, table.remove(&ids[..10]).unwrap());
        assert_eq!(10, table.remove_keys(&keys[10..20]).unwrap());
        assert_eq!(0, table.remove(&ids[..10]).unwrap());
        assert_eq!(80, table.num_distinct());

        let lookup = table.get(&keys).unwrap();

        assert_eq!(20, lookup.not_found);
        assert!(lookup.found[20..].iter().all(|&found| found));
        assert_eq!(&ids[20..], &lookup.ids[20..]);
        assert_eq!(as_strs(&table.extract_exact(&ids[20..]).unwrap()), &keys[20..]);
    }

    #[test]
    fn contents_reload() {
        let original = table(3, 4);

        let keys = words("reload", 300);
        let keys = as_strs(&keys);

        let ids = original.insert(&keys).unwrap();

        let contents = original.contents().unwrap();

        assert_eq!(300, contents.len());

        let reloaded = table(3, 4);

        let (ids_in, keys_in): (Vec<u64>, Vec<String>) = contents.into_iter().unzip();

        reloaded.insert_with_ids(&as_strs(&keys_in), &ids_in).unwrap();

        assert_eq!(ids, reloaded.get_exact(&keys).unwrap());
    }

    #[test]
    fn insert_with_ids_wrong_owner() {
        let table = table(2, 4);

        let id = table.insert(&["key"]).unwrap()[0];
        let owner = GlobalId::decode(id).owner();

        let wrong = GlobalId::new(1 - owner, 7).unwrap().encode();
        let right = GlobalId::new(owner, 7).unwrap().encode();

        assert_eq!(
            Err(StrDicError::IdMismatch {
                requested: wrong,
                stored: right
            }),
            table.insert_with_ids(&["key"], &[wrong])
        );
    }

    #[test]
    fn insert_with_ids_conflict() {
        let table = table(2, 4);

        let id = table.insert(&["key"]).unwrap()[0];
        let other = GlobalId::new(GlobalId::decode(id).owner(), 99).unwrap().encode();

        assert_eq!(
            Err(StrDicError::Workers(vec![(
                GlobalId::decode(id).owner(),
                StrDicError::IdMismatch { requested: other, stored: id }
            )])),
            table.insert_with_ids(&["key"], &[other])
        );
    }

    #[test]
    fn failed_insert_leaves_all_carriers_untouched() {
        let table = table(2, 4);

        let owner = |key: &str| owner_of(hash::hash_key(&table.hasher, key), 2);

        let keys = words("spread", 64);
        let first = keys.iter().map(String::as_str).find(|key| owner(key) == 0).unwrap();
        let second = keys.iter().map(String::as_str).find(|key| owner(key) == 1).unwrap();

        let stored = GlobalId::new(1, 5).unwrap().encode();
        let requested = GlobalId::new(1, 6).unwrap().encode();

        table.insert_with_ids(&[second], &[stored]).unwrap();

        assert_eq!(
            Err(StrDicError::Workers(vec![(1, StrDicError::IdMismatch { requested, stored })])),
            table.insert_with_ids(&[first, second], &[GlobalId::new(0, 0).unwrap().encode(), requested])
        );

        assert_eq!(vec![false], table.get(&[first]).unwrap().found);
        assert_eq!(1, table.num_distinct());

        //  Carrier 0 still hands out its first id.
        assert_eq!(vec![0, stored], table.insert(&[first, second]).unwrap());
    }

    #[test]
    fn local_ids_in_input_order() {
        let table = table(4, 64);

        let keys = words("ordered", 200);
        let ids = table.insert(&as_strs(&keys)).unwrap();

        let mut next = [0u64; 4];

        for id in ids {
            let id = GlobalId::decode(id);

            assert_eq!(next[id.owner()], id.local(), "{id:?}");

            next[id.owner()] += 1;
        }

        assert_eq!(200, next.iter().sum::<u64>());
    }

    #[test]
    fn worker_failures_aggregated() {
        let table = table(4, 1);
        let mut carriers = table.carriers.lock();

        let shards: Vec<Shard<'_>> = (0..4).map(|_| Shard::default()).collect();

        let result = table.dispatch("test", &mut carriers[..], &shards, |owner, _, _| match owner {
            1 => panic!("carrier 1 fails"),
            2 => Err(StrDicError::Corrupted("carrier 2 fails")),
            _ => Ok(owner),
        });

        assert_eq!(
            Err(StrDicError::Workers(vec![
                (1, StrDicError::WorkerPanicked { carrier: 1 }),
                (2, StrDicError::Corrupted("carrier 2 fails")),
            ])),
            result
        );

        drop(carriers);

        //  The pool survives.
        let id = table.insert(&["after"]).unwrap()[0];

        assert_eq!(0, GlobalId::decode(id).local());
    }

    #[test]
    fn concurrent_callers() {
        let table = Arc::new(table(4, 8));

        let keys = words("concurrent", 400);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (table, keys) = (table.clone(), keys.clone());

                thread::spawn(move || table.insert(&as_strs(&keys)).unwrap())
            })
            .collect();

        let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(400, table.num_distinct());
    }

    #[test]
    fn did_work() {
        let table = table(8, 1);

        table.insert(&["lonely"]).unwrap();

        let carriers = table.carriers.lock();

        assert_eq!(1, carriers.iter().filter(|carrier| carrier.did_work).count());
    }

    #[test]
    fn statistics_and_debug() {
        let table = table(2, 2);

        table.insert(&["a", "b", "c"]).unwrap();

        let statistics = table.statistics();

        assert_eq!(4, statistics.buckets);
        assert_eq!(3, statistics.distinct);

        let debug = format!("{table:?}");

        assert!(
            debug.starts_with("ThreadedStringTable { number_threads: 2, carriers: [Carrier { did_work: "),
            "{debug}"
        );
    }
} // mod tests
