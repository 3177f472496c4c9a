//! Sharded string dictionary.
//!
//! The `ThreadedStringTable` maps each distinct string to a dense integer id, and back, in bulk. It is specifically
//! designed to intern large batches of strings, such as the keys of a columnar document, in parallel.
//!
//!
//! #   How to use?
//!
//! If you just want to get going, use the `new` method, and you'll get a default configured `ThreadedStringTable`
//! which will be quite fine.
//!
//! You can always tune it later, using the configuration options.
//!
//! If a single thread is all you need, the `StringTable` offers the same operations, without sharding.
//!
//!
//! #   Configuration options
//!
//! The `ThreadedStringTable` offers multiple configuration options, available via the `ThreadedStringTableBuilder`:
//!
//! -   The hashing algorithm can be tuned, it defaults to Fx Hash.
//! -   The number of threads can be tuned, it defaults to the available parallelism. With 0 threads, all operations
//!     are executed on the calling thread.
//! -   The number of buckets of each thread can be tuned, it defaults to 1024.
//! -   The capacity of each slice can be tuned, it defaults to 300.
//! -   The number of bits of the Bloom filter of each slice can be tuned, it defaults to about 10 bits per key.
//!
//!
//! #   Limits
//!
//! The `ThreadedStringTable` has some hard limits, due to design constraints:
//!
//! -   It supports only up to 1024 threads, eg. 2**10.
//! -   It supports only up to 2**54 ids per thread.
//!
//!
//! #   Internals
//!
//! The `ThreadedStringTable` is a sharded data-structure:
//!
//! -   When inserting, the high 32 bits of the hash of each string determine which carrier, eg. thread, owns it. The
//!     index of the carrier is embedded in the upper 10 bits of the `GlobalId` returned.
//! -   When extracting, the 10 bits are extracted from the `GlobalId` and used to determine which carrier to look into.
//!
//! Each bulk operation is split by carrier, executed on a persistent pool of threads, and the results are reassembled
//! in input order. Each carrier operates in complete isolation, on its own `StringTable`.
//!
//! A `StringTable` is an array of buckets, each guarded by a spin lock, and each a list of slices:
//!
//! -   A slice stores up to a fixed number of strings, in columns: keys, hashes, and ids.
//! -   Only the last slice of a bucket accepts insertions. Once full, it is sealed: its hashes are sorted into an
//!     implicit 5-ary search tree, and a fresh slice takes over.
//! -   Each slice is guarded by the bounds of its hashes, and by a Bloom filter, so that most lookups skip most slices.
//!
//! Removal rebuilds the affected slice, including its Bloom filter, bounds, and search tree.

//  Ensure unsafe operations are duly checked.
#![deny(unsafe_op_in_unsafe_fn)]
//  Ensure proper documentation.
#![deny(missing_docs)]

mod bitmap;
mod bloom;
mod error;
mod hash;
mod id;
mod list;
mod lock;
mod slice;
mod table;
mod threaded;

pub use error::StrDicError;
pub use hash::{DefaultFxBuildHasher, FxHasher, HashFunction};
pub use id::GlobalId;
pub use list::Statistics;
pub use table::{Lookup, StringTable, StringTableBuilder};
pub use threaded::{ThreadedStringTable, ThreadedStringTableBuilder};
