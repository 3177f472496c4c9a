//  Hash functions.
//
//  Two families live here:
//
//  -   `FxHasher`, from the `fxhash` crate, a quick hash algorithm used by rustc and Firefox, which routes keys to
//      carriers and buckets.
//  -   `HashFunction`, a set of classic byte-at-a-time string hashes. They are weak on their own, but fail on
//      different inputs, which is exactly what the Bloom filters need.

use std::hash::{BuildHasher, Hasher};

pub use fxhash::FxHasher;

/// A BuildHasher which returns a `Default` `FxHasher`.
pub type DefaultFxBuildHasher = fxhash::FxBuildHasher;

/// Hashes a key with the given `BuildHasher`, for routing.
///
/// Only the bytes are fed, without the length suffix `Hash for str` would add. The result is then avalanched, as the
/// low bits of multiplicative hashes such as `FxHasher` depend only on the first bytes of the key, and routing by
/// modulo uses both the low and high bits.
#[inline]
pub fn hash_key<H>(hasher: &H, key: &str) -> u64
where
    H: BuildHasher,
{
    let mut hasher = hasher.build_hasher();

    hasher.write(key.as_bytes());

    avalanche(hasher.finish())
}

/// Classic string hash functions.
///
/// All of them are pure, deterministic, and never allocate. The empty key hashes to 0 with every function.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HashFunction {
    /// Sum of the bytes.
    Additive,
    /// Xor of the bytes.
    Xor,
    /// Rotate by 4, then xor the byte.
    Rotate,
    /// Shift-Add-Xor.
    Sax,
    /// Bernstein's `33 * h + c`.
    Bernstein,
    /// Bernstein's variant, `33 * h ^ c`.
    Bernstein2,
    /// Fowler-Noll-Vo, FNV-1a 64 bits.
    Fnv,
    /// Jenkins' one-at-a-time.
    OneAtATime,
    /// The ELF object file format hash.
    Elf,
    /// Jenkins' lookup2, 12 bytes at a time.
    Jenkins,
}

impl HashFunction {
    /// All the functions, in declaration order.
    pub const ALL: [HashFunction; 10] = [
        Self::Additive,
        Self::Xor,
        Self::Rotate,
        Self::Sax,
        Self::Bernstein,
        Self::Bernstein2,
        Self::Fnv,
        Self::OneAtATime,
        Self::Elf,
        Self::Jenkins,
    ];

    /// Hashes `bytes`.
    pub fn hash(self, bytes: &[u8]) -> u64 {
        if bytes.is_empty() {
            return 0;
        }

        match self {
            Self::Additive => bytes.iter().fold(0u64, |h, &c| h.wrapping_add(u64::from(c))),
            Self::Xor => bytes.iter().fold(0u64, |h, &c| h ^ u64::from(c)),
            Self::Rotate => bytes.iter().fold(0u64, |h, &c| h.rotate_left(4) ^ u64::from(c)),
            Self::Sax => bytes.iter().fold(0u64, |h, &c| {
                h ^ (h << 5).wrapping_add(h >> 2).wrapping_add(u64::from(c))
            }),
            Self::Bernstein => bytes.iter().fold(5381u64, |h, &c| h.wrapping_mul(33).wrapping_add(u64::from(c))),
            Self::Bernstein2 => bytes.iter().fold(5381u64, |h, &c| h.wrapping_mul(33) ^ u64::from(c)),
            Self::Fnv => bytes.iter().fold(FNV_OFFSET, |h, &c| (h ^ u64::from(c)).wrapping_mul(FNV_PRIME)),
            Self::OneAtATime => one_at_a_time(bytes),
            Self::Elf => elf(bytes),
            Self::Jenkins => jenkins(bytes),
        }
    }
}

//
//  Implementation
//

const FNV_OFFSET: u64 = 0xcb_f2_9c_e4_84_22_23_25;
const FNV_PRIME: u64 = 0x00_00_01_00_00_00_01_b3;

const GOLDEN_RATIO: u32 = 0x9e_37_79_b9;

//  The 64 bits finalizer of MurmurHash3: a bijection, in which every input bit affects every output bit.
#[inline(always)]
fn avalanche(mut hash: u64) -> u64 {
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff_51_af_d7_ed_55_8c_cd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4_ce_b9_fe_1a_85_ec_53);
    hash ^ (hash >> 33)
}

fn one_at_a_time(bytes: &[u8]) -> u64 {
    let mut h = 0u64;

    for &c in bytes {
        h = h.wrapping_add(u64::from(c));
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }

    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}

fn elf(bytes: &[u8]) -> u64 {
    let mut h = 0u32;

    for &c in bytes {
        h = (h << 4).wrapping_add(u32::from(c));

        let g = h & 0xf0_00_00_00;

        if g != 0 {
            h ^= g >> 24;
        }

        h &= !g;
    }

    u64::from(h)
}

//  Bob Jenkins' lookup2, with a 0 initial value.
fn jenkins(bytes: &[u8]) -> u64 {
    fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
        *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 13);
        *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 8);
        *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 13);
        *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 12);
        *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 16);
        *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 5);
        *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 3);
        *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 10);
        *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 15);
    }

    let word = |chunk: &[u8]| {
        chunk
            .iter()
            .enumerate()
            .fold(0u32, |w, (index, &c)| w.wrapping_add(u32::from(c) << (8 * index)))
    };

    let (mut a, mut b, mut c) = (GOLDEN_RATIO, GOLDEN_RATIO, 0u32);

    let mut chunks = bytes.chunks_exact(12);

    for chunk in &mut chunks {
        a = a.wrapping_add(word(&chunk[0..4]));
        b = b.wrapping_add(word(&chunk[4..8]));
        c = c.wrapping_add(word(&chunk[8..12]));

        mix(&mut a, &mut b, &mut c);
    }

    let tail = chunks.remainder();

    //  The lowest byte of `c` is reserved for the length.
    c = c.wrapping_add(bytes.len() as u32);

    a = a.wrapping_add(word(&tail[..tail.len().min(4)]));

    if tail.len() > 4 {
        b = b.wrapping_add(word(&tail[4..tail.len().min(8)]));
    }

    if tail.len() > 8 {
        c = c.wrapping_add(word(&tail[8..]) << 8);
    }

    mix(&mut a, &mut b, &mut c);

    u64::from(c)
}

// mod tests
