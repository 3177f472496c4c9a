//  The global ID of a string, across carriers.

use std::fmt;

use crate::error::StrDicError;

/// A `GlobalId` identifies a string within a `ThreadedStringTable`.
///
/// It packs the index of the owning carrier in its upper 10 bits, and the id local to this carrier in its lower 54
/// bits.
///
/// #   Tied to the table instance.
///
/// A `GlobalId` is only meaningful for the table instance which created it.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GlobalId {
    owner: u16,
    local: u64,
}

impl GlobalId {
    /// Number of bits of the local id.
    pub const LOCAL_ID_BITS: u32 = 54;

    /// Maximum number of owners, eg. threads, which can be encoded.
    pub const MAX_OWNERS: usize = 1usize << OWNER_BITS;

    /// Maximum local id which can be encoded.
    pub const MAX_LOCAL_ID: u64 = (1u64 << Self::LOCAL_ID_BITS) - 1;

    /// Creates a new instance.
    ///
    /// Fails if `owner` is not less than `MAX_OWNERS`, or `local` is greater than `MAX_LOCAL_ID`.
    pub fn new(owner: usize, local: u64) -> Result<Self, StrDicError> {
        if owner >= Self::MAX_OWNERS {
            return Err(StrDicError::ThreadLimitExceeded { requested: owner + 1 });
        }

        if local > Self::MAX_LOCAL_ID {
            return Err(StrDicError::UnknownId { id: local });
        }

        Ok(Self {
            owner: owner as u16,
            local,
        })
    }

    /// Decodes an encoded id.
    ///
    /// Every `u64` is a valid encoding, though not necessarily one of an existing string.
    pub fn decode(encoded: u64) -> Self {
        let owner = (encoded >> Self::LOCAL_ID_BITS) as u16;
        let local = encoded & Self::MAX_LOCAL_ID;

        Self { owner, local }
    }

    /// Encodes the id.
    pub fn encode(&self) -> u64 {
        (u64::from(self.owner) << Self::LOCAL_ID_BITS) | self.local
    }

    /// Returns the index of the owning carrier.
    pub fn owner(&self) -> usize {
        self.owner as usize
    }

    /// Returns the id within the owning carrier.
    pub fn local(&self) -> u64 {
        self.local
    }
}

impl fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("GlobalId")
            .field("owner", &self.owner)
            .field("local", &self.local)
            .finish()
    }
}

//
//  Implementation
//

const OWNER_BITS: u32 = 10;

const _: () = assert!(OWNER_BITS + GlobalId::LOCAL_ID_BITS == u64::BITS);
const _: () = assert!(GlobalId::MAX_OWNERS == 1024);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode() {
        for (owner, local) in [(0, 0), (1, 42), (1023, GlobalId::MAX_LOCAL_ID), (512, 1 << 40)] {
            let id = GlobalId::new(owner, local).unwrap();
            let decoded = GlobalId::decode(id.encode());

            assert_eq!(id, decoded);
            assert_eq!(owner, decoded.owner());
            assert_eq!(local, decoded.local());
        }
    }

    #[test]
    fn owner_zero_is_local() {
        assert_eq!(17, GlobalId::new(0, 17).unwrap().encode());
    }

    #[test]
    fn layout() {
        assert_eq!((3u64 << 54) | 5, GlobalId::new(3, 5).unwrap().encode());
    }

    #[test]
    fn limits() {
        assert_eq!(
            Err(StrDicError::ThreadLimitExceeded { requested: 1025 }),
            GlobalId::new(1024, 0)
        );
        assert_eq!(
            Err(StrDicError::UnknownId { id: 1 << 54 }),
            GlobalId::new(0, 1 << 54)
        );
    }

    #[test]
    fn debug() {
        assert_eq!("GlobalId { owner: 2, local: 9 }", format!("{:?}", GlobalId::new(2, 9).unwrap()));
    }
} // mod tests
