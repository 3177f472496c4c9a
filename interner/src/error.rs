//  Errors from the library.
use std::{error, fmt};

/// Errors returned by this library.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StrDicError {
    /// A required argument was missing, such as ids of a different length than the keys.
    NullArgument,
    /// An appender slice was asked to hold more than its capacity.
    CapacityExceeded,
    /// No memory could be allocated.
    AllocationFailure,
    /// A key was expected to be present, but was not.
    KeyNotFound {
        /// Index of the first missing key within the bulk call.
        index: usize,
    },
    /// An id is not known to this instance.
    UnknownId {
        /// The id in question.
        id: u64,
    },
    /// A key is already present under a different id, or an id is already taken by a different key.
    IdMismatch {
        /// The id the caller asked for.
        requested: u64,
        /// The id currently stored.
        stored: u64,
    },
    /// The operation is not supported, such as assigning an id beyond the local id space.
    UnsupportedOperation(&'static str),
    /// More threads were requested than a `GlobalId` can address.
    ThreadLimitExceeded {
        /// Number of threads requested.
        requested: usize,
    },
    /// The configuration is invalid.
    InvalidConfiguration(&'static str),
    /// An internal invariant was violated.
    Corrupted(&'static str),
    /// A worker thread panicked during a bulk call.
    WorkerPanicked {
        /// Index of the carrier whose worker panicked.
        carrier: usize,
    },
    /// One or more workers failed during a bulk call, in carrier order.
    Workers(Vec<(usize, StrDicError)>),
}

impl fmt::Display for StrDicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Workers(failures) => {
                write!(f, "{} worker(s) failed: [", failures.len())?;

                for (index, (carrier, error)) in failures.iter().enumerate() {
                    let separator = if index > 0 { ", " } else { "" };

                    write!(f, "{separator}{carrier}: {error}")?;
                }

                write!(f, "]")
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

impl error::Error for StrDicError {}

impl From<std::collections::TryReserveError> for StrDicError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::AllocationFailure
    }
}

// mod tests
