// src/common.rs
//
// common imports, type aliases, and other globals (avoids circular imports)

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// counting, record identifiers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// General purpose counter.
pub type Count = u64;

/// A logical record id, always in the 64-bit domain.
///
/// The OS exposes a 32-bit counter ([`NativeRecordId`]) for the legacy
/// Event Log API. Logical ids are kept in 64 bits so progress is monotonic
/// across the 32-bit wraparound.
pub type RecordId = u64;

/// The record number as the legacy Event Log API reports it.
///
/// Only ever used as a narrow probe value, e.g. the record number passed to
/// a positioned read or compared with a record header.
pub type NativeRecordId = u32;

/// Last fully processed logical record id.
///
/// Owned by the caller across poll cycles, a.k.a. `lastlogsize`.
pub type Checkpoint = RecordId;

/// Unix epoch seconds as reported to the sink.
pub type UnixSeconds = u32;

/// Sequence of Bytes
pub type Bytes = Vec<u8>;

/// Sentinel printed in place of a missing value.
pub const NONE_STR: &str = "(none)";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// custom Results enums for various fetch functions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// XXX: modeled on '\.rustup\toolchains\beta-x86_64-pc-windows-msvc\lib\rustlib\src\rust\library\core\src\result.rs'
//      https://doc.rust-lang.org/src/core/result.rs.html#501-659

/// `Result` Extended
/// for record fetching functions.
///
/// Reaching the end of the log is not an error and is not a value, it is
/// [`Done`].
///
/// [`Done`]: ResultFetch::Done
#[derive(Debug, PartialEq)]
pub enum ResultFetch<T, E> {
    /// Contains the success data
    Found(T),
    /// Log is exhausted, or other condition that means "Done", nothing to
    /// return, but no bad errors happened
    Done,
    /// Contains the error value, something bad happened
    Err(E),
}

impl<T, E> ResultFetch<T, E> {
    // Querying the contained values

    /// Returns `true` if the result is [`Found`, 'Done`].
    #[allow(dead_code)]
    #[must_use = "if you intended to assert that this is ok, consider `.unwrap()` instead"]
    #[inline(always)]
    pub const fn is_ok(&self) -> bool {
        matches!(*self, ResultFetch::Found(_) | ResultFetch::Done)
    }

    /// Returns `true` if the result is [`Found`].
    #[inline(always)]
    pub const fn is_found(&self) -> bool {
        matches!(*self, ResultFetch::Found(_))
    }

    /// Returns `true` if the result is [`Err`].
    #[allow(dead_code)]
    #[must_use = "if you intended to assert that this is err, consider `.unwrap_err()` instead"]
    #[inline(always)]
    pub const fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// Returns `true` if the result is [`Done`].
    #[inline(always)]
    pub const fn is_done(&self) -> bool {
        matches!(*self, ResultFetch::Done)
    }

    // Adapter for each variant

    /// Converts from `ResultFetch<T, E>` to [`Option<T>`].
    ///
    /// Converts `self` into an [`Option<T>`], consuming `self`,
    /// and discarding the error, if any.
    #[allow(dead_code)]
    #[inline(always)]
    pub fn ok(self) -> Option<T> {
        match self {
            ResultFetch::Found(x) => Some(x),
            ResultFetch::Done => None,
            ResultFetch::Err(_) => None,
        }
    }

    /// Converts from `ResultFetch<T, E>` to [`Option<E>`].
    ///
    /// Converts `self` into an [`Option<E>`], consuming `self`,
    /// and discarding the success value, if any.
    #[allow(dead_code)]
    #[inline(always)]
    pub fn err(self) -> Option<E> {
        match self {
            ResultFetch::Found(_) => None,
            ResultFetch::Done => None,
            ResultFetch::Err(x) => Some(x),
        }
    }
}

impl<T, E> std::fmt::Display for ResultFetch<T, E>
where
    E: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultFetch::Found(_) => { write!(f, "ResultFetch::Found") },
            ResultFetch::Done => { write!(f, "ResultFetch::Done") },
            ResultFetch::Err(err) => { write!(f, "ResultFetch::Err({})", err) },
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// cycle errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The only errors a poll cycle reports to its caller.
///
/// Everything else (buffer growth, end of log, message resolution, sink
/// refusal) is recovered inside the cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TailError {
    /// The log could not be opened; the checkpoint is untouched.
    Open(String),
    /// A read failed mid-cycle; the checkpoint stays at the last value
    /// successfully advanced.
    Read(String),
    /// The tailer configuration is unusable.
    Config(String),
}

impl std::fmt::Display for TailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TailError::Open(s) => write!(f, "{}", s),
            TailError::Read(s) => write!(f, "{}", s),
            TailError::Config(s) => write!(f, "Configuration error: {}", s),
        }
    }
}

impl std::error::Error for TailError {}

/// [`Result`] of a poll cycle.
///
/// [`Result`]: std::result::Result
pub type ResultTail<T> = std::result::Result<T, TailError>;
