// src/data/recordid.rs

//! Logical record id arithmetic and the [`LogWindow`].
//!
//! From the Windows documentation of [`EVENTLOGRECORD`]:
//!
//! > The very first record written to an event log is record number 1, and
//! > other records are numbered sequentially. If the record number reaches
//! > `ULONG_MAX`, the next record number will be 0, not 1; however, you use
//! > zero to seek to the record.
//!
//! Logical ids are always compared and stored as [`RecordId`] (`u64`).
//! A [`NativeRecordId`] (`u32`) is only ever produced by [`narrow_id`], to
//! pass to the OS, or consumed by [`widen_native_id`], to interpret what the
//! OS returned next to an expected logical id.
//!
//! [`EVENTLOGRECORD`]: https://learn.microsoft.com/en-us/windows/win32/api/winnt/ns-winnt-eventlogrecord

use std::fmt;

#[allow(unused_imports)]
use ::more_asserts::{
    debug_assert_ge,
    debug_assert_le,
};
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use crate::common::{
    Checkpoint,
    Count,
    NativeRecordId,
    RecordId,
};

/// Number of distinct values of a [`NativeRecordId`].
pub const NATIVE_ID_SPAN: RecordId = 1 << 32;

/// Half of [`NATIVE_ID_SPAN`]; the widest forward or backward distance
/// [`widen_native_id`] will interpret.
const NATIVE_ID_HALF_SPAN: RecordId = NATIVE_ID_SPAN / 2;

/// The span of logical ids currently retrievable from the log,
/// `FirstID` and `LastID`.
///
/// Recomputed at every session open. `last` may be smaller than a stale
/// checkpoint if the ring buffer overwrote old records.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogWindow {
    /// `FirstID`
    pub first: RecordId,
    /// `LastID`
    ///
    /// For the legacy API this is the id of the newest record.
    /// For the modern API this is `first + count`, an upper bound one past
    /// the newest record.
    pub last: RecordId,
    /// Number of records the log reported holding.
    pub count: Count,
}

impl fmt::Debug for LogWindow {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "LogWindow[{}, {}] count {}", self.first, self.last, self.count)
    }
}

impl LogWindow {
    /// The degenerate window both backends report for an empty log.
    pub const EMPTY: LogWindow = LogWindow {
        first: 1,
        last: 1,
        count: 0,
    };

    /// Window of the legacy API,
    /// `[oldest, oldest + count - 1]`.
    pub fn from_legacy(
        oldest_record_number: NativeRecordId,
        number_of_records: u32,
    ) -> LogWindow {
        if number_of_records == 0 {
            return LogWindow::EMPTY;
        }
        let first = oldest_record_number as RecordId;

        LogWindow {
            first,
            last: first + number_of_records as RecordId - 1,
            count: number_of_records as Count,
        }
    }

    /// Window of the modern API,
    /// `[first, first + count]`.
    ///
    /// The modern API cannot report the oldest id directly so `first` is
    /// the `EventRecordID` of the first record an unfiltered query returns.
    /// `None` means that query returned nothing.
    pub fn from_modern(
        first_record_id: Option<RecordId>,
        number_of_records: Count,
    ) -> LogWindow {
        match first_record_id {
            Some(first) => LogWindow {
                first,
                last: first.saturating_add(number_of_records),
                count: number_of_records,
            },
            None => LogWindow::EMPTY,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Is `id` within `[first, last]`?
    pub const fn contains(&self, id: RecordId) -> bool {
        self.first <= id && id <= self.last
    }

    /// Does `target` lie in the first half of `[first, last]`?
    ///
    /// A performance heuristic only; which half is chosen never changes
    /// which records are eventually delivered.
    pub fn in_first_half(&self, target: RecordId) -> bool {
        target.saturating_sub(self.first) < (self.last.saturating_sub(self.first)) / 2
    }
}

/// Truncate a logical id to the value the legacy API understands.
#[inline(always)]
pub const fn narrow_id(id: RecordId) -> NativeRecordId {
    id as NativeRecordId
}

/// Interpret `native` as the logical id congruent to it (modulo 2³²) that is
/// nearest to `expected`.
///
/// Consecutive records cross the 32-bit wraparound as
/// `0xFFFFFFFF` → `0`; with `expected` `0x1_0000_0000` the native `0` widens
/// to `0x1_0000_0000`, never back to `0`.
pub fn widen_native_id(
    native: NativeRecordId,
    expected: RecordId,
) -> RecordId {
    let epoch: RecordId = expected & !(NATIVE_ID_SPAN - 1);
    let candidate: RecordId = epoch | native as RecordId;
    if candidate.saturating_add(NATIVE_ID_HALF_SPAN) < expected {
        // `native` wrapped ahead of `expected`
        return candidate.saturating_add(NATIVE_ID_SPAN);
    }
    if candidate > expected.saturating_add(NATIVE_ID_HALF_SPAN) && candidate >= NATIVE_ID_SPAN {
        // `native` is from before `expected` wrapped
        return candidate - NATIVE_ID_SPAN;
    }

    candidate
}

/// A checkpoint larger than `LastID` means the oldest record number itself
/// wrapped since the checkpoint was taken; fold the checkpoint back into the
/// 32-bit domain the new window lives in.
pub fn rebase_checkpoint(
    checkpoint: Checkpoint,
    window: &LogWindow,
) -> Checkpoint {
    if checkpoint > window.last {
        let rebased: Checkpoint = narrow_id(checkpoint) as Checkpoint;
        defñ!("checkpoint {} > LastID {}, rebased to {}", checkpoint, window.last, rebased);
        return rebased;
    }

    checkpoint
}
