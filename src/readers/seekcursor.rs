// src/readers/seekcursor.rs

//! Implements a [`SeekCursor`], positioning a [`LogSession`] at the first
//! record after a checkpoint.
//!
//! ## Legacy backend
//!
//! A positioned read (`EVENTLOG_SEEK_READ`) at the target record number is
//! tried first. Its records, if any, are left in the session buffer for the
//! first batch.
//!
//! Some log states reject a positioned read with `ERROR_INVALID_PARAMETER`
//! even though every parameter is valid, see [KB177199]. When the target
//! lies in the second half of the window the cursor then reads backward
//! from the newest record, counting down `LastID − target` records. Reaching
//! the start of the log during that countdown is fine; the forward read that
//! follows finds the target by comparing record numbers.
//!
//! When the checkpoint was reset, no positioned read is attempted and
//! reading starts from the oldest record.
//!
//! ## Modern backend
//!
//! The query `Event/System[EventRecordID>checkpoint]` positions the cursor.
//!
//! [KB177199]: https://web.archive.org/web/2007/http://support.microsoft.com/kb/177199
//! [`LogSession`]: crate::readers::logsession::LogSession

use std::fmt;

#[allow(unused_imports)]
use ::si_trace_print::{
    def1n,
    def1o,
    def1x,
    defn,
    defo,
    defx,
    defñ,
};

use crate::common::{
    Checkpoint,
    Count,
    RecordId,
    ResultTail,
    TailError,
};
use crate::data::eventlogrecord::RawRecords;
use crate::data::recordid::{
    narrow_id,
    LogWindow,
};
use crate::de_wrn;
use crate::readers::api::{
    ApiError,
    EventLogApi,
    LegacyEventLog,
    ModernEventLog,
    ReadDirection,
    ReadMode,
};
use crate::readers::logsession::{
    BackendKind,
    LogSession,
    NormalizedCheckpoint,
    SessionBackend,
};
use crate::readers::recordbuffer::GrowableRecordBuffer;

/// How reading reaches the target record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeekStrategy {
    /// Nothing newer than the checkpoint.
    Nothing,
    /// Legacy: read forward from the oldest record.
    FromStart,
    /// Legacy: positioned read at the target; the direction chooses the
    /// fallback if the positioned read is rejected.
    Positioned(ReadDirection),
    /// Modern: query events after the checkpoint.
    Query,
}

/// The decision of where a poll cycle starts reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SeekPlan {
    /// The checkpoint after normalization to the window.
    pub checkpoint: Checkpoint,
    /// The checkpoint was reset.
    pub reset: bool,
    /// First logical id to read.
    pub target: RecordId,
    pub strategy: SeekStrategy,
}

impl SeekPlan {
    /// Decide where reading starts for `checkpoint` in `window`.
    pub fn new(
        kind: BackendKind,
        window: &LogWindow,
        normalized: NormalizedCheckpoint,
    ) -> SeekPlan {
        let checkpoint: Checkpoint = normalized.checkpoint;
        let target: RecordId = checkpoint.saturating_add(1);
        let strategy: SeekStrategy = if window.is_empty() {
            SeekStrategy::Nothing
        } else {
            match kind {
                BackendKind::Legacy => {
                    if normalized.reset {
                        SeekStrategy::FromStart
                    } else if target > window.last {
                        SeekStrategy::Nothing
                    } else if window.in_first_half(target) {
                        SeekStrategy::Positioned(ReadDirection::Forwards)
                    } else {
                        SeekStrategy::Positioned(ReadDirection::Backwards)
                    }
                }
                BackendKind::Modern => {
                    // `LastID` is one past the newest record
                    if target >= window.last {
                        SeekStrategy::Nothing
                    } else {
                        SeekStrategy::Query
                    }
                }
            }
        };

        SeekPlan {
            checkpoint,
            reset: normalized.reset,
            target,
            strategy,
        }
    }
}

/// Result of [`SeekCursor::position`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Positioned {
    /// Ready to read. The first `buffered` bytes of the session buffer hold
    /// records from a positioned read.
    Ready { buffered: usize },
    /// Nothing to read.
    Eof,
}

/// Positions a [`LogSession`] according to a [`SeekPlan`].
///
/// [`LogSession`]: crate::readers::logsession::LogSession
pub struct SeekCursor {
    plan: SeekPlan,
    /// The backward fallback was used.
    fallback: bool,
    /// `Count` of records counted down by the fallback.
    skipped: Count,
}

impl fmt::Debug for SeekCursor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("SeekCursor")
            .field("plan", &self.plan)
            .field("fallback", &self.fallback)
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl SeekCursor {
    /// Plan the position for `checkpoint` in `session`.
    pub fn new<A: EventLogApi>(
        session: &LogSession<A>,
        checkpoint: Checkpoint,
    ) -> SeekCursor {
        let normalized = session.normalize_checkpoint(checkpoint);
        let plan = SeekPlan::new(session.kind(), &session.window(), normalized);
        defñ!("{:?}", plan);

        SeekCursor {
            plan,
            fallback: false,
            skipped: 0,
        }
    }

    #[inline(always)]
    pub const fn plan(&self) -> &SeekPlan {
        &self.plan
    }

    /// Was the backward fallback used?
    #[inline(always)]
    pub const fn fallback_used(&self) -> bool {
        self.fallback
    }

    /// Move the session read position to the plan's target.
    ///
    /// Failures are [`TailError::Open`].
    pub fn position<A: EventLogApi>(
        &mut self,
        session: &mut LogSession<A>,
    ) -> ResultTail<Positioned> {
        def1n!("{:?}", self.plan);
        let log_name: String = session.log_name().to_string();
        let window: LogWindow = session.window();
        let (backend, buffer) = match session.parts_mut() {
            Some(parts) => parts,
            None => {
                def1x!("return Err; session closed");
                return Err(TailError::Open(format!("Cannot read eventlog '{}': session is closed.", log_name)));
            }
        };
        let result: Result<Positioned, ApiError> = match (self.plan.strategy, backend) {
            (SeekStrategy::Nothing, _) => Ok(Positioned::Eof),
            (SeekStrategy::FromStart, SessionBackend::Legacy(_)) => Ok(Positioned::Ready { buffered: 0 }),
            (SeekStrategy::Positioned(direction), SessionBackend::Legacy(legacy)) => {
                self.position_legacy(legacy, buffer, direction, &window)
            }
            (SeekStrategy::Query, SessionBackend::Modern(modern)) => {
                match modern.query(Some(self.plan.checkpoint)) {
                    Ok(()) => Ok(Positioned::Ready { buffered: 0 }),
                    Err(err) => Err(err),
                }
            }
            (strategy, backend) => {
                def1x!("return Err; strategy {:?} on {} backend", strategy, backend.kind());
                return Err(TailError::Open(format!(
                    "Cannot read eventlog '{}': no {:?} on the {} backend.",
                    log_name,
                    strategy,
                    backend.kind()
                )));
            }
        };
        match result {
            Ok(positioned) => {
                def1x!("return Ok({:?})", positioned);
                Ok(positioned)
            }
            Err(err) => {
                def1x!("return Err({})", err);
                Err(TailError::Open(format!("Cannot read eventlog '{}': {}", log_name, err)))
            }
        }
    }

    fn position_legacy<L: LegacyEventLog>(
        &mut self,
        legacy: &mut L,
        buffer: &mut GrowableRecordBuffer,
        direction: ReadDirection,
        window: &LogWindow,
    ) -> Result<Positioned, ApiError> {
        let target: RecordId = self.plan.target;
        let seek = ReadMode::Seek(narrow_id(target));
        match buffer.retry_on_insufficient_space(|buffer| {
            legacy.read(seek, ReadDirection::Forwards, buffer.as_mut_bytes())
        }) {
            Ok(buffered) => {
                defo!("positioned read at {} read {} bytes", target, buffered);
                return Ok(Positioned::Ready { buffered });
            }
            Err(ApiError::HandleEof) => {
                defo!("positioned read at {} is past the end", target);
                return Ok(Positioned::Eof);
            }
            Err(ApiError::InvalidParameter) => {
                defo!("positioned read at {} rejected", target);
            }
            Err(err) => {
                return Err(err);
            }
        }
        if direction == ReadDirection::Forwards {
            // the forward read starts at the oldest record and searches
            return Ok(Positioned::Ready { buffered: 0 });
        }

        self.fallback = true;
        let mut skip_count: Count = match window.last.saturating_sub(target) {
            0 => 1,
            n => n,
        };
        defo!("fallback skip_count {}", skip_count);
        while skip_count > 0 {
            let read: usize = match buffer.retry_on_insufficient_space(|buffer| {
                legacy.read(ReadMode::Sequential, ReadDirection::Backwards, buffer.as_mut_bytes())
            }) {
                Ok(read) => read,
                Err(ApiError::HandleEof) => {
                    defo!("fallback reached the start of the log, {} left to skip", skip_count);
                    break;
                }
                Err(err) => {
                    return Err(err);
                }
            };
            // count whole records; the buffer is not reused because of the
            // reverse order
            let mut counted: Count = 0;
            for record in RawRecords::new(&buffer.as_bytes()[..read]) {
                if record.is_err() {
                    break;
                }
                counted += 1;
                skip_count -= 1;
                if skip_count == 0 {
                    break;
                }
            }
            self.skipped += counted;
            if counted == 0 {
                de_wrn!("fallback read {} bytes holding no records", read);
                break;
            }
        }

        Ok(Positioned::Ready { buffered: 0 })
    }
}
