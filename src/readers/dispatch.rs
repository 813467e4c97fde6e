// src/readers/dispatch.rs

//! FilterDispatchLoop: fetch decoded events oldest to newest, filter them,
//! hand matches to an [`EventSink`], and advance the checkpoint.
//!
//! For each record, in arrival order:
//!
//! 1. The checkpoint candidate is the record's own logical id. An id other
//!    than the expected `checkpoint + 1` is trusted and logged.
//! 2. The record is decoded and filtered.
//! 3. A match is sent with the candidate as its checkpoint. Only on success
//!    does the checkpoint advance. A refused send stops the cycle with the
//!    checkpoint at the last record before it, so the refused record is
//!    read again next cycle.
//! 4. A record that does not match also advances the checkpoint.
//! 5. The cycle stops early once the [`RateBudget`] is spent.

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
    ResultFetch,
    TailError,
    UnixSeconds,
};
use crate::data::event::NormalizedEvent;
use crate::data::eventlogrecord::RawRecord;
use crate::data::recordid::{
    narrow_id,
    widen_native_id,
};
use crate::de_wrn;
#[cfg(any(debug_assertions, test))]
use crate::debug::printers::buffer_to_hex_String;
use crate::readers::api::{
    ApiError,
    LegacyEventLog,
    MessageFileApi,
    ModernEventLog,
    ReadDirection,
    ReadMode,
};
use crate::readers::decoder::{
    LegacyDecoder,
    ModernDecoder,
};
use crate::readers::filter::CompiledFilter;
use crate::readers::recordbuffer::GrowableRecordBuffer;

/// Most events fetched by one modern `EvtNext`.
pub const EVT_ARRAY_SIZE: usize = 100;

/// Metric flag marking a value that carries a persistent checkpoint.
pub const METRIC_FLAG_PERSISTENT: u8 = 0x01;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RateBudget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-cycle caps on records sent and records processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RateBudget {
    /// `rate × refresh`
    pub max_sent: Count,
    /// `4 × rate × refresh`
    pub max_processed: Count,
}

impl RateBudget {
    pub const fn new(
        rate: Count,
        refresh_interval_secs: Count,
    ) -> RateBudget {
        let max_sent: Count = rate.saturating_mul(refresh_interval_secs);
        RateBudget {
            max_sent,
            max_processed: max_sent.saturating_mul(4),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State of the monitored item a value is sent for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ItemState {
    #[default]
    Normal,
    NotSupported,
}

/// Identity of the monitored item values are sent for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SinkTarget {
    pub host: String,
    pub item_key: String,
    /// Metric flags; [`METRIC_FLAG_PERSISTENT`] is always added.
    pub flags: u8,
}

/// One value handed to an [`EventSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkRecord<'a> {
    pub host: &'a str,
    pub item_key: &'a str,
    pub message: &'a str,
    pub state: ItemState,
    /// The checkpoint value if this send succeeds.
    pub checkpoint: Checkpoint,
    pub timestamp: UnixSeconds,
    pub source: &'a str,
    /// Item log-type code of the severity.
    pub severity: u8,
    pub event_id: u32,
    pub flags: u8,
}

impl<'a> SinkRecord<'a> {
    pub fn new(
        target: &'a SinkTarget,
        event: &'a NormalizedEvent,
    ) -> SinkRecord<'a> {
        SinkRecord {
            host: target.host.as_str(),
            item_key: target.item_key.as_str(),
            message: event.message.as_str(),
            state: ItemState::Normal,
            checkpoint: event.record_id,
            timestamp: event.timestamp,
            source: event.source_name(),
            severity: event.severity.item_log_type(),
            event_id: event.event_id,
            flags: target.flags | METRIC_FLAG_PERSISTENT,
        }
    }
}

/// Receives matching events.
///
/// A refusal (`Err`) means "full, try later"; it stops the current cycle.
pub trait EventSink {
    fn send(
        &mut self,
        record: &SinkRecord,
    ) -> Result<(), String>;
}

impl<F> EventSink for F
where
    F: FnMut(&SinkRecord) -> Result<(), String>,
{
    fn send(
        &mut self,
        record: &SinkRecord,
    ) -> Result<(), String> {
        self(record)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// record sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Yields decoded events oldest to newest.
pub trait RecordSource {
    /// The next event. `expected` is the logical id the next record should
    /// have.
    fn next_event(
        &mut self,
        expected: RecordId,
    ) -> ResultFetch<NormalizedEvent, TailError>;
}

/// Events read sequentially forward by the legacy API.
///
/// Records before the target are skipped by comparing 32-bit record
/// numbers for equality; ordering comparisons on the native number are
/// ambiguous across its wraparound. Once the target is found, each native
/// number is widened next to the expected logical id.
pub struct LegacyRecordSource<'a, L: LegacyEventLog, M: MessageFileApi> {
    log: &'a mut L,
    buffer: &'a mut GrowableRecordBuffer,
    messages: &'a mut M,
    decoder: &'a mut LegacyDecoder,
    log_name: &'a str,
    /// bytes of records in `buffer`
    filled: usize,
    /// offset of the next record in `buffer`
    offset: usize,
    target: RecordId,
    started: bool,
    /// `Count` of records skipped searching for `target`.
    pub(crate) searched: Count,
}

impl<'a, L: LegacyEventLog, M: MessageFileApi> fmt::Debug for LegacyRecordSource<'a, L, M> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("LegacyRecordSource")
            .field("log_name", &self.log_name)
            .field("filled", &self.filled)
            .field("offset", &self.offset)
            .field("target", &self.target)
            .field("started", &self.started)
            .field("searched", &self.searched)
            .finish()
    }
}

impl<'a, L: LegacyEventLog, M: MessageFileApi> LegacyRecordSource<'a, L, M> {
    /// `buffered` bytes of `buffer` already hold records from a positioned
    /// read.
    pub fn new(
        log: &'a mut L,
        buffer: &'a mut GrowableRecordBuffer,
        messages: &'a mut M,
        decoder: &'a mut LegacyDecoder,
        log_name: &'a str,
        target: RecordId,
        buffered: usize,
    ) -> LegacyRecordSource<'a, L, M> {
        LegacyRecordSource {
            log,
            buffer,
            messages,
            decoder,
            log_name,
            filled: buffered,
            offset: 0,
            target,
            started: false,
            searched: 0,
        }
    }

    fn read_error(
        &self,
        err: &dyn fmt::Display,
    ) -> TailError {
        TailError::Read(format!("Cannot read eventlog '{}': {}", self.log_name, err))
    }
}

impl<'a, L: LegacyEventLog, M: MessageFileApi> RecordSource for LegacyRecordSource<'a, L, M> {
    fn next_event(
        &mut self,
        expected: RecordId,
    ) -> ResultFetch<NormalizedEvent, TailError> {
        loop {
            if self.offset >= self.filled {
                let log = &mut self.log;
                match self
                    .buffer
                    .retry_on_insufficient_space(|buffer| {
                        log.read(ReadMode::Sequential, ReadDirection::Forwards, buffer.as_mut_bytes())
                    }) {
                    Ok(0) | Err(ApiError::HandleEof) => {
                        defñ!("end of log");
                        return ResultFetch::Done;
                    }
                    Ok(read) => {
                        self.filled = read;
                        self.offset = 0;
                    }
                    Err(err) => {
                        defñ!("read error {}", err);
                        return ResultFetch::Err(self.read_error(&err));
                    }
                }
            }
            let raw: RawRecord = match RawRecord::at(&self.buffer.as_bytes()[..self.filled], self.offset) {
                Ok(raw) => raw,
                Err(err) => {
                    defñ!(
                        "bad record {} at offset {}: {}",
                        err,
                        self.offset,
                        buffer_to_hex_String(&self.buffer.as_bytes()[self.offset.min(self.filled)..self.filled], 16)
                    );
                    return ResultFetch::Err(self.read_error(&err));
                }
            };
            self.offset += raw.length() as usize;
            let native = raw.record_number();
            let record_id: RecordId = if self.started {
                widen_native_id(native, expected)
            } else if native == narrow_id(self.target) {
                self.started = true;
                self.target
            } else {
                let widened: RecordId = widen_native_id(native, self.target);
                if widened < self.target {
                    self.searched += 1;
                    continue;
                }
                // the target record is gone; start at the next one present
                self.started = true;
                de_wrn!("record {} not found in {:?}, starting at {}", self.target, self.log_name, widened);
                widened
            };

            return ResultFetch::Found(self.decoder.decode_raw(&mut *self.messages, &raw, record_id));
        }
    }
}

/// Events fetched in batches by the modern API.
pub struct ModernRecordSource<'a, L: ModernEventLog> {
    log: &'a mut L,
    buffer: &'a mut GrowableRecordBuffer,
    decoder: &'a mut ModernDecoder,
    log_name: &'a str,
    pending: Vec<L::Event>,
    /// index of the next event in `pending`
    at: usize,
    done: bool,
    /// `Count` of `EvtNext` calls.
    pub(crate) batches: Count,
}

impl<'a, L: ModernEventLog> fmt::Debug for ModernRecordSource<'a, L> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("ModernRecordSource")
            .field("log_name", &self.log_name)
            .field("pending", &(self.pending.len() - self.at.min(self.pending.len())))
            .field("done", &self.done)
            .field("batches", &self.batches)
            .finish()
    }
}

impl<'a, L: ModernEventLog> ModernRecordSource<'a, L> {
    pub fn new(
        log: &'a mut L,
        buffer: &'a mut GrowableRecordBuffer,
        decoder: &'a mut ModernDecoder,
        log_name: &'a str,
    ) -> ModernRecordSource<'a, L> {
        ModernRecordSource {
            log,
            buffer,
            decoder,
            log_name,
            pending: Vec::with_capacity(EVT_ARRAY_SIZE),
            at: 0,
            done: false,
            batches: 0,
        }
    }
}

impl<'a, L: ModernEventLog> RecordSource for ModernRecordSource<'a, L> {
    fn next_event(
        &mut self,
        expected: RecordId,
    ) -> ResultFetch<NormalizedEvent, TailError> {
        if self.at >= self.pending.len() {
            if self.done {
                return ResultFetch::Done;
            }
            // drop (close) the previous batch
            self.pending.clear();
            self.at = 0;
            self.batches += 1;
            match self.log.next(EVT_ARRAY_SIZE, &mut self.pending) {
                Ok(_) => {}
                Err(ApiError::NoMoreItems) => {
                    // fewer events than the window promised; the log was
                    // cleared or the count was an over-estimate
                    defñ!("no more items");
                    self.done = true;
                    return ResultFetch::Done;
                }
                Err(err) => {
                    defñ!("next error {}", err);
                    return ResultFetch::Err(TailError::Read(format!(
                        "EvtNext failed for eventlog '{}': {}, EventRecordID:{}",
                        self.log_name, err, expected
                    )));
                }
            }
            if self.pending.is_empty() {
                self.done = true;
                return ResultFetch::Done;
            }
        }
        let event = &self.pending[self.at];
        self.at += 1;
        match self.decoder.decode(&mut *self.log, event, &mut *self.buffer) {
            Ok(event) => ResultFetch::Found(event),
            Err(err) => {
                defñ!("render error {}", err);
                ResultFetch::Err(TailError::Read(format!(
                    "EvtRender failed for eventlog '{}': {}, EventRecordID:{}",
                    self.log_name, err, expected
                )))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// the loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why [`dispatch`] stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// No more records.
    #[default]
    Exhausted,
    /// The sink refused a record.
    SinkRefused,
    /// `max_sent` records were sent.
    SentBudget,
    /// `max_processed` records were processed.
    ProcessedBudget,
    /// A read failed.
    ReadError,
}

/// The results of one [`dispatch`], returned by value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleAccumulator {
    /// Last logical id fully processed.
    pub checkpoint: Checkpoint,
    /// Logical id of the last record the sink accepted.
    pub last_sent: Option<RecordId>,
    /// `Count` of records the sink accepted.
    pub sent: Count,
    /// `Count` of records processed, matching or not.
    pub processed: Count,
    /// `Count` of records whose id was not the expected id.
    pub discrepancies: Count,
    /// `Count` of records at or before the checkpoint, skipped.
    pub stale: Count,
    pub stop: StopReason,
    /// Set when `stop` is [`StopReason::ReadError`].
    pub error: Option<TailError>,
}

impl CycleAccumulator {
    pub fn new(checkpoint: Checkpoint) -> CycleAccumulator {
        CycleAccumulator {
            checkpoint,
            ..Default::default()
        }
    }
}

/// Run the filter and dispatch loop over `source` starting after
/// `checkpoint`.
pub fn dispatch<S, K>(
    source: &mut S,
    filter: &CompiledFilter,
    budget: &RateBudget,
    target: &SinkTarget,
    sink: &mut K,
    checkpoint: Checkpoint,
) -> CycleAccumulator
where
    S: RecordSource + ?Sized,
    K: EventSink + ?Sized,
{
    def1n!("checkpoint {}, {:?}", checkpoint, budget);
    let mut acc = CycleAccumulator::new(checkpoint);
    loop {
        let expected: RecordId = acc.checkpoint.saturating_add(1);
        let event: NormalizedEvent = match source.next_event(expected) {
            ResultFetch::Found(event) => event,
            ResultFetch::Done => {
                acc.stop = StopReason::Exhausted;
                break;
            }
            ResultFetch::Err(err) => {
                def1o!("read error {}", err);
                acc.stop = StopReason::ReadError;
                acc.error = Some(err);
                break;
            }
        };
        let candidate: RecordId = event.record_id;
        if candidate != expected {
            acc.discrepancies += 1;
            def1o!("expected record {} but the log reports {}", expected, candidate);
            if candidate <= acc.checkpoint {
                de_wrn!("record {} is not after checkpoint {}; skipped", candidate, acc.checkpoint);
                acc.stale += 1;
                continue;
            }
        }

        if filter.matches(&event) {
            let record = SinkRecord::new(target, &event);
            match sink.send(&record) {
                Ok(()) => {
                    acc.sent += 1;
                    acc.last_sent = Some(candidate);
                }
                Err(_err) => {
                    def1o!("sink refused record {}: {}", candidate, _err);
                    acc.stop = StopReason::SinkRefused;
                    break;
                }
            }
        }
        acc.processed += 1;
        acc.checkpoint = candidate;

        if acc.sent >= budget.max_sent {
            acc.stop = StopReason::SentBudget;
            break;
        }
        if acc.processed >= budget.max_processed {
            acc.stop = StopReason::ProcessedBudget;
            break;
        }
    }
    def1x!(
        "checkpoint {}, sent {}, processed {}, {:?}",
        acc.checkpoint,
        acc.sent,
        acc.processed,
        acc.stop
    );

    acc
}
