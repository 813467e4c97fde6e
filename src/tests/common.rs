// src/tests/common.rs

//! Common helpers for tests: an in-memory event log implementing the traits
//! of [`crate::readers::api`], a recording [`EventSink`], and record
//! builders.
//!
//! [`EventSink`]: crate::readers::dispatch::EventSink

#![allow(non_snake_case)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use crate::common::{
    Count,
    NativeRecordId,
    RecordId,
    UnixSeconds,
};
use crate::data::event::{
    FILETIME_TICKS_PER_SECOND,
    FILETIME_UNIX_EPOCH_OFFSET,
    EVENTLOG_INFORMATION_TYPE,
    WINEVENT_LEVEL_INFO,
};
use crate::data::eventlogrecord::EventLogRecord;
use crate::data::recordid::narrow_id;
use crate::readers::api::{
    ApiError,
    EventData,
    EventLogApi,
    LegacyEventLog,
    MessageFileApi,
    MessageFiles,
    ModernEventLog,
    ReadDirection,
    ReadMode,
    RenderedEvent,
};
use crate::readers::dispatch::{
    EventSink,
    ItemState,
    SinkRecord,
};
use crate::readers::recordbuffer::GrowableRecordBuffer;

pub const SIM_SOURCE: &str = "TestSource";
pub const SIM_COMPUTER: &str = "HOST1";
pub const SIM_TIME: UnixSeconds = 1_600_000_000;
pub const SIM_EVENT_ID: u32 = 1000;
pub const SIM_MESSAGE_FILE: &str = "C:\\Windows\\System32\\test.dll";
pub const SIM_PARAM_FILE: &str = "C:\\Windows\\System32\\params.dll";

/// `Os` error code the simulator returns for an injected failure.
pub const SIM_ERROR_CODE: u32 = 1359;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SimEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One record of the simulated log, exposed to both backends.
#[derive(Clone, Debug)]
pub struct SimEvent {
    /// Logical id; the legacy API sees its low 32 bits.
    pub record_id: RecordId,
    pub source: String,
    pub event_id: u32,
    /// legacy `EventType`
    pub event_type: u16,
    /// modern `Level`
    pub level: u8,
    pub keywords: u64,
    pub time: UnixSeconds,
    pub strings: Vec<String>,
    pub event_data: EventData,
    /// Result of modern `EvtFormatMessage`.
    pub formatted: Result<String, ApiError>,
}

impl SimEvent {
    pub fn new(record_id: RecordId) -> SimEvent {
        SimEvent {
            record_id,
            source: SIM_SOURCE.to_string(),
            event_id: SIM_EVENT_ID,
            event_type: EVENTLOG_INFORMATION_TYPE,
            level: WINEVENT_LEVEL_INFO,
            keywords: 0,
            time: SIM_TIME,
            strings: vec![format!("insert{}", record_id)],
            event_data: EventData::Single(format!("data{}", record_id)),
            formatted: Ok(format!("message {}", record_id)),
        }
    }

    pub fn native(&self) -> NativeRecordId {
        narrow_id(self.record_id)
    }

    /// The legacy `EVENTLOGRECORD` of this event.
    pub fn to_eventlogrecord(&self) -> EventLogRecord {
        EventLogRecord {
            record_number: self.native(),
            time_generated: self.time,
            time_written: self.time,
            event_id: self.event_id,
            event_type: self.event_type,
            event_category: 0,
            source_name: self.source.clone(),
            computer_name: SIM_COMPUTER.to_string(),
            strings: self.strings.clone(),
            data: vec![],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_eventlogrecord().to_bytes()
    }

    pub fn to_rendered(&self) -> RenderedEvent {
        RenderedEvent {
            provider: self.source.clone(),
            source: None,
            record_id: self.record_id,
            event_id: self.event_id as u16,
            level: self.level,
            keywords: self.keywords,
            time_created: unix_to_filetime(self.time),
            event_data: self.event_data.clone(),
        }
    }
}

pub fn unix_to_filetime(time: UnixSeconds) -> u64 {
    time as u64 * FILETIME_TICKS_PER_SECOND + FILETIME_UNIX_EPOCH_OFFSET
}

/// Events with ids `first..=last`.
pub fn sim_events(
    first: RecordId,
    last: RecordId,
) -> Vec<SimEvent> {
    (first..=last)
        .map(SimEvent::new)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SimLogState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State of the simulated log shared by the api and every handle it opens,
/// so a test can append records between poll cycles.
#[derive(Debug, Default)]
pub struct SimLogState {
    pub name: String,
    /// oldest to newest
    pub events: Vec<SimEvent>,
    pub modern_available: bool,
    pub legacy_available: bool,
    /// legacy positioned reads fail with `ERROR_INVALID_PARAMETER`
    pub seek_unsupported: bool,
    /// legacy sequential reads fail on reaching this record
    pub fail_read_at: Option<RecordId>,
    /// modern render fails for this record
    pub fail_render_at: Option<RecordId>,
    /// modern render needs this many bytes
    pub render_required: usize,
    /// modern `EvtNext` fails
    pub fail_next: bool,
    pub opens: Count,
    pub closes: Count,
    pub positioned_reads: Count,
    pub sequential_reads: Count,
    pub backward_reads: Count,
    /// argument of each modern `query`
    pub queries: Vec<Option<RecordId>>,
    pub renders: Count,
}

pub type SimLog = Rc<RefCell<SimLogState>>;

/// A simulated log named `name` holding `events`, both backends available.
pub fn sim_log(
    name: &str,
    events: Vec<SimEvent>,
) -> SimLog {
    Rc::new(RefCell::new(SimLogState {
        name: name.to_string(),
        events,
        modern_available: true,
        legacy_available: true,
        ..Default::default()
    }))
}

/// Append events `first..=last`.
pub fn sim_append(
    log: &SimLog,
    first: RecordId,
    last: RecordId,
) {
    log.borrow_mut()
        .events
        .extend(sim_events(first, last));
}

/// Drop the oldest events up to and including `last`, as a ring buffer
/// overwriting old records.
pub fn sim_overwrite_until(
    log: &SimLog,
    last: RecordId,
) {
    log.borrow_mut()
        .events
        .retain(|e| e.record_id > last);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SimLegacy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A simulated legacy handle.
///
/// A fresh handle reads forward from the oldest record and backward from
/// the newest. A backward read leaves the forward position one record
/// before the lowest record it returned.
#[derive(Debug)]
pub struct SimLegacy {
    log: SimLog,
    /// index of the next record a forward read returns
    forward: usize,
    /// index of the next record a backward read returns; `None` is newest
    backward: Option<isize>,
}

impl SimLegacy {
    /// Copy whole records `indexes` into `buffer`; stop before an injected
    /// failure.
    fn fill(
        &self,
        indexes: &[usize],
        buffer: &mut [u8],
    ) -> Result<(usize, usize), ApiError> {
        let state = self.log.borrow();
        let mut at: usize = 0;
        let mut copied: usize = 0;
        for index in indexes.iter() {
            let event = &state.events[*index];
            if state.fail_read_at == Some(event.record_id) {
                if copied == 0 {
                    return Err(ApiError::from_code(SIM_ERROR_CODE, "injected read failure".to_string()));
                }
                break;
            }
            let bytes = event.to_bytes();
            if at + bytes.len() > buffer.len() {
                if copied == 0 {
                    return Err(ApiError::InsufficientBuffer {
                        required: bytes.len(),
                    });
                }
                break;
            }
            buffer[at..at + bytes.len()].copy_from_slice(&bytes);
            at += bytes.len();
            copied += 1;
        }

        Ok((at, copied))
    }
}

impl LegacyEventLog for SimLegacy {
    fn number_of_records(&mut self) -> Result<u32, ApiError> {
        Ok(self.log.borrow().events.len() as u32)
    }

    fn oldest_record_number(&mut self) -> Result<NativeRecordId, ApiError> {
        Ok(match self.log.borrow().events.first() {
            Some(event) => event.native(),
            None => 0,
        })
    }

    fn read(
        &mut self,
        mode: ReadMode,
        direction: ReadDirection,
        buffer: &mut [u8],
    ) -> Result<usize, ApiError> {
        let len: usize = self.log.borrow().events.len();
        match (mode, direction) {
            (ReadMode::Seek(native), ReadDirection::Forwards) => {
                self.log.borrow_mut().positioned_reads += 1;
                if self.log.borrow().seek_unsupported {
                    return Err(ApiError::InvalidParameter);
                }
                let found: Option<usize> = self
                    .log
                    .borrow()
                    .events
                    .iter()
                    .position(|e| e.native() == native);
                let start: usize = match found {
                    Some(start) => start,
                    None => {
                        let newest: Option<NativeRecordId> = self.log.borrow().events.last().map(|e| e.native());
                        return match newest {
                            Some(newest) if newest.wrapping_add(1) == native => Err(ApiError::HandleEof),
                            None => Err(ApiError::HandleEof),
                            _ => Err(ApiError::InvalidParameter),
                        };
                    }
                };
                let indexes: Vec<usize> = (start..len).collect();
                let (read, copied) = self.fill(&indexes, buffer)?;
                self.forward = start + copied;

                Ok(read)
            }
            (ReadMode::Seek(_), ReadDirection::Backwards) => Err(ApiError::InvalidParameter),
            (ReadMode::Sequential, ReadDirection::Forwards) => {
                self.log.borrow_mut().sequential_reads += 1;
                if self.forward >= len {
                    return Err(ApiError::HandleEof);
                }
                let indexes: Vec<usize> = (self.forward..len).collect();
                let (read, copied) = self.fill(&indexes, buffer)?;
                self.forward += copied;

                Ok(read)
            }
            (ReadMode::Sequential, ReadDirection::Backwards) => {
                self.log.borrow_mut().backward_reads += 1;
                let start: isize = self.backward.unwrap_or(len as isize - 1);
                if start < 0 {
                    return Err(ApiError::HandleEof);
                }
                let indexes: Vec<usize> = (0..=start as usize).rev().collect();
                let (read, copied) = self.fill(&indexes, buffer)?;
                let lowest: isize = start - copied as isize + 1;
                self.backward = Some(lowest - 1);
                self.forward = (lowest - 1).max(0) as usize;

                Ok(read)
            }
        }
    }
}

impl Drop for SimLegacy {
    fn drop(&mut self) {
        self.log.borrow_mut().closes += 1;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SimModern
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A simulated modern event handle, an index into the simulated log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimEventHandle(pub usize);

/// A simulated modern channel.
#[derive(Debug)]
pub struct SimModern {
    log: SimLog,
    /// indexes selected by the current query
    results: Vec<usize>,
    at: usize,
}

impl SimModern {
    pub fn log(&self) -> &SimLog {
        &self.log
    }
}

impl ModernEventLog for SimModern {
    type Event = SimEventHandle;

    fn record_count(&mut self) -> Result<Count, ApiError> {
        Ok(self.log.borrow().events.len() as Count)
    }

    fn query(
        &mut self,
        after: Option<RecordId>,
    ) -> Result<(), ApiError> {
        let mut state = self.log.borrow_mut();
        state.queries.push(after);
        self.results = state
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| match after {
                Some(after) => e.record_id > after,
                None => true,
            })
            .map(|(i, _)| i)
            .collect();
        self.at = 0;

        Ok(())
    }

    fn next(
        &mut self,
        max: usize,
        events: &mut Vec<SimEventHandle>,
    ) -> Result<usize, ApiError> {
        if self.log.borrow().fail_next {
            return Err(ApiError::from_code(SIM_ERROR_CODE, "injected next failure".to_string()));
        }
        if self.at >= self.results.len() {
            return Err(ApiError::NoMoreItems);
        }
        let end: usize = (self.at + max).min(self.results.len());
        events.extend(
            self.results[self.at..end]
                .iter()
                .map(|i| SimEventHandle(*i)),
        );
        let returned = end - self.at;
        self.at = end;

        Ok(returned)
    }

    fn render(
        &mut self,
        event: &SimEventHandle,
        buffer: &mut GrowableRecordBuffer,
    ) -> Result<RenderedEvent, ApiError> {
        let mut state = self.log.borrow_mut();
        state.renders += 1;
        if buffer.capacity() < state.render_required {
            return Err(ApiError::InsufficientBuffer {
                required: state.render_required,
            });
        }
        let sim = &state.events[event.0];
        if state.fail_render_at == Some(sim.record_id) {
            return Err(ApiError::from_code(SIM_ERROR_CODE, "injected render failure".to_string()));
        }

        Ok(sim.to_rendered())
    }

    fn format_message(
        &mut self,
        _provider: &str,
        event: &SimEventHandle,
        _buffer: &mut GrowableRecordBuffer,
    ) -> Result<String, ApiError> {
        self.log.borrow().events[event.0]
            .formatted
            .clone()
    }
}

impl Drop for SimModern {
    fn drop(&mut self) {
        self.log.borrow_mut().closes += 1;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SimMessages, SimApi
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Simulated registry and message files.
#[derive(Debug, Default)]
pub struct SimMessages {
    /// `source → message files`
    pub files: HashMap<String, MessageFiles>,
    /// `(path, message id) → template` using `%1`…`%n` inserts
    pub table: HashMap<(String, u32), String>,
    pub lookups: Count,
    pub formats: Count,
}

impl SimMessages {
    /// Register `source` with one event message file holding `message_id`.
    pub fn with_message(
        mut self,
        source: &str,
        message_id: u32,
        template: &str,
    ) -> SimMessages {
        self.files.insert(
            source.to_string(),
            MessageFiles {
                event_message_file: Some(SIM_MESSAGE_FILE.to_string()),
                parameter_message_file: Some(SIM_PARAM_FILE.to_string()),
            },
        );
        self.table
            .insert((SIM_MESSAGE_FILE.to_string(), message_id), template.to_string());

        self
    }
}

impl MessageFileApi for SimMessages {
    fn message_files(
        &mut self,
        _log_name: &str,
        source: &str,
    ) -> Option<MessageFiles> {
        self.lookups += 1;
        self.files.get(source).cloned()
    }

    fn format_message(
        &mut self,
        path: &str,
        message_id: u32,
        inserts: Option<&[String]>,
    ) -> Option<String> {
        self.formats += 1;
        let mut message: String = self
            .table
            .get(&(path.to_string(), message_id))?
            .clone();
        if let Some(inserts) = inserts {
            for (i, insert) in inserts.iter().enumerate().rev() {
                message = message.replace(&format!("%{}", i + 1), insert);
            }
        }

        Some(message)
    }
}

/// Simulated [`EventLogApi`] over one [`SimLog`].
#[derive(Debug)]
pub struct SimApi {
    pub log: SimLog,
    pub messages: SimMessages,
}

impl SimApi {
    pub fn new(log: &SimLog) -> SimApi {
        SimApi {
            log: log.clone(),
            messages: SimMessages::default(),
        }
    }

    pub fn with_messages(
        log: &SimLog,
        messages: SimMessages,
    ) -> SimApi {
        SimApi {
            log: log.clone(),
            messages,
        }
    }
}

impl EventLogApi for SimApi {
    type Legacy = SimLegacy;
    type Modern = SimModern;
    type Messages = SimMessages;

    fn open_modern(
        &mut self,
        log_name: &str,
    ) -> Result<SimModern, ApiError> {
        let mut state = self.log.borrow_mut();
        if !state.modern_available || state.name != log_name {
            return Err(ApiError::ChannelNotFound);
        }
        state.opens += 1;

        Ok(SimModern {
            log: self.log.clone(),
            results: vec![],
            at: 0,
        })
    }

    fn open_legacy(
        &mut self,
        log_name: &str,
    ) -> Result<SimLegacy, ApiError> {
        let mut state = self.log.borrow_mut();
        if !state.legacy_available || state.name != log_name {
            return Err(ApiError::from_code(2, "The system cannot find the file specified".to_string()));
        }
        state.opens += 1;

        Ok(SimLegacy {
            log: self.log.clone(),
            forward: 0,
            backward: None,
        })
    }

    fn messages(&mut self) -> &mut SimMessages {
        &mut self.messages
    }
}

/// A simulated log available only through the legacy API if `legacy`,
/// otherwise only through the modern API.
pub fn sim_log_only(
    name: &str,
    events: Vec<SimEvent>,
    legacy: bool,
) -> SimLog {
    let log = sim_log(name, events);
    {
        let mut state = log.borrow_mut();
        state.modern_available = !legacy;
        state.legacy_available = legacy;
    }

    log
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VecSink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owned copy of a [`SinkRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentRecord {
    pub host: String,
    pub item_key: String,
    pub message: String,
    pub state: ItemState,
    pub checkpoint: RecordId,
    pub timestamp: UnixSeconds,
    pub source: String,
    pub severity: u8,
    pub event_id: u32,
    pub flags: u8,
}

/// An [`EventSink`] recording each accepted record.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<SentRecord>,
    /// refuse every send once this many were accepted
    pub refuse_after: Option<usize>,
    pub refusals: Count,
}

impl VecSink {
    pub fn new() -> VecSink {
        VecSink::default()
    }

    pub fn refusing_after(accepted: usize) -> VecSink {
        VecSink {
            refuse_after: Some(accepted),
            ..Default::default()
        }
    }

    pub fn checkpoints(&self) -> Vec<RecordId> {
        self.records
            .iter()
            .map(|r| r.checkpoint)
            .collect()
    }
}

impl EventSink for VecSink {
    fn send(
        &mut self,
        record: &SinkRecord,
    ) -> Result<(), String> {
        if let Some(after) = self.refuse_after {
            if self.records.len() >= after {
                self.refusals += 1;
                return Err("sink full".to_string());
            }
        }
        self.records.push(SentRecord {
            host: record.host.to_string(),
            item_key: record.item_key.to_string(),
            message: record.message.to_string(),
            state: record.state,
            checkpoint: record.checkpoint,
            timestamp: record.timestamp,
            source: record.source.to_string(),
            severity: record.severity,
            event_id: record.event_id,
            flags: record.flags,
        });

        Ok(())
    }
}
